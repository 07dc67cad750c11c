//! Workflow utilities shared by the pipeline stages
//!
//! - **batch**: bounded-concurrency fan-out with per-task failure isolation
//! - **task**: task-level progress logging
//! - **yaml**: extraction and typed parsing of structured collaborator output

pub mod batch;
pub mod task;
pub mod yaml;

pub use batch::{execute_batch, TaskContext};
pub use task::execute_task;
pub use yaml::{clean_yaml, extract_yaml, parse_structured, parse_yaml};
