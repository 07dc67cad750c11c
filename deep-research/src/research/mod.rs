//! Research pipeline module
//!
//! Drives a query through five gated stages: brief, topic plan, parallel per-topic
//! research, compression, and the final report. Stage outputs are committed as artifacts
//! so an interrupted run can resume from the last completed boundary.

pub mod artifacts;
pub mod checkpoint;
pub mod cli;
pub mod errors;
pub mod gates;
pub mod phase0_brief;
pub mod phase1_plan;
pub mod phase2_research;
pub mod phase3_compress;
pub mod phase4_report;
pub mod prompts;
pub mod stage;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use artifacts::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, StageKey};
pub use errors::{StageFailure, TaskFailure};
pub use gates::{GateThresholds, GateVerdict};
pub use types::{
    Brief, CompressedFindings, Report, ResearchBatch, Source, SourceUrl, Topic, TopicFindings,
    TopicOutcome, TopicSet,
};
pub use workflow::{derive_run_id, run_research_pipeline, Pipeline, PipelineOptions, PipelineState};
