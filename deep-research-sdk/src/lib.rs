//! SDK for embedding the deep-research pipeline.
//!
//! Holds the pieces that surrounding tooling links against without pulling in the
//! pipeline itself:
//! - [`Stage`], the fixed stage sequence
//! - the two collaborator capabilities, [`ContentGenerator`] and [`SearchProvider`]
//! - [`PipelineLog`], the structured progress events emitted on stderr, plus the
//!   `log_*!` helper macros

// Re-export async trait for collaborator implementations
pub use async_trait::async_trait;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One sequential phase of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Brief,
    Topics,
    Research,
    Compress,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Brief,
        Stage::Topics,
        Stage::Research,
        Stage::Compress,
        Stage::Report,
    ];

    /// Stable machine name, used in failures and artifact keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Brief => "brief",
            Stage::Topics => "topics",
            Stage::Research => "research",
            Stage::Compress => "compress",
            Stage::Report => "report",
        }
    }

    /// Zero-based position in the pipeline
    pub fn number(&self) -> usize {
        match self {
            Stage::Brief => 0,
            Stage::Topics => 1,
            Stage::Research => 2,
            Stage::Compress => 3,
            Stage::Report => 4,
        }
    }

    /// Human-readable title for progress displays
    pub fn title(&self) -> &'static str {
        match self {
            Stage::Brief => "Write Brief",
            Stage::Topics => "Plan Topics",
            Stage::Research => "Research Topics",
            Stage::Compress => "Compress Findings",
            Stage::Report => "Write Report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single prompt handed to the content-generation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub stage: Stage,
    pub prompt: String,
    /// Set for research turns so implementations can route or label per topic
    pub topic_index: Option<usize>,
}

impl GenerationRequest {
    pub fn new(stage: Stage, prompt: impl Into<String>) -> Self {
        Self {
            stage,
            prompt: prompt.into(),
            topic_index: None,
        }
    }

    pub fn for_topic(mut self, topic_index: usize) -> Self {
        self.topic_index = Some(topic_index);
        self
    }
}

/// Maps a stage prompt to generated text.
///
/// Structured stages expect YAML or JSON in the returned text (optionally fenced);
/// any error is treated by the pipeline as a failure of the calling stage or task.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String>;
}

/// One result snippet from a search action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Maps a query string to a finite, lazily consumed sequence of hits.
///
/// Each search action issues a fresh call; streams are never restarted.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<BoxStream<'static, SearchHit>>;
}

/// Marker that prefixes every serialized event on stderr
pub const EVENT_PREFIX: &str = "__DR_EVENT__:";

/// Structured progress events emitted by a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineLog {
    StageStarted {
        stage: usize,
        name: String,
        total_stages: usize,
    },
    StageCompleted {
        stage: usize,
        name: String,
    },
    /// Stage output was loaded from a checkpoint instead of computed
    StageSkipped {
        stage: usize,
        name: String,
        reason: String,
    },
    StageFailed {
        stage: usize,
        name: String,
        error: String,
    },
    TaskStarted {
        stage: usize,
        task_id: String,
        description: String,
        total_tasks: Option<usize>,
    },
    TaskProgress {
        task_id: String,
        message: String,
    },
    TaskCompleted {
        task_id: String,
        result: Option<String>,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    /// Task result was loaded from a checkpoint
    TaskSkipped {
        task_id: String,
        reason: String,
    },
    ArtifactCommitted {
        stage: usize,
        key: String,
        bytes: usize,
    },
}

impl PipelineLog {
    /// Serialize with the event marker, for consumers parsing stderr
    pub fn to_line(&self) -> Option<String> {
        serde_json::to_string(self)
            .ok()
            .map(|json| format!("{}{}", EVENT_PREFIX, json))
    }

    /// Emit this event to stderr
    pub fn emit(&self) {
        if let Some(line) = self.to_line() {
            use std::io::Write;
            eprintln!("{}", line);
            // Flush so interleaved task output stays line-ordered
            let _ = std::io::stderr().flush();
        }
    }

    /// Parse a stderr line back into an event, if it carries the marker
    pub fn parse_line(line: &str) -> Option<Self> {
        line.strip_prefix(EVENT_PREFIX)
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

/// Helper macros for pipeline event logging
#[macro_export]
macro_rules! log_stage_start {
    ($stage:expr) => {
        $crate::PipelineLog::StageStarted {
            stage: $stage.number(),
            name: $stage.title().to_string(),
            total_stages: $crate::Stage::ALL.len(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_stage_complete {
    ($stage:expr) => {
        $crate::PipelineLog::StageCompleted {
            stage: $stage.number(),
            name: $stage.title().to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_stage_skipped {
    ($stage:expr, $reason:expr) => {
        $crate::PipelineLog::StageSkipped {
            stage: $stage.number(),
            name: $stage.title().to_string(),
            reason: $reason.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_stage_failed {
    ($stage:expr, $error:expr) => {
        $crate::PipelineLog::StageFailed {
            stage: $stage.number(),
            name: $stage.title().to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_start {
    ($stage:expr, $task_id:expr, $desc:expr) => {
        $crate::PipelineLog::TaskStarted {
            stage: $stage.number(),
            task_id: $task_id.to_string(),
            description: $desc.to_string(),
            total_tasks: None,
        }
        .emit();
    };
    ($stage:expr, $task_id:expr, $desc:expr, $total:expr) => {
        $crate::PipelineLog::TaskStarted {
            stage: $stage.number(),
            task_id: $task_id.to_string(),
            description: $desc.to_string(),
            total_tasks: Some($total),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_progress {
    ($task_id:expr, $msg:expr) => {
        $crate::PipelineLog::TaskProgress {
            task_id: $task_id.to_string(),
            message: $msg.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_complete {
    ($task_id:expr) => {
        $crate::PipelineLog::TaskCompleted {
            task_id: $task_id.to_string(),
            result: None,
        }
        .emit();
    };
    ($task_id:expr, $result:expr) => {
        $crate::PipelineLog::TaskCompleted {
            task_id: $task_id.to_string(),
            result: Some($result.to_string()),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_failed {
    ($task_id:expr, $error:expr) => {
        $crate::PipelineLog::TaskFailed {
            task_id: $task_id.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_skipped {
    ($task_id:expr, $reason:expr) => {
        $crate::PipelineLog::TaskSkipped {
            task_id: $task_id.to_string(),
            reason: $reason.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_artifact_committed {
    ($stage:expr, $key:expr, $bytes:expr) => {
        $crate::PipelineLog::ArtifactCommitted {
            stage: $stage.number(),
            key: $key.to_string(),
            bytes: $bytes,
        }
        .emit();
    };
}

// ============================================================================
// Console Logging Macros (for the CLI)
// ============================================================================

/// Logs an informational message.
///
/// # Example
/// ```
/// use deep_research_sdk::log_info;
/// log_info!("Loading checkpoint...");
/// ```
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        eprintln!("\x1b[90m→ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        eprintln!("\x1b[90m→ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
///
/// # Example
/// ```
/// use deep_research_sdk::log_warning;
/// log_warning!("Search provider not configured");
/// ```
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        eprintln!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        eprintln!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs that a file has been saved.
///
/// # Example
/// ```
/// use deep_research_sdk::log_file_saved;
/// log_file_saved!("./report.md");
/// ```
#[macro_export]
macro_rules! log_file_saved {
    ($path:expr) => {
        eprintln!("\x1b[32m✓ Saved: {}\x1b[0m", $path);
    };
}
