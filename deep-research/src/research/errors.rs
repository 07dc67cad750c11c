//! Failure types surfaced by a research run
//!
//! Every run ends in either a complete report or exactly one [`StageFailure`] naming the
//! stage (and, for batch failures, the topics) that broke.

use deep_research_sdk::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One fan-out task that did not produce usable findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub topic_index: usize,
    pub reason: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topic {}: {}", self.topic_index, self.reason)
    }
}

fn describe_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(TaskFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal, structured failure of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageFailure {
    /// A stage produced output that failed its structural gate
    #[error("[{stage}] gate failed: {reason}")]
    Gate { stage: Stage, reason: String },

    /// Every research task failed, so nothing usable reached compression
    #[error("[research] all {} research tasks failed: {}", .failures.len(), describe_failures(.failures))]
    Batch { failures: Vec<TaskFailure> },

    /// A checkpointed artifact exists without the artifact it was derived from
    #[error("[{stage}] resume inconsistency: {reason}")]
    ResumeInconsistency { stage: Stage, reason: String },

    /// The content-generation collaborator errored or returned something unreadable
    #[error("[{stage}] collaborator error: {reason}")]
    Collaborator { stage: Stage, reason: String },

    #[error("[{stage}] storage error: {reason}")]
    Storage { stage: Stage, reason: String },

    #[error("invalid pipeline options: {reason}")]
    InvalidOptions { reason: String },
}

impl StageFailure {
    /// Stage the failure is attributed to; `None` only for rejected options
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageFailure::Gate { stage, .. }
            | StageFailure::ResumeInconsistency { stage, .. }
            | StageFailure::Collaborator { stage, .. }
            | StageFailure::Storage { stage, .. } => Some(*stage),
            StageFailure::Batch { .. } => Some(Stage::Research),
            StageFailure::InvalidOptions { .. } => None,
        }
    }

    /// Diagnostic without the stage prefix
    pub fn reason(&self) -> String {
        match self {
            StageFailure::Gate { reason, .. }
            | StageFailure::ResumeInconsistency { reason, .. }
            | StageFailure::Collaborator { reason, .. }
            | StageFailure::Storage { reason, .. }
            | StageFailure::InvalidOptions { reason } => reason.clone(),
            StageFailure::Batch { failures } => describe_failures(failures),
        }
    }

    /// Topic indices that failed, when the failure is a batch failure
    pub fn failed_topics(&self) -> Vec<usize> {
        match self {
            StageFailure::Batch { failures } => failures.iter().map(|f| f.topic_index).collect(),
            _ => Vec::new(),
        }
    }

    /// Reason for an untyped task error: a wrapped `StageFailure` without its stage
    /// prefix, anything else as its full context chain
    pub fn reason_of(error: &anyhow::Error) -> String {
        match error.downcast_ref::<StageFailure>() {
            Some(failure) => failure.reason(),
            None => format!("{:#}", error),
        }
    }

    pub(crate) fn storage(stage: Stage, error: anyhow::Error) -> Self {
        StageFailure::Storage {
            stage,
            reason: format!("{:#}", error),
        }
    }

    pub(crate) fn collaborator(stage: Stage, error: anyhow::Error) -> Self {
        StageFailure::Collaborator {
            stage,
            reason: format!("{:#}", error),
        }
    }
}
