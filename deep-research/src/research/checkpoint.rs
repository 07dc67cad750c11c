//! Run checkpoint: which artifacts of a run are already committed
//!
//! The checkpoint is loaded once from the store when a run opens and updated after every
//! commit. Fan-out tasks record disjoint `findings/<i>` keys, so the lock is only held for
//! set insertion.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use deep_research_sdk::{log_warning, Stage};

use crate::research::artifacts::{ArtifactStore, StageKey};
use crate::research::errors::StageFailure;
use crate::research::workflow::PipelineState;

#[derive(Debug)]
pub struct RunCheckpoint {
    run_id: String,
    committed: Mutex<BTreeSet<StageKey>>,
}

impl RunCheckpoint {
    /// Open the checkpoint for `run_id`.
    ///
    /// A fresh (non-resume) run discards whatever an earlier run left under the same id,
    /// so stale slots can never be picked up by a later resume.
    pub async fn open(
        store: &dyn ArtifactStore,
        run_id: &str,
        resume: bool,
    ) -> Result<Self, StageFailure> {
        let existing = store
            .keys(run_id)
            .await
            .map_err(|e| StageFailure::storage(Stage::Brief, e))?;

        let committed = if resume {
            tracing::info!(run_id, artifacts = existing.len(), "resuming run");
            existing
        } else {
            if !existing.is_empty() {
                log_warning!(
                    "Discarding {} artifact(s) from an earlier run of '{}' (resume is off)",
                    existing.len(),
                    run_id
                );
                store
                    .discard(run_id)
                    .await
                    .map_err(|e| StageFailure::storage(Stage::Brief, e))?;
            }
            BTreeSet::new()
        };

        Ok(Self {
            run_id: run_id.to_string(),
            committed: Mutex::new(committed),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn contains(&self, key: StageKey) -> bool {
        self.lock().contains(&key)
    }

    pub fn record(&self, key: StageKey) {
        self.lock().insert(key);
    }

    /// Indices of committed per-topic findings, ascending
    pub fn findings_indices(&self) -> Vec<usize> {
        self.lock()
            .iter()
            .filter_map(|key| match key {
                StageKey::Findings(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<StageKey>> {
        self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most advanced state the run can re-enter at.
    ///
    /// Each artifact is derived from the one before it, so a later artifact without its
    /// prerequisite means the checkpoint was tampered with or partially deleted. That is
    /// reported, never repaired.
    pub fn resume_point(&self) -> Result<PipelineState, StageFailure> {
        let has = |key| self.contains(key);
        let findings = self.findings_indices();

        let inconsistent = |stage: Stage, reason: String| StageFailure::ResumeInconsistency {
            stage,
            reason,
        };

        if has(StageKey::Report) && !has(StageKey::Compressed) {
            return Err(inconsistent(
                Stage::Report,
                "report exists but compressed findings do not".to_string(),
            ));
        }
        if has(StageKey::Compressed) && findings.is_empty() {
            return Err(inconsistent(
                Stage::Compress,
                "compressed findings exist but no per-topic findings do".to_string(),
            ));
        }
        if !findings.is_empty() && !has(StageKey::Topics) {
            let listed = findings
                .iter()
                .map(|i| StageKey::Findings(*i).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(inconsistent(
                Stage::Research,
                format!("{} exist but topics do not", listed),
            ));
        }
        if has(StageKey::Topics) && !has(StageKey::Brief) {
            return Err(inconsistent(
                Stage::Topics,
                "topics exist but the brief does not".to_string(),
            ));
        }

        let state = if has(StageKey::Report) {
            PipelineState::Reported
        } else if has(StageKey::Compressed) {
            PipelineState::Compressed
        } else if has(StageKey::Topics) {
            PipelineState::Planned
        } else if has(StageKey::Brief) {
            PipelineState::Briefed
        } else {
            PipelineState::Start
        };
        Ok(state)
    }
}
