//! Stage runner: compute, gate, commit, or load a checkpointed artifact

use std::future::Future;
use std::sync::Arc;

use deep_research_sdk::log_artifact_committed;

use crate::research::artifacts::{Artifact, ArtifactStore, StageKey};
use crate::research::checkpoint::RunCheckpoint;
use crate::research::errors::StageFailure;
use crate::research::gates::GateVerdict;

/// Where a stage result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Computed,
    Resumed,
}

pub struct StageRunner {
    store: Arc<dyn ArtifactStore>,
    checkpoint: RunCheckpoint,
    resume: bool,
}

impl StageRunner {
    pub fn new(store: Arc<dyn ArtifactStore>, checkpoint: RunCheckpoint, resume: bool) -> Self {
        Self {
            store,
            checkpoint,
            resume,
        }
    }

    pub fn checkpoint(&self) -> &RunCheckpoint {
        &self.checkpoint
    }

    pub fn run_id(&self) -> &str {
        self.checkpoint.run_id()
    }

    pub fn resume(&self) -> bool {
        self.resume
    }

    /// True when `key` would be served from the checkpoint
    pub fn is_checkpointed(&self, key: StageKey) -> bool {
        self.resume && self.checkpoint.contains(key)
    }

    /// Load and decode a committed artifact
    pub async fn load<T: Artifact>(&self, key: StageKey) -> Result<T, StageFailure> {
        let stage = key.stage();
        let bytes = self
            .store
            .load(self.run_id(), key)
            .await
            .map_err(|e| StageFailure::storage(stage, e))?;
        T::decode(&bytes)
            .map_err(|e| StageFailure::storage(stage, e.context(format!("corrupt artifact {}", key))))
    }

    /// Run one stage invocation.
    ///
    /// With resume enabled and `key` already committed, the artifact is loaded and returned
    /// without calling `compute` or re-applying the gate. Otherwise `compute` runs, `gate`
    /// judges the candidate, and a passing candidate is committed exactly once.
    pub async fn run<T, C, Fut, G>(
        &self,
        key: StageKey,
        compute: C,
        gate: G,
    ) -> Result<(T, Provenance), StageFailure>
    where
        T: Artifact,
        C: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        G: FnOnce(&T) -> GateVerdict,
    {
        let stage = key.stage();

        if self.is_checkpointed(key) {
            tracing::debug!(run_id = self.run_id(), key = %key, "loading checkpointed artifact");
            let artifact = self.load(key).await?;
            return Ok((artifact, Provenance::Resumed));
        }

        let candidate = compute()
            .await
            .map_err(|e| StageFailure::collaborator(stage, e))?;

        gate(&candidate).into_result(stage)?;

        let bytes = candidate
            .encode()
            .map_err(|e| StageFailure::storage(stage, e))?;
        self.store
            .commit(self.run_id(), key, &bytes)
            .await
            .map_err(|e| StageFailure::storage(stage, e))?;
        self.checkpoint.record(key);
        log_artifact_committed!(stage, key, bytes.len());

        Ok((candidate, Provenance::Computed))
    }
}
