//! Durable storage for stage artifacts
//!
//! One blob per (run id, [`StageKey`]). The filesystem store commits each blob by writing a
//! temporary sibling and renaming it into place, so an existence check never observes a
//! partially written artifact.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use deep_research_sdk::Stage;

use crate::research::types::{Brief, CompressedFindings, Report, TopicFindings, TopicSet};

const TMP_SUFFIX: &str = ".tmp";
const FINDINGS_DIR: &str = "findings";

/// Address of one persisted artifact within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKey {
    Brief,
    Topics,
    Findings(usize),
    Compressed,
    Report,
}

impl StageKey {
    /// Stage that produces the artifact
    pub fn stage(&self) -> Stage {
        match self {
            StageKey::Brief => Stage::Brief,
            StageKey::Topics => Stage::Topics,
            StageKey::Findings(_) => Stage::Research,
            StageKey::Compressed => Stage::Compress,
            StageKey::Report => Stage::Report,
        }
    }

    /// Path relative to the run directory
    pub fn file_name(&self) -> String {
        match self {
            StageKey::Brief => "brief.md".to_string(),
            StageKey::Topics => "topics.yaml".to_string(),
            StageKey::Findings(i) => format!("{}/{}.yaml", FINDINGS_DIR, i),
            StageKey::Compressed => "compressed.yaml".to_string(),
            StageKey::Report => "report.md".to_string(),
        }
    }

    /// Inverse of [`StageKey::file_name`] for top-level files
    fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "brief.md" => Some(StageKey::Brief),
            "topics.yaml" => Some(StageKey::Topics),
            "compressed.yaml" => Some(StageKey::Compressed),
            "report.md" => Some(StageKey::Report),
            _ => None,
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKey::Brief => f.write_str("brief"),
            StageKey::Topics => f.write_str("topics"),
            StageKey::Findings(i) => write!(f, "findings/{}", i),
            StageKey::Compressed => f.write_str("compressed"),
            StageKey::Report => f.write_str("report"),
        }
    }
}

impl FromStr for StageKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "brief" => Ok(StageKey::Brief),
            "topics" => Ok(StageKey::Topics),
            "compressed" => Ok(StageKey::Compressed),
            "report" => Ok(StageKey::Report),
            other => {
                let index = other
                    .strip_prefix("findings/")
                    .ok_or_else(|| anyhow!("unknown stage key `{}`", other))?;
                let index = index
                    .parse::<usize>()
                    .with_context(|| format!("invalid topic index in stage key `{}`", other))?;
                Ok(StageKey::Findings(index))
            }
        }
    }
}

/// Byte encoding of a stage artifact
pub trait Artifact: Sized {
    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

fn encode_yaml<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_yaml::to_string(value)
        .context("Failed to serialize artifact")?
        .into_bytes())
}

fn decode_yaml<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_yaml::from_slice(bytes).context("Failed to deserialize artifact")
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).context("Artifact is not valid UTF-8")
}

impl Artifact for Brief {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.text().as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_text(bytes).map(Brief::new)
    }
}

impl Artifact for Report {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.markdown().as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_text(bytes).map(Report::new)
    }
}

macro_rules! yaml_artifact {
    ($($ty:ty),+) => {
        $(
            impl Artifact for $ty {
                fn encode(&self) -> Result<Vec<u8>> {
                    encode_yaml(self)
                }

                fn decode(bytes: &[u8]) -> Result<Self> {
                    decode_yaml(bytes)
                }
            }
        )+
    };
}

yaml_artifact!(TopicSet, TopicFindings, CompressedFindings);

/// Persists named artifacts per run
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn exists(&self, run_id: &str, key: StageKey) -> Result<bool>;

    async fn load(&self, run_id: &str, key: StageKey) -> Result<Vec<u8>>;

    /// Replace-once write; visible to `exists`/`load` only once complete
    async fn commit(&self, run_id: &str, key: StageKey, bytes: &[u8]) -> Result<()>;

    /// Every committed key for the run
    async fn keys(&self, run_id: &str) -> Result<BTreeSet<StageKey>>;

    /// Remove every artifact of the run
    async fn discard(&self, run_id: &str) -> Result<()>;
}

/// Run ids become directory names; keep them to a single safe path segment
pub fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty() {
        bail!("run id is empty");
    }
    if run_id.starts_with('.')
        || !run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        bail!(
            "run id `{}` must contain only ASCII letters, digits, '-', '_' or '.' and not start with '.'",
            run_id
        );
    }
    Ok(())
}

/// Filesystem layout: `<root>/<run_id>/<key file>`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        validate_run_id(run_id)?;
        Ok(self.root.join(run_id))
    }

    fn path_for(&self, run_id: &str, key: StageKey) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join(key.file_name()))
    }
}

async fn dir_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read directory {}", dir.display()))
        }
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        if let Some(name) = entry.file_name().to_str() {
            if !name.ends_with(TMP_SUFFIX) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn exists(&self, run_id: &str, key: StageKey) -> Result<bool> {
        let path = self.path_for(run_id, key)?;
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check {}", path.display()))
    }

    async fn load(&self, run_id: &str, key: StageKey) -> Result<Vec<u8>> {
        let path = self.path_for(run_id, key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read artifact {}", path.display()))
    }

    async fn commit(&self, run_id: &str, key: StageKey, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(run_id, key)?;
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("artifact path {} has no parent", path.display()))?;
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(TMP_SUFFIX);
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to commit artifact {}", path.display()))?;

        tracing::debug!(run_id, key = %key, bytes = bytes.len(), path = %path.display(), "artifact committed");
        Ok(())
    }

    async fn keys(&self, run_id: &str) -> Result<BTreeSet<StageKey>> {
        let run_dir = self.run_dir(run_id)?;
        let mut keys: BTreeSet<StageKey> = dir_file_names(&run_dir)
            .await?
            .iter()
            .filter_map(|name| StageKey::from_file_name(name))
            .collect();

        for name in dir_file_names(&run_dir.join(FINDINGS_DIR)).await? {
            match name.strip_suffix(".yaml").map(str::parse::<usize>) {
                Some(Ok(index)) => {
                    keys.insert(StageKey::Findings(index));
                }
                _ => tracing::warn!(run_id, file = %name, "ignoring unrecognized findings file"),
            }
        }

        Ok(keys)
    }

    async fn discard(&self, run_id: &str) -> Result<()> {
        let run_dir = self.run_dir(run_id)?;
        match tokio::fs::remove_dir_all(&run_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", run_dir.display())),
        }
    }
}

/// Process-local store used when no checkpoint location is configured
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<BTreeMap<(String, StageKey), Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn exists(&self, run_id: &str, key: StageKey) -> Result<bool> {
        Ok(self
            .blobs
            .read()
            .await
            .contains_key(&(run_id.to_string(), key)))
    }

    async fn load(&self, run_id: &str, key: StageKey) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(&(run_id.to_string(), key))
            .cloned()
            .ok_or_else(|| anyhow!("artifact {} not found for run {}", key, run_id))
    }

    async fn commit(&self, run_id: &str, key: StageKey, bytes: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .await
            .insert((run_id.to_string(), key), bytes.to_vec());
        Ok(())
    }

    async fn keys(&self, run_id: &str) -> Result<BTreeSet<StageKey>> {
        Ok(self
            .blobs
            .read()
            .await
            .keys()
            .filter(|(id, _)| id == run_id)
            .map(|(_, key)| *key)
            .collect())
    }

    async fn discard(&self, run_id: &str) -> Result<()> {
        self.blobs.write().await.retain(|(id, _), _| id != run_id);
        Ok(())
    }
}
