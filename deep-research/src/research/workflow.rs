//! Pipeline orchestration for a research run
//!
//! The stage sequence is fixed, so the controller is an explicit state machine over
//! [`PipelineState`]. Each transition runs one stage through the [`StageRunner`] (compute,
//! gate, commit) except `Planned → Researched`, which fans out over the topics and rejoins
//! once every task has settled.
//!
//! The primary entry point is [`run_research_pipeline`]; [`Pipeline`] is the reusable form
//! for callers that run several queries against the same collaborators.

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deep_research_sdk::{
    log_stage_complete, log_stage_failed, log_stage_skipped, log_stage_start, ContentGenerator,
    SearchProvider, Stage,
};

use crate::research::{
    artifacts::{validate_run_id, ArtifactStore, FsArtifactStore, MemoryArtifactStore, StageKey},
    checkpoint::RunCheckpoint,
    errors::StageFailure,
    gates::{self, GateThresholds},
    phase0_brief::write_brief,
    phase1_plan::plan_topics,
    phase2_research::{research_topics, FanOutSettings, Researcher},
    phase3_compress::compress_findings,
    phase4_report::write_report,
    stage::{Provenance, StageRunner},
    types::{Brief, CompressedFindings, Report, ResearchBatch, TopicSet},
};

/// Configuration for one pipeline run
///
/// # Examples
///
/// ```no_run
/// use deep_research::research::PipelineOptions;
///
/// let options = PipelineOptions {
///     max_concurrency: 5,
///     resume: true,
///     checkpoint_location: Some("./checkpoints".into()),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Research tasks allowed to run at once
    pub max_concurrency: usize,
    /// Search actions each research task may issue
    pub max_effort_per_topic: usize,
    /// Reuse committed artifacts of the same run id
    pub resume: bool,
    /// Directory for durable artifacts; `None` keeps them in memory
    pub checkpoint_location: Option<PathBuf>,
    /// Explicit run id; derived from the query when unset
    pub run_id: Option<String>,
    /// Planned topics beyond this are dropped
    pub max_topics: usize,
    /// Results consumed from each search
    pub hits_per_search: usize,
    /// Wall-clock limit per research task
    pub task_timeout: Option<Duration>,
    pub thresholds: GateThresholds,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_effort_per_topic: 5,
            resume: false,
            checkpoint_location: None,
            run_id: None,
            max_topics: 5,
            hits_per_search: 5,
            task_timeout: None,
            thresholds: GateThresholds::default(),
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<(), StageFailure> {
        let invalid = |reason: &str| {
            Err(StageFailure::InvalidOptions {
                reason: reason.to_string(),
            })
        };
        if self.max_concurrency == 0 {
            return invalid("max_concurrency must be at least 1");
        }
        if self.max_topics == 0 {
            return invalid("max_topics must be at least 1");
        }
        if self.hits_per_search == 0 {
            return invalid("hits_per_search must be at least 1");
        }
        if let Some(run_id) = &self.run_id {
            validate_run_id(run_id).map_err(|e| StageFailure::InvalidOptions {
                reason: format!("{:#}", e),
            })?;
        }
        Ok(())
    }
}

/// Stable run id for a query: a short slug plus 12 hex chars of its SHA-256
pub fn derive_run_id(query: &str) -> String {
    let query = query.trim();
    let slug = query
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .take(6)
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    let slug: String = slug.chars().take(40).collect();
    let slug = slug.trim_end_matches('-');

    let digest = Sha256::digest(query.as_bytes());
    let hash: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();

    if slug.is_empty() {
        format!("run-{}", hash)
    } else {
        format!("{}-{}", slug, hash)
    }
}

/// Controller states, in execution order, plus the absorbing failure state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Briefed,
    Planned,
    Researched,
    Compressed,
    Reported,
    Done,
    Aborted(StageFailure),
}

impl PipelineState {
    /// Stage that moves the controller out of this state
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Start => Some(Stage::Brief),
            PipelineState::Briefed => Some(Stage::Topics),
            PipelineState::Planned => Some(Stage::Research),
            PipelineState::Researched => Some(Stage::Compress),
            PipelineState::Compressed => Some(Stage::Report),
            PipelineState::Reported | PipelineState::Done | PipelineState::Aborted(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted(_))
    }
}

/// In-memory artifacts of the run, filled by hydration and by each transition
#[derive(Default)]
struct RunArtifacts {
    brief: Option<Brief>,
    topics: Option<TopicSet>,
    batch: Option<ResearchBatch>,
    compressed: Option<CompressedFindings>,
    report: Option<Report>,
}

fn missing(stage: Stage, what: &str) -> StageFailure {
    StageFailure::ResumeInconsistency {
        stage,
        reason: format!("{} is not available to this stage", what),
    }
}

fn require<'a, T>(slot: &'a Option<T>, stage: Stage, what: &str) -> Result<&'a T, StageFailure> {
    slot.as_ref().ok_or_else(|| missing(stage, what))
}

fn log_stage_outcome(stage: Stage, provenance: Provenance) {
    match provenance {
        Provenance::Computed => {
            log_stage_complete!(stage);
        }
        Provenance::Resumed => {
            log_stage_skipped!(stage, "loaded from checkpoint");
        }
    }
}

/// A configured pipeline bound to its collaborators and artifact store
pub struct Pipeline {
    options: PipelineOptions,
    generator: Arc<dyn ContentGenerator>,
    search: Arc<dyn SearchProvider>,
    store: Arc<dyn ArtifactStore>,
}

impl Pipeline {
    /// Artifacts go to `checkpoint_location` when set, otherwise to a process-local store
    pub fn new(
        options: PipelineOptions,
        generator: Arc<dyn ContentGenerator>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        let store: Arc<dyn ArtifactStore> = match &options.checkpoint_location {
            Some(root) => Arc::new(FsArtifactStore::new(root.clone())),
            None => Arc::new(MemoryArtifactStore::new()),
        };
        Self {
            options,
            generator,
            search,
            store,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn run_id_for(&self, query: &str) -> String {
        self.options
            .run_id
            .clone()
            .unwrap_or_else(|| derive_run_id(query))
    }

    /// Run the pipeline for `query`, returning the report or the single failure that
    /// stopped it.
    pub async fn execute(&self, query: &str) -> Result<Report, StageFailure> {
        let query = query.trim();
        let run_id = self.run_id_for(query);
        let started = Instant::now();

        let mut artifacts = RunArtifacts::default();
        let terminal = self.drive(query, &run_id, &mut artifacts).await;

        if let PipelineState::Aborted(failure) = terminal {
            if let Some(stage) = failure.stage() {
                log_stage_failed!(stage, failure);
            }
            tracing::error!(
                run_id = %run_id,
                failed_topics = ?failure.failed_topics(),
                "research run aborted: {}",
                failure
            );
            return Err(failure);
        }

        let report = artifacts
            .report
            .take()
            .ok_or_else(|| missing(Stage::Report, "the report"))?;
        tracing::info!(
            run_id = %run_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "research run complete"
        );
        Ok(report)
    }

    /// Advance from the entry state until `Done` or `Aborted`. Failures before the first
    /// transition (options, checkpoint, hydration) abort the same way stage failures do.
    async fn drive(
        &self,
        query: &str,
        run_id: &str,
        artifacts: &mut RunArtifacts,
    ) -> PipelineState {
        let (mut state, runner) = match self.enter(query, run_id, artifacts).await {
            Ok(entered) => entered,
            Err(failure) => return PipelineState::Aborted(failure),
        };

        while !state.is_terminal() {
            state = match self.advance(&state, query, &runner, artifacts).await {
                Ok(next) => next,
                Err(failure) => PipelineState::Aborted(failure),
            };
        }
        state
    }

    async fn enter(
        &self,
        query: &str,
        run_id: &str,
        artifacts: &mut RunArtifacts,
    ) -> Result<(PipelineState, StageRunner), StageFailure> {
        self.options.validate()?;
        if query.is_empty() {
            return Err(StageFailure::InvalidOptions {
                reason: "query is empty".to_string(),
            });
        }
        validate_run_id(run_id).map_err(|e| StageFailure::InvalidOptions {
            reason: format!("{:#}", e),
        })?;

        tracing::info!(run_id = %run_id, resume = self.options.resume, "starting research run");

        let checkpoint = RunCheckpoint::open(self.store.as_ref(), run_id, self.options.resume).await?;
        let entry = if self.options.resume {
            checkpoint.resume_point()?
        } else {
            PipelineState::Start
        };
        let runner = StageRunner::new(self.store.clone(), checkpoint, self.options.resume);

        self.hydrate(&entry, &runner, artifacts).await?;
        if entry != PipelineState::Start {
            tracing::info!(run_id = %run_id, state = ?entry, "entering pipeline from checkpoint");
        }
        Ok((entry, runner))
    }

    /// Load what the states after `entry` read, and check per-topic slots against the plan
    async fn hydrate(
        &self,
        entry: &PipelineState,
        runner: &StageRunner,
        artifacts: &mut RunArtifacts,
    ) -> Result<(), StageFailure> {
        let skipped: &[Stage] = match entry {
            PipelineState::Briefed => &[Stage::Brief],
            PipelineState::Planned => &[Stage::Brief, Stage::Topics],
            PipelineState::Compressed => {
                &[Stage::Brief, Stage::Topics, Stage::Research, Stage::Compress]
            }
            PipelineState::Reported => &Stage::ALL,
            _ => &[],
        };

        match entry {
            PipelineState::Briefed => {
                artifacts.brief = Some(runner.load(StageKey::Brief).await?);
            }
            PipelineState::Planned => {
                artifacts.brief = Some(runner.load(StageKey::Brief).await?);
                let topics: TopicSet = runner.load(StageKey::Topics).await?;
                let orphans: Vec<String> = runner
                    .checkpoint()
                    .findings_indices()
                    .into_iter()
                    .filter(|i| *i >= topics.len())
                    .map(|i| StageKey::Findings(i).to_string())
                    .collect();
                if !orphans.is_empty() {
                    return Err(StageFailure::ResumeInconsistency {
                        stage: Stage::Research,
                        reason: format!(
                            "{} exist but topics has only {} entries",
                            orphans.join(", "),
                            topics.len()
                        ),
                    });
                }
                artifacts.topics = Some(topics);
            }
            PipelineState::Compressed => {
                artifacts.brief = Some(runner.load(StageKey::Brief).await?);
                artifacts.compressed = Some(runner.load(StageKey::Compressed).await?);
            }
            PipelineState::Reported => {
                artifacts.report = Some(runner.load(StageKey::Report).await?);
            }
            _ => {}
        }

        for stage in skipped {
            log_stage_skipped!(stage, "loaded from checkpoint");
        }
        Ok(())
    }

    async fn advance(
        &self,
        state: &PipelineState,
        query: &str,
        runner: &StageRunner,
        artifacts: &mut RunArtifacts,
    ) -> Result<PipelineState, StageFailure> {
        let generator = self.generator.as_ref();
        let thresholds = self.options.thresholds;

        if let Some(stage) = state.next_stage() {
            log_stage_start!(stage);
        }

        let next = match state {
            PipelineState::Start => {
                let (brief, provenance) = runner
                    .run(
                        StageKey::Brief,
                        || write_brief(generator, query),
                        |b| gates::brief(b, &thresholds),
                    )
                    .await?;
                log_stage_outcome(Stage::Brief, provenance);
                artifacts.brief = Some(brief);
                PipelineState::Briefed
            }
            PipelineState::Briefed => {
                let brief = require(&artifacts.brief, Stage::Topics, "the brief")?;
                let (topics, provenance) = runner
                    .run(
                        StageKey::Topics,
                        || plan_topics(generator, brief, self.options.max_topics),
                        |t| gates::topics(t, &thresholds),
                    )
                    .await?;
                log_stage_outcome(Stage::Topics, provenance);
                tracing::info!(topics = topics.len(), "topics planned");
                artifacts.topics = Some(topics);
                PipelineState::Planned
            }
            PipelineState::Planned => {
                let topics = require(&artifacts.topics, Stage::Research, "the topic plan")?;
                let researcher = Researcher::new(
                    generator,
                    self.search.as_ref(),
                    self.options.max_effort_per_topic,
                    self.options.hits_per_search,
                );
                let settings = FanOutSettings {
                    max_concurrency: self.options.max_concurrency,
                    task_timeout: self.options.task_timeout,
                };
                let batch = research_topics(runner, &researcher, topics, settings).await?;
                log_stage_complete!(Stage::Research);
                artifacts.batch = Some(batch);
                PipelineState::Researched
            }
            PipelineState::Researched => {
                let batch = require(&artifacts.batch, Stage::Compress, "the research batch")?;
                let (compressed, provenance) = runner
                    .run(
                        StageKey::Compressed,
                        || compress_findings(generator, batch),
                        |c| gates::compressed(c, batch),
                    )
                    .await?;
                log_stage_outcome(Stage::Compress, provenance);
                artifacts.compressed = Some(compressed);
                PipelineState::Compressed
            }
            PipelineState::Compressed => {
                let brief = require(&artifacts.brief, Stage::Report, "the brief")?;
                let compressed =
                    require(&artifacts.compressed, Stage::Report, "the compressed findings")?;
                let (report, provenance) = runner
                    .run(
                        StageKey::Report,
                        || write_report(generator, query, brief, compressed),
                        |r| gates::report(r, compressed),
                    )
                    .await?;
                log_stage_outcome(Stage::Report, provenance);
                artifacts.report = Some(report);
                PipelineState::Reported
            }
            PipelineState::Reported => PipelineState::Done,
            PipelineState::Done | PipelineState::Aborted(_) => state.clone(),
        };

        Ok(next)
    }
}

/// Run the complete research pipeline for one query
///
/// # Examples
///
/// ```no_run
/// use deep_research::research::{run_research_pipeline, PipelineOptions};
/// # use std::sync::Arc;
/// # async fn example(
/// #     generator: Arc<dyn deep_research_sdk::ContentGenerator>,
/// #     search: Arc<dyn deep_research_sdk::SearchProvider>,
/// # ) {
/// match run_research_pipeline("How do arena allocators work?", PipelineOptions::default(), generator, search).await {
///     Ok(report) => println!("{}", report),
///     Err(failure) => eprintln!("{}", failure),
/// }
/// # }
/// ```
pub async fn run_research_pipeline(
    query: &str,
    options: PipelineOptions,
    generator: Arc<dyn ContentGenerator>,
    search: Arc<dyn SearchProvider>,
) -> Result<Report, StageFailure> {
    Pipeline::new(options, generator, search).execute(query).await
}
