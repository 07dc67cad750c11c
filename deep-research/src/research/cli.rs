//! CLI argument parsing for the research pipeline

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::research::gates::GateThresholds;
use crate::research::workflow::PipelineOptions;

/// Deep Research CLI Arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "deep-research",
    about = "Multi-stage research pipeline: brief → topics → parallel research → compress → report",
    after_help = "Examples:\n  deep-research \"What are the latest developments in quantum computing?\"\n  deep-research -o report.md \"Compare React vs Vue vs Svelte\"\n  deep-research --resume \"History of artificial intelligence\"\n  deep-research -i"
)]
pub struct Args {
    /// Research query (omit for interactive mode)
    pub query: Option<String>,

    /// Read queries from stdin, one per line
    #[arg(short, long)]
    pub interactive: bool,

    /// Write the final report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Model name for the content-generation provider (overrides DEEP_RESEARCH_MODEL)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Research tasks to run in parallel
    #[arg(short, long, default_value_t = 3)]
    pub parallel: usize,

    /// Search actions allowed per topic
    #[arg(long, default_value_t = 5)]
    pub max_searches: usize,

    /// Maximum number of planned topics
    #[arg(long, default_value_t = 5)]
    pub max_topics: usize,

    /// Search results consumed per search action
    #[arg(long, default_value_t = 5)]
    pub hits_per_search: usize,

    /// Wall-clock limit per research task, in seconds
    #[arg(long)]
    pub task_timeout: Option<u64>,

    /// Resume from committed artifacts of the same run
    #[arg(long)]
    pub resume: bool,

    /// Directory for checkpointed artifacts
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Explicit run id (default: derived from the query)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Minimum brief length in characters
    #[arg(long, default_value_t = 40)]
    pub min_brief_chars: usize,

    /// Minimum topic length in characters
    #[arg(long, default_value_t = 20)]
    pub min_topic_chars: usize,
}

/// Platform data directory for checkpoints, e.g. `~/.local/share/deep-research/runs`
pub fn default_checkpoint_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "deep-research")
        .map(|dirs| dirs.data_dir().join("runs"))
}

impl Args {
    pub fn is_interactive(&self) -> bool {
        self.interactive || self.query.is_none()
    }

    /// Explicit directory, or the platform data directory when resuming
    pub fn checkpoint_location(&self) -> Option<PathBuf> {
        match (&self.checkpoint_dir, self.resume) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => default_checkpoint_dir(),
            (None, false) => None,
        }
    }
}

impl From<Args> for PipelineOptions {
    fn from(args: Args) -> Self {
        let checkpoint_location = args.checkpoint_location();
        PipelineOptions {
            max_concurrency: args.parallel,
            max_effort_per_topic: args.max_searches,
            resume: args.resume,
            checkpoint_location,
            run_id: args.run_id,
            max_topics: args.max_topics,
            hits_per_search: args.hits_per_search,
            task_timeout: args.task_timeout.map(Duration::from_secs),
            thresholds: GateThresholds {
                min_brief_chars: args.min_brief_chars,
                min_topic_chars: args.min_topic_chars,
            },
        }
    }
}
