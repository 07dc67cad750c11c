//! Tests for PipelineOptions and the CLI mapping onto it

use clap::Parser;
use deep_research::research::cli::Args;
use deep_research::research::{GateThresholds, PipelineOptions, PipelineState, StageFailure};
use deep_research_sdk::Stage;
use std::time::Duration;

#[test]
fn test_pipeline_options_default() {
    let options = PipelineOptions::default();

    assert_eq!(options.max_concurrency, 3);
    assert_eq!(options.max_effort_per_topic, 5);
    assert_eq!(options.max_topics, 5);
    assert_eq!(options.hits_per_search, 5);
    assert!(!options.resume);
    assert!(options.checkpoint_location.is_none());
    assert!(options.run_id.is_none());
    assert!(options.task_timeout.is_none());
    assert_eq!(
        options.thresholds,
        GateThresholds {
            min_brief_chars: 40,
            min_topic_chars: 20,
        }
    );
}

#[test]
fn test_pipeline_options_validation() {
    for options in [
        PipelineOptions {
            max_concurrency: 0,
            ..Default::default()
        },
        PipelineOptions {
            max_topics: 0,
            ..Default::default()
        },
        PipelineOptions {
            hits_per_search: 0,
            ..Default::default()
        },
        PipelineOptions {
            run_id: Some("nested/run".to_string()),
            ..Default::default()
        },
    ] {
        assert!(matches!(
            options.validate(),
            Err(StageFailure::InvalidOptions { .. })
        ));
    }
}

#[test]
fn test_cli_builds_options() {
    let args = Args::try_parse_from([
        "deep-research",
        "--parallel",
        "4",
        "--max-topics",
        "3",
        "--min-brief-chars",
        "60",
        "--task-timeout",
        "90",
        "Compare bump and slab allocators",
    ])
    .unwrap();
    assert_eq!(args.query.as_deref(), Some("Compare bump and slab allocators"));

    let options = PipelineOptions::from(args);
    assert_eq!(options.max_concurrency, 4);
    assert_eq!(options.max_topics, 3);
    assert_eq!(options.thresholds.min_brief_chars, 60);
    assert_eq!(options.task_timeout, Some(Duration::from_secs(90)));
    assert!(options.validate().is_ok());
}

#[test]
fn test_resume_without_dir_uses_platform_location() {
    let args = Args::try_parse_from(["deep-research", "--resume", "query"]).unwrap();
    let options = PipelineOptions::from(args);
    assert!(options.resume);
    // Only absent on platforms without a home directory
    if let Some(dir) = options.checkpoint_location {
        assert!(dir.ends_with("runs"));
    }
}

#[test]
fn test_pipeline_state_order() {
    let order = [
        PipelineState::Start,
        PipelineState::Briefed,
        PipelineState::Planned,
        PipelineState::Researched,
        PipelineState::Compressed,
    ];
    let stages: Vec<Stage> = order.iter().filter_map(PipelineState::next_stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());

    let aborted = PipelineState::Aborted(StageFailure::InvalidOptions {
        reason: "max_concurrency must be at least 1".to_string(),
    });
    assert!(aborted.is_terminal());
    assert_eq!(aborted.next_stage(), None);
}
