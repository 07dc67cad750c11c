//! End-to-end pipeline runs against scripted collaborators

use super::common::{options, topic_url, CountingSearch, ScriptedGenerator, BRIEF_40, QUERY};
use deep_research::research::phase2_research::{research_topics, FanOutSettings, Researcher};
use deep_research::research::checkpoint::RunCheckpoint;
use deep_research::research::stage::StageRunner;
use deep_research::research::{
    ArtifactStore, MemoryArtifactStore, Pipeline, PipelineOptions, StageFailure, StageKey, Topic,
    TopicOutcome, TopicSet,
};
use deep_research_sdk::Stage;
use std::sync::Arc;
use std::time::Duration;

fn pipeline(
    options: PipelineOptions,
    generator: &Arc<ScriptedGenerator>,
    search: &Arc<CountingSearch>,
    store: &Arc<MemoryArtifactStore>,
) -> Pipeline {
    Pipeline::new(options, generator.clone(), search.clone()).with_store(store.clone())
}

#[tokio::test]
async fn test_full_run_produces_cited_report() {
    let generator = Arc::new(ScriptedGenerator::new(3));
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let report = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .expect("pipeline should succeed");

    let markdown = report.markdown();
    assert!(markdown.contains("## Sources"));
    for i in 0..3 {
        assert!(markdown.contains(&topic_url(i)), "missing source for topic {}", i);
    }

    assert_eq!(generator.calls(Stage::Brief), 1);
    assert_eq!(generator.calls(Stage::Topics), 1);
    // One search turn plus one finish turn per topic
    assert_eq!(generator.calls(Stage::Research), 6);
    assert_eq!(generator.calls(Stage::Compress), 1);
    assert_eq!(generator.calls(Stage::Report), 1);
    assert_eq!(search.calls(), 3);

    let keys = store.keys("test-run").await.unwrap();
    assert!(keys.contains(&StageKey::Brief));
    assert!(keys.contains(&StageKey::Topics));
    assert!(keys.contains(&StageKey::Findings(2)));
    assert!(keys.contains(&StageKey::Compressed));
    assert!(keys.contains(&StageKey::Report));
}

#[tokio::test]
async fn test_partial_failure_continues_with_surviving_topics() {
    let generator = Arc::new(ScriptedGenerator::new(5).failing(&[1, 3]));
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let report = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .expect("two of five failures must not abort the run");

    let keys = store.keys("test-run").await.unwrap();
    for i in [0, 2, 4] {
        assert!(keys.contains(&StageKey::Findings(i)));
    }
    for i in [1, 3] {
        assert!(!keys.contains(&StageKey::Findings(i)));
    }

    // Only usable findings reach compression
    let compress_prompt = &generator.prompts(Stage::Compress)[0];
    assert_eq!(compress_prompt.matches("### Topic").count(), 3);
    assert!(compress_prompt.contains(&topic_url(0)));
    assert!(!compress_prompt.contains(&topic_url(1)));
    assert!(!compress_prompt.contains(&topic_url(3)));

    assert!(report.markdown().contains(&topic_url(4)));
    assert!(!report.markdown().contains(&topic_url(3)));
}

#[tokio::test]
async fn test_batch_records_failed_slots_in_order() {
    let generator = ScriptedGenerator::new(5).failing(&[1, 3]);
    let search = CountingSearch::new();
    let store = Arc::new(MemoryArtifactStore::new());
    let checkpoint = RunCheckpoint::open(store.as_ref(), "batch", false)
        .await
        .unwrap();
    let runner = StageRunner::new(store, checkpoint, false);
    let researcher = Researcher::new(&generator, &search, 1, 3);
    let topics = TopicSet::new(
        (0..5)
            .map(|i| Topic::new(super::common::topic_text(i)))
            .collect(),
    );

    let batch = research_topics(
        &runner,
        &researcher,
        &topics,
        FanOutSettings {
            max_concurrency: 2,
            task_timeout: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(batch.len(), 5);
    for (index, findings) in batch.iter().enumerate() {
        assert_eq!(findings.topic_index, index);
        if index == 1 || index == 3 {
            match &findings.outcome {
                TopicOutcome::Failed { reason } => {
                    assert!(reason.contains(&format!("researcher {} unavailable", index)))
                }
                other => panic!("topic {} should have failed, got {:?}", index, other),
            }
        } else {
            assert_eq!(findings.outcome, TopicOutcome::Ok);
        }
    }
    assert_eq!(
        batch.failures().iter().map(|f| f.topic_index).collect::<Vec<_>>(),
        vec![1, 3]
    );
}

#[tokio::test]
async fn test_all_research_failing_stops_before_compression() {
    let generator = Arc::new(ScriptedGenerator::new(3).failing(&[0, 1, 2]));
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let failure = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .unwrap_err();

    assert!(matches!(failure, StageFailure::Batch { .. }));
    assert_eq!(failure.stage(), Some(Stage::Research));
    assert_eq!(failure.failed_topics(), vec![0, 1, 2]);
    assert!(failure.to_string().contains("all 3 research tasks failed"));

    assert_eq!(generator.calls(Stage::Compress), 0);
    assert_eq!(generator.calls(Stage::Report), 0);
    let keys = store.keys("test-run").await.unwrap();
    assert!(!keys.contains(&StageKey::Compressed));
    assert!(!keys.contains(&StageKey::Report));
    assert!(keys.contains(&StageKey::Topics));
}

#[tokio::test]
async fn test_search_budget_bounds_every_task() {
    let mut generator = ScriptedGenerator::new(2);
    generator.searches_before_finish = usize::MAX;
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let report = pipeline(
        PipelineOptions {
            max_effort_per_topic: 2,
            ..options()
        },
        &generator,
        &search,
        &store,
    )
    .execute(QUERY)
    .await
    .expect("an exhausted budget still yields findings");

    // Two searches per topic; the third turn finalizes from the gathered hits
    assert_eq!(search.calls(), 4);
    assert_eq!(generator.research_turns(0), 3);
    assert_eq!(generator.research_turns(1), 3);
    assert!(report.markdown().contains("https://search.example/"));
}

#[tokio::test]
async fn test_zero_budget_never_searches() {
    let mut generator = ScriptedGenerator::new(2);
    generator.searches_before_finish = usize::MAX;
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let report = pipeline(
        PipelineOptions {
            max_effort_per_topic: 0,
            ..options()
        },
        &generator,
        &search,
        &store,
    )
    .execute(QUERY)
    .await
    .unwrap();

    assert_eq!(search.calls(), 0);
    assert_eq!(generator.calls(Stage::Research), 2);
    assert!(report
        .markdown()
        .contains("No sources were found for this research."));
}

#[tokio::test]
async fn test_no_sources_report_says_so() {
    let mut generator = ScriptedGenerator::new(2);
    generator.searches_before_finish = 0;
    generator.cite_nothing = true;
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let report = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .expect("topics without sources still count as usable");

    let markdown = report.markdown();
    assert!(markdown.contains("## Sources"));
    assert!(markdown.contains("No sources were found for this research."));
    assert!(generator.prompts(Stage::Report)[0].contains("no sources were found"));
}

#[tokio::test]
async fn test_brief_gate_boundary() {
    let mut passing = ScriptedGenerator::new(1);
    passing.brief = BRIEF_40.to_string();
    let passing = Arc::new(passing);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());
    pipeline(options(), &passing, &search, &store)
        .execute(QUERY)
        .await
        .expect("a 40 character brief passes");

    let mut short = ScriptedGenerator::new(1);
    short.brief = BRIEF_40[..39].to_string();
    let short = Arc::new(short);
    let store = Arc::new(MemoryArtifactStore::new());
    let failure = pipeline(options(), &short, &search, &store)
        .execute(QUERY)
        .await
        .unwrap_err();

    match &failure {
        StageFailure::Gate { stage, reason } => {
            assert_eq!(*stage, Stage::Brief);
            assert!(reason.contains("39 characters"));
        }
        other => panic!("expected a brief gate failure, got {:?}", other),
    }
    assert_eq!(short.calls(Stage::Topics), 0);
    assert!(store.keys("test-run").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_short_topic_fails_plan_gate() {
    let mut generator = ScriptedGenerator::new(2);
    generator.topics[1] = "Too short".to_string();
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let failure = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .unwrap_err();

    assert!(matches!(
        failure,
        StageFailure::Gate {
            stage: Stage::Topics,
            ..
        }
    ));
    assert_eq!(generator.calls(Stage::Research), 0);
    let keys = store.keys("test-run").await.unwrap();
    assert!(keys.contains(&StageKey::Brief));
    assert!(!keys.contains(&StageKey::Topics));
}

#[tokio::test]
async fn test_report_without_sources_section_fails_gate() {
    let mut generator = ScriptedGenerator::new(2);
    generator.omit_report_sources = true;
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let failure = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .unwrap_err();

    assert!(matches!(
        failure,
        StageFailure::Gate {
            stage: Stage::Report,
            ..
        }
    ));
    assert!(!store
        .keys("test-run")
        .await
        .unwrap()
        .contains(&StageKey::Report));
}

#[tokio::test]
async fn test_report_with_empty_sources_section_fails_gate() {
    let mut generator = ScriptedGenerator::new(2);
    generator.empty_report_sources = true;
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let failure = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .unwrap_err();

    match &failure {
        StageFailure::Gate { stage, reason } => {
            assert_eq!(*stage, Stage::Report);
            assert!(reason.contains("omits 2 of 2"));
            assert!(reason.contains(&topic_url(1)));
        }
        other => panic!("expected a report gate failure, got {:?}", other),
    }
    assert!(!store
        .keys("test-run")
        .await
        .unwrap()
        .contains(&StageKey::Report));
}

#[tokio::test]
async fn test_compress_error_is_attributed_to_compress() {
    let mut generator = ScriptedGenerator::new(2);
    generator.fail_compress = true;
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let failure = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .unwrap_err();

    assert_eq!(failure.stage(), Some(Stage::Compress));
    assert!(failure.reason().contains("compression model overloaded"));
    assert_eq!(generator.calls(Stage::Report), 0);
}

#[tokio::test]
async fn test_slow_topic_times_out_alone() {
    let mut generator = ScriptedGenerator::new(3);
    generator
        .slow_topics
        .insert(0, Duration::from_secs(5));
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let report = pipeline(
        PipelineOptions {
            task_timeout: Some(Duration::from_millis(200)),
            ..options()
        },
        &generator,
        &search,
        &store,
    )
    .execute(QUERY)
    .await
    .expect("one slow topic must not sink the run");

    let keys = store.keys("test-run").await.unwrap();
    assert!(!keys.contains(&StageKey::Findings(0)));
    assert!(keys.contains(&StageKey::Findings(1)));
    assert!(!report.markdown().contains(&topic_url(0)));
    assert!(report.markdown().contains(&topic_url(2)));
}

#[tokio::test]
async fn test_panicking_researcher_is_isolated() {
    let mut generator = ScriptedGenerator::new(3);
    generator.panicking_topics.insert(2);
    let generator = Arc::new(generator);
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let report = pipeline(options(), &generator, &search, &store)
        .execute(QUERY)
        .await
        .expect("a panicking task is recorded as a failure");

    assert!(report.markdown().contains(&topic_url(0)));
    assert!(!report.markdown().contains(&topic_url(2)));
}

#[tokio::test]
async fn test_concurrency_cap_is_respected() {
    let generator = Arc::new(ScriptedGenerator::new(5));
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    pipeline(
        PipelineOptions {
            max_concurrency: 2,
            ..options()
        },
        &generator,
        &search,
        &store,
    )
    .execute(QUERY)
    .await
    .unwrap();

    assert!(generator.peak_concurrent_research() <= 2);
    assert!(generator.peak_concurrent_research() >= 1);
    assert_eq!(generator.calls(Stage::Research), 10);
}

#[tokio::test]
async fn test_invalid_options_fail_before_any_call() {
    let generator = Arc::new(ScriptedGenerator::new(2));
    let search = Arc::new(CountingSearch::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let failure = pipeline(
        PipelineOptions {
            max_concurrency: 0,
            ..options()
        },
        &generator,
        &search,
        &store,
    )
    .execute(QUERY)
    .await
    .unwrap_err();

    assert!(matches!(failure, StageFailure::InvalidOptions { .. }));
    assert_eq!(generator.total_calls(), 0);

    let failure = pipeline(options(), &generator, &search, &store)
        .execute("   ")
        .await
        .unwrap_err();
    assert!(matches!(failure, StageFailure::InvalidOptions { .. }));
    assert_eq!(generator.total_calls(), 0);
}
