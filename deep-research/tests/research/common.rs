//! Scripted collaborators for pipeline tests

use anyhow::anyhow;
use deep_research::research::PipelineOptions;
use deep_research_sdk::{
    async_trait, ContentGenerator, GenerationRequest, SearchHit, SearchProvider, Stage,
};
use futures::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 40 characters exactly
pub const BRIEF_40: &str = "I want to know how arena allocators work";

pub const QUERY: &str = "How do arena allocators work in Rust?";

pub fn topic_text(index: usize) -> String {
    format!("Subtopic {}: allocator behaviour in depth", index)
}

pub fn topic_url(index: usize) -> String {
    format!("https://example.com/topic-{}", index)
}

/// Content generator driven by a fixed script, counting every call per stage
pub struct ScriptedGenerator {
    pub brief: String,
    pub topics: Vec<String>,
    /// Research tasks for these topic indices return an error
    pub failing_topics: HashSet<usize>,
    /// Research tasks for these topic indices panic
    pub panicking_topics: HashSet<usize>,
    /// Research tasks for these topic indices stall before answering
    pub slow_topics: HashMap<usize, Duration>,
    /// Search actions requested before finishing; `usize::MAX` never finishes
    pub searches_before_finish: usize,
    /// Finish without citing anything
    pub cite_nothing: bool,
    pub fail_compress: bool,
    /// Report stub leaves out the Sources section
    pub omit_report_sources: bool,
    /// Report stub writes the Sources header but lists nothing under it
    pub empty_report_sources: bool,
    calls: Mutex<HashMap<Stage, usize>>,
    research_turns: Mutex<HashMap<usize, usize>>,
    requests: Mutex<Vec<GenerationRequest>>,
    active_research: AtomicUsize,
    peak_research: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(topic_count: usize) -> Self {
        Self {
            brief: format!("{} and when to prefer them.", BRIEF_40),
            topics: (0..topic_count).map(topic_text).collect(),
            failing_topics: HashSet::new(),
            panicking_topics: HashSet::new(),
            slow_topics: HashMap::new(),
            searches_before_finish: 1,
            cite_nothing: false,
            fail_compress: false,
            omit_report_sources: false,
            empty_report_sources: false,
            calls: Mutex::new(HashMap::new()),
            research_turns: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            active_research: AtomicUsize::new(0),
            peak_research: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, topics: &[usize]) -> Self {
        self.failing_topics.extend(topics.iter().copied());
        self
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.calls.lock().unwrap().get(&stage).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn research_turns(&self, topic_index: usize) -> usize {
        self.research_turns
            .lock()
            .unwrap()
            .get(&topic_index)
            .copied()
            .unwrap_or(0)
    }

    pub fn peak_concurrent_research(&self) -> usize {
        self.peak_research.load(Ordering::SeqCst)
    }

    /// Prompts sent for `stage`, in call order
    pub fn prompts(&self, stage: Stage) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .map(|r| r.prompt.clone())
            .collect()
    }

    async fn research_turn(&self, topic_index: usize) -> anyhow::Result<String> {
        let turn = {
            let mut turns = self.research_turns.lock().unwrap();
            let entry = turns.entry(topic_index).or_insert(0);
            *entry += 1;
            *entry
        };

        if let Some(delay) = self.slow_topics.get(&topic_index) {
            tokio::time::sleep(*delay).await;
        }
        // Let sibling tasks interleave
        tokio::time::sleep(Duration::from_millis(5)).await;

        if self.panicking_topics.contains(&topic_index) {
            panic!("researcher {} crashed", topic_index);
        }
        if self.failing_topics.contains(&topic_index) {
            return Err(anyhow!("researcher {} unavailable", topic_index));
        }

        if turn <= self.searches_before_finish {
            return Ok(format!(
                "```yaml\naction: search\nquery: topic {} query {}\n```",
                topic_index, turn
            ));
        }

        if self.cite_nothing {
            return Ok(format!(
                "action: finish\nfindings: Nothing citable about topic {}.\nsources: []\n",
                topic_index
            ));
        }
        Ok(format!(
            "action: finish\nfindings: Findings for topic {}.\nsources:\n  - title: Source {}\n    url: {}\n",
            topic_index,
            topic_index,
            topic_url(topic_index)
        ))
    }

    fn report(&self, prompt: &str) -> String {
        let cited: Vec<&str> = prompt
            .lines()
            .filter(|line| line.starts_with('[') && line.contains(" - http"))
            .collect();
        let mut report = "# Arena Allocators\n\nAn overview of the findings [1].\n".to_string();
        if self.empty_report_sources {
            report.push_str("\n## Sources\n\n(none)\n");
        } else if !self.omit_report_sources && !cited.is_empty() {
            report.push_str("\n## Sources\n");
            for line in cited {
                report.push_str(&format!("- {}\n", line));
            }
        }
        report
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        *self.calls.lock().unwrap().entry(request.stage).or_insert(0) += 1;
        self.requests.lock().unwrap().push(request.clone());

        match request.stage {
            Stage::Brief => Ok(format!(
                "```yaml\nbrief: \"{}\"\nkey_aspects: []\n```",
                self.brief
            )),
            Stage::Topics => {
                let topics = self
                    .topics
                    .iter()
                    .map(|t| format!("  - topic: \"{}\"", t))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(format!("topics:\n{}\nreasoning: one per area\n", topics))
            }
            Stage::Research => {
                let index = request
                    .topic_index
                    .ok_or_else(|| anyhow!("research request without topic index"))?;
                let now = self.active_research.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_research.fetch_max(now, Ordering::SeqCst);
                let result = self.research_turn(index).await;
                self.active_research.fetch_sub(1, Ordering::SeqCst);
                result
            }
            Stage::Compress => {
                if self.fail_compress {
                    return Err(anyhow!("compression model overloaded"));
                }
                let topics = request.prompt.matches("### Topic").count();
                Ok(format!("Synthesis of {} topics, citing [1].", topics))
            }
            Stage::Report => Ok(self.report(&request.prompt)),
        }
    }
}

/// Search stub returning three hits per query, counting calls
#[derive(Default)]
pub struct CountingSearch {
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl CountingSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for CountingSearch {
    async fn search(&self, query: &str) -> anyhow::Result<BoxStream<'static, SearchHit>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        let hits: Vec<SearchHit> = (0..3)
            .map(|i| SearchHit {
                title: format!("Result {} for {}", i, query),
                url: format!("https://search.example/{}/{}", n, i),
                snippet: format!("snippet {}", i),
            })
            .collect();
        Ok(futures::stream::iter(hits).boxed())
    }
}

/// Options with a fixed run id so tests can inspect the store
pub fn options() -> PipelineOptions {
    PipelineOptions {
        run_id: Some("test-run".to_string()),
        ..Default::default()
    }
}
