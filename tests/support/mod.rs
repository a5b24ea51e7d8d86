//! Shared wiring for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use windplan::llm::MockLLMClient;
use windplan::pipeline::{CoordinatorConfig, MemoryTraceSink, PipelineCoordinator};
use windplan::router::{AgentConfig, AgentStrategy, IntentRouter};
use windplan::session::{InMemorySessionStore, SessionStore};
use windplan::tools::{
    MockWorker, RetryPolicy, ToolInvocationClient, ToolName, Worker, WorkerRegistry,
};

pub const COORDINATES: &str = "35.067482, -101.395466";

/// Retry policy with the production shape but millisecond delays
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(8))
        .without_jitter()
}

pub fn fast_client(registry: WorkerRegistry) -> Arc<ToolInvocationClient> {
    Arc::new(ToolInvocationClient::new(
        registry,
        fast_policy(),
        Duration::from_secs(5),
    ))
}

/// One mock worker per tool, each returned so tests can inspect calls
pub struct Workers {
    pub terrain: Arc<MockWorker>,
    pub layout: Arc<MockWorker>,
    pub simulation: Arc<MockWorker>,
    pub report: Arc<MockWorker>,
}

impl Workers {
    pub fn new() -> Self {
        Self {
            terrain: Arc::new(MockWorker::new(ToolName::Terrain)),
            layout: Arc::new(MockWorker::new(ToolName::Layout)),
            simulation: Arc::new(MockWorker::new(ToolName::Simulation)),
            report: Arc::new(MockWorker::new(ToolName::Report)),
        }
    }

    pub fn get(&self, tool: ToolName) -> &Arc<MockWorker> {
        match tool {
            ToolName::Terrain => &self.terrain,
            ToolName::Layout => &self.layout,
            ToolName::Simulation => &self.simulation,
            ToolName::Report => &self.report,
        }
    }

    pub fn registry(&self) -> WorkerRegistry {
        ToolName::ALL
            .into_iter()
            .fold(WorkerRegistry::new(), |registry, tool| {
                registry.with_worker(self.get(tool).clone() as Arc<dyn Worker>)
            })
    }

    pub fn total_calls(&self) -> usize {
        ToolName::ALL
            .into_iter()
            .map(|tool| self.get(tool).call_count())
            .sum()
    }
}

pub struct Harness {
    pub store: Arc<dyn SessionStore>,
    pub workers: Workers,
    pub traces: Arc<MemoryTraceSink>,
    pub coordinator: PipelineCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Workers::new(), None)
    }

    pub fn with_workers(workers: Workers) -> Self {
        Self::build(workers, None)
    }

    /// Agent strategy with attempt budget `k` in front of the deterministic one
    pub fn with_agent(workers: Workers, llm: Arc<MockLLMClient>, k: u32) -> Self {
        let agent = AgentStrategy::new(
            llm,
            AgentConfig {
                max_attempts: k,
                timeout: Duration::from_secs(5),
                ..AgentConfig::default()
            },
        );
        Self::build(workers, Some(agent))
    }

    fn build(workers: Workers, agent: Option<AgentStrategy>) -> Self {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(3600));
        let registry = workers.registry();
        let mut router = IntentRouter::new(registry.tools());
        if let Some(agent) = agent {
            router = router.with_agent(agent);
        }
        let traces = Arc::new(MemoryTraceSink::new());
        let coordinator = PipelineCoordinator::new(
            store.clone(),
            router,
            fast_client(registry),
            CoordinatorConfig::default(),
        )
        .with_traces(traces.clone());

        Self {
            store,
            workers,
            traces,
            coordinator,
        }
    }
}
