//! Worker registry
//!
//! Maps each tool to the worker that serves it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::types::ToolName;
use super::worker::Worker;

#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<ToolName, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `worker` for its tool, replacing any previous one
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.tool(), worker);
    }

    pub fn with_worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.register(worker);
        self
    }

    pub fn get(&self, tool: ToolName) -> Option<Arc<dyn Worker>> {
        self.workers.get(&tool).cloned()
    }

    pub fn tools(&self) -> BTreeSet<ToolName> {
        self.workers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.workers.iter().map(|(k, w)| (k.as_str(), w.endpoint())))
            .finish()
    }
}
