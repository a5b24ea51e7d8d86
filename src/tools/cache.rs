use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::types::{CorrelationId, ToolCallResult, ToolParams};

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ToolCallResult,
    fingerprint: String,
    stored_at: Instant,
}

/// Successful results keyed by correlation id, each valid for `ttl`
///
/// An entry only answers a lookup with the same parameters it was stored
/// with.
#[derive(Clone)]
pub struct ResultCache {
    cache: Arc<RwLock<HashMap<CorrelationId, CacheEntry>>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(
        &self,
        correlation_id: &CorrelationId,
        params: &ToolParams,
    ) -> Option<ToolCallResult> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(correlation_id)?;
        if entry.stored_at.elapsed() >= self.ttl || entry.fingerprint != params.fingerprint() {
            return None;
        }
        Some(entry.result.clone())
    }

    /// Stores `result` for `params` if it succeeded; failures are never cached
    pub fn insert(&self, params: &ToolParams, result: &ToolCallResult) {
        if !result.success {
            return;
        }
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|_, e| e.stored_at.elapsed() < self.ttl);
            cache.insert(
                result.correlation_id.clone(),
                CacheEntry {
                    result: result.clone(),
                    fingerprint: params.fingerprint(),
                    stored_at: Instant::now(),
                },
            );
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
