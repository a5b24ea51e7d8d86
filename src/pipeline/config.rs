use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Cap for one stage, covering every attempt and backoff of its call
    pub stage_timeout: Duration,
    /// TTL applied to the session on every request
    pub session_ttl_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(300),
            session_ttl_secs: 86_400,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage_timeout(mut self, stage_timeout: Duration) -> Self {
        self.stage_timeout = stage_timeout;
        self
    }

    pub fn with_session_ttl_secs(mut self, session_ttl_secs: u64) -> Self {
        self.session_ttl_secs = session_ttl_secs;
        self
    }
}
