//! Configuration management for windplan
//!
//! Settings are read from environment variables with defaults. Worker
//! endpoints, retry policy, timeouts, the agent backend and storage locations
//! are all configured here; [`WindplanConfig::build_coordinator`] assembles a
//! ready [`PipelineCoordinator`] from them.
//!
//! # Environment Variables
//!
//! - `WINDPLAN_TERRAIN_URL`, `WINDPLAN_LAYOUT_URL`, `WINDPLAN_SIMULATION_URL`,
//!   `WINDPLAN_REPORT_URL`: worker endpoints. A stage without an endpoint is
//!   unavailable.
//! - `WINDPLAN_MAX_ATTEMPTS`: attempts per worker call - default: "3"
//! - `WINDPLAN_RETRY_BASE_MS` / `WINDPLAN_RETRY_CAP_MS`: backoff - default: "500" / "4000"
//! - `WINDPLAN_ATTEMPT_TIMEOUT_SECS`: per-attempt timeout - default: "60"
//! - `WINDPLAN_STAGE_TIMEOUT_SECS`: per-stage timeout - default: "300"
//! - `WINDPLAN_RESULT_CACHE_TTL_SECS`: result cache TTL, 0 disables - default: "900"
//! - `WINDPLAN_AGENT_PROVIDER`: agent backend (ollama|openai|claude|gemini|grok|groq).
//!   Unset disables the agent strategy.
//! - `WINDPLAN_AGENT_MODEL`: agent model - default: "qwen2.5-coder:7b"
//! - `WINDPLAN_AGENT_MAX_ATTEMPTS`: agent attempt budget - default: "3"
//! - `WINDPLAN_AGENT_TIMEOUT_SECS`: agent wall-clock cap - default: "90"
//! - `WINDPLAN_SESSION_TTL_SECS`: session TTL - default: "86400"
//! - `WINDPLAN_SESSION_DIR`: JSON session directory. Unset keeps sessions in memory.
//! - `WINDPLAN_TRACE_FILE`: JSONL execution trace file
//! - `WINDPLAN_LOG_LEVEL`: logging level - default: "info"
//!
//! Provider credentials are read by genai from the provider's own variables
//! (`OLLAMA_HOST`, `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, ...).

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::llm::GenAIClient;
use crate::pipeline::{
    CoordinatorConfig, JsonlTraceSink, NoOpTraceSink, PipelineCoordinator, TraceSink,
};
use crate::progress::ProgressHandler;
use crate::router::{AgentConfig, AgentStrategy, IntentRouter};
use crate::session::{FileSessionStore, InMemorySessionStore, SessionStore};
use crate::tools::{
    HttpWorker, ResultCache, RetryPolicy, ToolInvocationClient, ToolName, WorkerRegistry,
};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_CAP_MS: u64 = 4_000;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RESULT_CACHE_TTL_SECS: u64 = 900;
const DEFAULT_AGENT_MODEL: &str = "qwen2.5-coder:7b";
const DEFAULT_AGENT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 90;
const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: ollama, openai, claude, gemini, grok, groq")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid endpoint for {tool}: {error}")]
    InvalidEndpoint { tool: ToolName, error: String },

    #[error("No worker endpoints configured. Set at least one WINDPLAN_<STAGE>_URL variable")]
    NoWorkers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindplanConfig {
    /// Endpoint per stage; stages without one are unavailable
    pub worker_urls: BTreeMap<ToolName, String>,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub attempt_timeout_secs: u64,
    pub stage_timeout_secs: u64,
    pub result_cache_ttl_secs: u64,
    /// Agent backend name; `None` disables the agent strategy
    pub agent_provider: Option<String>,
    pub agent_model: String,
    pub agent_max_attempts: u32,
    pub agent_timeout_secs: u64,
    pub session_ttl_secs: u64,
    pub session_dir: Option<PathBuf>,
    pub trace_file: Option<PathBuf>,
    pub log_level: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn url_var(tool: ToolName) -> String {
    format!("WINDPLAN_{}_URL", tool.as_str().to_uppercase())
}

impl Default for WindplanConfig {
    /// Loads the configuration from `WINDPLAN_*` variables, falling back to
    /// defaults for anything unset or unparsable
    fn default() -> Self {
        let worker_urls = ToolName::ALL
            .into_iter()
            .filter_map(|tool| env_non_empty(&url_var(tool)).map(|url| (tool, url)))
            .collect();

        Self {
            worker_urls,
            max_attempts: env_parse("WINDPLAN_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            retry_base_ms: env_parse("WINDPLAN_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS),
            retry_cap_ms: env_parse("WINDPLAN_RETRY_CAP_MS", DEFAULT_RETRY_CAP_MS),
            attempt_timeout_secs: env_parse(
                "WINDPLAN_ATTEMPT_TIMEOUT_SECS",
                DEFAULT_ATTEMPT_TIMEOUT_SECS,
            ),
            stage_timeout_secs: env_parse(
                "WINDPLAN_STAGE_TIMEOUT_SECS",
                DEFAULT_STAGE_TIMEOUT_SECS,
            ),
            result_cache_ttl_secs: env_parse(
                "WINDPLAN_RESULT_CACHE_TTL_SECS",
                DEFAULT_RESULT_CACHE_TTL_SECS,
            ),
            agent_provider: env_non_empty("WINDPLAN_AGENT_PROVIDER"),
            agent_model: env_non_empty("WINDPLAN_AGENT_MODEL")
                .unwrap_or_else(|| DEFAULT_AGENT_MODEL.to_string()),
            agent_max_attempts: env_parse(
                "WINDPLAN_AGENT_MAX_ATTEMPTS",
                DEFAULT_AGENT_MAX_ATTEMPTS,
            ),
            agent_timeout_secs: env_parse(
                "WINDPLAN_AGENT_TIMEOUT_SECS",
                DEFAULT_AGENT_TIMEOUT_SECS,
            ),
            session_ttl_secs: env_parse("WINDPLAN_SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS),
            session_dir: env_non_empty("WINDPLAN_SESSION_DIR").map(PathBuf::from),
            trace_file: env_non_empty("WINDPLAN_TRACE_FILE").map(PathBuf::from),
            log_level: env::var("WINDPLAN_LOG_LEVEL")
                .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
                .to_lowercase(),
        }
    }
}

impl WindplanConfig {
    /// Checks ranges, the provider name and endpoint syntax
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(ConfigError::ValidationFailed(
                "Max attempts must be between 1 and 10".to_string(),
            ));
        }
        if self.retry_base_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "Retry base delay must be at least 1ms".to_string(),
            ));
        }
        if self.retry_cap_ms < self.retry_base_ms {
            return Err(ConfigError::ValidationFailed(
                "Retry cap cannot be below the retry base delay".to_string(),
            ));
        }
        if !(1..=600).contains(&self.attempt_timeout_secs) {
            return Err(ConfigError::ValidationFailed(
                "Attempt timeout must be between 1 second and 10 minutes".to_string(),
            ));
        }
        if self.stage_timeout_secs < self.attempt_timeout_secs {
            return Err(ConfigError::ValidationFailed(
                "Stage timeout cannot be shorter than the attempt timeout".to_string(),
            ));
        }
        if !(1..=10).contains(&self.agent_max_attempts) {
            return Err(ConfigError::ValidationFailed(
                "Agent attempt budget must be between 1 and 10".to_string(),
            ));
        }
        if !(1..=600).contains(&self.agent_timeout_secs) {
            return Err(ConfigError::ValidationFailed(
                "Agent timeout must be between 1 second and 10 minutes".to_string(),
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Session TTL must be at least 1 second".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if let Some(provider) = &self.agent_provider {
            GenAIClient::parse_provider(provider)
                .map_err(|_| ConfigError::InvalidProvider(provider.clone()))?;
        }

        for (tool, url) in &self.worker_urls {
            reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidEndpoint {
                tool: *tool,
                error: e.to_string(),
            })?;
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.retry_base_ms))
            .with_max_delay(Duration::from_millis(self.retry_cap_ms))
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_attempts: self.agent_max_attempts,
            timeout: Duration::from_secs(self.agent_timeout_secs),
            ..AgentConfig::default()
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new()
            .with_stage_timeout(Duration::from_secs(self.stage_timeout_secs))
            .with_session_ttl_secs(self.session_ttl_secs)
    }

    /// HTTP workers for every configured endpoint
    pub fn worker_registry(&self) -> Result<WorkerRegistry, ConfigError> {
        let timeout = Duration::from_secs(self.attempt_timeout_secs);
        let mut registry = WorkerRegistry::new();
        for (tool, url) in &self.worker_urls {
            let worker = HttpWorker::new(*tool, url.clone(), timeout).map_err(|e| {
                ConfigError::InvalidEndpoint {
                    tool: *tool,
                    error: e.message,
                }
            })?;
            registry.register(Arc::new(worker));
        }
        Ok(registry)
    }

    /// Agent strategy for the configured provider, if any
    pub fn agent_strategy(&self) -> Result<Option<AgentStrategy>, ConfigError> {
        let Some(provider) = &self.agent_provider else {
            return Ok(None);
        };
        let kind = GenAIClient::parse_provider(provider)
            .map_err(|_| ConfigError::InvalidProvider(provider.clone()))?;
        let client = GenAIClient::new(
            kind,
            self.agent_model.clone(),
            Duration::from_secs(self.agent_timeout_secs),
        );
        Ok(Some(AgentStrategy::new(Arc::new(client), self.agent_config())))
    }

    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        match &self.session_dir {
            Some(dir) => Arc::new(FileSessionStore::new(dir.clone(), self.session_ttl_secs)),
            None => Arc::new(InMemorySessionStore::new(self.session_ttl_secs)),
        }
    }

    pub fn trace_sink(&self) -> Arc<dyn TraceSink> {
        match &self.trace_file {
            Some(path) => Arc::new(JsonlTraceSink::new(path.clone())),
            None => Arc::new(NoOpTraceSink),
        }
    }

    /// Wires stores, workers, the router and the invocation client together
    pub fn build_coordinator(
        &self,
        progress: Arc<dyn ProgressHandler>,
    ) -> Result<PipelineCoordinator, ConfigError> {
        let registry = self.worker_registry()?;
        if registry.is_empty() {
            return Err(ConfigError::NoWorkers);
        }

        let mut client = ToolInvocationClient::new(
            registry.clone(),
            self.retry_policy(),
            Duration::from_secs(self.attempt_timeout_secs),
        )
        .with_progress(progress.clone());
        if self.result_cache_ttl_secs > 0 {
            client = client.with_cache(ResultCache::new(Duration::from_secs(
                self.result_cache_ttl_secs,
            )));
        }

        let mut router = IntentRouter::new(registry.tools()).with_progress(progress.clone());
        if let Some(agent) = self.agent_strategy()? {
            router = router.with_agent(agent.with_progress(progress.clone()));
        }

        Ok(PipelineCoordinator::new(
            self.session_store(),
            router,
            Arc::new(client),
            self.coordinator_config(),
        )
        .with_traces(self.trace_sink())
        .with_progress(progress))
    }

    pub fn to_display_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();

        for (tool, url) in &self.worker_urls {
            map.insert(format!("{}_url", tool.as_str()), url.clone());
        }
        map.insert("max_attempts".to_string(), self.max_attempts.to_string());
        map.insert("retry_base_ms".to_string(), self.retry_base_ms.to_string());
        map.insert("retry_cap_ms".to_string(), self.retry_cap_ms.to_string());
        map.insert(
            "attempt_timeout_secs".to_string(),
            self.attempt_timeout_secs.to_string(),
        );
        map.insert(
            "stage_timeout_secs".to_string(),
            self.stage_timeout_secs.to_string(),
        );
        map.insert(
            "result_cache_ttl_secs".to_string(),
            self.result_cache_ttl_secs.to_string(),
        );
        map.insert(
            "agent_provider".to_string(),
            self.agent_provider
                .clone()
                .unwrap_or_else(|| "disabled".to_string()),
        );
        map.insert("agent_model".to_string(), self.agent_model.clone());
        map.insert(
            "agent_max_attempts".to_string(),
            self.agent_max_attempts.to_string(),
        );
        map.insert(
            "agent_timeout_secs".to_string(),
            self.agent_timeout_secs.to_string(),
        );
        map.insert(
            "session_ttl_secs".to_string(),
            self.session_ttl_secs.to_string(),
        );
        if let Some(dir) = &self.session_dir {
            map.insert("session_dir".to_string(), dir.display().to_string());
        }
        if let Some(path) = &self.trace_file {
            map.insert("trace_file".to_string(), path.display().to_string());
        }
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for WindplanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Windplan Configuration:")?;
        writeln!(f, "  Workers:")?;
        for tool in ToolName::ALL {
            match self.worker_urls.get(&tool) {
                Some(url) => writeln!(f, "    {}: {}", tool, url)?,
                None => writeln!(f, "    {}: (not configured)", tool)?,
            }
        }
        writeln!(
            f,
            "  Retry: {} attempts, {}ms base, {}ms cap",
            self.max_attempts, self.retry_base_ms, self.retry_cap_ms
        )?;
        writeln!(f, "  Attempt Timeout: {}s", self.attempt_timeout_secs)?;
        writeln!(f, "  Stage Timeout: {}s", self.stage_timeout_secs)?;
        match &self.agent_provider {
            Some(provider) => writeln!(
                f,
                "  Agent: {} / {} ({} attempts, {}s)",
                provider, self.agent_model, self.agent_max_attempts, self.agent_timeout_secs
            )?,
            None => writeln!(f, "  Agent: disabled")?,
        }
        writeln!(f, "  Session TTL: {}s", self.session_ttl_secs)?;
        if let Some(dir) = &self.session_dir {
            writeln!(f, "  Session Dir: {}", dir.display())?;
        }
        if let Some(path) = &self.trace_file {
            writeln!(f, "  Trace File: {}", path.display())?;
        }
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
