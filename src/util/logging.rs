//! Structured logging setup
//!
//! Installs a `tracing` subscriber once per process. Output goes to stderr
//! so that command output on stdout stays machine-readable, and `RUST_LOG`
//! takes precedence over the configured level when it is set.
//!
//! ```no_run
//! use windplan::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(session = "s1", stage = "terrain", "Stage started");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Dependencies that are too chatty at the crate's own level
const QUIET_TARGETS: [&str; 4] = ["h2=warn", "hyper=warn", "reqwest=warn", "genai=warn"];

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level applied to the `windplan` target
    pub level: Level,

    /// One JSON object per event instead of the console format
    pub use_json: bool,

    pub include_target: bool,

    /// File and line of the call site
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with call sites and thread ids, for log collectors
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            ..Default::default()
        }
    }
}

/// Parses a level name, case-insensitively; unknown names give `INFO`
///
/// ```
/// use windplan::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("Debug"), Level::DEBUG);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. \
                 Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    if env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let mut filter = EnvFilter::new(format!("windplan={}", level));
    for directive in QUIET_TARGETS {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the subscriber; later calls are no-ops
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);
        let registry = tracing_subscriber::registry().with(filter);

        if config.use_json {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `WINDPLAN_LOG_LEVEL` and `WINDPLAN_LOG_JSON`
pub fn init_from_env() {
    init_logging(config_from_env());
}

fn config_from_env() -> LoggingConfig {
    let level = env::var("WINDPLAN_LOG_LEVEL")
        .map(|v| parse_level(&v))
        .unwrap_or(Level::INFO);
    let use_json = env::var("WINDPLAN_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level,
        use_json,
        ..Default::default()
    }
}
