//! Command handlers
//!
//! Each handler prints its result to stdout, diagnostics to stderr, and
//! returns the process exit code.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use super::commands::{CancelArgs, ConfigArgs, RunArgs, SessionArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::config::{ConfigError, WindplanConfig};
use crate::pipeline::{request_cancel, CoordinatorError, InboundRequest};
use crate::progress::LoggingHandler;
use crate::session::SessionError;

/// Every stage the request needed succeeded
pub const EXIT_SUCCESS: i32 = 0;
/// The request was handled but rejected, cancelled or failed in a stage
pub const EXIT_PIPELINE_FAILURE: i32 = 1;
/// Configuration or session storage problems
pub const EXIT_ERROR: i32 = 2;

fn load_config(session_dir: Option<&PathBuf>) -> Result<WindplanConfig, ConfigError> {
    let mut config = WindplanConfig::default();
    if let Some(dir) = session_dir {
        config.session_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn exit_code_for(err: &CoordinatorError) -> i32 {
    match err {
        CoordinatorError::InvalidRequest(_) => EXIT_PIPELINE_FAILURE,
        CoordinatorError::Session(e) if e.is_absent() => EXIT_PIPELINE_FAILURE,
        CoordinatorError::Session(SessionError::InvalidId(_)) => EXIT_PIPELINE_FAILURE,
        CoordinatorError::Session(_) => EXIT_ERROR,
    }
}

fn print_output(formatted: anyhow::Result<String>) -> bool {
    match formatted {
        Ok(text) => {
            println!("{}", text.trim_end());
            true
        }
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            eprintln!("Error: {:#}", e);
            false
        }
    }
}

pub async fn handle_run(args: &RunArgs, session_dir: Option<&PathBuf>) -> i32 {
    let mut config = match load_config(session_dir) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };
    if args.no_agent {
        config.agent_provider = None;
    } else if let Some(provider) = &args.agent {
        config.agent_provider = Some(provider.clone());
    }

    let coordinator = match config.build_coordinator(Arc::new(LoggingHandler)) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("Failed to set up pipeline: {}", e);
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };

    let session_id = args
        .session
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    debug!(session = %session_id, agent = coordinator.router().has_agent(), "Running request");

    let mut request = InboundRequest::new(session_id, args.utterance_text());
    if let Some(params) = args.explicit_params() {
        request = request.with_explicit_params(params);
    }

    let response = match coordinator.handle(request).await {
        Ok(response) => response,
        Err(e) => {
            error!("Request failed: {}", e);
            eprintln!("Error: {}", e.user_message());
            return exit_code_for(&e);
        }
    };

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    if !print_output(formatter.format_response(&response)) {
        return EXIT_ERROR;
    }

    if response.success {
        EXIT_SUCCESS
    } else {
        EXIT_PIPELINE_FAILURE
    }
}

pub async fn handle_cancel(args: &CancelArgs, session_dir: Option<&PathBuf>) -> i32 {
    let config = match load_config(session_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };
    let store = config.session_store();

    match request_cancel(store.as_ref(), &args.session).await {
        Ok(_) => {
            println!(
                "Cancellation requested for session {}. The pipeline stops before its next stage.",
                args.session
            );
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(session = %args.session, "Cancel failed: {}", e);
            eprintln!("Error: {}", e.user_message());
            exit_code_for(&e)
        }
    }
}

pub async fn handle_session(args: &SessionArgs, session_dir: Option<&PathBuf>) -> i32 {
    let config = match load_config(session_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };
    let store = config.session_store();

    match store.get(&args.session_id).await {
        Ok(session) => {
            let formatter = OutputFormatter::new(OutputFormat::from(args.format));
            if print_output(formatter.format_session(&session)) {
                EXIT_SUCCESS
            } else {
                EXIT_ERROR
            }
        }
        Err(e) => {
            let e = CoordinatorError::from(e);
            eprintln!("Error: {}", e.user_message());
            exit_code_for(&e)
        }
    }
}

pub fn handle_config(args: &ConfigArgs, session_dir: Option<&PathBuf>) -> i32 {
    let mut config = WindplanConfig::default();
    if let Some(dir) = session_dir {
        config.session_dir = Some(dir.clone());
    }

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    if !print_output(formatter.format_config(&config)) {
        return EXIT_ERROR;
    }

    match config.validate() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Warning: {}", e);
            EXIT_ERROR
        }
    }
}
