use windplan::cli::commands::{CliArgs, Commands};
use windplan::cli::handlers::{handle_cancel, handle_config, handle_run, handle_session};
use windplan::util::logging::{init_logging, parse_level, LoggingConfig};
use windplan::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("windplan v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let session_dir = args.session_dir.as_ref();
    let exit_code = match &args.command {
        Commands::Run(run_args) => handle_run(run_args, session_dir).await,
        Commands::Cancel(cancel_args) => handle_cancel(cancel_args, session_dir).await,
        Commands::Session(session_args) => handle_session(session_args, session_dir).await,
        Commands::Config(config_args) => handle_config(config_args, session_dir),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("WINDPLAN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let use_json = env::var("WINDPLAN_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..LoggingConfig::default()
    });
}
