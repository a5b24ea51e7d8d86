pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CancelArgs, CliArgs, Commands, ConfigArgs, RunArgs, SessionArgs};
pub use handlers::{EXIT_ERROR, EXIT_PIPELINE_FAILURE, EXIT_SUCCESS};
pub use output::{OutputFormat, OutputFormatter};
