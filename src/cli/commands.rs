use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::llm::GenAIClient;
use crate::router::SlotValues;

/// Wind-farm siting workflow orchestrator
#[derive(Parser, Debug)]
#[command(
    name = "windplan",
    about = "Wind-farm siting workflow orchestrator",
    version,
    author,
    long_about = "windplan turns natural-language siting requests into calls to the terrain, \
                  layout, simulation and report workers. Requests in the same session share \
                  their location and earlier results, so follow-ups like \"now run the wake \
                  simulation\" pick up where the last request left off."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Directory for session files (overrides WINDPLAN_SESSION_DIR)"
    )]
    pub session_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Handle one request",
        long_about = "Routes the request to a stage plan and runs the stages in order.\n\n\
                      Examples:\n  \
                      windplan run --session s1 \"Analyze terrain at 35.0, -101.0\"\n  \
                      windplan run --session s1 \"now optimize the layout\"\n  \
                      windplan run --lat 35.0 --lon -101.0 --capacity-mw 50 \"optimize layout\""
    )]
    Run(RunArgs),

    #[command(
        about = "Cancel the pipeline running in a session",
        long_about = "Sets the session's cancel flag. The running pipeline stops before its \
                      next stage; the stage in flight is not interrupted.\n\n\
                      Examples:\n  \
                      windplan cancel --session s1"
    )]
    Cancel(CancelArgs),

    #[command(about = "Show a session's stored context")]
    Session(SessionArgs),

    #[command(about = "Show the effective configuration")]
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(
        value_name = "REQUEST",
        required = true,
        num_args = 1..,
        help = "Request text"
    )]
    pub utterance: Vec<String>,

    #[arg(
        short = 's',
        long,
        value_name = "ID",
        help = "Session id (a new one is generated when omitted)"
    )]
    pub session: Option<String>,

    #[arg(
        long,
        value_name = "DEGREES",
        allow_hyphen_values = true,
        requires = "lon",
        help = "Site latitude"
    )]
    pub lat: Option<f64>,

    #[arg(
        long,
        value_name = "DEGREES",
        allow_hyphen_values = true,
        requires = "lat",
        help = "Site longitude"
    )]
    pub lon: Option<f64>,

    #[arg(long, value_name = "KM", help = "Analysis radius in kilometres")]
    pub radius_km: Option<f64>,

    #[arg(long, value_name = "MW", help = "Target farm capacity in megawatts")]
    pub capacity_mw: Option<f64>,

    #[arg(long, value_name = "COUNT", help = "Number of turbines")]
    pub turbines: Option<u32>,

    #[arg(
        long,
        value_name = "PROVIDER",
        value_parser = parse_provider,
        conflicts_with = "no_agent",
        help = "Agent backend (overrides WINDPLAN_AGENT_PROVIDER)"
    )]
    pub agent: Option<String>,

    #[arg(long, help = "Route deterministically only")]
    pub no_agent: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

impl RunArgs {
    pub fn utterance_text(&self) -> String {
        self.utterance.join(" ")
    }

    /// Parameters given as flags; these take precedence over the text
    pub fn explicit_params(&self) -> Option<SlotValues> {
        let mut params = SlotValues::new();
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            params = params.with_coordinates(lat, lon);
        }
        params.radius_km = self.radius_km;
        params.capacity_mw = self.capacity_mw;
        params.turbine_count = self.turbines;

        (!params.is_empty()).then_some(params)
    }
}

#[derive(Args, Debug, Clone)]
pub struct CancelArgs {
    #[arg(short = 's', long, value_name = "ID", help = "Session to cancel")]
    pub session: String,
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    #[arg(value_name = "ID", help = "Session id")]
    pub session_id: String,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_provider(s: &str) -> Result<String, String> {
    GenAIClient::parse_provider(s)
        .map(|_| s.trim().to_lowercase())
        .map_err(|e| e.to_string())
}
