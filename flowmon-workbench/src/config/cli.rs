use clap::{Parser, Subcommand, ValueEnum};
use flow_monitor::Protocol;
use flow_monitor::report::ReportFormat;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct CliOpt {
    /// How the report printed to stdout should be rendered
    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    /// Path where a CSV report should additionally be stored
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Path where a JSON report should additionally be stored
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Only report flows sent from this IP address
    #[arg(long)]
    pub source: Option<IpAddr>,

    /// Only report flows sent to this IP address
    #[arg(long)]
    pub destination: Option<IpAddr>,

    /// Only report flows using this protocol (a name such as `udp`, or a protocol number)
    #[arg(long)]
    pub protocol: Option<Protocol>,

    /// Abort at the first event that cannot be ingested, instead of reporting it as a data
    /// quality problem
    #[arg(long)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Replay the events recorded in a trace file
    Replay(ReplayOpt),
    /// Generate events from a synthetic traffic description
    Synthetic(SyntheticOpt),
}

#[derive(Parser, Debug, Clone)]
pub struct ReplayOpt {
    /// Path to the JSON file containing the recorded flows and events
    #[arg(long)]
    pub trace: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct SyntheticOpt {
    /// Path to the JSON file describing the link and the traffic sources
    #[arg(long)]
    pub traffic: PathBuf,

    /// The random seed governing packet loss and extra delays
    #[arg(long, default_value_t = 42)]
    pub rng_seed: u64,

    /// Whether the run should be non-deterministic, i.e. using a non-constant seed for the random
    /// number generator
    #[arg(long)]
    pub non_deterministic: bool,
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Console,
    Csv,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Console => ReportFormat::Console,
            OutputFormat::Csv => ReportFormat::Csv,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}
