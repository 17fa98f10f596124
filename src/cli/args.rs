// CLI argument definitions using Clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Summary output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SummaryFormat {
    #[default]
    Text,
    Json,
}

/// Build Allure XML reports from test lifecycle events
#[derive(Parser, Debug)]
#[command(name = "allure-adaptor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn test lifecycle events into Allure XML reports", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose debug output
    #[arg(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Show current configuration and exit
    #[arg(long, default_value_t = false)]
    pub config: bool,

    /// Create default configuration file
    #[arg(long, value_name = "CONFIG_FILE")]
    pub init_config: Option<PathBuf>,

    /// Install shell completion (bash, zsh, fish, elvish, powershell)
    #[arg(long, value_name = "SHELL_TYPE", value_parser = ["bash", "zsh", "fish", "elvish", "powershell"])]
    pub completion: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed recorded host events through a listener
    Replay(ReplayArgs),

    /// Merge worker envelope files into one report
    Merge(MergeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// JSON-lines event files, in the order they were produced
    #[arg(required = true)]
    pub events: Vec<PathBuf>,

    /// Report output directory
    #[arg(long, value_name = "DIR")]
    pub alluredir: Option<PathBuf>,

    /// Keep files already present in the output directory
    #[arg(long, default_value_t = false)]
    pub no_clean: bool,

    /// Act as a worker: write case envelopes to this file instead of a report
    #[arg(long, value_name = "FILE")]
    pub worker_output: Option<PathBuf>,

    /// Report failed cases right after their call phase as well
    #[arg(long, default_value_t = false)]
    pub double_report: bool,

    /// Only run tests of these severities (comma separated)
    #[arg(long, value_name = "SEVERITIES")]
    pub allure_severities: Option<String>,

    /// Only run tests with these features (comma separated)
    #[arg(long, value_name = "FEATURES")]
    pub allure_features: Option<String>,

    /// Only run tests with these stories (comma separated)
    #[arg(long, value_name = "STORIES")]
    pub allure_stories: Option<String>,

    /// Summary output format
    #[arg(long, value_enum, default_value_t = SummaryFormat::Text)]
    pub format: SummaryFormat,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Envelope files or directories containing `*.jsonl` files
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Report output directory
    #[arg(long, value_name = "DIR")]
    pub alluredir: Option<PathBuf>,

    /// Keep files already present in the output directory
    #[arg(long, default_value_t = false)]
    pub no_clean: bool,

    /// Summary output format
    #[arg(long, value_enum, default_value_t = SummaryFormat::Text)]
    pub format: SummaryFormat,
}
