use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "morphd")]
#[command(about = "Asynchronous content transformation worker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a worker node (transformer component + operator HTTP API)
    Node(NodeArgs),

    /// Print persisted dead letters as JSON lines, oldest first
    DeadLetters(DeadLetterArgs),

    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct NodeArgs {
    /// Configuration file (defaults to $MORPHD_CONFIG or config/morphd.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct DeadLetterArgs {
    /// Dead-letter store directory (defaults to `dead_letter.path` from config)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Maximum number of entries to print
    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (defaults to $MORPHD_CONFIG or config/morphd.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}
