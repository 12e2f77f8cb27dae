mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};

use morphd::config::Config;
use morphd::deadletter::{DeadLetterView, FjallDeadLetterStore};
use morphd::observability::init_tracing;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Node(args) => {
            let config = Config::load(args.config)?;
            init_tracing(&config.telemetry.log_filter);
            server::run(config).await?;
        }
        Commands::DeadLetters(args) => {
            let path = match args.path {
                Some(path) => path,
                None => Config::load(None)?.dead_letter.path,
            };
            init_tracing("warn");

            let store = FjallDeadLetterStore::open(&path)?;
            for entry in store.list(args.limit)? {
                println!("{}", serde_json::to_string(&DeadLetterView::from(entry))?);
            }
        }
        Commands::Config(args) => {
            let config = Config::load(args.config)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
