use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod configure;

use crate::core::{AppConfig, logging};

#[derive(Subcommand)]
enum Command {
    /// Start a chat session (the default)
    Chat {},
    /// Store the API key used to authenticate requests
    Configure {
        #[arg(long)]
        api_key: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    logging::init();
    let config = AppConfig::from_env();

    // Handle each sub command
    match args.command {
        Some(Command::Configure { api_key }) => {
            configure::run(&config, &api_key)?;
        }
        Some(Command::Chat {}) | None => {
            chat::run(&config).await?;
        }
    }

    Ok(())
}
