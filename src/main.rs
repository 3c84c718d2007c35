mod config;
mod phrases;
mod pipeline;
mod platform;
mod relay;
mod translate;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::platform::telegram::{self, Destination};
use crate::relay::Relay;

/// Relay posts from Telegram channels to a group, translated to English.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Also append log output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,channel_translator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    info!("Loading configuration from: {}", cli.config.display());
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    info!("Configuration loaded successfully");
    info!("  Channels: {:?}", config.channels);
    info!("  Recipient group: {}", config.telegram.recipient_group_id);
    info!("  OpenAI endpoints: {}", config.openai.len());

    let relay = Arc::new(Relay::from_config(&config)?);

    let bot = Bot::new(&config.credentials.bot_token);
    let channels = telegram::verify(&bot, &config.channels).await?;
    let destination = Destination(ChatId(config.telegram.recipient_group_id));

    info!("Relay is starting...");
    telegram::run(bot, relay, channels, destination).await?;

    info!("Relay stopped");
    Ok(())
}
