//! channel-dispatcher - send one message to every configured channel
//!
//! ## Usage
//!
//! ```bash
//! # Send using ./.env and wait for rate-limited channels to clear
//! channel-dispatcher
//!
//! # Use another env file and return right after the first pass
//! channel-dispatcher --env-file faucets.env --no-wait
//!
//! # Keep a log file next to the console output
//! channel-dispatcher --log-file bot.log
//! ```
//!
//! ## Environment Variables
//!
//! - `DISCORD_TOKEN`: authorization token (required)
//! - `CHANNEL_<id>`: message to send to channel `<id>`
//! - `DISPATCH_API_BASE`: API base URL (default: "https://discord.com/api/v9")
//! - `DISPATCH_TIMEOUT_SECS`: request timeout (default: 10)
//! - `DISPATCH_MAX_ATTEMPTS`: retries per channel, 0 for unlimited (default: 20)
//! - `DISPATCH_LOG_FILE`: also append logs to this file (same as `--log-file`)
//! - `RUST_LOG`: log filter (default: "info")

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use channel_dispatcher::{
    load_from_env_file, ClientConfig, DispatchEvent, Dispatcher, DispatcherConfig, ReportSink,
    TracingSink,
};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "channel-dispatcher", about = "Send a message to every configured channel")]
struct Cli {
    /// Env file holding the token and `CHANNEL_<id>=<message>` entries.
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Do not wait for rate-limited channels to be retried.
    #[arg(long)]
    no_wait: bool,

    /// Also append plain-text logs to this file.
    #[arg(long, env = "DISPATCH_LOG_FILE")]
    log_file: Option<PathBuf>,
}

/// Prints retry progress for the user and mirrors it to the log.
struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn report(&self, event: &DispatchEvent) {
        if let DispatchEvent::EndpointWaiting { endpoint_id, wait } = event {
            println!(
                "Waiting {:.1} seconds before retrying for channel {}.",
                wait.as_secs_f64(),
                endpoint_id
            );
        }
        TracingSink.report(event);
    }
}

/// Open `path` for appending, creating it if needed.
fn open_log_file(path: &Path) -> anyhow::Result<Mutex<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    Ok(Mutex::new(file))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Missing env file is fine when the variables come from the process.
    let _ = dotenvy::from_path(&cli.env_file);

    let file_layer = match &cli.log_file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(open_log_file(path)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    let client_config = ClientConfig::from_env()?;
    let config = DispatcherConfig::from_env()?;
    let registry = load_from_env_file(&cli.env_file)
        .with_context(|| format!("loading channels from {}", cli.env_file.display()))?;

    info!(channels = registry.len(), api_base = %client_config.api_base, "starting dispatch");

    let dispatcher = Dispatcher::from_client_config(&client_config, config)?
        .with_sink(Arc::new(ConsoleSink));
    let cycle = dispatcher.dispatch_all(&registry).await;
    println!("{}", cycle.report);

    let Some(retry) = cycle.retry else {
        return Ok(());
    };
    if cli.no_wait {
        info!("not waiting for pending channels");
        retry.abort();
        return Ok(());
    }

    tokio::select! {
        summary = retry.wait() => {
            if let Some(summary) = summary {
                println!("{}", summary);
            }
        }
        _ = signal::ctrl_c() => {
            println!("\nInterrupted, pending channels were not retried.");
        }
    }

    Ok(())
}
