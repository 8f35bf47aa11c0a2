//! release-notify entry point.
//!
//! Each invocation does one unit of work and exits: `check` fetches the
//! release page and records changed versions, `announce` posts the
//! statements carried by a store change-stream event.  Scheduling is left
//! to whatever invokes the binary.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info};

mod config;
mod diff;
mod driver;
mod error;
mod notifier;
mod pipeline;
mod source;
mod store;
mod stream;
#[cfg(test)]
mod testing;
mod types;

use config::Config;
use driver::MessageFormat;
use notifier::{Notifier, TwitterNotifier};
use pipeline::{run_check, CheckOptions};
use source::SupportPageSource;
use store::JsonFileStore;
use stream::handle_event;

#[derive(Debug, Parser)]
#[command(name = "release-notify")]
#[command(about = "Track OS release versions and announce changes", long_about = None)]
struct Cli {
    /// Extra TOML configuration merged over the defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch the release page and record changed versions
    Check,
    /// Post the statements carried by a change-stream event
    Announce {
        /// Event JSON file, or `-` for stdin
        #[arg(long)]
        event: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    // Load configuration
    let cfg = Config::load(cli.config.as_deref())?;
    info!("Starting release-notify with config: {:?}", cfg);

    let result = match cli.command {
        Commands::Check => check(&cfg).await,
        Commands::Announce { event } => announce_event(&cfg, &event).await,
    };
    if let Err(e) = &result {
        error!("Run failed: {:#}", e);
    }
    result
}

fn format_for(cfg: &Config) -> MessageFormat {
    MessageFormat::new(cfg.hashtags.clone())
}

fn build_notifier(cfg: &Config) -> anyhow::Result<TwitterNotifier> {
    let twitter = cfg
        .twitter
        .clone()
        .context("Twitter credentials are not configured")?;
    TwitterNotifier::new(twitter, cfg.http_timeout())
}

async fn check(cfg: &Config) -> anyhow::Result<()> {
    let source = SupportPageSource::new(cfg.source_url.clone(), cfg.http_timeout(), &cfg.devices)?;
    let store = JsonFileStore::new(&cfg.store_path);
    let notifier = cfg
        .notify_on_change
        .then(|| build_notifier(cfg))
        .transpose()?;
    let format = format_for(cfg);

    let opts = CheckOptions::from_config(cfg, &format, chrono::Utc::now().timestamp());
    let report = run_check(
        &source,
        &store,
        notifier.as_ref().map(|n| n as &dyn Notifier),
        &opts,
    )
    .await?;

    for (device, outcome) in &report.outcomes {
        info!("{}: {:?}", device, outcome);
    }
    report.ensure_complete()?;
    info!("Check complete, store at {}", store.path().display());
    Ok(())
}

async fn announce_event(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event {}", path.display()))?
    };

    handle_event(
        &raw,
        &cfg.devices,
        &format_for(cfg),
        chrono::Utc::now().timestamp(),
        || build_notifier(cfg),
    )
    .await?;
    Ok(())
}
