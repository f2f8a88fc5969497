/*
daily-digest - main.rs
Loads the configuration and triggers the digest pipeline, either once (for an
external cron) or every day at `digest.schedule_time`.
*/

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use common::Config;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use daily_digest::scheduler::{next_run_after, DailyDigestJob};

#[derive(Parser, Debug)]
#[command(name = "daily-digest", about = "Curate, summarize and post a daily news digest")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run the pipeline once and exit
    #[arg(long)]
    once: bool,

    /// Log posts instead of creating them
    #[arg(long)]
    dry_run: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Merge `config.default.toml` with the override file (`--config`, else `config.toml`).
async fn load_config(override_arg: Option<&Path>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = match override_arg {
        Some(p) if !p.exists() => {
            anyhow::bail!("Config file not found: {}", p.display());
        }
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from("config.toml")).filter(|p| p.exists()),
    };

    let config = Config::load_with_defaults(
        Some(&default_path).filter(|p| p.exists()).map(PathBuf::as_path),
        override_path.as_deref(),
    )
    .await?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // API keys may live in a .env file
    dotenv::dotenv().ok();

    let mut config = match load_config(args.config.as_deref()).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration: {:#}", e);
            return Err(e);
        }
    };

    let job = DailyDigestJob::new(args.dry_run);

    if args.once {
        let outcome = job.execute(&config).await;
        info!(?outcome, "single run finished");
        return Ok(());
    }

    loop {
        let now = Local::now();
        let next = next_run_after(&now, config.digest.schedule_time()?);
        let wait = (next - now).to_std().unwrap_or(Duration::from_secs(0));
        info!(next_run = %next, "waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                break;
            }
        }

        // Settings are read at the start of every run.
        match load_config(args.config.as_deref()).await {
            Ok(cfg) => config = cfg,
            Err(e) => error!("failed to reload configuration, keeping previous: {:#}", e),
        }

        let outcome = job.execute(&config).await;
        info!(?outcome, "scheduled run finished");
    }

    info!("Shutdown complete");
    Ok(())
}
