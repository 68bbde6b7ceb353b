mod config;
mod controller;
mod filters;
mod i18n;
mod library;
mod models;
mod mpv;
mod pagination;
mod radio_browser;
mod session;
mod storage;
mod ui;
mod user;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Internet radio player for the radio-browser directory.
#[derive(Debug, Parser)]
#[command(name = "soundpulse", version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/soundpulse/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Language for messages: en, de, fr, es, zh, ar
    #[arg(long)]
    lang: Option<i18n::Language>,

    /// Stations shown per page
    #[arg(long)]
    items_per_page: Option<usize>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "soundpulse=debug" } else { "soundpulse=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config_path = match args.config {
        Some(p) => p,
        None => config::default_config_path()?,
    };
    let mut config = config::AppConfig::load(&config_path)?;
    if let Some(lang) = args.lang {
        config.language = lang;
    }
    if let Some(n) = args.items_per_page {
        config.items_per_page = n;
    }

    let mut controller = controller::start_controller(config, config_path)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build shell runtime")?;
    let res = rt.block_on(ui::shell::run(&mut controller));
    // Stdin reads block a runtime thread; don't wait on them.
    rt.shutdown_timeout(Duration::from_millis(100));
    drop(controller);
    res
}
