use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dzgrab::link::resolve_asset_id;
use dzgrab::{Config, run};

#[derive(Debug, Parser)]
#[command(version, about = "Download a track from Deezer using an arl token")]
struct Cli {
    /// Deezer track id or url to download
    track: String,

    /// Output directory (default: current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Read settings from this file instead of the per-user config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Don't draw the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dzgrab=debug" } else { "dzgrab=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).context("loading config")?;
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    config.show_progress = !cli.no_progress;

    let credential = match config.credential() {
        Ok(credential) => credential,
        Err(e) => {
            error!("{}", e);
            error!("Please check your DEEZER_ARL_TOKEN environment variable");
            return Ok(ExitCode::FAILURE);
        }
    };
    debug!("Arl token validation: format appears valid ({:?})", credential);

    let track = match resolve_asset_id(&cli.track, config.request_timeout()).await {
        Ok(track) => track,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if run(&config, &credential, &track, &config.output_dir).await {
        info!("Download completed successfully");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
