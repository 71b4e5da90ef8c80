//! CLI entry point for rust-scan.
//!
//! Provides command-line access to:
//! - watching channels in real time or playback, logging what would be drawn
//! - probing the newest timestamp of a channel
//! - printing the effective configuration
//!
//! # Usage
//!
//! ```bash
//! rust-scan watch -c rbnb/temp -c rbnb/cam.jpg --window 30s
//! rust-scan --server http://host:8000/RBNB newest rbnb/temp
//! rust-scan config
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_scan::config::{PanelConfig, ScanConfig};
use rust_scan::scan_client::{resolve_address, ScanClient, DEFAULT_SERVER_URL};
use rust_scan::{
    format, logging, ChannelKind, LogRenderer, PlaybackSession, SessionCommand, SystemClock,
};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "rust-scan")]
#[command(about = "Real-time and playback viewer for telemetry channels", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server root URL (overrides config and RUST_SCAN_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow channels until Ctrl-C
    Watch {
        /// Channel path; numeric channels share a panel
        #[arg(short, long = "channel")]
        channels: Vec<String>,

        /// Visible window, e.g. "30s" or "5m"
        #[arg(long, value_parser = parse_duration)]
        window: Option<Duration>,

        /// Session key/value set, e.g. "dt=500&v=60&p00=rbnb/temp"
        #[arg(long)]
        session: Option<String>,

        /// Where to start
        #[arg(long, value_enum, default_value_t = StartAt::Rt)]
        start: StartAt,
    },

    /// Print the newest timestamp of a channel
    Newest {
        /// Channel path
        channel: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StartAt {
    /// Real time at newest
    Rt,
    /// Paused at newest
    Eof,
    /// Paused at oldest
    Bof,
    /// Paused, nothing fetched
    Pause,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ScanConfig::load_from(path),
        None => ScanConfig::load(),
    }
    .context("loading configuration")?;

    match cli.command {
        Commands::Watch {
            channels,
            window,
            session,
            start,
        } => {
            if let Some(pairs) = session {
                config.apply_session_pairs(&pairs)?;
            }
            if let Some(window) = window {
                config.playback.window = window;
            }
            if !channels.is_empty() {
                config.panels = layout(&channels);
            }
            config.validate()?;
            logging::init_from_config(&config)?;
            watch(&config, cli.server.as_deref(), start).await
        }
        Commands::Newest { channel } => {
            logging::init_from_config(&config)?;
            let client = client(&config, cli.server.as_deref())?;
            let newest = client
                .newest_time(&channel)
                .await
                .with_context(|| format!("probing {channel}"))?;
            let now = chrono::Utc::now().timestamp_millis() as f64;
            println!("{newest}\t{}", format::time_label(newest, 0.0, now));
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Numeric channels share the first panel; images and audio get their own.
fn layout(channels: &[String]) -> Vec<PanelConfig> {
    let mut numeric = PanelConfig::default();
    let mut others = Vec::new();
    for path in channels {
        if ChannelKind::from_path(path) == ChannelKind::Numeric {
            numeric.channels.push(path.clone());
        } else {
            others.push(PanelConfig {
                channels: vec![path.clone()],
            });
        }
    }
    let mut panels = Vec::new();
    if !numeric.channels.is_empty() {
        panels.push(numeric);
    }
    panels.extend(others);
    panels
}

fn client(config: &ScanConfig, server: Option<&str>) -> Result<ScanClient> {
    let configured = Some(config.server.url.as_str()).filter(|u| *u != DEFAULT_SERVER_URL);
    let address = resolve_address(server, configured);
    info!(server = %address, source = %address.source(), "data server");
    Ok(ScanClient::with_config(address, &config.server.client_config())?)
}

async fn watch(config: &ScanConfig, server: Option<&str>, start: StartAt) -> Result<()> {
    if config.panels.iter().all(|p| p.channels.is_empty()) {
        bail!("no channels to watch; pass --channel or configure [[panels]]");
    }

    let client = client(config, server)?;
    let mut session = PlaybackSession::new(
        Arc::new(client),
        config.session_config(),
        Arc::new(SystemClock),
        Box::new(LogRenderer::default()),
    );
    for panel in &config.panels {
        let id = session.create_panel();
        for channel in &panel.channels {
            session
                .add_channel(id, channel)
                .with_context(|| format!("adding {channel}"))?;
        }
    }

    match start {
        StartAt::Rt => {
            session.go_realtime().await;
        }
        StartAt::Eof => {
            session.go_eof().await;
        }
        StartAt::Bof => {
            session.go_bof().await;
        }
        StartAt::Pause => {}
    }

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(SessionCommand::Shutdown).await;
        }
    });

    session.run(rx).await;
    Ok(())
}
