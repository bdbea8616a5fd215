//! # stagelink
//!
//! Runs the messaging coordinators against the in-memory scene host, talking
//! to the client as newline-delimited JSON envelopes on stdin/stdout.

#![deny(unsafe_code)]

mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stagelink_core::{FrameClock, MemoryScene, MessageBus};
use stagelink_messaging::MessagingController;
use stagelink_settings::{StageLinkSettings, load_settings_from_path};
use stagelink_telemetry::{TelemetryConfig, init_telemetry};
use tokio::sync::mpsc;
use tracing::info;

/// Scene messaging host.
#[derive(Parser, Debug)]
#[command(name = "stagelink", about = "Scene messaging host over stdio")]
struct Cli {
    /// Settings file (JSON). Missing files fall back to defaults.
    #[arg(long, default_value = "stagelink.json")]
    settings: PathBuf,

    /// Document to open at startup (overrides `loading.autoLoadUrl`).
    #[arg(long)]
    open: Option<String>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Human-readable logs instead of JSON.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        log_level: cli.log_level,
        module_levels: Vec::new(),
        json: !cli.pretty,
    })?;

    let mut settings = load_settings_from_path(&cli.settings)
        .with_context(|| format!("Failed to load settings from {}", cli.settings.display()))?;
    if let Some(url) = cli.open {
        settings.loading.auto_load_url = Some(url);
    }

    // The coordinators assume one host thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(serve(settings))
}

async fn serve(settings: StageLinkSettings) -> Result<()> {
    let settings = Arc::new(settings);
    let capacity = settings.runtime.event_capacity;

    let scene = Arc::new(MemoryScene::new());
    let bus = MessageBus::new(capacity);
    let clock = FrameClock::new();
    let outbound = bus.subscribe();

    let controller = MessagingController::new(
        scene.clone(),
        scene,
        bus,
        clock.clone(),
        Arc::clone(&settings),
    );
    let shutdown = controller.shutdown_token();
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));

    let ticker = tokio::spawn(transport::drive_clock(
        clock,
        Duration::from_millis(settings.runtime.tick_interval_ms),
        shutdown.clone(),
    ));
    let writer = tokio::spawn(transport::write_outbound(outbound, shutdown.clone()));
    let reader = tokio::spawn(transport::read_inbound(inbound_tx));
    let signal = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        })
    };

    info!(
        tick_ms = settings.runtime.tick_interval_ms,
        tag = %settings.tag_attribute,
        "stagelink ready"
    );
    controller.run(inbound_rx).await;

    shutdown.cancel();
    let (ticked, written) = tokio::join!(ticker, writer);
    ticked.context("clock task failed")?;
    written.context("writer task failed")?;
    reader.abort();
    signal.abort();
    info!("shutting down");
    Ok(())
}
