//! Hotword service entry point.
//!
//! Hermes messages arrive as JSON lines on stdin and events leave as JSON
//! lines on stdout, so stdout carries nothing else. Logs go to stderr.

mod bus;
mod cli;
mod settings;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hotword_core::HotwordEngine;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::{forward_lines, JsonLinesSink};
use crate::cli::Cli;
use crate::settings::resolve_settings;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Tracing ───────────────────────────────────────────────────────────
    let default_filter = if cli.debug { "hotword=debug" } else { "hotword=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    // ── Settings ──────────────────────────────────────────────────────────
    let mut settings = resolve_settings(cli.settings.as_deref())?;
    settings.apply_cli(&cli)?;
    settings.normalize();
    info!(
        keyphrase = %settings.keyphrase,
        site_ids = ?settings.site_ids,
        udp_endpoints = settings.udp_audio.len(),
        "hotword service starting"
    );

    // ── Engine ────────────────────────────────────────────────────────────
    let engine = HotwordEngine::new(
        settings.engine_config(cli.debug),
        Arc::new(settings.energy_loader()),
    )
    .context("invalid engine configuration")?;
    engine.warm_up().context("failed to load keyword decoder")?;
    let (plane, _threads) = engine.start().context("failed to start engine")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_lines(BufReader::new(tokio::io::stdin()), tx));

        let mut sink = JsonLinesSink::new(std::io::stdout());
        tokio::select! {
            result = plane.run(rx, &mut sink) => result?,
            _ = tokio::signal::ctrl_c() => warn!("interrupted"),
        }
        Ok::<_, anyhow::Error>(())
    })?;

    info!(
        status = ?engine.status(),
        diagnostics = ?engine.diagnostics_snapshot(),
        "hotword service stopped"
    );
    Ok(())
}
