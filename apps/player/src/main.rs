//! Guildtune Player - headless command-line front end for Guildtune.
//!
//! Joins one channel for one entity, queues the given tracks, mixes and
//! announcements, logs every status change, and exits once playback has
//! settled or a shutdown signal arrives.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use guildtune_core::{
    bootstrap_services, Adapters, BootstrappedServices, ChannelId, EntityId, StatusSnapshot,
    TokioSpawner,
};
use tokio::signal;
use tokio_stream::StreamExt;

use crate::config::PlayerConfig;

/// Guildtune Player - sequential playback from the command line.
#[derive(Parser, Debug)]
#[command(name = "guildtune")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "GUILDTUNE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Entity to play for.
    #[arg(short, long, default_value_t = 1, env = "GUILDTUNE_ENTITY")]
    entity: u64,

    /// Channel to join.
    #[arg(short = 'C', long, default_value_t = 1, env = "GUILDTUNE_CHANNEL")]
    channel: u64,

    /// Announcement to speak (repeatable).
    #[arg(short, long = "say", value_name = "TEXT")]
    say: Vec<String>,

    /// Comma-separated artists to mix into the queue.
    #[arg(short, long, value_delimiter = ',', value_name = "ARTISTS")]
    mix: Vec<String>,

    /// Song names or URLs to queue, in order.
    queries: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Guildtune Player v{}", env!("CARGO_PKG_VERSION"));

    let config =
        PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    log::info!(
        "Configuration: debounce={}ms, seek_step={}s, resolver={}, transport={}",
        config.playback.advance_debounce_ms,
        config.playback.seek_step_secs,
        config.ytdlp.program,
        config.ffmpeg.program
    );

    let spawner = TokioSpawner::current();
    let adapters = Adapters::from_configs(config.ytdlp, config.synth, config.ffmpeg, &spawner);
    let services = bootstrap_services(&config.playback, spawner, adapters)
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let entity = EntityId(args.entity);
    let result = tokio::select! {
        result = play(&services, entity, ChannelId(args.channel), &args) => result,
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
            Ok(())
        }
    };

    services.shutdown().await;
    result
}

/// Submits everything requested on the command line, then follows the status
/// until nothing is left to play.
async fn play(
    services: &BootstrappedServices,
    entity: EntityId,
    channel: ChannelId,
    args: &Args,
) -> Result<()> {
    let scheduler = &services.scheduler;
    scheduler
        .connect(entity, channel)
        .await
        .context("Failed to join channel")?;

    for query in &args.queries {
        match scheduler.enqueue(entity, query).await {
            Ok(receipt) => match receipt.position {
                Some(position) => log::info!("Queued \"{}\" at #{}", receipt.title, position),
                None => log::info!("Playing \"{}\"", receipt.title),
            },
            Err(e) => log::warn!("[{}] {}", e.code(), e),
        }
    }

    if !args.mix.is_empty() {
        match scheduler.enqueue_mix(entity, &args.mix).await {
            Ok(receipt) => log::info!("Mixed {} track(s) into the queue", receipt.added),
            Err(e) => log::warn!("[{}] {}", e.code(), e),
        }
    }

    for text in &args.say {
        match scheduler.submit_utterance(entity, text).await {
            Ok(job) => log::info!("Announcement {} accepted", job),
            Err(e) => log::warn!("[{}] {}", e.code(), e),
        }
    }

    let Some(mut updates) = scheduler.status_stream(entity) else {
        return Ok(());
    };
    while let Some(snapshot) = updates.next().await {
        render(&snapshot);
        if snapshot.is_settled() {
            log::info!("Nothing left to play");
            break;
        }
    }
    Ok(())
}

fn render(snapshot: &StatusSnapshot) {
    for line in snapshot.render_text().lines() {
        log::info!("[Status #{}] {}", snapshot.revision, line);
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
