//! desktop-recorder: records the desktop and an audio device into one file.
//!
//! Usage: `desktop-recorder [config.json]`. Without an argument the default
//! config file is used when present, otherwise built-in defaults.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use desktop_recorder::audio::create_audio_backend;
use desktop_recorder::capture::create_video_backend;
use desktop_recorder::platform::{get_platform_name, DisplayTopology};
use desktop_recorder::{
    ContainerWriter, RawStreamWriter, Recorder, RecorderConfig, RecorderEvent, RecorderParams,
    WavWriter,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "desktop-recorder v{} on {}",
        env!("CARGO_PKG_VERSION"),
        get_platform_name()
    );

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = RecorderConfig::load_or_default(config_path.as_deref())?;
    config.validate().context("Invalid configuration")?;

    let topology = DisplayTopology::current().context("Failed to query display layout")?;
    info!(
        "{} monitor(s), desktop {:?}",
        topology.monitors.len(),
        topology.desktop_bounds()
    );

    let video = create_video_backend(
        &config.video,
        config.region,
        config.include_cursor,
        &topology,
        config.fallback_to_gdi,
    )
    .context("Failed to create video capture")?;
    let audio = create_audio_backend(&config.audio, config.frame_rate)
        .context("Failed to create audio capture")?;

    let (writer, output) = open_writer(&config, video.as_deref(), audio.as_deref())?;

    let mut recorder = Recorder::new(RecorderParams {
        frame_rate: config.frame_rate,
        capture_timeout_ms: config.capture_timeout_ms,
        video,
        audio,
        writer,
    })?;
    let mut events = recorder.subscribe();

    let delay = config.start_delay();
    if !delay.is_zero() {
        info!("Starting in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted before start");
                recorder.stop()?;
                return Ok(());
            }
        }
    }

    recorder.start()?;
    info!(
        "Recording session {} ({:?}) to {}",
        recorder.session_id(),
        recorder.sync_mode(),
        output.display()
    );

    // Configured duration includes the start delay
    let limit = config.duration().map(|d| d.saturating_sub(delay));
    tokio::select! {
        _ = run_for(limit) => info!("Duration reached"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Ctrl-C handler failed: {}", e);
            }
            info!("Ctrl-C received");
        }
        message = next_failure(&mut events) => {
            error!("Recording aborted: {}", message);
        }
    }

    let result = recorder.stop();
    let stats = recorder.stats();
    info!(
        "Frames: {} written ({} repeated, {} late), {:.1} fps effective, avg cycle {:.2} ms",
        stats.frames_written,
        stats.frames_repeated,
        stats.frames_late,
        stats.effective_frame_rate(),
        stats.avg_cycle_ms
    );
    info!(
        "Audio blocks: {} written, {} dropped",
        stats.blocks_written, stats.blocks_dropped
    );

    result.context("Recording failed")?;
    info!("Saved {}", output.display());
    Ok(())
}

/// Raw stream container when there is video, WAV for audio-only sessions
fn open_writer(
    config: &RecorderConfig,
    video: Option<&dyn desktop_recorder::VideoCaptureBackend>,
    audio: Option<&dyn desktop_recorder::AudioCaptureBackend>,
) -> Result<(Arc<dyn ContainerWriter>, PathBuf)> {
    let audio_format = audio.map(|a| a.format());

    match (video, audio_format) {
        (Some(video), audio_format) => {
            let path = config.output_path("ravi");
            let (width, height) = video.size();
            let writer = RawStreamWriter::create(&path, width, height, config.frame_rate, audio_format)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok((Arc::new(writer), path))
        }
        (None, Some(format)) => {
            let path = config.output_path("wav");
            let writer = WavWriter::create(&path, format)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok((Arc::new(writer), path))
        }
        (None, None) => anyhow::bail!("Nothing to record"),
    }
}

async fn run_for(limit: Option<std::time::Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Resolves with the message of the first `Failed` event
async fn next_failure(events: &mut broadcast::Receiver<RecorderEvent>) -> String {
    loop {
        match events.recv().await {
            Ok(RecorderEvent::Failed(message)) => return message,
            Ok(RecorderEvent::StateChanged(_)) => continue,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Missed {} recorder events", n);
            }
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
