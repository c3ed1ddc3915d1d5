use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

mod config;
mod media;
mod nal;
mod pacing;
mod source;

use config::Config;
use source::{FileSource, SampleSource, SourceError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("loopcast=debug".parse()?))
        .init();

    let config = Config::load()?;
    tracing::info!(
        path = %config.source.path,
        fps = config.source.fps,
        looping = config.source.loop_playback,
        "starting stream source"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let mut stream_handle = tokio::task::spawn_blocking(move || run_stream(config, &flag));

    tokio::select! {
        result = &mut stream_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("stream failed: {e}"),
                Err(e) => tracing::error!("stream task panicked: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            shutdown.store(true, Ordering::Relaxed);
            let _ = stream_handle.await;
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Blocking supervisor: drives the pull-based tick loop at the target rate
/// and respawns the source when its encoder child dies.
fn run_stream(config: Config, shutdown: &AtomicBool) -> Result<(), SourceError> {
    let tick = Duration::from_micros(1_000_000 / u64::from(config.source.fps.max(1)));

    while !shutdown.load(Ordering::Relaxed) {
        let mut source = FileSource::open(&config)?;
        source.start();

        let bootstrap = source.initial_nalus();
        if !bootstrap.is_empty() {
            tracing::debug!(bytes = bootstrap.len(), "bootstrap units cached");
        }

        while !shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(tick);
            source.load_next_sample();

            if !source.is_alive() {
                tracing::warn!("encoder process died, restarting source");
                break;
            }

            tracing::trace!(
                time_us = source.sample_time_us(),
                bytes = source.sample().len(),
                "tick"
            );
        }

        source.stop();
        if !shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_secs(5));
        }
    }

    Ok(())
}
