//! Headless Capture Board Viewer
//!
//! Runs the relay core against real hardware: board microphone to the
//! default speaker, board video to a logging observer. Stops on Enter or
//! on a fatal relay failure; a stalled video device triggers whole-session
//! reconstruction.

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capture_board_relay::audio::list_devices;
use capture_board_relay::error::VideoError;
use capture_board_relay::{RelayConfig, RelayObserver, RelaySession, SessionEvent, VideoFrame};

/// Observer that counts deliveries and logs the first frame's geometry
#[derive(Default)]
struct StatsObserver {
    frames: AtomicU64,
    chunks: AtomicU64,
}

impl RelayObserver for StatsObserver {
    fn on_frame(&self, frame: VideoFrame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if count == 1 {
            tracing::info!(
                "First frame: {}x{}, stride {} bytes",
                frame.width,
                frame.height,
                frame.stride
            );
        }
    }

    fn on_audio_chunk_relayed(&self) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why a session run ended
enum RunOutcome {
    Quit,
    Restart,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Capture Board Viewer");

    let config = match std::env::args().nth(1) {
        Some(path) => RelayConfig::load(&PathBuf::from(path))?,
        None => RelayConfig::load_default()?,
    };
    config.validate()?;

    println!("\n=== Available Audio Devices ===");
    for device in list_devices()? {
        let direction = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        println!(
            "  [{}] {} ({}, host {})",
            device.index, device.name, direction, device.host_name
        );
    }
    println!();

    // Enter stops the viewer.
    let (quit_tx, quit_rx) = bounded::<()>(1);
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = quit_tx.send(());
    });

    loop {
        let observer = Arc::new(StatsObserver::default());
        let mut session = RelaySession::new(config.clone(), observer.clone());
        session.start()?;
        tracing::info!("Relay running - press Enter to stop");

        let outcome = run_until_exit(&session, &observer, &quit_rx);

        if let Err(e) = session.stop() {
            tracing::warn!("Session stop reported: {}", e);
        }

        match outcome {
            RunOutcome::Quit => break,
            RunOutcome::Restart => {
                tracing::info!("Reconstructing relay session");
                continue;
            }
        }
    }

    tracing::info!("Viewer stopped");
    Ok(())
}

/// Poll session events and the quit signal, logging periodic stats
fn run_until_exit(
    session: &RelaySession,
    observer: &StatsObserver,
    quit_rx: &Receiver<()>,
) -> RunOutcome {
    let events = session.events();
    let started = Instant::now();
    let mut last_stats = Instant::now();

    loop {
        if quit_rx.try_recv().is_ok() {
            return RunOutcome::Quit;
        }

        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(SessionEvent::AudioFailed(e)) => {
                tracing::error!("Audio relay failed: {}", e);
                return RunOutcome::Quit;
            }
            Ok(SessionEvent::VideoFailed(VideoError::CaptureStalled { misses })) => {
                tracing::warn!(
                    "Video stalled after {} consecutive misses; restarting session",
                    misses
                );
                return RunOutcome::Restart;
            }
            Ok(SessionEvent::VideoFailed(e)) => {
                tracing::error!("Video relay failed: {}", e);
                return RunOutcome::Quit;
            }
            Ok(SessionEvent::AudioFinished { chunks }) => {
                tracing::info!("Audio relay finished after {} chunks", chunks);
            }
            Ok(SessionEvent::VideoFinished { frames }) => {
                tracing::info!("Video relay finished after {} frames", frames);
            }
            Err(_) => {}
        }

        if last_stats.elapsed() >= Duration::from_secs(5) {
            last_stats = Instant::now();
            let frames = observer.frames.load(Ordering::Relaxed);
            let chunks = observer.chunks.load(Ordering::Relaxed);
            let elapsed = started.elapsed().as_secs_f64();
            tracing::info!(
                "Stats: {} frames ({:.1} fps), {} audio chunks relayed",
                frames,
                frames as f64 / elapsed,
                chunks
            );
        }
    }
}
