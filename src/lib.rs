//! # Capture Board Relay
//!
//! Low-latency audio/video passthrough core for USB capture boards.
//!
//! The crate relays the board's microphone audio to the default speaker and
//! hands raw video frames to a presentation callback, each on its own
//! dedicated worker thread:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         RelaySession                             │
//! │                                                                  │
//! │  ┌───────────────┐  audio-relay thread   ┌──────────────────┐    │
//! │  │ USB board mic │ ──► read N bytes ───► │ default speaker  │    │
//! │  │ (cpal input)  │      write N bytes    │ (cpal output)    │    │
//! │  └───────────────┘                       └──────────────────┘    │
//! │                                                                  │
//! │  ┌───────────────┐  video-relay thread   ┌──────────────────┐    │
//! │  │ USB board cam │ ──► read frame ─────► │ on_frame callback│    │
//! │  │ (VideoCapture)│      wrap + emit      │ (presentation)   │    │
//! │  └───────────────┘                       └──────────────────┘    │
//! │                                                                  │
//! │        shared running flag · start()/stop() · event channel      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Device handles are opened on, exclusively owned by, and released on the
//! relay thread that uses them. A session runs once: after `stop()` it is
//! terminal, and recovery is by constructing a fresh session.

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod video;

pub use config::{AudioConfig, RelayConfig, VideoConfig};
pub use error::{Error, Result};
pub use session::{RelayObserver, RelaySession, SessionEvent, SessionState};
pub use video::frame::{PixelFormat, VideoFrame};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for the capture board's audio interface
    pub const DEFAULT_SAMPLE_RATE: u32 = 96_000;

    /// Default channel count (the board mic is mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Default passthrough chunk size in bytes
    pub const DEFAULT_CHUNK_SIZE: usize = 128;

    /// Bytes per PCM sample (16-bit signed integer)
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Host API position the capture board's audio interface registers under
    pub const DEFAULT_HOST_API: u32 = 2;

    /// Name substring identifying the capture board's audio interface
    pub const CAPTURE_BOARD_NAME: &str = "USB3.0 Capture";

    /// Default video device index
    pub const DEFAULT_VIDEO_INDEX: i32 = 0;

    /// Default requested frame width
    pub const DEFAULT_FRAME_WIDTH: u32 = 1280;

    /// Default requested frame height
    pub const DEFAULT_FRAME_HEIGHT: u32 = 700;

    /// Default requested frame rate
    pub const DEFAULT_FPS: f64 = 60.0;

    /// Capacity of the bounded channels between cpal callbacks and the relay
    pub const STREAM_CHANNEL_CAPACITY: usize = 32;

    /// How long a chunk read/write may go without data before the stream is
    /// considered dead
    pub const STREAM_IO_TIMEOUT_MS: u64 = 1_000;

    /// Consecutive failed frame reads before the video relay gives up
    pub const MAX_CONSECUTIVE_MISSES: u32 = 120;

    /// How long start() waits for a worker to confirm device acquisition
    pub const START_TIMEOUT_MS: u64 = 10_000;

    /// How long stop() waits for each worker to exit before detaching it
    pub const STOP_TIMEOUT_MS: u64 = 2_000;

    /// Frame interval for periodic capture progress logging
    pub const CAMERA_LOG_INTERVAL: u64 = 300;
}
