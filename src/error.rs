//! Error types for the relay core

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    OpenFailed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Stream IO failed: {0}")]
    Stream(String),
}

/// Video subsystem errors
#[derive(Error, Debug, Clone)]
pub enum VideoError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open capture device: {0}")]
    OpenFailed(String),

    #[error("Frame read failed: {0}")]
    Stream(String),

    #[error("Capture stalled: {misses} consecutive frame reads failed")]
    CaptureStalled { misses: u32 },
}

/// Session lifecycle errors
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Session is already started")]
    AlreadyStarted,

    #[error("Session has finished; construct a new session to run again")]
    Finished,

    #[error("Worker thread did not confirm startup in time")]
    StartTimeout,

    #[error("Worker thread exited before confirming startup")]
    StartAborted,

    #[error("Worker thread '{thread}' did not exit within the stop timeout")]
    StopTimeout { thread: String },
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
