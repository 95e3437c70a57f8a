//! Video subsystem module

pub mod device;
pub mod frame;
pub mod relay;

pub use device::{CameraSource, VideoSource};
pub use frame::{PixelFormat, VideoFrame};
pub use relay::run_video_relay;
