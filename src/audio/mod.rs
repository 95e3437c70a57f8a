//! Audio subsystem module

pub mod device;
pub mod relay;
pub mod stream;

pub use device::{list_devices, select_input_device, AudioDeviceInfo};
pub use relay::run_passthrough;
pub use stream::{AudioFormat, AudioSink, AudioSource};
