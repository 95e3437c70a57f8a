//! Audio device enumeration and selection
//!
//! The capture board exposes its microphone as a USB audio input device.
//! Selection matches on the host API the device registers under plus a
//! substring of its reported name, never falling back to a default input.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::config::AudioConfig;
use crate::error::AudioError;

/// Metadata for one enumerated audio device
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Position in enumeration order across all hosts
    pub index: usize,
    /// Human-readable device name
    pub name: String,
    /// Zero-based position of the owning host in `cpal::available_hosts()`
    pub host_api: u32,
    /// Name of the owning host API
    pub host_name: String,
    pub is_input: bool,
    pub is_output: bool,
}

/// Select the capture board's input device from an enumerated list.
///
/// Returns the position of the first input device whose host API equals
/// `host_api` and whose name contains `name_substring` (case-sensitive),
/// or `None` when nothing matches. Callers must treat `None` as a
/// configuration error rather than opening some other device.
pub fn select_input_device(
    devices: &[AudioDeviceInfo],
    host_api: u32,
    name_substring: &str,
) -> Option<usize> {
    devices
        .iter()
        .position(|d| d.is_input && d.host_api == host_api && d.name.contains(name_substring))
}

/// List all audio devices across every available host, in host order then
/// device order
pub fn list_devices() -> Result<Vec<AudioDeviceInfo>, AudioError> {
    Ok(enumerate()?.into_iter().map(|(info, _)| info).collect())
}

/// Find the capture board's input device per the audio configuration
pub fn find_capture_device(config: &AudioConfig) -> Result<cpal::Device, AudioError> {
    let mut devices = enumerate()?;
    let infos: Vec<AudioDeviceInfo> = devices.iter().map(|(info, _)| info.clone()).collect();

    let index = select_input_device(&infos, config.host_api, &config.device_name).ok_or_else(
        || {
            AudioError::DeviceNotFound(format!(
                "no input device on host API {} with \"{}\" in its name",
                config.host_api, config.device_name
            ))
        },
    )?;

    tracing::info!(
        "Selected capture device: {} (host {})",
        infos[index].name,
        infos[index].host_name
    );

    Ok(devices.swap_remove(index).1)
}

/// Get the default output device for playback
pub fn default_output_device() -> Result<cpal::Device, AudioError> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceNotFound("no default output device".to_string()))
}

fn enumerate() -> Result<Vec<(AudioDeviceInfo, cpal::Device)>, AudioError> {
    let mut devices = Vec::new();
    let mut index = 0;

    for (host_api, host_id) in cpal::available_hosts().into_iter().enumerate() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                tracing::warn!("Host {} unavailable: {}", host_id.name(), e);
                continue;
            }
        };

        let host_devices = host
            .devices()
            .map_err(|e| AudioError::OpenFailed(format!("device enumeration failed: {}", e)))?;

        for device in host_devices {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_input = device.supported_input_configs().map(|mut c| c.next().is_some()).unwrap_or(false);
            let is_output = device.supported_output_configs().map(|mut c| c.next().is_some()).unwrap_or(false);

            devices.push((
                AudioDeviceInfo {
                    index,
                    name,
                    host_api: host_api as u32,
                    host_name: host_id.name().to_string(),
                    is_input,
                    is_output,
                },
                device,
            ));
            index += 1;
        }
    }

    Ok(devices)
}
