//! Video capture device access
//!
//! Wraps an OpenCV `VideoCapture` opened by device index. Resolution and
//! frame rate requests are best-effort: the device may deliver something
//! else, so the actual values are read back and mismatches logged.

use opencv::prelude::*;
use opencv::videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH};

use crate::config::VideoConfig;
use crate::constants::CAMERA_LOG_INTERVAL;
use crate::error::VideoError;

use super::frame::{PixelFormat, VideoFrame};

/// Source of captured frames.
///
/// `Ok(None)` is a transient capture miss: the device produced nothing this
/// iteration and the caller should skip it without emitting a frame.
pub trait VideoSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, VideoError>;
}

/// Capture device backed by OpenCV `VideoCapture`
pub struct CameraSource {
    capture: VideoCapture,
    frame_count: u64,
    actual_width: u32,
    actual_height: u32,
    actual_fps: f64,
}

impl CameraSource {
    /// Open the capture device and apply the requested settings
    pub fn open(config: &VideoConfig) -> Result<Self, VideoError> {
        tracing::info!(
            "Opening video device {} at {}x{} @ {} fps",
            config.device_index,
            config.width,
            config.height,
            config.fps
        );

        let mut capture = VideoCapture::new(config.device_index, CAP_ANY)
            .map_err(|e| VideoError::OpenFailed(e.to_string()))?;

        let opened = capture
            .is_opened()
            .map_err(|e| VideoError::OpenFailed(e.to_string()))?;
        if !opened {
            return Err(VideoError::DeviceNotFound(format!(
                "video device {} is not available",
                config.device_index
            )));
        }

        // Best-effort requests; the read-back below is authoritative.
        let _ = capture.set(CAP_PROP_FRAME_WIDTH, f64::from(config.width));
        let _ = capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(config.height));
        let _ = capture.set(CAP_PROP_FPS, config.fps);

        let actual_width = get_property(&capture, CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = get_property(&capture, CAP_PROP_FRAME_HEIGHT)? as u32;
        let actual_fps = get_property(&capture, CAP_PROP_FPS)?;

        tracing::info!(
            "Video device configured: {}x{} @ {:.1} fps",
            actual_width,
            actual_height,
            actual_fps
        );
        if actual_width != config.width || actual_height != config.height {
            tracing::warn!(
                "Resolution mismatch (got {}x{}, requested {}x{})",
                actual_width,
                actual_height,
                config.width,
                config.height
            );
        }
        if (actual_fps - config.fps).abs() > 1.0 {
            tracing::warn!(
                "Frame rate mismatch (got {:.1}, requested {:.1})",
                actual_fps,
                config.fps
            );
        }

        Ok(Self {
            capture,
            frame_count: 0,
            actual_width,
            actual_height,
            actual_fps,
        })
    }

    /// Resolution the device actually delivers
    pub fn actual_resolution(&self) -> (u32, u32) {
        (self.actual_width, self.actual_height)
    }

    /// Frame rate the device actually reports
    pub fn actual_fps(&self) -> f64 {
        self.actual_fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl VideoSource for CameraSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        let mut mat = Mat::default();

        let success = self
            .capture
            .read(&mut mat)
            .map_err(|e| VideoError::Stream(format!("frame read failed: {}", e)))?;

        // A failed grab is a transient miss, not an error.
        if !success || mat.empty() {
            return Ok(None);
        }

        let width = mat.cols();
        let height = mat.rows();
        if width <= 0 || height <= 0 {
            return Ok(None);
        }

        if !mat.is_continuous() {
            mat = mat
                .try_clone()
                .map_err(|e| VideoError::Stream(e.to_string()))?;
        }

        let data = mat
            .data_bytes()
            .map_err(|e| VideoError::Stream(e.to_string()))?
            .to_vec();

        if data.len() % height as usize != 0 {
            tracing::warn!(
                "Discarding frame with inconsistent buffer ({} bytes for {} rows)",
                data.len(),
                height
            );
            return Ok(None);
        }
        let stride = data.len() / height as usize;

        self.frame_count += 1;
        if self.frame_count % CAMERA_LOG_INTERVAL == 0 {
            tracing::debug!("Frames captured: {}", self.frame_count);
        }

        Ok(Some(VideoFrame::new(
            width as u32,
            height as u32,
            stride,
            PixelFormat::Bgr8,
            data,
        )))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        tracing::info!(
            "Releasing video device after {} frames",
            self.frame_count
        );
        if let Err(e) = self.capture.release() {
            tracing::warn!("Error releasing video device: {}", e);
        }
    }
}

/// Open the configured camera as a boxed source. Called on the video relay
/// thread, which then owns the handle.
pub fn open_camera(config: &VideoConfig) -> Result<Box<dyn VideoSource>, VideoError> {
    Ok(Box::new(CameraSource::open(config)?))
}

fn get_property(capture: &VideoCapture, prop: i32) -> Result<f64, VideoError> {
    capture
        .get(prop)
        .map_err(|e| VideoError::OpenFailed(format!("error reading property: {}", e)))
}
