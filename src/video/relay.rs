//! Video frame relay loop
//!
//! Reads frames from the capture device and hands them to the presentation
//! callback in capture order. A missed frame is skipped silently; a long
//! unbroken run of misses means the device has stopped delivering and the
//! loop gives up instead of spinning forever.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::VideoError;

use super::device::VideoSource;
use super::frame::VideoFrame;

/// Run the frame relay until the stop flag clears or the device fails.
///
/// Each delivered frame is passed to `on_frame` by value. Misses never
/// reach the callback; `miss_threshold` consecutive misses escalate to
/// [`VideoError::CaptureStalled`]. Returns the frame count on a clean stop.
pub fn run_video_relay(
    source: &mut dyn VideoSource,
    running: &AtomicBool,
    miss_threshold: u32,
    mut on_frame: impl FnMut(VideoFrame),
) -> Result<u64, VideoError> {
    let mut delivered: u64 = 0;
    let mut consecutive_misses: u32 = 0;

    while running.load(Ordering::Relaxed) {
        match source.read_frame()? {
            Some(frame) => {
                consecutive_misses = 0;
                delivered += 1;
                on_frame(frame);
            }
            None => {
                consecutive_misses += 1;
                if consecutive_misses >= miss_threshold {
                    return Err(VideoError::CaptureStalled {
                        misses: consecutive_misses,
                    });
                }
            }
        }
    }

    tracing::debug!("Video relay stopped after {} frames", delivered);
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::PixelFormat;

    /// Step script for a fake capture device
    enum Step {
        Frame(u8),
        Miss,
        Fail,
    }

    struct ScriptedCamera {
        steps: Vec<Step>,
        cursor: usize,
    }

    impl ScriptedCamera {
        fn new(steps: Vec<Step>) -> Self {
            Self { steps, cursor: 0 }
        }
    }

    impl VideoSource for ScriptedCamera {
        fn read_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
            let step = self.steps.get(self.cursor);
            self.cursor += 1;
            match step {
                Some(Step::Frame(tag)) => Ok(Some(VideoFrame::new(
                    2,
                    1,
                    6,
                    PixelFormat::Bgr8,
                    vec![*tag; 6],
                ))),
                Some(Step::Miss) => Ok(None),
                Some(Step::Fail) | None => {
                    Err(VideoError::Stream("device disconnected".to_string()))
                }
            }
        }
    }

    #[test]
    fn test_frames_delivered_in_capture_order() {
        let mut camera = ScriptedCamera::new(vec![
            Step::Frame(1),
            Step::Frame(2),
            Step::Frame(3),
            Step::Fail,
        ]);
        let running = AtomicBool::new(true);
        let mut tags = Vec::new();

        let result = run_video_relay(&mut camera, &running, 10, |f| tags.push(f.data[0]));

        assert!(result.is_err());
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn test_misses_are_skipped_not_emitted() {
        let mut camera = ScriptedCamera::new(vec![
            Step::Frame(1),
            Step::Miss,
            Step::Miss,
            Step::Frame(2),
            Step::Fail,
        ]);
        let running = AtomicBool::new(true);
        let mut tags = Vec::new();

        let _ = run_video_relay(&mut camera, &running, 10, |f| tags.push(f.data[0]));

        assert_eq!(tags, vec![1, 2]);
    }

    #[test]
    fn test_consecutive_misses_escalate() {
        let mut camera =
            ScriptedCamera::new(vec![Step::Miss, Step::Miss, Step::Miss, Step::Frame(1)]);
        let running = AtomicBool::new(true);
        let mut frames = 0;

        let result = run_video_relay(&mut camera, &running, 3, |_| frames += 1);

        assert!(matches!(
            result,
            Err(VideoError::CaptureStalled { misses: 3 })
        ));
        assert_eq!(frames, 0);
    }

    #[test]
    fn test_successful_frame_resets_miss_count() {
        let mut camera = ScriptedCamera::new(vec![
            Step::Miss,
            Step::Miss,
            Step::Frame(1),
            Step::Miss,
            Step::Miss,
            Step::Frame(2),
            Step::Fail,
        ]);
        let running = AtomicBool::new(true);
        let mut tags = Vec::new();

        // Threshold 3 is never reached because frames break the runs of 2.
        let result = run_video_relay(&mut camera, &running, 3, |f| tags.push(f.data[0]));

        assert!(matches!(result, Err(VideoError::Stream(_))));
        assert_eq!(tags, vec![1, 2]);
    }

    #[test]
    fn test_stop_flag_exits_cleanly() {
        let mut camera = ScriptedCamera::new(vec![Step::Frame(1)]);
        let running = AtomicBool::new(false);

        let delivered = run_video_relay(&mut camera, &running, 10, |_| {}).unwrap();

        assert_eq!(delivered, 0);
    }
}
