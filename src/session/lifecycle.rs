//! Relay session lifecycle
//!
//! A [`RelaySession`] owns the two relay worker threads and their device
//! handles. Each worker opens its own endpoints, so handles never cross
//! threads; `start` waits on a per-worker rendezvous channel for the open
//! result, which makes acquisition failures synchronous to the caller. The
//! same channel disconnecting later tells `stop` the worker has exited.
//!
//! A session runs at most once. After `stop` it is terminal; recovery from
//! device hiccups is by constructing a fresh session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::audio::relay::run_passthrough;
use crate::audio::stream::{open_capture_pair, AudioSink, AudioSource};
use crate::config::{AudioConfig, RelayConfig, VideoConfig};
use crate::constants::{MAX_CONSECUTIVE_MISSES, START_TIMEOUT_MS, STOP_TIMEOUT_MS};
use crate::error::{AudioError, Error, Result, SessionError, VideoError};
use crate::video::device::{open_camera, VideoSource};
use crate::video::frame::VideoFrame;
use crate::video::relay::run_video_relay;

/// Session state machine.
///
/// ```text
/// Idle → Starting → Running → Stopping → Stopped
///           └─────── (startup failure) ──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Callbacks into the presentation shell, invoked from relay threads
pub trait RelayObserver: Send + Sync {
    /// A new frame is ready; ownership of the buffer moves with it
    fn on_frame(&self, frame: VideoFrame);

    /// One audio chunk was relayed to the output device
    fn on_audio_chunk_relayed(&self) {}
}

/// Steady-state notifications for the lifecycle owner
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The audio relay terminated on a stream error
    AudioFailed(AudioError),
    /// The video relay terminated on a device error or a stall
    VideoFailed(VideoError),
    /// The audio relay observed the stop flag and exited cleanly
    AudioFinished { chunks: u64 },
    /// The video relay observed the stop flag and exited cleanly
    VideoFinished { frames: u64 },
}

/// Opens the audio endpoints on the relay thread that will own them
pub type AudioOpenFn = Box<
    dyn FnOnce(&AudioConfig) -> std::result::Result<(Box<dyn AudioSource>, Box<dyn AudioSink>), AudioError>
        + Send,
>;

/// Opens the video source on the relay thread that will own it
pub type VideoOpenFn =
    Box<dyn FnOnce(&VideoConfig) -> std::result::Result<Box<dyn VideoSource>, VideoError> + Send>;

/// One spawned relay worker.
///
/// `exit_rx` carries the startup rendezvous message and afterwards signals
/// worker exit by disconnecting.
struct Worker {
    name: &'static str,
    handle: thread::JoinHandle<()>,
    exit_rx: Receiver<Result<()>>,
}

/// The capture session: audio passthrough plus video relay behind one
/// start/stop lifecycle and one shared running flag
pub struct RelaySession {
    config: RelayConfig,
    observer: Arc<dyn RelayObserver>,
    state: SessionState,
    running: Arc<AtomicBool>,
    workers: Vec<Worker>,
    event_tx: Sender<SessionEvent>,
    event_rx: Receiver<SessionEvent>,
    audio_open: Option<AudioOpenFn>,
    video_open: Option<VideoOpenFn>,
}

impl RelaySession {
    /// Create a session against the real capture hardware
    pub fn new(config: RelayConfig, observer: Arc<dyn RelayObserver>) -> Self {
        Self::with_openers(
            config,
            observer,
            Box::new(open_capture_pair),
            Box::new(open_camera),
        )
    }

    /// Create a session with injectable media endpoints
    pub fn with_openers(
        config: RelayConfig,
        observer: Arc<dyn RelayObserver>,
        audio_open: AudioOpenFn,
        video_open: VideoOpenFn,
    ) -> Self {
        let (event_tx, event_rx) = bounded(16);
        Self {
            config,
            observer,
            state: SessionState::Idle,
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            event_tx,
            event_rx,
            audio_open: Some(audio_open),
            video_open: Some(video_open),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Receiver for steady-state session events
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.event_rx.clone()
    }

    /// Acquire devices and start both relay workers.
    ///
    /// Returns only once both workers have confirmed device acquisition.
    /// Any acquisition failure tears the partial session down, leaves the
    /// session `Stopped` and surfaces the error to the caller.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Stopped => return Err(SessionError::Finished.into()),
            _ => return Err(SessionError::AlreadyStarted.into()),
        }
        self.config.validate()?;

        let audio_open = self.audio_open.take().ok_or(SessionError::Finished)?;
        let video_open = self.video_open.take().ok_or(SessionError::Finished)?;

        self.state = SessionState::Starting;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Starting relay session");

        let audio_worker = match self.spawn_audio(audio_open) {
            Ok(worker) => worker,
            Err(e) => return self.abort_startup(Vec::new(), e),
        };
        if let Err(e) = await_ready(&audio_worker) {
            return self.abort_startup(vec![audio_worker], e);
        }

        let video_worker = match self.spawn_video(video_open) {
            Ok(worker) => worker,
            Err(e) => return self.abort_startup(vec![audio_worker], e),
        };
        if let Err(e) = await_ready(&video_worker) {
            return self.abort_startup(vec![audio_worker, video_worker], e);
        }

        self.workers.push(audio_worker);
        self.workers.push(video_worker);
        self.state = SessionState::Running;
        tracing::info!("Relay session running");
        Ok(())
    }

    /// Stop both relays and wait for their threads to exit.
    ///
    /// The stop flag is written exactly once; each worker is then waited on
    /// with a bounded timeout and detached (with an error) if it fails to
    /// exit — the process never hangs on a stuck device read. Stopping a
    /// session that is not running is a no-op, so calling `stop` twice is
    /// fine; either way the session ends `Stopped` and cannot be restarted.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != SessionState::Running {
            self.state = SessionState::Stopped;
            return Ok(());
        }

        self.state = SessionState::Stopping;
        tracing::info!("Stopping relay session");
        self.running.store(false, Ordering::SeqCst);

        let workers = std::mem::take(&mut self.workers);
        let result = join_workers(workers);
        self.state = SessionState::Stopped;

        result.map_err(Into::into)
    }

    fn abort_startup(&mut self, workers: Vec<Worker>, cause: Error) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let _ = join_workers(workers);
        self.state = SessionState::Stopped;
        Err(cause)
    }

    fn spawn_audio(&self, open: AudioOpenFn) -> Result<Worker> {
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let config = self.config.audio.clone();
        let running = self.running.clone();
        let observer = self.observer.clone();
        let event_tx = self.event_tx.clone();

        let handle = thread::Builder::new()
            .name("audio-relay".to_string())
            .spawn(move || {
                let (mut source, mut sink) = match open(&config) {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                let outcome = run_passthrough(
                    source.as_mut(),
                    sink.as_mut(),
                    config.chunk_size,
                    &running,
                    || observer.on_audio_chunk_relayed(),
                );
                match outcome {
                    Ok(chunks) => {
                        let _ = event_tx.try_send(SessionEvent::AudioFinished { chunks });
                    }
                    Err(e) => {
                        tracing::error!("Audio relay failed: {}", e);
                        let _ = event_tx.try_send(SessionEvent::AudioFailed(e));
                    }
                }
                // ready_tx drops here; its disconnect marks worker exit
            })
            .map_err(Error::Io)?;

        Ok(Worker {
            name: "audio-relay",
            handle,
            exit_rx: ready_rx,
        })
    }

    fn spawn_video(&self, open: VideoOpenFn) -> Result<Worker> {
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let config = self.config.video.clone();
        let running = self.running.clone();
        let observer = self.observer.clone();
        let event_tx = self.event_tx.clone();

        let handle = thread::Builder::new()
            .name("video-relay".to_string())
            .spawn(move || {
                let mut source = match open(&config) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                let outcome = run_video_relay(
                    source.as_mut(),
                    &running,
                    MAX_CONSECUTIVE_MISSES,
                    |frame| observer.on_frame(frame),
                );
                match outcome {
                    Ok(frames) => {
                        let _ = event_tx.try_send(SessionEvent::VideoFinished { frames });
                    }
                    Err(e) => {
                        tracing::error!("Video relay failed: {}", e);
                        let _ = event_tx.try_send(SessionEvent::VideoFailed(e));
                    }
                }
            })
            .map_err(Error::Io)?;

        Ok(Worker {
            name: "video-relay",
            handle,
            exit_rx: ready_rx,
        })
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            let _ = self.stop();
        }
    }
}

/// Wait for a worker's startup rendezvous message
fn await_ready(worker: &Worker) -> Result<()> {
    match worker
        .exit_rx
        .recv_timeout(Duration::from_millis(START_TIMEOUT_MS))
    {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(SessionError::StartTimeout.into()),
        Err(RecvTimeoutError::Disconnected) => Err(SessionError::StartAborted.into()),
    }
}

/// Wait for each worker to exit, bounded per worker; a worker that misses
/// the deadline is detached rather than joined
fn join_workers(workers: Vec<Worker>) -> std::result::Result<(), SessionError> {
    let mut result = Ok(());

    for worker in workers {
        let deadline = Instant::now() + Duration::from_millis(STOP_TIMEOUT_MS);
        let exited = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match worker.exit_rx.recv_timeout(remaining) {
                // Unconsumed rendezvous message; keep waiting for the
                // channel to disconnect.
                Ok(_) => continue,
                Err(RecvTimeoutError::Disconnected) => break true,
                Err(RecvTimeoutError::Timeout) => break false,
            }
        };

        if exited {
            if worker.handle.join().is_err() {
                tracing::warn!("Worker '{}' panicked", worker.name);
            }
        } else {
            tracing::warn!(
                "Worker '{}' did not exit within the stop timeout; detaching",
                worker.name
            );
            result = Err(SessionError::StopTimeout {
                thread: worker.name.to_string(),
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::PixelFormat;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Observer recording everything it sees
    #[derive(Default)]
    struct RecordingObserver {
        frame_tags: Mutex<Vec<u8>>,
        chunks: AtomicUsize,
    }

    impl RelayObserver for RecordingObserver {
        fn on_frame(&self, frame: VideoFrame) {
            self.frame_tags.lock().push(frame.data[0]);
        }

        fn on_audio_chunk_relayed(&self) {
            self.chunks.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Source that replays scripted chunks, then reports a closed stream
    struct ScriptedSource {
        chunks: VecDeque<Vec<u8>>,
    }

    impl AudioSource for ScriptedSource {
        fn read_chunk(&mut self, buf: &mut [u8]) -> std::result::Result<(), AudioError> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf.copy_from_slice(&chunk);
                    Ok(())
                }
                None => {
                    // Mimic a device that went quiet.
                    thread::sleep(Duration::from_millis(5));
                    Err(AudioError::Stream("capture stream closed".to_string()))
                }
            }
        }
    }

    /// Source that produces patterned chunks until the session stops it
    struct EndlessSource {
        counter: u8,
    }

    impl AudioSource for EndlessSource {
        fn read_chunk(&mut self, buf: &mut [u8]) -> std::result::Result<(), AudioError> {
            thread::sleep(Duration::from_millis(1));
            buf.fill(self.counter);
            self.counter = self.counter.wrapping_add(1);
            Ok(())
        }
    }

    /// Sink sharing its record with the test thread
    #[derive(Clone, Default)]
    struct SharedSink {
        written: Arc<Mutex<Vec<u8>>>,
        writes: Arc<AtomicUsize>,
    }

    impl AudioSink for SharedSink {
        fn write_chunk(&mut self, buf: &[u8]) -> std::result::Result<(), AudioError> {
            self.written.lock().extend_from_slice(buf);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tagged_frame(tag: u8) -> VideoFrame {
        VideoFrame::new(2, 1, 6, PixelFormat::Bgr8, vec![tag; 6])
    }

    /// Camera that delivers scripted frames, then misses forever
    struct ScriptedCamera {
        frames: VecDeque<VideoFrame>,
    }

    impl VideoSource for ScriptedCamera {
        fn read_frame(&mut self) -> std::result::Result<Option<VideoFrame>, VideoError> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => {
                    thread::sleep(Duration::from_millis(1));
                    Ok(None)
                }
            }
        }
    }

    /// Camera that keeps producing frames until the session stops it
    struct EndlessCamera {
        tag: u8,
    }

    impl VideoSource for EndlessCamera {
        fn read_frame(&mut self) -> std::result::Result<Option<VideoFrame>, VideoError> {
            thread::sleep(Duration::from_millis(1));
            self.tag = self.tag.wrapping_add(1);
            Ok(Some(tagged_frame(self.tag)))
        }
    }

    fn test_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.audio.chunk_size = 128;
        config
    }

    fn scripted_audio(chunks: VecDeque<Vec<u8>>, sink: SharedSink) -> AudioOpenFn {
        Box::new(move |_| Ok((Box::new(ScriptedSource { chunks }) as _, Box::new(sink) as _)))
    }

    fn endless_audio() -> AudioOpenFn {
        Box::new(|_| {
            Ok((
                Box::new(EndlessSource { counter: 0 }) as _,
                Box::new(SharedSink::default()) as _,
            ))
        })
    }

    fn failing_audio(err: AudioError) -> AudioOpenFn {
        Box::new(move |_| Err(err))
    }

    fn scripted_video(frames: VecDeque<VideoFrame>) -> VideoOpenFn {
        Box::new(move |_| Ok(Box::new(ScriptedCamera { frames }) as _))
    }

    fn endless_video() -> VideoOpenFn {
        Box::new(|_| Ok(Box::new(EndlessCamera { tag: 0 }) as _))
    }

    fn failing_video(err: VideoError) -> VideoOpenFn {
        Box::new(move |_| Err(err))
    }

    #[test]
    fn test_relays_scripted_media_in_order() {
        let config = test_config();
        let observer = Arc::new(RecordingObserver::default());
        let sink = SharedSink::default();
        let sink_handle = sink.clone();

        let audio_data: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 128]).collect();
        let expected_audio: Vec<u8> = audio_data.concat();
        let frames: VecDeque<VideoFrame> = (1..=5u8).map(tagged_frame).collect();

        let mut session = RelaySession::with_openers(
            config,
            observer.clone(),
            scripted_audio(VecDeque::from(audio_data), sink),
            scripted_video(frames),
        );

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);

        // Both scripts drain quickly; the audio relay then errors out and
        // the camera just misses.
        let events = session.events();
        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, SessionEvent::AudioFailed(_)));

        let started = Instant::now();
        session.stop().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(session.state(), SessionState::Stopped);

        assert_eq!(sink_handle.writes.load(Ordering::SeqCst), 10);
        assert_eq!(*sink_handle.written.lock(), expected_audio);
        assert_eq!(*observer.frame_tags.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(observer.chunks.load(Ordering::SeqCst), 10);

        // No late callbacks after stop.
        let frames_after = observer.frame_tags.lock().len();
        let chunks_after = observer.chunks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(observer.frame_tags.lock().len(), frames_after);
        assert_eq!(observer.chunks.load(Ordering::SeqCst), chunks_after);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session =
            RelaySession::with_openers(test_config(), observer, endless_audio(), endless_video());

        session.start().unwrap();
        session.stop().unwrap();
        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_restart_requires_reconstruction() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session =
            RelaySession::with_openers(test_config(), observer, endless_audio(), endless_video());

        session.start().unwrap();
        assert!(matches!(
            session.start(),
            Err(Error::Session(SessionError::AlreadyStarted))
        ));

        session.stop().unwrap();
        assert!(matches!(
            session.start(),
            Err(Error::Session(SessionError::Finished))
        ));
    }

    #[test]
    fn test_audio_open_failure_is_synchronous() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = RelaySession::with_openers(
            test_config(),
            observer,
            failing_audio(AudioError::DeviceNotFound(
                "no capture board attached".to_string(),
            )),
            endless_video(),
        );

        assert!(matches!(
            session.start(),
            Err(Error::Audio(AudioError::DeviceNotFound(_)))
        ));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_video_open_failure_tears_down_audio() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = RelaySession::with_openers(
            test_config(),
            observer,
            endless_audio(),
            failing_video(VideoError::DeviceNotFound("no video device".to_string())),
        );

        let started = Instant::now();
        assert!(matches!(
            session.start(),
            Err(Error::Video(VideoError::DeviceNotFound(_)))
        ));
        // Teardown includes waiting out the already-running audio worker.
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_audio_failure_leaves_video_running() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session = RelaySession::with_openers(
            test_config(),
            observer.clone(),
            scripted_audio(VecDeque::new(), SharedSink::default()),
            endless_video(),
        );

        session.start().unwrap();

        let events = session.events();
        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, SessionEvent::AudioFailed(_)));

        // Video keeps delivering after the audio relay died.
        let seen = observer.frame_tags.lock().len();
        thread::sleep(Duration::from_millis(50));
        assert!(observer.frame_tags.lock().len() > seen);

        session.stop().unwrap();
    }

    #[test]
    fn test_stop_before_start_is_terminal() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session =
            RelaySession::with_openers(test_config(), observer, endless_audio(), endless_video());

        session.stop().unwrap();
        assert!(matches!(
            session.start(),
            Err(Error::Session(SessionError::Finished))
        ));
    }

    #[test]
    fn test_clean_stop_emits_finished_events() {
        let observer = Arc::new(RecordingObserver::default());
        let mut session =
            RelaySession::with_openers(test_config(), observer, endless_audio(), endless_video());

        session.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        session.stop().unwrap();

        let events = session.events();
        let mut audio_done = false;
        let mut video_done = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::AudioFinished { .. } => audio_done = true,
                SessionEvent::VideoFinished { .. } => video_done = true,
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(audio_done && video_done);
    }
}
