//! Chunked audio stream endpoints
//!
//! cpal delivers audio through callbacks on its own stream threads; the
//! relay wants blocking chunk reads and writes. The endpoints here bridge
//! the two with small bounded channels. Both directions use 16-bit signed
//! integer PCM and the same format, so bytes pass through untouched.
//!
//! A stream that stops producing (or draining) data makes the next chunk
//! call fail after a bounded timeout instead of blocking forever; the
//! relay loop turns that into a stream error for the session owner.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::config::AudioConfig;
use crate::constants::{BYTES_PER_SAMPLE, STREAM_CHANNEL_CAPACITY, STREAM_IO_TIMEOUT_MS};
use crate::error::AudioError;

use super::device::{default_output_device, find_capture_device};

/// Fixed PCM format shared by the input and the output stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes per PCM frame (one i16 sample per channel)
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    fn stream_config(&self) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    }
}

impl From<&AudioConfig> for AudioFormat {
    fn from(config: &AudioConfig) -> Self {
        Self::new(config.sample_rate, config.channels)
    }
}

/// Blocking source of fixed-size PCM chunks
pub trait AudioSource {
    /// Fill `buf` completely with the next captured bytes, in capture order
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<(), AudioError>;
}

/// Blocking sink for fixed-size PCM chunks
pub trait AudioSink {
    /// Queue `buf` for playback, blocking while the device drains
    fn write_chunk(&mut self, buf: &[u8]) -> Result<(), AudioError>;
}

/// Capture endpoint backed by a cpal input stream.
///
/// The stream is built and owned here, so the endpoint must be created on
/// the thread that will read from it and dropped there to stop capture.
pub struct CpalChunkSource {
    _stream: cpal::Stream,
    data_rx: Receiver<Vec<u8>>,
    error_rx: Receiver<AudioError>,
    pending: VecDeque<u8>,
}

impl CpalChunkSource {
    pub fn open(device: &cpal::Device, format: AudioFormat) -> Result<Self, AudioError> {
        let (data_tx, data_rx) = bounded::<Vec<u8>>(STREAM_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = bounded::<AudioError>(16);

        let stream = device
            .build_input_stream(
                &format.stream_config(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mut bytes = Vec::with_capacity(data.len() * BYTES_PER_SAMPLE);
                    for sample in data {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                    // A full channel drops the block: one capture glitch,
                    // never a blocked stream callback.
                    let _ = data_tx.try_send(bytes);
                },
                move |err| {
                    let _ = error_tx.try_send(AudioError::Stream(err.to_string()));
                },
                None,
            )
            .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| AudioError::OpenFailed(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            data_rx,
            error_rx,
            pending: VecDeque::new(),
        })
    }
}

impl AudioSource for CpalChunkSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<(), AudioError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }

        let deadline = Instant::now() + Duration::from_millis(STREAM_IO_TIMEOUT_MS);
        while self.pending.len() < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.data_rx.recv_timeout(remaining) {
                Ok(bytes) => self.pending.extend(bytes),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(AudioError::Stream(
                        "capture stream produced no data within the IO timeout".to_string(),
                    ))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AudioError::Stream("capture stream closed".to_string()))
                }
            }
        }

        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..buf.len())) {
            *dst = src;
        }
        Ok(())
    }
}

/// Playback endpoint backed by a cpal output stream.
///
/// Same thread-ownership rule as [`CpalChunkSource`]. The output callback
/// plays silence on underrun rather than stalling the device.
pub struct CpalChunkSink {
    _stream: cpal::Stream,
    data_tx: Sender<Vec<u8>>,
    error_rx: Receiver<AudioError>,
}

impl CpalChunkSink {
    pub fn open(device: &cpal::Device, format: AudioFormat) -> Result<Self, AudioError> {
        let (data_tx, data_rx) = bounded::<Vec<u8>>(STREAM_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = bounded::<AudioError>(16);

        let mut pending: VecDeque<u8> = VecDeque::new();
        let stream = device
            .build_output_stream(
                &format.stream_config(),
                move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    for sample in out.iter_mut() {
                        while pending.len() < BYTES_PER_SAMPLE {
                            match data_rx.try_recv() {
                                Ok(bytes) => pending.extend(bytes),
                                Err(_) => break,
                            }
                        }
                        *sample = if pending.len() >= BYTES_PER_SAMPLE {
                            let lo = pending.pop_front().unwrap_or(0);
                            let hi = pending.pop_front().unwrap_or(0);
                            i16::from_le_bytes([lo, hi])
                        } else {
                            0
                        };
                    }
                },
                move |err| {
                    let _ = error_tx.try_send(AudioError::Stream(err.to_string()));
                },
                None,
            )
            .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| AudioError::OpenFailed(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            data_tx,
            error_rx,
        })
    }
}

impl AudioSink for CpalChunkSink {
    fn write_chunk(&mut self, buf: &[u8]) -> Result<(), AudioError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }

        self.data_tx
            .send_timeout(buf.to_vec(), Duration::from_millis(STREAM_IO_TIMEOUT_MS))
            .map_err(|e| match e {
                crossbeam_channel::SendTimeoutError::Timeout(_) => AudioError::Stream(
                    "playback stream did not drain within the IO timeout".to_string(),
                ),
                crossbeam_channel::SendTimeoutError::Disconnected(_) => {
                    AudioError::Stream("playback stream closed".to_string())
                }
            })
    }
}

/// Open the capture input and the default-speaker output with one shared
/// format. Called on the audio relay thread, which then owns both streams.
pub fn open_capture_pair(
    config: &AudioConfig,
) -> Result<(Box<dyn AudioSource>, Box<dyn AudioSink>), AudioError> {
    let format = AudioFormat::from(config);

    let input_device = find_capture_device(config)?;
    let source = CpalChunkSource::open(&input_device, format)?;

    let output_device = default_output_device()?;
    let sink = CpalChunkSink::open(&output_device, format)?;

    Ok((Box::new(source), Box::new(sink)))
}

fn map_build_error(err: cpal::BuildStreamError) -> AudioError {
    match err {
        cpal::BuildStreamError::StreamConfigNotSupported => {
            AudioError::UnsupportedFormat(err.to_string())
        }
        cpal::BuildStreamError::DeviceNotAvailable => AudioError::DeviceNotFound(err.to_string()),
        other => AudioError::OpenFailed(other.to_string()),
    }
}
