//! Audio passthrough loop
//!
//! Real-time relay from the capture input to the playback output: read a
//! fixed-size chunk, write it unmodified, repeat. There is deliberately no
//! queue between the two calls — a slow sink stalls the relay rather than
//! growing a buffer, which keeps latency flat.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::AudioError;

use super::stream::{AudioSink, AudioSource};

/// Run the passthrough until the stop flag clears or an IO error occurs.
///
/// Chunks move strictly in read order. `on_chunk` is invoked after each
/// completed read/write cycle. Returns the number of chunks relayed on a
/// clean stop; the first read or write error ends the loop and propagates
/// to the caller.
pub fn run_passthrough(
    source: &mut dyn AudioSource,
    sink: &mut dyn AudioSink,
    chunk_size: usize,
    running: &AtomicBool,
    mut on_chunk: impl FnMut(),
) -> Result<u64, AudioError> {
    let mut chunk = vec![0u8; chunk_size];
    let mut relayed: u64 = 0;

    while running.load(Ordering::Relaxed) {
        source.read_chunk(&mut chunk)?;
        sink.write_chunk(&chunk)?;
        relayed += 1;
        on_chunk();
    }

    tracing::debug!("Audio passthrough stopped after {} chunks", relayed);
    Ok(relayed)
}
