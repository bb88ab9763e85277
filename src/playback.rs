//! Gapless playback scheduling with immediate barge-in cancellation.
//!
//! The scheduler keeps a monotonic "next available time" cursor on the output
//! timeline. Each decoded chunk starts at `max(clock_now, cursor)` and
//! advances the cursor by its duration, so chunks never overlap and never
//! leave a gap while the model keeps streaming. The output clock is derived
//! from the samples the device callback has actually consumed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};

use crate::error::SessionError;

pub const OUTPUT_CHUNK_SIZE: usize = 1024;

/// One scheduled unit of audio on the output timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: u64,
    pub start: f64,
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

pub struct PlaybackScheduler {
    sample_rate: u32,
    next_time: f64,
    next_id: u64,
    active: Vec<ScheduledChunk>,
    queue: Arc<Mutex<VecDeque<f32>>>,
    consumed: Arc<AtomicU64>,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_shared(
            sample_rate,
            Arc::new(Mutex::new(VecDeque::new())),
            Arc::new(AtomicU64::new(0)),
        )
    }

    /// Builds a scheduler over queue and clock handles already wired to an
    /// output engine.
    pub fn with_shared(
        sample_rate: u32,
        queue: Arc<Mutex<VecDeque<f32>>>,
        consumed: Arc<AtomicU64>,
    ) -> Self {
        Self {
            sample_rate,
            next_time: 0.0,
            next_id: 0,
            active: Vec::new(),
            queue,
            consumed,
        }
    }

    /// Shared sample queue the output callback drains.
    pub fn queue_handle(&self) -> Arc<Mutex<VecDeque<f32>>> {
        self.queue.clone()
    }

    /// Counter of samples the output callback has played.
    pub fn consumed_handle(&self) -> Arc<AtomicU64> {
        self.consumed.clone()
    }

    /// Current position on the output timeline, in seconds of played audio.
    pub fn clock_now(&self) -> f64 {
        self.consumed.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    /// Schedules a decoded chunk back-to-back with whatever is pending.
    pub fn schedule(&mut self, samples: &[f32]) -> ScheduledChunk {
        self.prune_finished();

        let start = self.clock_now().max(self.next_time);
        let duration = samples.len() as f64 / self.sample_rate as f64;
        let chunk = ScheduledChunk {
            id: self.next_id,
            start,
            duration,
        };
        self.next_id += 1;
        self.next_time = chunk.end();
        self.active.push(chunk);

        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(samples.iter().copied());
        }
        chunk
    }

    /// Barge-in: silence everything immediately. The pending queue is
    /// flushed, the active set cleared, and the cursor reset to zero so the
    /// next chunk starts at "now" rather than a stale future offset.
    pub fn interrupt(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
        self.active.clear();
        self.next_time = 0.0;
        tracing::debug!("playback interrupted, queue flushed");
    }

    pub fn next_time(&self) -> f64 {
        self.next_time
    }

    pub fn active_len(&mut self) -> usize {
        self.prune_finished();
        self.active.len()
    }

    fn prune_finished(&mut self) {
        let now = self.clock_now();
        self.active.retain(|chunk| chunk.end() > now);
    }
}

/// Owns the cpal output stream feeding device buffers from the scheduler's
/// shared queue. Dropping the engine stops the stream and releases the
/// output device.
pub struct PlaybackEngine {
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl PlaybackEngine {
    pub fn start(
        device_name: Option<String>,
        queue: Arc<Mutex<VecDeque<f32>>>,
        consumed: Arc<AtomicU64>,
    ) -> Result<Self, SessionError> {
        let output = planvoice_utils::device::get_or_default_output(device_name)
            .map_err(|e| SessionError::Playback(format!("no output device: {e}")))?;

        let output_config = output
            .default_output_config()
            .map_err(|e| SessionError::Playback(format!("no default output config: {e}")))?;
        let output_config = StreamConfig {
            channels: output_config.channels(),
            sample_rate: output_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
        };
        let channel_count = output_config.channels as usize;
        let sample_rate = output_config.sample_rate.0;
        tracing::info!("output stream config: {:?}", &output_config);

        let underrun_logged = AtomicBool::new(false);
        let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            // try_lock keeps the audio callback non-blocking; on contention we
            // emit one buffer of silence instead of stalling the device.
            let mut queue = match queue.try_lock() {
                Ok(queue) => queue,
                Err(_) => {
                    data.fill(0.0);
                    return;
                }
            };
            let mut sample_index = 0;
            let mut played = 0u64;
            while sample_index < data.len() {
                let sample = match queue.pop_front() {
                    Some(sample) => {
                        played += 1;
                        sample
                    }
                    None => 0.0,
                };
                // Duplicate mono onto the first two channels, zero the rest.
                for channel in 0..channel_count {
                    if sample_index < data.len() {
                        data[sample_index] = if channel < 2 { sample } else { 0.0 };
                        sample_index += 1;
                    }
                }
            }
            consumed.fetch_add(played, Ordering::Relaxed);
            if played == 0 {
                if !underrun_logged.swap(true, Ordering::Relaxed) {
                    tracing::trace!("output queue empty, playing silence");
                }
            } else {
                underrun_logged.store(false, Ordering::Relaxed);
            }
        };

        let stream = output
            .build_output_stream(
                &output_config,
                output_data_fn,
                move |err| tracing::error!("an error occurred on output stream: {}", err),
                None,
            )
            .map_err(|e| SessionError::Playback(format!("failed to build output stream: {e}")))?;
        stream
            .play()
            .map_err(|e| SessionError::Playback(format!("failed to start output stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    const RATE: u32 = 24_000;

    fn samples(n: usize) -> Vec<f32> {
        vec![0.1; n]
    }

    #[test]
    fn chunks_schedule_back_to_back_without_gaps() {
        let mut scheduler = PlaybackScheduler::new(RATE);
        let durations = [2400, 1200, 4800, 600];
        let mut scheduled = Vec::new();
        for n in durations {
            scheduled.push(scheduler.schedule(&samples(n)));
        }
        for pair in scheduled.windows(2) {
            assert_eq!(pair[1].start, pair[0].end());
            assert!(pair[1].start >= 0.0);
        }
        assert_eq!(scheduled[0].start, 0.0);
        assert!((scheduler.next_time() - 9000.0 / RATE as f64).abs() < 1e-9);
    }

    #[test]
    fn chunks_never_start_before_the_output_clock() {
        let mut scheduler = PlaybackScheduler::new(RATE);
        scheduler.schedule(&samples(2400));
        // Simulate the device having played well past the queued audio.
        scheduler.consumed_handle().store(48_000, Ordering::Relaxed);
        let late = scheduler.schedule(&samples(2400));
        assert_eq!(late.start, 2.0);
        assert_eq!(scheduler.next_time(), late.end());
    }

    #[test]
    fn interruption_flushes_everything_and_resets_the_cursor() {
        let mut scheduler = PlaybackScheduler::new(RATE);
        for _ in 0..5 {
            scheduler.schedule(&samples(2400));
        }
        assert_eq!(scheduler.active_len(), 5);

        scheduler.interrupt();
        assert_eq!(scheduler.active_len(), 0);
        assert_eq!(scheduler.next_time(), 0.0);
        assert!(scheduler.queue_handle().lock().unwrap().is_empty());

        // The next chunk starts fresh at "now", not the stale cursor.
        let chunk = scheduler.schedule(&samples(2400));
        assert_eq!(chunk.start, scheduler.clock_now());
    }

    #[test]
    fn finished_chunks_leave_the_active_set() {
        let mut scheduler = PlaybackScheduler::new(RATE);
        scheduler.schedule(&samples(2400));
        scheduler.schedule(&samples(2400));
        // The device consumed the first chunk entirely.
        scheduler.consumed_handle().store(2400, Ordering::Relaxed);
        assert_eq!(scheduler.active_len(), 1);
    }
}
