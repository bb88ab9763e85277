//! Microphone capture: a cpal input stream whose callback downmixes to mono
//! and hands blocks to the session's encode task. The callback does bounded
//! work only; a gate flag guarantees nothing is forwarded after `stop`, even
//! if the hardware fires one more callback while the stream winds down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};

use crate::error::SessionError;

pub const INPUT_CHUNK_SIZE: usize = 1024;

/// The bounded per-callback work: gate check, mono downmix, fire-and-forget
/// hand-off. Kept separate from the cpal plumbing so the post-stop behavior
/// is testable without a device.
pub struct CaptureForwarder {
    gate: Arc<AtomicBool>,
    channel_count: usize,
    audio_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
}

impl CaptureForwarder {
    pub fn new(
        gate: Arc<AtomicBool>,
        channel_count: usize,
        audio_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
    ) -> Self {
        Self {
            gate,
            channel_count,
            audio_tx,
        }
    }

    pub fn handle_block(&self, data: &[f32]) {
        if !self.gate.load(Ordering::Acquire) {
            return;
        }
        let audio = if self.channel_count > 1 {
            data.chunks(self.channel_count)
                .map(|c| c.iter().sum::<f32>() / self.channel_count as f32)
                .collect::<Vec<f32>>()
        } else {
            data.to_vec()
        };
        if let Err(e) = self.audio_tx.try_send(audio) {
            tracing::warn!("failed to send audio data to buffer: {:?}", e);
        }
    }
}

struct CaptureResources {
    // Held for RAII: dropping the stream stops capture and releases the
    // microphone.
    _stream: cpal::Stream,
    gate: Arc<AtomicBool>,
    sample_rate: u32,
}

/// Owns the microphone for the duration of one listening span.
#[derive(Default)]
pub struct CapturePipeline {
    resources: Option<CaptureResources>,
}

impl CapturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_capturing(&self) -> bool {
        self.resources.is_some()
    }

    /// Device sample rate of the running capture, for resampler setup.
    pub fn sample_rate(&self) -> Option<u32> {
        self.resources.as_ref().map(|r| r.sample_rate)
    }

    /// Acquires the microphone and starts forwarding mono blocks into
    /// `audio_tx`. On failure no resources are retained and a later call may
    /// retry.
    pub fn start(
        &mut self,
        device_name: Option<String>,
        audio_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
    ) -> Result<(), SessionError> {
        if self.resources.is_some() {
            return Err(SessionError::Capture("already capturing".to_string()));
        }

        let input = planvoice_utils::device::get_or_default_input(device_name)
            .map_err(|e| SessionError::Capture(format!("no input device: {e}")))?;
        let input_config = input
            .default_input_config()
            .map_err(|e| SessionError::Capture(format!("no default input config: {e}")))?;
        let input_config = StreamConfig {
            channels: input_config.channels(),
            sample_rate: input_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
        };
        tracing::info!("input stream config: {:?}", &input_config);

        let gate = Arc::new(AtomicBool::new(true));
        let forwarder = CaptureForwarder::new(
            gate.clone(),
            input_config.channels as usize,
            audio_tx,
        );
        let input_data_fn =
            move |data: &[f32], _: &cpal::InputCallbackInfo| forwarder.handle_block(data);

        let stream = input
            .build_input_stream(
                &input_config,
                input_data_fn,
                move |err| tracing::error!("an error occurred on input stream: {}", err),
                None,
            )
            .map_err(|e| SessionError::Capture(format!("failed to build input stream: {e}")))?;
        stream
            .play()
            .map_err(|e| SessionError::Capture(format!("failed to start input stream: {e}")))?;

        self.resources = Some(CaptureResources {
            _stream: stream,
            gate,
            sample_rate: input_config.sample_rate.0,
        });
        Ok(())
    }

    /// Closes the gate and releases the microphone. Idempotent; a subsequent
    /// `start` reinitializes from scratch.
    pub fn stop(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.gate.store(false, Ordering::Release);
            tracing::info!("microphone released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stray_callback_after_stop_forwards_nothing() {
        let gate = Arc::new(AtomicBool::new(true));
        let (audio_tx, mut audio_rx) = tokio::sync::mpsc::channel(8);
        let forwarder = CaptureForwarder::new(gate.clone(), 1, audio_tx);

        forwarder.handle_block(&[0.25; 4]);
        assert!(audio_rx.try_recv().is_ok());

        // stop() flips the gate before the stream is dropped.
        gate.store(false, Ordering::Release);
        forwarder.handle_block(&[0.25; 4]);
        assert!(audio_rx.try_recv().is_err());
    }

    #[test]
    fn stereo_blocks_are_downmixed_to_mono() {
        let gate = Arc::new(AtomicBool::new(true));
        let (audio_tx, mut audio_rx) = tokio::sync::mpsc::channel(8);
        let forwarder = CaptureForwarder::new(gate, 2, audio_tx);

        forwarder.handle_block(&[1.0, 0.0, 0.5, 0.5]);
        assert_eq!(audio_rx.try_recv().unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let mut pipeline = CapturePipeline::new();
        pipeline.stop();
        pipeline.stop();
        assert!(!pipeline.is_capturing());
    }
}
