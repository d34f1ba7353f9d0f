use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use audio_thread_priority::RtPriorityHandle;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Sender, TrySendError};

use crate::config::AudioConfig;
use crate::error::{Result, TimegrapherError};

/// Average interleaved frames down to one channel
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

pub struct AudioCapture {
    stream: cpal::Stream,
    failed: Arc<AtomicBool>,
    _rt_handle: Option<RtPriorityHandle>,
}

impl AudioCapture {
    /// Start capturing from the default input device
    ///
    /// Mono blocks are sent to `tx` from the audio callback. The callback never
    /// blocks: if the consumer falls behind, blocks are dropped with a warning.
    pub fn new(config: &AudioConfig, tx: Sender<Vec<f32>>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| TimegrapherError::AudioDevice("No input device found".into()))?;

        match device.description() {
            Ok(desc) => log::info!("Input device: {:?}", desc),
            Err(_) => log::info!("Input device: Unknown"),
        }

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size as u32),
        };

        let channels = config.channels as usize;
        let failed = Arc::new(AtomicBool::new(false));
        let failed_cb = Arc::clone(&failed);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    match tx.try_send(downmix(data, channels)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            log::warn!("Processing fell behind, capture block dropped")
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            log::warn!("Audio receiver dropped")
                        }
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                    failed_cb.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| TimegrapherError::AudioStream(format!("{}", e)))?;

        let rt_handle = audio_thread_priority::promote_current_thread_to_real_time(
            config.buffer_size as u32,
            config.sample_rate,
        );

        let rt_handle = match rt_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Could not set real-time priority: {}", e);
                None
            }
        };

        stream
            .play()
            .map_err(|e| TimegrapherError::AudioStream(format!("{}", e)))?;

        Ok(Self {
            stream,
            failed,
            _rt_handle: rt_handle,
        })
    }

    /// True once the device has reported a stream error
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        let _ = self.stream.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }
}
