use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crossbeam_channel::{Receiver, TryRecvError};
use hound::WavReader;

use super::AudioCapture;
use crate::config::AudioConfig;
use crate::error::{Result, TimegrapherError};

/// Producer of mono audio samples at a fixed rate
///
/// `read` returns whatever is available right now (possibly nothing) and
/// never waits. `Ok(None)` means the stream has ended normally; an error means
/// the source failed and the session cannot continue.
pub trait SampleSource {
    fn read(&mut self) -> Result<Option<Vec<f32>>>;
    fn sample_rate(&self) -> u32;
}

/// Number of capture blocks the channel can queue before the callback drops
const CAPTURE_QUEUE_BLOCKS: usize = 64;

pub struct DeviceSource {
    rx: Receiver<Vec<f32>>,
    sample_rate: u32,
    capture: AudioCapture,
}

impl DeviceSource {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(CAPTURE_QUEUE_BLOCKS);
        let capture = AudioCapture::new(config, tx)?;
        Ok(Self {
            rx,
            sample_rate: config.sample_rate,
            capture,
        })
    }
}

impl SampleSource for DeviceSource {
    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        if self.capture.has_failed() {
            return Err(TimegrapherError::AudioStream(
                "input device reported an error".into(),
            ));
        }

        let mut samples = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(block) => samples.extend_from_slice(&block),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if samples.is_empty() {
                        return Err(TimegrapherError::SourceClosed);
                    }
                    break;
                }
            }
        }
        Ok(Some(samples))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Mono sample source backed by a WAV file
///
/// Multi-channel files are downmixed. Each `read` yields one chunk.
pub struct WavFileSource {
    samples: Vec<f32>,
    position: usize,
    chunk_size: usize,
    sample_rate: u32,
}

impl WavFileSource {
    pub fn new<P: AsRef<Path>>(path: P, chunk_size: usize) -> anyhow::Result<Self> {
        let reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        let interleaved = Self::read_samples(reader, &spec)?;
        let samples = super::capture::downmix(&interleaved, spec.channels as usize);

        Ok(Self {
            samples,
            position: 0,
            chunk_size: chunk_size.max(1),
            sample_rate: spec.sample_rate,
        })
    }

    /// Wrap samples already in memory
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, chunk_size: usize) -> Self {
        Self {
            samples,
            position: 0,
            chunk_size: chunk_size.max(1),
            sample_rate,
        }
    }

    fn read_samples(
        mut reader: WavReader<BufReader<File>>,
        spec: &hound::WavSpec,
    ) -> anyhow::Result<Vec<f32>> {
        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let max_val = 2_i32.pow(spec.bits_per_sample as u32 - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleSource for WavFileSource {
    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }

        let end = (self.position + self.chunk_size).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(Some(chunk))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_chunks() {
        let mut source = WavFileSource::from_samples(vec![0.5; 10], 48000, 4);
        assert_eq!(source.read().unwrap().unwrap().len(), 4);
        assert_eq!(source.read().unwrap().unwrap().len(), 4);
        assert_eq!(source.read().unwrap().unwrap().len(), 2);
        assert!(source.read().unwrap().is_none());
        assert_eq!(source.sample_rate(), 48000);
    }
}
