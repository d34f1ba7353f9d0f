use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{WavSpec, WavWriter};

fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    }
}

/// Write mono samples as a 32-bit float WAV file
pub fn save_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, mono_spec(sample_rate))?;

    for &sample in samples {
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Incremental mono WAV writer for dumping live input
pub struct WavRecorder {
    writer: WavWriter<BufWriter<File>>,
}

impl WavRecorder {
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Self, hound::Error> {
        Ok(Self {
            writer: WavWriter::create(path, mono_spec(sample_rate))?,
        })
    }

    pub fn write(&mut self, samples: &[f32]) -> Result<(), hound::Error> {
        for &sample in samples {
            self.writer.write_sample(sample)?;
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<(), hound::Error> {
        self.writer.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SampleSource, WavFileSource};

    #[test]
    fn test_recorder_output_is_readable() {
        let path = std::env::temp_dir().join(format!("timegrapher_wav_{}.wav", std::process::id()));

        let mut recorder = WavRecorder::create(&path, 44100).unwrap();
        recorder.write(&[0.25, -0.5]).unwrap();
        recorder.write(&[0.75]).unwrap();
        recorder.finalize().unwrap();

        let mut source = WavFileSource::new(&path, 16).unwrap();
        assert_eq!(source.sample_rate(), 44100);
        assert_eq!(source.read().unwrap().unwrap(), vec![0.25, -0.5, 0.75]);

        std::fs::remove_file(&path).unwrap();
    }
}
