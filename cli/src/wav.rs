use crate::error::{CliError, Result};
use glyphwave_core::{AudioSource, Waveform, SAMPLE_RATE};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
enum SampleKind {
    Int16,
    Float32,
}

fn sample_kind(spec: &WavSpec) -> Result<SampleKind> {
    if spec.sample_rate as usize != SAMPLE_RATE {
        return Err(CliError::UnsupportedWav(format!(
            "{} Hz (expected {} Hz)",
            spec.sample_rate, SAMPLE_RATE
        )));
    }
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => Ok(SampleKind::Int16),
        (SampleFormat::Float, 32) => Ok(SampleKind::Float32),
        (format, bits) => Err(CliError::UnsupportedWav(format!(
            "{:?} samples at {} bits",
            format, bits
        ))),
    }
}

/// Write a waveform as 48 kHz mono 16-bit PCM
pub fn write_wav(path: &Path, waveform: &Waveform) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in waveform.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a whole capture; multi-channel files keep their first channel
pub fn read_wav(path: &Path) -> Result<Waveform> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<i16> = match sample_kind(&spec)? {
        SampleKind::Int16 => reader
            .samples::<i16>()
            .step_by(channels)
            .collect::<std::result::Result<_, _>>()?,
        SampleKind::Float32 => {
            let floats: Vec<f32> = reader
                .samples::<f32>()
                .step_by(channels)
                .collect::<std::result::Result<_, _>>()?;
            Waveform::from_f32(&floats).into_samples()
        }
    };

    Ok(Waveform::new(samples))
}

/// Streams a WAV file to a listener in fixed windows
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    kind: SampleKind,
    channels: usize,
    window: usize,
}

impl WavSource {
    pub fn open(path: &Path, window: usize) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        let kind = sample_kind(&spec)?;
        log::debug!(
            "capturing {} ({} channels, {:?}, window {})",
            path.display(),
            spec.channels,
            kind,
            window
        );
        Ok(Self {
            reader,
            kind,
            channels: spec.channels.max(1) as usize,
            window: window.max(1),
        })
    }
}

impl AudioSource for WavSource {
    fn capture_window(&mut self) -> Option<Vec<i16>> {
        let wanted = self.window * self.channels;
        let read: std::result::Result<Vec<i16>, hound::Error> = match self.kind {
            SampleKind::Int16 => self.reader.samples::<i16>().take(wanted).collect(),
            SampleKind::Float32 => self
                .reader
                .samples::<f32>()
                .take(wanted)
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map(|floats| Waveform::from_f32(&floats).into_samples()),
        };

        match read {
            Ok(samples) if samples.is_empty() => None,
            Ok(samples) => Some(samples.into_iter().step_by(self.channels).collect()),
            Err(e) => {
                log::warn!("stopping capture after read error: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("glyphwave-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_wav_round_trip() {
        let path = temp_path("round_trip.wav");
        let waveform = Waveform::new(vec![0, 1, -1, i16::MAX, i16::MIN, 1234]);
        write_wav(&path, &waveform).unwrap();
        assert_eq!(read_wav(&path).unwrap(), waveform);

        let mut source = WavSource::open(&path, 4).unwrap();
        assert_eq!(source.capture_window(), Some(vec![0, 1, -1, i16::MAX]));
        assert_eq!(source.capture_window(), Some(vec![i16::MIN, 1234]));
        assert_eq!(source.capture_window(), None);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_stereo_keeps_first_channel() {
        let path = temp_path("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE as u32,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [10i16, -10, 20, -20, 30, -30] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        assert_eq!(read_wav(&path).unwrap().samples(), &[10, 20, 30]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_wrong_sample_rate_rejected() {
        let path = temp_path("44k.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(read_wav(&path), Err(CliError::UnsupportedWav(_))));
        std::fs::remove_file(&path).ok();
    }
}
