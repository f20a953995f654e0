use crate::encoder::Waveform;
use crate::error::{AudioLinkError, Result};
use crate::SAMPLE_RATE;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Simulated room between speaker and microphone
///
/// A single echo followed by additive white Gaussian noise scaled to a
/// target SNR. Deterministic for a given seed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelModel {
    pub snr_db: f32,
    pub echo_delay_ms: f32,
    pub echo_gain: f32,
    pub seed: u64,
}

impl Default for ChannelModel {
    fn default() -> Self {
        Self {
            snr_db: 20.0,
            echo_delay_ms: 50.0,
            echo_gain: 0.3,
            seed: 0,
        }
    }
}

impl ChannelModel {
    /// Noise-only channel at the given SNR
    pub fn awgn(snr_db: f32, seed: u64) -> Self {
        Self {
            snr_db,
            echo_delay_ms: 0.0,
            echo_gain: 0.0,
            seed,
        }
    }

    pub fn apply(&self, waveform: &Waveform) -> Result<Waveform> {
        if !self.snr_db.is_finite() || !self.echo_gain.is_finite() || self.echo_delay_ms < 0.0 {
            return Err(AudioLinkError::InvalidConfig(format!(
                "bad channel parameters: {:?}",
                self
            )));
        }

        let mut signal: Vec<f32> = waveform.samples().iter().map(|&s| s as f32).collect();

        let delay = (self.echo_delay_ms * SAMPLE_RATE as f32 / 1000.0).round() as usize;
        if self.echo_gain != 0.0 && delay > 0 {
            for i in (delay..signal.len()).rev() {
                signal[i] += self.echo_gain * signal[i - delay];
            }
        }

        let power = if signal.is_empty() {
            0.0
        } else {
            signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32
        };
        let noise_power = power / 10f32.powf(self.snr_db / 10.0);

        let noisy = add_gaussian(&signal, noise_power.sqrt(), self.seed)?;
        Ok(Waveform::new(noisy.iter().map(|&s| quantize(s)).collect()))
    }
}

/// Add zero-mean Gaussian noise with standard deviation `sigma` (in PCM units)
pub fn add_noise(waveform: &Waveform, sigma: f32, seed: u64) -> Result<Waveform> {
    let signal: Vec<f32> = waveform.samples().iter().map(|&s| s as f32).collect();
    let noisy = add_gaussian(&signal, sigma, seed)?;
    Ok(Waveform::new(noisy.iter().map(|&s| quantize(s)).collect()))
}

/// Scale a waveform by `gain`, saturating at full scale
pub fn attenuate(waveform: &Waveform, gain: f32) -> Waveform {
    Waveform::new(
        waveform
            .samples()
            .iter()
            .map(|&s| quantize(s as f32 * gain))
            .collect(),
    )
}

fn add_gaussian(signal: &[f32], sigma: f32, seed: u64) -> Result<Vec<f32>> {
    if sigma <= 0.0 {
        return Ok(signal.to_vec());
    }
    let normal = Normal::new(0.0f32, sigma)
        .map_err(|e| AudioLinkError::InvalidConfig(format!("noise level {}: {}", sigma, e)))?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(signal.iter().map(|&s| s + normal.sample(&mut rng)).collect())
}

fn quantize(sample: f32) -> i16 {
    sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
