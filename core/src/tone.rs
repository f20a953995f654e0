use crate::error::{AudioLinkError, Result};
use crate::protocol::ProtocolSpec;
use crate::SAMPLE_RATE;
use std::cmp::Ordering;
use std::f32::consts::PI;

// Tone synthesis and narrow-band analysis
//
// A data slot lights one tone per band; a marker slot lights two tones per
// band. Both are shaped with a short raised-cosine fade at the slot edges so
// consecutive slots do not click.

/// Fade length as a share of the slot, applied on each side.
const EDGE_TAPER_RATIO: f32 = 0.03;

/// Minimum fade regardless of slot length.
const MIN_TAPER_SAMPLES: usize = 16;

/// Peak level of a synthesized slot relative to full scale.
const OUTPUT_LEVEL: f32 = 0.7;

/// Generate a raised-cosine style window that softly ramps amplitude at both edges.
pub(crate) fn raised_cosine_window(len: usize, taper_len: usize) -> Vec<f32> {
    if taper_len == 0 || len == 0 {
        return vec![1.0; len];
    }

    let taper = taper_len.min(len / 2);
    if taper == 0 {
        return vec![1.0; len];
    }

    let mut window = vec![1.0; len];
    for i in 0..taper {
        // Smoothly increase from 0 to 1 using a sine-squared profile
        let progress = i as f32 / taper as f32;
        let value = (PI * progress / 2.0).sin().powi(2);
        window[i] = value;
        window[len - 1 - i] = value;
    }

    window
}

/// Per-band tone energies measured over one slot
#[derive(Debug, Clone, PartialEq)]
pub struct SlotEnergies {
    pub bands: Vec<Vec<f32>>,
}

/// Strongest tone of a band with the runner-up energy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPeak {
    pub tone: usize,
    pub energy: f32,
    pub runner_up: f32,
}

impl SlotEnergies {
    pub fn peak(&self, band: usize) -> BandPeak {
        let energies = &self.bands[band];
        let mut tone = 0;
        let mut energy = f32::MIN;
        let mut runner_up = 0.0f32;

        for (idx, &value) in energies.iter().enumerate() {
            if value > energy {
                if idx > 0 {
                    runner_up = energy;
                }
                energy = value;
                tone = idx;
            } else if value > runner_up {
                runner_up = value;
            }
        }

        BandPeak {
            tone,
            energy: energy.max(0.0),
            runner_up: runner_up.max(0.0),
        }
    }

    /// Demapped symbol of every band
    pub fn symbols(&self) -> Vec<u8> {
        (0..self.bands.len())
            .map(|band| self.peak(band).tone as u8)
            .collect()
    }
}

/// Tone modulator - renders symbol slots and preamble markers
pub struct ToneModulator {
    spec: &'static ProtocolSpec,
    sample_rate: f32,
    window: Vec<f32>,
}

impl ToneModulator {
    pub fn new(spec: &'static ProtocolSpec) -> Self {
        let taper = taper_length(spec.slot_samples);
        let mut window = raised_cosine_window(spec.slot_samples, taper);
        let avg = window.iter().sum::<f32>() / window.len() as f32;
        let normalization = if avg > 0.0 { 1.0 / avg } else { 1.0 };
        for weight in window.iter_mut() {
            *weight *= normalization;
        }

        Self {
            spec,
            sample_rate: SAMPLE_RATE as f32,
            window,
        }
    }

    /// Render one data slot; `symbols` holds one tone index per band
    pub fn modulate_slot(&self, symbols: &[u8]) -> Result<Vec<f32>> {
        if symbols.len() != self.spec.bands {
            return Err(AudioLinkError::InvalidInputSize);
        }

        let mut freqs = Vec::with_capacity(self.spec.bands);
        for (band, &symbol) in symbols.iter().enumerate() {
            if symbol as usize >= self.spec.alphabet {
                return Err(AudioLinkError::InvalidInputSize);
            }
            freqs.push(self.spec.tone_freq(band, symbol as usize));
        }

        Ok(self.render(&freqs))
    }

    /// Render preamble marker slot `index`
    pub fn modulate_marker(&self, index: usize) -> Vec<f32> {
        let tones = self.spec.marker_tones(index);
        let freqs: Vec<f32> = (0..self.spec.bands)
            .flat_map(|band| tones.iter().map(move |&tone| (band, tone)))
            .map(|(band, tone)| self.spec.tone_freq(band, tone))
            .collect();
        self.render(&freqs)
    }

    fn render(&self, freqs: &[f32]) -> Vec<f32> {
        let n = self.spec.slot_samples;
        let mut samples = vec![0.0f32; n];

        for &frequency in freqs {
            let angular_freq = 2.0 * PI * frequency / self.sample_rate;
            for (i, sample) in samples.iter_mut().enumerate() {
                *sample += (angular_freq * i as f32).sin();
            }
        }

        let scale = OUTPUT_LEVEL / freqs.len() as f32;
        for (sample, &weight) in samples.iter_mut().zip(self.window.iter()) {
            *sample *= weight * scale;
        }

        samples
    }
}

pub(crate) fn taper_length(slot_samples: usize) -> usize {
    let taper = ((slot_samples as f32) * EDGE_TAPER_RATIO).round() as usize;
    taper.max(MIN_TAPER_SAMPLES).min(slot_samples / 2)
}

#[derive(Debug, Clone, Copy)]
struct Goertzel {
    coeff: f32,
    cos: f32,
    sin: f32,
}

/// Tone analyzer - Goertzel power at every grid tone of the protocol
pub struct ToneAnalyzer {
    spec: &'static ProtocolSpec,
    filters: Vec<Goertzel>,
}

impl ToneAnalyzer {
    pub fn new(spec: &'static ProtocolSpec) -> Self {
        let n = spec.slot_samples as f32;
        let mut filters = Vec::with_capacity(spec.tone_count());
        for band in 0..spec.bands {
            for tone in 0..spec.alphabet {
                let freq = spec.tone_freq(band, tone);
                let k = (n * freq / SAMPLE_RATE as f32).round();
                let omega = 2.0 * PI * k / n;
                filters.push(Goertzel {
                    coeff: 2.0 * omega.cos(),
                    cos: omega.cos(),
                    sin: omega.sin(),
                });
            }
        }

        Self { spec, filters }
    }

    pub fn spec(&self) -> &'static ProtocolSpec {
        self.spec
    }

    /// Power at every tone for exactly one slot of samples
    pub fn slot_energies(&self, samples: &[f32]) -> Result<SlotEnergies> {
        if samples.len() != self.spec.slot_samples {
            return Err(AudioLinkError::InvalidInputSize);
        }

        // Remove DC so that leakage into low bins does not trip detection.
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;

        let mut bands = Vec::with_capacity(self.spec.bands);
        for band in 0..self.spec.bands {
            let filters = &self.filters[band * self.spec.alphabet..(band + 1) * self.spec.alphabet];
            let energies = filters
                .iter()
                .map(|filter| {
                    let mut q1 = 0.0f32;
                    let mut q2 = 0.0f32;
                    for &sample in samples {
                        let q0 = filter.coeff * q1 - q2 + (sample - mean);
                        q2 = q1;
                        q1 = q0;
                    }
                    let real = q1 - q2 * filter.cos;
                    let imag = q2 * filter.sin;
                    real * real + imag * imag
                })
                .collect();
            bands.push(energies);
        }

        Ok(SlotEnergies { bands })
    }

    /// How well a slot matches marker layout `index`, in [0, 1]
    ///
    /// Per band: twice the weaker of the two expected tone magnitudes over
    /// the band's total magnitude, after removing the band median as a noise
    /// floor. A single data tone scores near zero even when it lands on an
    /// expected marker tone.
    pub fn marker_score(&self, samples: &[f32], index: usize) -> Result<f32> {
        let energies = self.slot_energies(samples)?;
        let [first, second] = self.spec.marker_tones(index);
        let mut total = 0.0f32;

        for band in &energies.bands {
            let mut magnitudes: Vec<f32> = band.iter().map(|e| e.sqrt()).collect();
            let mut sorted = magnitudes.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let floor = sorted[sorted.len() / 2];
            for value in magnitudes.iter_mut() {
                *value = (*value - floor).max(0.0);
            }

            let sum: f32 = magnitudes.iter().sum();
            if sum <= f32::EPSILON {
                continue;
            }
            let weaker = magnitudes[first].min(magnitudes[second]);
            total += (2.0 * weaker / sum).min(1.0);
        }

        Ok(total / self.spec.bands as f32)
    }
}

/// Split a bitstream into slot symbols, band 0 taking the most significant bits
pub fn bits_to_slots(bits: &[bool], spec: &ProtocolSpec) -> Vec<Vec<u8>> {
    let per_band = spec.bits_per_band();
    let slot_count = spec.slots_for_bits(bits.len());
    let mut slots = Vec::with_capacity(slot_count);

    for slot in 0..slot_count {
        let mut symbols = Vec::with_capacity(spec.bands);
        for band in 0..spec.bands {
            let start = slot * spec.bits_per_slot() + band * per_band;
            let mut symbol = 0u8;
            for offset in 0..per_band {
                let bit = bits.get(start + offset).copied().unwrap_or(false);
                symbol = (symbol << 1) | bit as u8;
            }
            symbols.push(symbol);
        }
        slots.push(symbols);
    }

    slots
}

/// Append the bits carried by one slot's symbols
pub fn slot_to_bits(symbols: &[u8], spec: &ProtocolSpec, bits: &mut Vec<bool>) {
    let per_band = spec.bits_per_band();
    for &symbol in symbols {
        for i in (0..per_band).rev() {
            bits.push((symbol >> i) & 1 == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolVariant;

    #[test]
    fn test_slot_length() {
        let spec = ProtocolVariant::AudibleFastest.spec();
        let modulator = ToneModulator::new(spec);
        let samples = modulator.modulate_slot(&[3, 12]).unwrap();
        assert_eq!(samples.len(), spec.slot_samples);
        assert_eq!(modulator.modulate_marker(0).len(), spec.slot_samples);
    }

    #[test]
    fn test_slot_has_edge_taper() {
        let spec = ProtocolVariant::AudibleFast.spec();
        let modulator = ToneModulator::new(spec);
        let samples = modulator.modulate_slot(&[1, 9]).unwrap();
        let taper_len = taper_length(samples.len());

        assert!(samples[0].abs() < 1e-4);
        assert!(samples[samples.len() - 1].abs() < 0.05);

        let edge_energy: f32 =
            samples.iter().take(taper_len).map(|s| s.abs()).sum::<f32>() / taper_len as f32;
        let mid_start = samples.len() / 2 - taper_len / 2;
        let mid_energy: f32 = samples
            .iter()
            .skip(mid_start)
            .take(taper_len)
            .map(|s| s.abs())
            .sum::<f32>()
            / taper_len as f32;
        assert!(mid_energy > edge_energy, "mid={} edge={}", mid_energy, edge_energy);
    }

    #[test]
    fn test_never_clips() {
        for variant in ProtocolVariant::ALL {
            let modulator = ToneModulator::new(variant.spec());
            let marker = modulator.modulate_marker(1);
            assert!(marker.iter().all(|s| s.abs() < 1.0), "{} marker clips", variant);
        }
    }

    #[test]
    fn test_invalid_symbols_rejected() {
        let modulator = ToneModulator::new(ProtocolVariant::AudibleNormal.spec());
        assert!(modulator.modulate_slot(&[1]).is_err());
        assert!(modulator.modulate_slot(&[1, 2, 3]).is_err());
        assert!(modulator.modulate_slot(&[16, 0]).is_err());
    }

    #[test]
    fn test_roundtrip_every_tone() {
        for variant in ProtocolVariant::ALL {
            let spec = variant.spec();
            let modulator = ToneModulator::new(spec);
            let analyzer = ToneAnalyzer::new(spec);
            for tone in 0..spec.alphabet as u8 {
                let symbols: Vec<u8> = (0..spec.bands)
                    .map(|band| (tone + band as u8 * 5) % spec.alphabet as u8)
                    .collect();
                let samples = modulator.modulate_slot(&symbols).unwrap();
                let energies = analyzer.slot_energies(&samples).unwrap();
                assert_eq!(energies.symbols(), symbols, "{} tone {}", variant, tone);
            }
        }
    }

    #[test]
    fn test_clean_slot_is_dominant() {
        let spec = ProtocolVariant::UltrasoundFastest.spec();
        let modulator = ToneModulator::new(spec);
        let analyzer = ToneAnalyzer::new(spec);
        let samples = modulator.modulate_slot(&[0, 15]).unwrap();
        let energies = analyzer.slot_energies(&samples).unwrap();
        for band in 0..spec.bands {
            let peak = energies.peak(band);
            assert!(peak.runner_up < peak.energy * 0.01, "band {}: {:?}", band, peak);
        }
    }

    #[test]
    fn test_gain_invariance() {
        let spec = ProtocolVariant::AudibleFast.spec();
        let modulator = ToneModulator::new(spec);
        let analyzer = ToneAnalyzer::new(spec);
        let samples = modulator.modulate_slot(&[5, 10]).unwrap();

        for gain in [0.05, 0.5, 1.4] {
            let scaled: Vec<f32> = samples.iter().map(|s| s * gain).collect();
            assert_eq!(analyzer.slot_energies(&scaled).unwrap().symbols(), vec![5, 10]);
        }
    }

    #[test]
    fn test_dc_rejection() {
        let spec = ProtocolVariant::AudibleFastest.spec();
        let modulator = ToneModulator::new(spec);
        let analyzer = ToneAnalyzer::new(spec);
        let base = modulator.modulate_slot(&[0, 0]).unwrap();

        for offset in [-0.2, 0.3] {
            let shifted: Vec<f32> = base.iter().map(|s| s + offset).collect();
            assert_eq!(analyzer.slot_energies(&shifted).unwrap().symbols(), vec![0, 0]);
        }
    }

    #[test]
    fn test_marker_score_separates_markers_from_data() {
        let spec = ProtocolVariant::AudibleFast.spec();
        let modulator = ToneModulator::new(spec);
        let analyzer = ToneAnalyzer::new(spec);

        let marker = modulator.modulate_marker(0);
        assert!(analyzer.marker_score(&marker, 0).unwrap() > 0.9);
        assert!(analyzer.marker_score(&marker, 1).unwrap() < 0.1);

        // A data slot sitting on a marker edge tone still fails
        let data = modulator.modulate_slot(&[0, 15]).unwrap();
        assert!(analyzer.marker_score(&data, 0).unwrap() < 0.1);

        let silence = vec![0.0; spec.slot_samples];
        assert_eq!(analyzer.marker_score(&silence, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_bits_to_slots_three_bit_alphabet() {
        let spec = ProtocolVariant::AudibleRobust.spec();
        // 0b101_110_01 -> slots 5, 6, 2 (last slot zero padded)
        let bits = [true, false, true, true, true, false, false, true];
        let slots = bits_to_slots(&bits, spec);
        assert_eq!(slots, vec![vec![5], vec![6], vec![2]]);

        let mut recovered = Vec::new();
        for slot in &slots {
            slot_to_bits(slot, spec, &mut recovered);
        }
        assert_eq!(&recovered[..8], &bits);
    }

    #[test]
    fn test_bits_to_slots_band_order() {
        let spec = ProtocolVariant::AudibleNormal.spec();
        let bits = crate::framing::bytes_to_bits(&[0xAB]);
        assert_eq!(bits_to_slots(&bits, spec), vec![vec![0xA, 0xB]]);
    }
}
