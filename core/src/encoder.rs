use crate::error::{AudioLinkError, Result};
use crate::framing::{bytes_to_bits, Frame, FrameEncoder};
use crate::protocol::ProtocolVariant;
use crate::tone::{bits_to_slots, ToneModulator};
use crate::{PREAMBLE_SLOTS, SAMPLE_RATE};

/// Mono 16-bit PCM at `SAMPLE_RATE`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Waveform {
    samples: Vec<i16>,
}

impl Waveform {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Build from float samples in [-1, 1], clamping anything outside
    pub fn from_f32(samples: &[f32]) -> Self {
        Self {
            samples: samples.iter().map(|&s| f32_to_i16(s)).collect(),
        }
    }

    /// Parse little-endian PCM bytes
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(AudioLinkError::InvalidInputSize);
        }
        Ok(Self {
            samples: bytes
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        })
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> usize {
        SAMPLE_RATE
    }

    pub fn duration_ms(&self) -> f32 {
        self.samples.len() as f32 * 1000.0 / SAMPLE_RATE as f32
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| i16_to_f32(s)).collect()
    }
}

pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

pub(crate) fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Encoder for text glyphs
///
/// Wraps the text in a frame and renders it as a burst of
/// `PREAMBLE_SLOTS` marker slots followed by one tone slot per
/// `bits_per_slot` frame bits. Stateless: the same text and variant always
/// produce the same samples.
pub struct Encoder {
    variant: ProtocolVariant,
    modulator: ToneModulator,
}

impl Encoder {
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            modulator: ToneModulator::new(variant.spec()),
        }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Number of samples `encode` will produce for a payload of `payload_len` bytes
    pub fn burst_samples(&self, payload_len: usize) -> usize {
        let spec = self.variant.spec();
        let bits = crate::framing::encoded_len(payload_len) * 8;
        (PREAMBLE_SLOTS + spec.slots_for_bits(bits)) * spec.slot_samples
    }

    /// Encode text into a waveform
    pub fn encode(&self, text: &str) -> Result<Waveform> {
        self.encode_payload(text.as_bytes())
    }

    /// Encode text into little-endian PCM bytes
    pub fn encode_pcm(&self, text: &str) -> Result<Vec<u8>> {
        Ok(self.encode(text)?.to_le_bytes())
    }

    pub(crate) fn encode_payload(&self, payload: &[u8]) -> Result<Waveform> {
        let spec = self.variant.spec();
        let frame = Frame::build(payload, spec.capacity)?;
        let bits = bytes_to_bits(&FrameEncoder::encode(&frame));
        let slots = bits_to_slots(&bits, spec);

        let mut samples = Vec::with_capacity((PREAMBLE_SLOTS + slots.len()) * spec.slot_samples);
        for index in 0..PREAMBLE_SLOTS {
            samples.extend(self.modulator.modulate_marker(index).iter().map(|&s| f32_to_i16(s)));
        }
        for symbols in &slots {
            let slot = self.modulator.modulate_slot(symbols)?;
            samples.extend(slot.iter().map(|&s| f32_to_i16(s)));
        }

        log::debug!(
            "encoded {} payload bytes as {} slots ({} samples, {})",
            payload.len(),
            PREAMBLE_SLOTS + slots.len(),
            samples.len(),
            self.variant
        );

        Ok(Waveform::new(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_basic() {
        let encoder = Encoder::new(ProtocolVariant::AudibleFast);
        let waveform = encoder.encode("Hello").unwrap();
        assert!(waveform.len() > PREAMBLE_SLOTS * 2048);
        assert_eq!(waveform.sample_rate(), 48000);
    }

    #[test]
    fn test_encoder_duration_formula() {
        for variant in ProtocolVariant::ALL {
            let encoder = Encoder::new(variant);
            let spec = variant.spec();
            for text in ["", "a", "SKODEN!", "łᐊᒥłł.3"] {
                let waveform = encoder.encode(text).unwrap();
                let frame_bits = (text.len() + 5) * 8;
                let expected_slots = PREAMBLE_SLOTS + frame_bits.div_ceil(spec.bits_per_slot());
                assert_eq!(waveform.len(), expected_slots * spec.slot_samples);
                assert_eq!(waveform.len(), encoder.burst_samples(text.len()));
            }
        }
    }

    #[test]
    fn test_encoder_capacity_boundary() {
        for variant in ProtocolVariant::ALL {
            let encoder = Encoder::new(variant);
            let capacity = variant.capacity();
            assert!(encoder.encode(&"x".repeat(capacity)).is_ok());
            assert_eq!(
                encoder.encode(&"x".repeat(capacity + 1)),
                Err(AudioLinkError::PayloadTooLarge {
                    len: capacity + 1,
                    capacity
                })
            );
        }
    }

    #[test]
    fn test_encoder_deterministic() {
        let first = Encoder::new(ProtocolVariant::UltrasoundFast).encode("Deterministic").unwrap();
        let second = Encoder::new(ProtocolVariant::UltrasoundFast).encode("Deterministic").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_preamble_has_signal() {
        let encoder = Encoder::new(ProtocolVariant::AudibleFastest);
        let waveform = encoder.encode("Test").unwrap();
        let preamble = &waveform.samples()[..PREAMBLE_SLOTS * 1024];
        assert!(preamble.iter().any(|&s| s.abs() > 1000));
    }

    #[test]
    fn test_pcm_bytes_roundtrip() {
        let waveform = Waveform::new(vec![0, 1, -1, i16::MAX, i16::MIN]);
        let bytes = waveform.to_le_bytes();
        assert_eq!(bytes.len(), 10);
        assert_eq!(Waveform::from_le_bytes(&bytes).unwrap(), waveform);
        assert_eq!(
            Waveform::from_le_bytes(&bytes[..3]),
            Err(AudioLinkError::InvalidInputSize)
        );
    }

    #[test]
    fn test_float_conversion_clamps() {
        let waveform = Waveform::from_f32(&[2.0, -2.0, 0.0]);
        assert_eq!(waveform.samples(), &[32767, -32767, 0]);
    }
}
