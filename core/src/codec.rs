use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{AudioLinkError, Result};
use crate::protocol::ProtocolVariant;

/// Explicit codec instance with a selectable protocol
///
/// Each instance owns its encoder and decoder, so independent instances can
/// be used from different threads without sharing any state.
#[derive(Default)]
pub struct Codec {
    active: Option<(Encoder, Decoder)>,
    last_rejection: Option<AudioLinkError>,
}

impl Codec {
    /// Codec with no protocol selected yet
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_protocol(variant: ProtocolVariant) -> Self {
        let mut codec = Self::new();
        codec.set_protocol(variant);
        codec
    }

    pub fn set_protocol(&mut self, variant: ProtocolVariant) {
        log::debug!("codec protocol set to {}", variant);
        self.active = Some((Encoder::new(variant), Decoder::new(variant)));
        self.last_rejection = None;
    }

    pub fn protocol(&self) -> Option<ProtocolVariant> {
        self.active.as_ref().map(|(encoder, _)| encoder.variant())
    }

    /// Encode text into little-endian 16-bit PCM bytes
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let (encoder, _) = self.active.as_ref().ok_or(AudioLinkError::NoProtocolSelected)?;
        encoder.encode_pcm(text)
    }

    /// Decode one glyph from little-endian PCM bytes
    ///
    /// `Ok(None)` covers every recoverable failure; the specific reason is
    /// kept in `last_rejection` for diagnostics. Decoding before a protocol
    /// is selected is an error.
    pub fn decode(&mut self, pcm: &[u8]) -> Result<Option<(String, f32)>> {
        let (_, decoder) = self.active.as_mut().ok_or(AudioLinkError::NoProtocolSelected)?;
        match decoder.decode_pcm(pcm) {
            Ok(message) => {
                self.last_rejection = None;
                Ok(Some((message.text, message.resonance)))
            }
            Err(e) => {
                log::debug!("codec decode rejected: {}", e);
                self.last_rejection = Some(e);
                Ok(None)
            }
        }
    }

    pub fn last_rejection(&self) -> Option<&AudioLinkError> {
        self.last_rejection.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_requires_protocol() {
        let codec = Codec::new();
        assert_eq!(codec.protocol(), None);
        assert_eq!(codec.encode("hi"), Err(AudioLinkError::NoProtocolSelected));
    }

    #[test]
    fn test_decode_requires_protocol() {
        let mut codec = Codec::new();
        let pcm = Codec::with_protocol(ProtocolVariant::AudibleFastest)
            .encode("unheard")
            .unwrap();
        assert_eq!(codec.decode(&pcm), Err(AudioLinkError::NoProtocolSelected));
        assert_eq!(codec.last_rejection(), None);

        codec.set_protocol(ProtocolVariant::AudibleFastest);
        assert_eq!(codec.decode(&pcm).unwrap().unwrap().0, "unheard");
    }

    #[test]
    fn test_round_trip() {
        let mut codec = Codec::with_protocol(ProtocolVariant::AudibleFastest);
        let pcm = codec.encode("łᐊᒥłł.3").unwrap();
        let (text, resonance) = codec.decode(&pcm).unwrap().unwrap();
        assert_eq!(text, "łᐊᒥłł.3");
        assert!(resonance > 0.95, "resonance {}", resonance);
        assert_eq!(codec.last_rejection(), None);
    }

    #[test]
    fn test_silence_decodes_to_none() {
        let mut codec = Codec::with_protocol(ProtocolVariant::AudibleFast);
        assert_eq!(codec.decode(&vec![0u8; 48000 * 2]), Ok(None));
        assert_eq!(codec.last_rejection(), Some(&AudioLinkError::PreambleNotFound));
    }

    #[test]
    fn test_odd_byte_count_is_rejected() {
        let mut codec = Codec::with_protocol(ProtocolVariant::AudibleFast);
        assert_eq!(codec.decode(&[0u8; 3]), Ok(None));
        assert_eq!(codec.last_rejection(), Some(&AudioLinkError::InvalidInputSize));
    }

    #[test]
    fn test_switching_protocol() {
        let mut codec = Codec::with_protocol(ProtocolVariant::UltrasoundFast);
        let pcm = codec.encode("switch").unwrap();
        codec.set_protocol(ProtocolVariant::AudibleFast);
        assert_eq!(codec.protocol(), Some(ProtocolVariant::AudibleFast));
        assert_eq!(codec.decode(&pcm), Ok(None));

        codec.set_protocol(ProtocolVariant::UltrasoundFast);
        assert_eq!(codec.decode(&pcm).unwrap().unwrap().0, "switch");
    }
}
