use crate::protocol::ProtocolSpec;
use crate::tone::SlotEnergies;
use crate::FRAME_HEADER_SIZE;
use std::ops::Range;

/// Dominance of the strongest tone over the runner-up in one band,
/// `(dominant - runner_up) / dominant` clipped to [0, 1]
pub fn band_dominance(dominant: f32, runner_up: f32) -> f32 {
    if dominant <= 0.0 || !dominant.is_finite() {
        return 0.0;
    }
    ((dominant - runner_up) / dominant).clamp(0.0, 1.0)
}

/// Data slots that carry at least one payload bit
///
/// An empty payload has none, so the whole frame is scored instead.
pub fn payload_slots(spec: &ProtocolSpec, payload_len: usize) -> Range<usize> {
    let per_slot = spec.bits_per_slot();
    let header_bits = FRAME_HEADER_SIZE * 8;
    let first = header_bits / per_slot;
    let end = (header_bits + payload_len * 8).div_ceil(per_slot);
    if end > first {
        first..end
    } else {
        0..spec.slots_for_bits(crate::framing::encoded_len(0) * 8)
    }
}

/// Resonance score of a decoded frame
///
/// Mean band dominance across the given slots and all their bands. Pure: it
/// only looks at the energies gathered while demapping.
pub fn resonance(slots: &[SlotEnergies]) -> f32 {
    let mut total = 0.0f64;
    let mut count = 0usize;

    for slot in slots {
        for band in 0..slot.bands.len() {
            let peak = slot.peak(band);
            total += band_dominance(peak.energy, peak.runner_up) as f64;
            count += 1;
        }
    }

    if count == 0 {
        return 0.0;
    }
    ((total / count as f64) as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(bands: &[&[f32]]) -> SlotEnergies {
        SlotEnergies {
            bands: bands.iter().map(|b| b.to_vec()).collect(),
        }
    }

    #[test]
    fn test_clean_slot_scores_one() {
        let slots = vec![slot(&[&[0.0, 9.0, 0.0]]), slot(&[&[4.0, 0.0, 0.0]])];
        assert_eq!(resonance(&slots), 1.0);
    }

    #[test]
    fn test_tied_slot_scores_zero() {
        assert_eq!(resonance(&[slot(&[&[5.0, 5.0]])]), 0.0);
    }

    #[test]
    fn test_mean_over_bands() {
        let slots = vec![slot(&[&[10.0, 5.0], &[8.0, 0.0]])];
        assert!((resonance(&slots) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_empty_and_silent() {
        assert_eq!(resonance(&[]), 0.0);
        assert_eq!(resonance(&[slot(&[&[0.0, 0.0]])]), 0.0);
    }

    #[test]
    fn test_payload_slots_skip_header_and_trailer() {
        let fast = crate::ProtocolVariant::AudibleFast.spec();
        // 8 bits per slot: header fills slots 0..3, payload follows
        assert_eq!(payload_slots(fast, 5), 3..8);

        let robust = crate::ProtocolVariant::AudibleRobust.spec();
        // 3 bits per slot: payload bit 24 starts slot 8, bit 39 ends slot 13
        assert_eq!(payload_slots(robust, 2), 8..14);

        // Empty payload falls back to the full frame (header + trailer)
        assert_eq!(payload_slots(fast, 0), 0..5);
    }

    #[test]
    fn test_monotonic_in_noise_floor() {
        // Raising the runner-up (noise) with the peak fixed never raises the score
        let mut previous = f32::MAX;
        for noise in [0.0, 0.5, 1.0, 2.0, 4.0, 8.0] {
            let score = resonance(&[slot(&[&[10.0, noise, noise / 2.0]])]);
            assert!(score <= previous);
            previous = score;
        }
    }
}
