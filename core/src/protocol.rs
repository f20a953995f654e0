use crate::error::{AudioLinkError, Result};
use crate::{PREAMBLE_SLOTS, SAMPLE_RATE};
use std::fmt;
use std::str::FromStr;

// Protocol table
//
// Every variant places `bands * alphabet` tones on a regular grid:
//   tone i of band b -> start_hz + (b * alphabet + i) * spacing_hz
//
// All grid frequencies are integer multiples of SAMPLE_RATE / slot_samples,
// which keeps the tones orthogonal over one slot.
//
// Audible variants start at 1875 Hz; ultrasound variants occupy 18.0-20.9 kHz
// so the whole burst stays inside the 18-22 kHz band.

const AUDIBLE_START_HZ: f32 = 1875.0;
const ULTRASOUND_START_HZ: f32 = 18000.0;
const NARROW_SPACING_HZ: f32 = 93.75;
const WIDE_SPACING_HZ: f32 = 187.5;

/// Largest payload carried by the 16-tone variants.
pub const STANDARD_CAPACITY: usize = 140;

/// Static description of one protocol variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtocolSpec {
    pub name: &'static str,
    /// Samples per symbol slot at `SAMPLE_RATE`
    pub slot_samples: usize,
    /// Number of tones each band chooses from (power of two)
    pub alphabet: usize,
    /// Number of bands sounding simultaneously in a slot
    pub bands: usize,
    pub start_hz: f32,
    pub spacing_hz: f32,
    /// Maximum payload bytes per frame
    pub capacity: usize,
    pub ultrasonic: bool,
}

impl ProtocolSpec {
    pub fn bits_per_band(&self) -> usize {
        self.alphabet.trailing_zeros() as usize
    }

    pub fn bits_per_slot(&self) -> usize {
        self.bands * self.bits_per_band()
    }

    pub fn tone_count(&self) -> usize {
        self.bands * self.alphabet
    }

    /// Frequency of tone `tone` inside band `band`
    pub fn tone_freq(&self, band: usize, tone: usize) -> f32 {
        self.start_hz + ((band * self.alphabet + tone) as f32) * self.spacing_hz
    }

    pub fn max_freq(&self) -> f32 {
        self.tone_freq(self.bands - 1, self.alphabet - 1)
    }

    pub fn slot_duration_ms(&self) -> f32 {
        self.slot_samples as f32 * 1000.0 / SAMPLE_RATE as f32
    }

    pub fn preamble_samples(&self) -> usize {
        PREAMBLE_SLOTS * self.slot_samples
    }

    /// Number of data slots needed to carry `bits` bits
    pub fn slots_for_bits(&self, bits: usize) -> usize {
        bits.div_ceil(self.bits_per_slot())
    }

    /// Tones lit by marker slot `index` in every band
    pub fn marker_tones(&self, index: usize) -> [usize; 2] {
        if index % 2 == 0 {
            [0, self.alphabet - 1]
        } else {
            [self.alphabet / 2 - 1, self.alphabet / 2]
        }
    }
}

const AUDIBLE_NORMAL: ProtocolSpec = ProtocolSpec {
    name: "audible-normal",
    slot_samples: 4096,
    alphabet: 16,
    bands: 2,
    start_hz: AUDIBLE_START_HZ,
    spacing_hz: NARROW_SPACING_HZ,
    capacity: STANDARD_CAPACITY,
    ultrasonic: false,
};

const AUDIBLE_FAST: ProtocolSpec = ProtocolSpec {
    name: "audible-fast",
    slot_samples: 2048,
    ..AUDIBLE_NORMAL
};

const AUDIBLE_FASTEST: ProtocolSpec = ProtocolSpec {
    name: "audible-fastest",
    slot_samples: 1024,
    ..AUDIBLE_NORMAL
};

const ULTRASOUND_NORMAL: ProtocolSpec = ProtocolSpec {
    name: "ultrasound-normal",
    start_hz: ULTRASOUND_START_HZ,
    ultrasonic: true,
    ..AUDIBLE_NORMAL
};

const ULTRASOUND_FAST: ProtocolSpec = ProtocolSpec {
    name: "ultrasound-fast",
    slot_samples: 2048,
    ..ULTRASOUND_NORMAL
};

const ULTRASOUND_FASTEST: ProtocolSpec = ProtocolSpec {
    name: "ultrasound-fastest",
    slot_samples: 1024,
    ..ULTRASOUND_NORMAL
};

// 8-way alphabet, one band: 3 bits per slot with wide tone spacing.
const AUDIBLE_ROBUST: ProtocolSpec = ProtocolSpec {
    name: "audible-robust",
    slot_samples: 4096,
    alphabet: 8,
    bands: 1,
    start_hz: AUDIBLE_START_HZ,
    spacing_hz: WIDE_SPACING_HZ,
    capacity: 32,
    ultrasonic: false,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    AudibleNormal,
    #[default]
    AudibleFast,
    AudibleFastest,
    UltrasoundNormal,
    UltrasoundFast,
    UltrasoundFastest,
    AudibleRobust,
}

impl ProtocolVariant {
    pub const ALL: [ProtocolVariant; 7] = [
        ProtocolVariant::AudibleNormal,
        ProtocolVariant::AudibleFast,
        ProtocolVariant::AudibleFastest,
        ProtocolVariant::UltrasoundNormal,
        ProtocolVariant::UltrasoundFast,
        ProtocolVariant::UltrasoundFastest,
        ProtocolVariant::AudibleRobust,
    ];

    pub fn spec(&self) -> &'static ProtocolSpec {
        match self {
            ProtocolVariant::AudibleNormal => &AUDIBLE_NORMAL,
            ProtocolVariant::AudibleFast => &AUDIBLE_FAST,
            ProtocolVariant::AudibleFastest => &AUDIBLE_FASTEST,
            ProtocolVariant::UltrasoundNormal => &ULTRASOUND_NORMAL,
            ProtocolVariant::UltrasoundFast => &ULTRASOUND_FAST,
            ProtocolVariant::UltrasoundFastest => &ULTRASOUND_FASTEST,
            ProtocolVariant::AudibleRobust => &AUDIBLE_ROBUST,
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn capacity(&self) -> usize {
        self.spec().capacity
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProtocolVariant {
    type Err = AudioLinkError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ProtocolVariant::ALL
            .into_iter()
            .find(|variant| variant.name() == wanted)
            .ok_or_else(|| AudioLinkError::UnknownProtocol(s.to_string()))
    }
}
