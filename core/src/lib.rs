//! Acoustic data-link for short text glyphs
//!
//! Multi-tone FSK bursts (audible or 18-22 kHz near-ultrasonic) carrying a
//! checksummed frame, a streaming decoder that reports a resonance score for
//! each recovered glyph, and a council vote that aggregates glyphs into a
//! quorum decision.

pub mod error;
pub mod protocol;
pub mod framing;
pub mod tone;
pub mod encoder;
pub mod resonance;
pub mod decoder;
pub mod stream;
pub mod channel;
pub mod vote;
pub mod council;
pub mod codec;

pub use channel::ChannelModel;
pub use codec::Codec;
pub use council::{Council, SessionHandle};
pub use decoder::{DecodedMessage, Decoder, DecoderStats, FrameAttempt};
pub use encoder::{Encoder, Waveform};
pub use error::{AudioLinkError, Result};
pub use protocol::{ProtocolSpec, ProtocolVariant};
pub use stream::{AudioSink, AudioSource, CancellationToken, Listener, PcmChunks};
pub use vote::{Decision, QuorumPolicy, SessionState, SharedVoteSession, VoteOutcome, VoteSession};

// Audio format
pub const SAMPLE_RATE: usize = 48000;

// Frame configuration
pub const PREAMBLE_SLOTS: usize = 4;
pub const SYNC_WORD: u8 = 0xA7;
pub const FRAME_HEADER_SIZE: usize = 3; // sync word (1) + payload length (1) + CRC-8 (1)
pub const FRAME_TRAILER_SIZE: usize = 2; // CRC-16

// Preamble detection
pub const PREAMBLE_SCORE_THRESHOLD: f32 = 0.6;
pub const PREAMBLE_SLOT_MIN_SCORE: f32 = 0.35;
pub const SCAN_STEPS_PER_SLOT: usize = 8;
