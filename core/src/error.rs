use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioLinkError {
    #[error("Payload of {len} bytes exceeds frame capacity of {capacity} bytes")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("No protocol selected")]
    NoProtocolSelected,

    #[error("Failed to detect preamble")]
    PreambleNotFound,

    #[error("CRC mismatch in frame header")]
    HeaderCrcMismatch,

    #[error("Checksum mismatch in frame payload")]
    ChecksumMismatch,

    #[error("Invalid frame size")]
    InvalidFrameSize,

    #[error("Decoded payload is not valid UTF-8 text")]
    InvalidText,

    #[error("Stream ended in the middle of a frame")]
    Truncated,

    #[error("Invalid input size")]
    InvalidInputSize,

    #[error("Unknown protocol variant: {0}")]
    UnknownProtocol(String),

    #[error("Invalid ballot: {0}")]
    InvalidBallot(String),

    #[error("Vote session is closed")]
    SessionClosed,

    #[error("Unknown vote session")]
    UnknownSession,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AudioLinkError {
    /// Decode-time failures that only mean "no message in this audio".
    /// A listening session keeps going after any of these.
    pub fn is_no_message(&self) -> bool {
        matches!(
            self,
            AudioLinkError::PreambleNotFound
                | AudioLinkError::HeaderCrcMismatch
                | AudioLinkError::ChecksumMismatch
                | AudioLinkError::InvalidFrameSize
                | AudioLinkError::InvalidText
                | AudioLinkError::Truncated
        )
    }
}

pub type Result<T> = std::result::Result<T, AudioLinkError>;
