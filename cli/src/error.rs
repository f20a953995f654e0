use glyphwave_core::AudioLinkError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Link(#[from] AudioLinkError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported WAV format: {0}")]
    UnsupportedWav(String),

    #[error("No message found in {}", .0.display())]
    NoMessage(PathBuf),

    #[error("Nothing to encode: pass --text or --input")]
    MissingText,
}

pub type Result<T> = std::result::Result<T, CliError>;
