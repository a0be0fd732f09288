//! Error types for rill-ap
//!
//! Nothing in the streaming or mixing path returns these to the audio
//! thread; decode failures and underruns degrade to silence. Errors surface
//! only from setup (device, config, file open) and from API misuse.

use thiserror::Error;

/// Main error type for the rill-ap crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration or other shared-crate errors
    #[error(transparent)]
    Common(#[from] rill_common::Error),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio backend could not be initialized
    #[error("Audio device initialization failed: {0}")]
    DeviceInit(String),

    /// Audio output stream errors after initialization
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Unknown or already destroyed player handle
    #[error("Player not found: {0}")]
    PlayerNotFound(u64),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using rill-ap Error
pub type Result<T> = std::result::Result<T, Error>;
