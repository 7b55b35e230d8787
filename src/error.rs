//! Error types for the sampler core.
//!
//! Configuration and registry failures are fatal for the operation that
//! raised them. Bank and preset failures are recoverable: the previous state
//! is always kept. Render failures only silence the block they occurred in.

use thiserror::Error;

/// Configuration and registry errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Duplicate parameter key: {0}")]
    DuplicateParameter(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading an instrument bank.
#[derive(Error, Debug)]
pub enum BankError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid bank manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Invalid WAV data in {path}: {source}")]
    Wav {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("Invalid inline PCM data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unsupported sample format in {0}")]
    UnsupportedFormat(String),

    #[error("Checksum mismatch for {path}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Bank contains no instruments")]
    Empty,

    #[error("Instrument '{0}' has no playable zones")]
    NoZones(String),

    #[error("Invalid zone in instrument '{instrument}': {reason}")]
    InvalidZone { instrument: String, reason: String },
}

/// Errors raised while decoding or applying a preset blob.
#[derive(Error, Debug)]
pub enum PresetError {
    #[error("Malformed preset: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported preset version {0}")]
    UnsupportedVersion(u32),

    #[error("Parameter '{0}' has a non-finite value")]
    NonFiniteValue(String),

    #[error("Instrument index {index} out of range (bank has {count})")]
    InstrumentOutOfRange { index: usize, count: usize },

    #[error("Preset bank could not be loaded: {0}")]
    Bank(#[from] BankError),
}

/// Fatal-for-this-block render errors. The block is zero-filled and the next
/// render call proceeds normally.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    #[error("Render called before initialize")]
    NotInitialized,

    #[error("Requested {requested} frames, maximum is {max}")]
    TooManyFrames { requested: usize, max: usize },

    #[error("Output channel holds {len} frames, {needed} required")]
    BufferTooShort { len: usize, needed: usize },

    #[error("No output channels")]
    NoOutputChannels,

    #[error("Render panicked")]
    Panicked,
}
