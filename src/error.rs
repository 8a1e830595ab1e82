//! Error handling for the firmtrace core
//!
//! This module defines the error taxonomy shared by every component and
//! a Result alias used throughout the crate.
//!
//! Truncation is deliberately absent here: a truncated unwind or packet
//! sequence is an annotated partial result, not an error. Only structural
//! violations and invalid inputs surface as [`TraceError`].

use crate::types::TraceFormat;
use thiserror::Error;

/// Main error type for firmtrace operations
#[derive(Error, Debug)]
pub enum TraceError {
    /// A reader operation would run past the end of the buffer
    #[error("read of {wanted} bytes at offset {offset} exceeds buffer length {len}")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        len: usize,
    },

    /// No registered format signature matched the buffer
    #[error("no known trace format signature matched the input")]
    DetectionFailed,

    /// A decoder hit a structural violation in the buffer
    #[error("{format} decode failed at offset {offset}: {reason}")]
    DecodeFailed {
        format: TraceFormat,
        offset: usize,
        reason: String,
    },

    /// A record declares a format version newer than this decoder supports
    #[error("{format} record version {version} is newer than supported version {supported}")]
    UnsupportedVersion {
        format: TraceFormat,
        version: u16,
        supported: u16,
    },

    /// Symbol ranges overlap or are otherwise malformed
    #[error("invalid symbol map: {0}")]
    InvalidSymbolMap(String),

    /// A decoder is already bound to the format tag
    #[error("a decoder is already registered for format {0}")]
    DuplicateDecoder(TraceFormat),

    /// The format was recognized but no decoder is registered for it
    #[error("no decoder registered for format {0}")]
    DecoderUnavailable(TraceFormat),

    /// Errors related to configuration loading/saving
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors (configuration files, export targets)
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraceError {
    /// Create a `DecodeFailed` with byte-offset context
    pub fn decode(format: TraceFormat, offset: usize, reason: impl Into<String>) -> Self {
        TraceError::DecodeFailed {
            format,
            offset,
            reason: reason.into(),
        }
    }

    /// Tag an error with the format being decoded
    ///
    /// Reader-level `OutOfBounds` errors escaping a decoder are rewrapped
    /// so the caller always learns which format's decode failed and where.
    pub fn tagged(self, format: TraceFormat) -> Self {
        match self {
            TraceError::OutOfBounds {
                offset,
                wanted,
                len,
            } => TraceError::DecodeFailed {
                format,
                offset,
                reason: format!("read of {} bytes exceeds buffer length {}", wanted, len),
            },
            other => other,
        }
    }
}

/// Result type alias for firmtrace operations
pub type Result<T> = std::result::Result<T, TraceError>;
