//! Error types for firmtest.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for firmtest operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Pattern matching errors
    #[error("Match error: {0}")]
    Match(#[from] MatchError),

    /// Device/board errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

impl Error {
    /// Whether this is a pattern timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Match(MatchError::Timeout { .. }))
    }

    /// Whether the stream ended before the pattern appeared.
    pub fn is_no_match(&self) -> bool {
        matches!(self, Error::Match(MatchError::NoMatch { .. }))
    }

    /// Whether the transport is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Closed))
    }
}

/// Transport layer errors (opening, reading and writing the hardware channel).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The hardware handle could not be acquired
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Operation attempted after close or after a fatal I/O fault
    #[error("Transport closed")]
    Closed,

    /// Hardware I/O fault
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Pattern matching errors.
#[derive(Error, Debug)]
pub enum MatchError {
    /// Deadline exceeded before the pattern appeared
    #[error("Pattern '{pattern}' not found within {elapsed:?}")]
    Timeout { pattern: String, elapsed: Duration },

    /// The stream ended before the pattern appeared
    #[error("Stream ended before pattern '{pattern}' appeared")]
    NoMatch { pattern: String },

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Device and board profile errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No board profile registered under this name
    #[error("Unknown board '{name}'")]
    UnknownBoard { name: String },

    /// Board profile already registered
    #[error("Board '{name}' is already registered")]
    AlreadyRegistered { name: String },

    /// Programming the firmware image failed
    #[error("Failed to program '{}': {source}", image.display())]
    Program {
        image: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Resetting or erasing the target failed
    #[error("Programmer error: {0}")]
    Programmer(#[source] io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Result type alias using firmtest's Error.
pub type Result<T> = std::result::Result<T, Error>;
