//! # Error Types
//!
//! Custom error types for the MAX14906 driver using `thiserror`.

use thiserror::Error;

use crate::transport::TransportError;

/// Main error type for the MAX14906 driver
#[derive(Debug, Error)]
pub enum Max14906Error {
    /// SPI or GPIO collaborator failure, propagated as reported
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Bad channel index, register address or chip address
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Response CRC did not match; the register value was discarded
    #[error("CRC mismatch: expected 0x{expected:02X}, got 0x{received:02X}")]
    CrcMismatch { expected: u8, received: u8 },

    /// Operation on a device that was never initialized
    #[error("No such device")]
    NoDevice,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the MAX14906 driver
pub type Result<T> = std::result::Result<T, Max14906Error>;
