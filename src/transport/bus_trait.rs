//! Trait abstractions for the SPI bus and enable line to enable testing

use std::io;
use thiserror::Error;

/// Errors reported by the SPI/GPIO collaborators
#[derive(Debug, Error)]
pub enum TransportError {
    /// SPI transfer or bus setup failure
    #[error("SPI error: {0}")]
    Spi(String),

    /// Enable line failure
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// I/O errors from the underlying device node
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Blocking full-duplex SPI transfer primitive
#[cfg_attr(test, mockall::automock)]
pub trait SpiBus: Send {
    /// Clock `buf` out and replace it with the bytes clocked in
    ///
    /// With `cs_change` set, chip select is deasserted once the transfer
    /// completes.
    fn transfer(&mut self, buf: &mut [u8], cs_change: bool) -> Result<(), TransportError>;

    /// Release the bus handle
    fn release(&mut self) -> Result<(), TransportError>;
}

/// Electrical state driven on the enable line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Low,
    High,
    HighZ,
}

/// Active-high enable line of the device
#[cfg_attr(test, mockall::automock)]
pub trait EnableLine: Send {
    /// Drive the line
    fn set_level(&mut self, level: LineLevel) -> Result<(), TransportError>;

    /// Release the line handle
    fn release(&mut self) -> Result<(), TransportError>;
}

/// Placeholder for boards without an enable line
///
/// Has no values, so `Option<NoEnableLine>` is always `None`.
#[derive(Debug)]
pub enum NoEnableLine {}

impl EnableLine for NoEnableLine {
    fn set_level(&mut self, _level: LineLevel) -> Result<(), TransportError> {
        match *self {}
    }

    fn release(&mut self) -> Result<(), TransportError> {
        match *self {}
    }
}
