//! # MAX14906 Driver Library
//!
//! SPI register driver for the MAX14906 quad-channel industrial digital I/O.
//!
//! This library provides the register access layer (frame codec with optional
//! CRC5, register read/write/update), per-channel operations (level, function,
//! current limit) and the device lifecycle (init/remove) on top of a blocking
//! SPI transfer primitive.

pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod device;

pub use device::{FaultStatus, InitParam, Max14906};
pub use error::{Max14906Error, Result};
