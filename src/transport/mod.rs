//! # Transport Module
//!
//! SPI bus and enable line collaborators of the MAX14906 driver.
//!
//! This module handles:
//! - The blocking SPI transfer primitive (`SpiBus`)
//! - The optional active-high enable line (`EnableLine`)
//! - A simulated device for tests and hardware-free runs
//! - Raspberry Pi SPI/GPIO access (feature `raspberry-pi`)

pub mod bus_trait;
pub mod simulated;
#[cfg(feature = "raspberry-pi")]
pub mod raspberry_pi;

pub use bus_trait::{EnableLine, LineLevel, NoEnableLine, SpiBus, TransportError};
pub use simulated::{SimulatedEnableLine, SimulatedMax14906};
