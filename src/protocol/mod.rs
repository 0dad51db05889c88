//! # MAX14906 Protocol Module
//!
//! SPI frame format of the MAX14906 quad-channel digital I/O.
//!
//! This module handles:
//! - Register map and per-channel bit fields
//! - Request frame encoding (2 bytes, 3 with CRC)
//! - Response validation
//! - CRC5 checksum calculation

pub mod registers;
pub mod frame;
pub mod crc;
