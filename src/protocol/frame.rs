//! # MAX14906 Frame Codec
//!
//! Builds request frames into the device scratch buffer and validates
//! response frames.
//!
//! ```text
//! Byte 0: A1 A0 | R4..R0 | RW      (RW = 1 for write)
//! Byte 1: register value (ignored on read requests)
//! Byte 2: CRC5 in bits 4..0        (only when CRC mode is enabled)
//! ```

use super::crc::{crc5_decode, crc5_encode};
use super::registers::*;
use crate::error::{Max14906Error, Result};

/// Scratch buffer holding one frame
pub type FrameBuffer = [u8; MAX14906_FRAME_SIZE_CRC];

/// Build the command byte
///
/// # Arguments
///
/// * `chip_address` - Device address on a shared chip select (0-3)
/// * `addr` - Register address (0x00-0x1F)
/// * `write` - `true` for a write request
pub fn command_byte(chip_address: u8, addr: u8, write: bool) -> u8 {
    field_prep(MAX14906_CHIP_ADDR_MASK, chip_address)
        | field_prep(MAX14906_ADDR_MASK, addr)
        | field_prep(MAX14906_RW_MASK, write as u8)
}

/// Transfer length for the given CRC mode
pub fn frame_len(crc_enabled: bool) -> usize {
    if crc_enabled {
        MAX14906_FRAME_SIZE_CRC
    } else {
        MAX14906_FRAME_SIZE
    }
}

/// Encode a register write request
///
/// # Returns
///
/// * `usize` - Number of bytes to transfer (2, or 3 with CRC)
pub fn encode_write(
    buf: &mut FrameBuffer,
    chip_address: u8,
    addr: u8,
    val: u8,
    crc_enabled: bool,
) -> usize {
    *buf = [0; MAX14906_FRAME_SIZE_CRC];
    buf[0] = command_byte(chip_address, addr, true);
    buf[1] = val;

    if crc_enabled {
        buf[2] = crc5_encode(buf[0], buf[1]);
    }

    frame_len(crc_enabled)
}

/// Encode a register read request
///
/// The data byte is zero. With CRC enabled the request carries its own CRC
/// so the device accepts it.
///
/// # Returns
///
/// * `usize` - Number of bytes to transfer (2, or 3 with CRC)
pub fn encode_read(buf: &mut FrameBuffer, chip_address: u8, addr: u8, crc_enabled: bool) -> usize {
    *buf = [0; MAX14906_FRAME_SIZE_CRC];
    buf[0] = command_byte(chip_address, addr, false);

    if crc_enabled {
        buf[2] = crc5_encode(buf[0], buf[1]);
    }

    frame_len(crc_enabled)
}

/// Decode the response to a read request
///
/// # Arguments
///
/// * `frame` - Bytes clocked in during the read transfer
/// * `crc_enabled` - Whether the response carries a CRC byte
///
/// # Returns
///
/// * `Result<u8>` - Register value
///
/// # Errors
///
/// Returns `CrcMismatch` if the received CRC does not match the response,
/// `InvalidArgument` if the frame is shorter than the CRC mode requires.
pub fn decode_read(frame: &[u8], crc_enabled: bool) -> Result<u8> {
    let expected_len = frame_len(crc_enabled);
    if frame.len() < expected_len {
        return Err(Max14906Error::InvalidArgument(format!(
            "Response too short: expected {} bytes, got {}",
            expected_len,
            frame.len()
        )));
    }

    if crc_enabled {
        let expected = crc5_decode(frame[0], frame[1]);
        let received = frame[2];

        if expected != received {
            return Err(Max14906Error::CrcMismatch { expected, received });
        }
    }

    Ok(frame[1])
}
