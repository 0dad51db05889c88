//! # CRC5 Implementation
//!
//! CRC5 checksum used by the MAX14906 SPI frame when CRC mode is enabled.
//!
//! **Polynomial**: 0x15 (x^5 + x^4 + x^2 + 1, top bit implicit)
//! **Initial Value**: 0x1F
//!
//! The check covers the command byte, the data byte and three trailing zero
//! bits. Frames sent to the device include all 8 command bits; frames received
//! from the device only cover the low 6 bits of the first byte.

/// CRC5 polynomial
const CRC5_POLY: u8 = 0x15;

/// CRC5 start value
const CRC5_INIT: u8 = 0x1F;

/// Number of zero bits appended after the data byte
const CRC5_PAD_BITS: u32 = 3;

/// Number of bits of the first response byte covered by the CRC
const CRC5_DECODE_STATUS_BITS: u32 = 6;

/// Precomputed lookup table, register aligned to the top of a byte
const CRC5_TABLE: [u8; 256] = generate_crc5_table();

/// Generate CRC5 lookup table at compile time
///
/// Entries hold the 5-bit register in bits 7..3, so a whole byte can be
/// stepped with a single XOR and lookup.
const fn generate_crc5_table() -> [u8; 256] {
    let poly = CRC5_POLY << 3;
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ poly;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Shift a single bit through the CRC5 register
#[inline]
fn crc5_step(crc: u8, bit: u8) -> u8 {
    let top = (crc >> 4) & 0x01;
    let shifted = (crc << 1) & 0x1F;

    if bit ^ top != 0 {
        shifted ^ CRC5_POLY
    } else {
        shifted
    }
}

/// Feed the low `count` bits of `byte`, MSB first
#[inline]
fn crc5_bits(mut crc: u8, byte: u8, count: u32) -> u8 {
    for i in (0..count).rev() {
        crc = crc5_step(crc, (byte >> i) & 0x01);
    }
    crc
}

/// Feed a full byte using the lookup table
#[inline]
fn crc5_byte(crc: u8, byte: u8) -> u8 {
    CRC5_TABLE[((crc << 3) ^ byte) as usize] >> 3
}

/// Calculate the CRC5 of a frame sent to the device
///
/// # Arguments
///
/// * `command` - Command byte (chip address, register address, RW bit)
/// * `data` - Data byte
///
/// # Returns
///
/// * `u8` - 5-bit CRC in the low bits
///
/// # Examples
///
/// ```
/// use max14906::protocol::crc::crc5_encode;
///
/// assert_eq!(crc5_encode(0x00, 0x00), 0x07);
/// ```
pub fn crc5_encode(command: u8, data: u8) -> u8 {
    let crc = crc5_byte(CRC5_INIT, command);
    let crc = crc5_byte(crc, data);
    crc5_bits(crc, 0x00, CRC5_PAD_BITS)
}

/// Calculate the CRC5 of a frame received from the device
///
/// The two top bits of the first byte are not covered by the device's CRC.
///
/// # Arguments
///
/// * `status` - First response byte
/// * `data` - Register value byte
///
/// # Returns
///
/// * `u8` - 5-bit CRC in the low bits
pub fn crc5_decode(status: u8, data: u8) -> u8 {
    let crc = crc5_bits(CRC5_INIT, status, CRC5_DECODE_STATUS_BITS);
    let crc = crc5_byte(crc, data);
    crc5_bits(crc, 0x00, CRC5_PAD_BITS)
}

/// Bit-serial CRC5 over a bit window of the first byte (slow, for verification)
///
/// `skip` is the number of leading (most significant) bits of `first` left out.
#[allow(dead_code)]
fn crc5_slow(first: u8, data: u8, skip: u32) -> u8 {
    let mut crc = CRC5_INIT;

    for i in skip..8 {
        crc = crc5_step(crc, (first >> (7 - i)) & 0x01);
    }
    for i in 0..8 {
        crc = crc5_step(crc, (data >> (7 - i)) & 0x01);
    }
    for _ in 0..CRC5_PAD_BITS {
        crc = crc5_step(crc, 0);
    }

    crc
}
