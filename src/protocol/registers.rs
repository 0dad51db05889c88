//! # MAX14906 Register Map
//!
//! Register addresses, bit fields and the enumerated field values.

use serde::Deserialize;

/// Number of channels on the device
pub const MAX14906_CHANNELS: u8 = 4;

/// Frame size without CRC (command + data)
pub const MAX14906_FRAME_SIZE: usize = 2;

/// Frame size with CRC (command + data + crc)
pub const MAX14906_FRAME_SIZE_CRC: usize = 3;

/// Highest chip address selectable through the A0/A1 pins
pub const MAX14906_MAX_CHIP_ADDRESS: u8 = 3;

/// Highest register address encodable in the command byte
pub const MAX14906_MAX_REG_ADDRESS: u8 = 0x1F;

// Register addresses
pub const MAX14906_SETOUT_REG: u8 = 0x00;
pub const MAX14906_SET_FLED_REG: u8 = 0x01;
pub const MAX14906_DOILEVEL_REG: u8 = 0x02;
pub const MAX14906_INTERRUPT_REG: u8 = 0x03;
pub const MAX14906_OVR_LD_REG: u8 = 0x04;
pub const MAX14906_OPN_WIR_FLT_REG: u8 = 0x05;
pub const MAX14906_SHD_VDD_FLT_REG: u8 = 0x06;
pub const MAX14906_GLOBAL_FLT_REG: u8 = 0x07;
pub const MAX14906_CONFIG1_REG: u8 = 0x0A;
pub const MAX14906_CONFIG2_REG: u8 = 0x0B;
pub const MAX14906_CONFIG_DI_REG: u8 = 0x0C;
pub const MAX14906_CONFIG_DO_REG: u8 = 0x0D;
pub const MAX14906_CONFIG_CURR_LIM_REG: u8 = 0x0E;
pub const MAX14906_CONFIG_MASK_REG: u8 = 0x0F;

/// Latched fault registers, cleared by reading
pub const MAX14906_LATCHED_FAULT_REGS: [u8; 4] = [
    MAX14906_OVR_LD_REG,
    MAX14906_OPN_WIR_FLT_REG,
    MAX14906_SHD_VDD_FLT_REG,
    MAX14906_GLOBAL_FLT_REG,
];

// Command byte fields
pub const MAX14906_CHIP_ADDR_MASK: u8 = 0b1100_0000;
pub const MAX14906_ADDR_MASK: u8 = 0b0011_1110;
pub const MAX14906_RW_MASK: u8 = 0b0000_0001;

/// High-side output bit of a channel (SETOUT)
pub const fn higho_mask(ch: u8) -> u8 {
    1 << ch
}

/// Direction bit of a channel (SETOUT), 1 = input
pub const fn ch_dir_mask(ch: u8) -> u8 {
    1 << (ch + 4)
}

/// Voltage level bit of a channel (DOILEVEL)
pub const fn doi_level_mask(ch: u8) -> u8 {
    1 << ch
}

/// Output mode field of a channel (CONFIG_DO)
pub const fn do_mode_mask(ch: u8) -> u8 {
    0b11 << (2 * ch)
}

/// Current limit field of a channel (CONFIG_CURR_LIM)
pub const fn climit_mask(ch: u8) -> u8 {
    0b11 << (2 * ch)
}

/// Shift `val` into the position described by `mask`
pub const fn field_prep(mask: u8, val: u8) -> u8 {
    (val << mask.trailing_zeros()) & mask
}

/// Extract the field described by `mask` from `reg`
pub const fn field_get(mask: u8, reg: u8) -> u8 {
    (reg & mask) >> mask.trailing_zeros()
}

/// Channel function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ChannelFunction {
    Output = 0,
    Input = 1,
    HighZ = 2,
}

/// Output driver mode (CONFIG_DO)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputMode {
    HighSide = 0,
    HighSideInrush = 1,
    PushPullClamp = 2,
    PushPull = 3,
}

impl OutputMode {
    /// Decode a 2-bit field value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => OutputMode::HighSide,
            1 => OutputMode::HighSideInrush,
            2 => OutputMode::PushPullClamp,
            _ => OutputMode::PushPull,
        }
    }
}

/// Output current limit (CONFIG_CURR_LIM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[repr(u8)]
pub enum CurrentLimit {
    #[serde(rename = "600mA")]
    Cl600 = 0,
    #[serde(rename = "130mA")]
    Cl130 = 1,
    #[serde(rename = "300mA")]
    Cl300 = 2,
    #[serde(rename = "1200mA")]
    Cl1200 = 3,
}

impl CurrentLimit {
    /// Lowest selectable limit, applied at init
    pub const MIN: CurrentLimit = CurrentLimit::Cl130;

    /// Decode a 2-bit field value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => CurrentLimit::Cl600,
            1 => CurrentLimit::Cl130,
            2 => CurrentLimit::Cl300,
            _ => CurrentLimit::Cl1200,
        }
    }

    /// Limit in milliamps
    pub fn milliamps(self) -> u16 {
        match self {
            CurrentLimit::Cl600 => 600,
            CurrentLimit::Cl130 => 130,
            CurrentLimit::Cl300 => 300,
            CurrentLimit::Cl1200 => 1200,
        }
    }
}
