//! # Simulated MAX14906
//!
//! In-memory register file that speaks the MAX14906 SPI frame format.
//! Used by the test suite and by the monitor when no hardware is attached.
//!
//! Handles are cheap to clone and share state, so a test can keep one
//! handle while the driver owns another.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use super::bus_trait::{EnableLine, LineLevel, SpiBus, TransportError};
use crate::protocol::crc::{crc5_decode, crc5_encode};
use crate::protocol::frame::frame_len;
use crate::protocol::registers::*;

const REGISTER_COUNT: usize = MAX14906_MAX_REG_ADDRESS as usize + 1;

#[derive(Debug)]
struct SimState {
    registers: [u8; REGISTER_COUNT],
    input_levels: u8,
    crc_enabled: bool,
    chip_address: u8,
    writes: Vec<(u8, u8)>,
    transfers: usize,
    crc_errors: usize,
    fail_next: Option<String>,
    corrupt_next_crc: bool,
    released: bool,
}

impl SimState {
    /// DOILEVEL follows the output latch for outputs and the pin for inputs
    fn doi_level(&self) -> u8 {
        let setout = self.registers[MAX14906_SETOUT_REG as usize];
        let mut level = 0;

        for ch in 0..MAX14906_CHANNELS {
            let bit = if setout & ch_dir_mask(ch) == 0 {
                setout & higho_mask(ch) != 0
            } else {
                self.input_levels & (1 << ch) != 0
            };
            if bit {
                level |= doi_level_mask(ch);
            }
        }

        level
    }

    fn read_register(&mut self, addr: u8) -> u8 {
        if addr == MAX14906_DOILEVEL_REG {
            return self.doi_level();
        }

        let value = self.registers[addr as usize];
        if MAX14906_LATCHED_FAULT_REGS.contains(&addr) {
            self.registers[addr as usize] = 0;
        }
        value
    }
}

/// Simulated MAX14906 attached to an SPI bus
#[derive(Debug, Clone)]
pub struct SimulatedMax14906 {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedMax14906 {
    /// Create a simulated device with all registers cleared
    ///
    /// # Arguments
    ///
    /// * `crc_enabled` - Whether frames carry the CRC byte (CRCEN pin)
    /// * `chip_address` - Address strapped on the A0/A1 pins
    pub fn new(crc_enabled: bool, chip_address: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                registers: [0; REGISTER_COUNT],
                input_levels: 0,
                crc_enabled,
                chip_address,
                writes: Vec::new(),
                transfers: 0,
                crc_errors: 0,
                fail_next: None,
                corrupt_next_crc: false,
                released: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // State stays consistent even if a test thread panicked mid-transfer
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current register content, without read side effects
    pub fn register(&self, addr: u8) -> u8 {
        let state = self.lock();
        if addr == MAX14906_DOILEVEL_REG {
            state.doi_level()
        } else {
            state.registers[(addr & MAX14906_MAX_REG_ADDRESS) as usize]
        }
    }

    /// Overwrite a register, e.g. to latch a fault
    pub fn set_register(&self, addr: u8, val: u8) {
        self.lock().registers[(addr & MAX14906_MAX_REG_ADDRESS) as usize] = val;
    }

    /// Drive the field-side voltage seen by an input channel
    pub fn set_input_level(&self, ch: u8, high: bool) {
        let mut state = self.lock();
        if high {
            state.input_levels |= 1 << ch;
        } else {
            state.input_levels &= !(1 << ch);
        }
    }

    /// Register writes accepted so far, in order
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.lock().writes.clone()
    }

    /// Number of transfers clocked so far, including failed ones
    pub fn transfer_count(&self) -> usize {
        self.lock().transfers
    }

    /// Number of request frames rejected for a bad CRC
    pub fn crc_error_count(&self) -> usize {
        self.lock().crc_errors
    }

    /// Make the next transfer fail with the given message
    pub fn fail_next_transfer(&self, message: &str) {
        self.lock().fail_next = Some(message.to_string());
    }

    /// Flip one bit of the CRC byte in the next response
    pub fn corrupt_next_response(&self) {
        self.lock().corrupt_next_crc = true;
    }

    /// Whether the driver released the bus
    pub fn is_released(&self) -> bool {
        self.lock().released
    }
}

impl SpiBus for SimulatedMax14906 {
    fn transfer(&mut self, buf: &mut [u8], _cs_change: bool) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.transfers += 1;

        if let Some(message) = state.fail_next.take() {
            return Err(TransportError::Spi(message));
        }

        if state.released {
            return Err(TransportError::Spi("bus already released".to_string()));
        }

        let expected_len = frame_len(state.crc_enabled);
        if buf.len() != expected_len {
            return Err(TransportError::Spi(format!(
                "unexpected frame length {} (expected {})",
                buf.len(),
                expected_len
            )));
        }

        let command = buf[0];
        let chip = field_get(MAX14906_CHIP_ADDR_MASK, command);
        let addr = field_get(MAX14906_ADDR_MASK, command);
        let write = command & MAX14906_RW_MASK != 0;

        if chip != state.chip_address {
            // Another chip address: nobody drives MISO
            buf.fill(0);
            return Ok(());
        }

        let request_ok = !state.crc_enabled || crc5_encode(buf[0], buf[1]) == buf[2];

        let data = if !request_ok {
            state.crc_errors += 1;
            warn!("Simulated MAX14906 dropped frame 0x{:02X} with bad CRC", command);
            0
        } else if write {
            let val = buf[1];
            state.registers[addr as usize] = val;
            state.writes.push((addr, val));
            debug!("Simulated MAX14906 write reg 0x{:02X} = 0x{:02X}", addr, val);
            val
        } else {
            state.read_register(addr)
        };

        buf[0] = 0x00;
        buf[1] = data;
        if state.crc_enabled {
            let mut crc = crc5_decode(buf[0], buf[1]);
            if state.corrupt_next_crc {
                state.corrupt_next_crc = false;
                crc ^= 0x01;
            }
            buf[2] = crc;
        }

        Ok(())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        self.lock().released = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LineState {
    levels: Vec<LineLevel>,
    released: bool,
}

/// Simulated enable line that records every level driven
#[derive(Debug, Clone, Default)]
pub struct SimulatedEnableLine {
    state: Arc<Mutex<LineState>>,
}

impl SimulatedEnableLine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last level driven, if any
    pub fn level(&self) -> Option<LineLevel> {
        self.lock().levels.last().copied()
    }

    /// Every level driven, in order
    pub fn history(&self) -> Vec<LineLevel> {
        self.lock().levels.clone()
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }
}

impl EnableLine for SimulatedEnableLine {
    fn set_level(&mut self, level: LineLevel) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.released {
            return Err(TransportError::Gpio("enable line already released".to_string()));
        }
        state.levels.push(level);
        Ok(())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        self.lock().released = true;
        Ok(())
    }
}
