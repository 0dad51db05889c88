//! # MAX14906 Device Module
//!
//! Device descriptor, register access and lifecycle.
//!
//! This module handles:
//! - Register read, write and read-modify-write over the SPI frame codec
//! - Bring-up: enable line, latched fault clearing, all channels to high-Z
//! - Teardown: all channels to high-Z, bus and enable line release
//! - Per-channel operations (see [`channel`])
//!
//! A descriptor is a single bus conversation. Operations take `&mut self`,
//! so sharing one between threads needs an outer lock. Read-modify-write
//! sequences are two transfers and are not atomic against other bus masters.

pub mod channel;

use tracing::{debug, info, warn};

use crate::error::{Max14906Error, Result};
use crate::protocol::frame::{decode_read, encode_read, encode_write, FrameBuffer};
use crate::protocol::registers::*;
use crate::transport::{EnableLine, LineLevel, NoEnableLine, SpiBus};

/// Initialization parameters
///
/// The bus and enable line handles are moved into the descriptor.
#[derive(Debug)]
pub struct InitParam<S, G = NoEnableLine> {
    /// SPI bus the device is attached to
    pub spi: S,
    /// Optional active-high enable line
    pub enable: Option<G>,
    /// Append and check the CRC5 byte on every frame
    pub crc_enabled: bool,
    /// Address strapped on the A0/A1 pins (0-3)
    pub chip_address: u8,
}

impl<S> InitParam<S, NoEnableLine> {
    /// Parameters for a board without an enable line
    pub fn new(spi: S, crc_enabled: bool, chip_address: u8) -> Self {
        Self {
            spi,
            enable: None,
            crc_enabled,
            chip_address,
        }
    }
}

/// Latched fault registers, as read (and cleared) from the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStatus {
    /// Overload / current limit per channel (OVR_LD)
    pub overload: u8,
    /// Open wire / above-VDD per channel (OPN_WIR_FLT)
    pub open_wire: u8,
    /// Short to VDD per channel (SHD_VDD_FLT)
    pub short_vdd: u8,
    /// Supply and thermal faults (GLOBAL_FLT)
    pub global: u8,
}

impl FaultStatus {
    /// No fault bit set in any register
    pub fn is_clear(&self) -> bool {
        self.overload == 0 && self.open_wire == 0 && self.short_vdd == 0 && self.global == 0
    }
}

/// MAX14906 device descriptor
pub struct Max14906<S: SpiBus, G: EnableLine = NoEnableLine> {
    spi: S,
    enable: Option<G>,
    crc_enabled: bool,
    chip_address: u8,
    buf: FrameBuffer,
}

impl<S: SpiBus, G: EnableLine> std::fmt::Debug for Max14906<S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Max14906")
            .field("crc_enabled", &self.crc_enabled)
            .field("chip_address", &self.chip_address)
            .field("enable_line", &self.enable.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: SpiBus, G: EnableLine> Max14906<S, G> {
    /// Initialize the device
    ///
    /// Drives the enable line high (if one is given), clears the latched
    /// faults generated at power up and puts every channel in high-Z with
    /// the lowest current limit.
    ///
    /// # Arguments
    ///
    /// * `param` - Bus, enable line and protocol settings
    ///
    /// # Returns
    ///
    /// * `Result<Max14906>` - Ready descriptor
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. The enable line and then the
    /// bus are released before returning.
    ///
    /// # Examples
    ///
    /// ```
    /// use max14906::device::{InitParam, Max14906};
    /// use max14906::protocol::registers::ChannelFunction;
    /// use max14906::transport::SimulatedMax14906;
    ///
    /// let sim = SimulatedMax14906::new(true, 0);
    /// let mut dev = Max14906::init(InitParam::new(sim, true, 0))?;
    /// assert_eq!(dev.ch_func_get(0)?, ChannelFunction::HighZ);
    /// dev.remove()?;
    /// # Ok::<(), max14906::error::Max14906Error>(())
    /// ```
    pub fn init(param: InitParam<S, G>) -> Result<Self> {
        let mut descriptor = Self {
            spi: param.spi,
            enable: param.enable,
            crc_enabled: param.crc_enabled,
            chip_address: param.chip_address,
            buf: [0; MAX14906_FRAME_SIZE_CRC],
        };

        match descriptor.bring_up() {
            Ok(()) => {
                info!(
                    "MAX14906 initialized (chip address {}, CRC {})",
                    descriptor.chip_address,
                    if descriptor.crc_enabled { "on" } else { "off" }
                );
                Ok(descriptor)
            }
            Err(e) => {
                warn!("MAX14906 init failed: {}", e);
                descriptor.release_handles();
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<()> {
        if self.chip_address > MAX14906_MAX_CHIP_ADDRESS {
            return Err(Max14906Error::InvalidArgument(format!(
                "Chip address {} out of range (0-{})",
                self.chip_address, MAX14906_MAX_CHIP_ADDRESS
            )));
        }

        if let Some(enable) = self.enable.as_mut() {
            enable.set_level(LineLevel::High)?;
        }

        let faults = self.read_faults()?;
        if !faults.is_clear() {
            debug!("Cleared power-up faults: {:?}", faults);
        }

        for ch in 0..MAX14906_CHANNELS {
            self.ch_func(ch, ChannelFunction::HighZ)?;
            self.climit_set(ch, CurrentLimit::MIN)?;
        }

        Ok(())
    }

    /// Release handles after a failed init, enable line first
    fn release_handles(&mut self) {
        if let Some(mut enable) = self.enable.take() {
            if let Err(e) = enable.release() {
                warn!("Failed to release enable line: {}", e);
            }
        }

        if let Err(e) = self.spi.release() {
            warn!("Failed to release SPI bus: {}", e);
        }
    }

    /// Put every channel in high-Z and release the bus and enable line
    ///
    /// Teardown does not stop at the first failure: every channel is
    /// attempted and both handles are always released.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn remove(mut self) -> Result<()> {
        let mut first_error: Option<Max14906Error> = None;

        for ch in 0..MAX14906_CHANNELS {
            if let Err(e) = self.ch_func(ch, ChannelFunction::HighZ) {
                warn!("Failed to put channel {} in high-Z: {}", ch, e);
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.spi.release() {
            warn!("Failed to release SPI bus: {}", e);
            first_error.get_or_insert(e.into());
        }

        if let Some(mut enable) = self.enable.take() {
            if let Err(e) = enable.set_level(LineLevel::HighZ) {
                warn!("Failed to float enable line: {}", e);
                first_error.get_or_insert(e.into());
            }
            if let Err(e) = enable.release() {
                warn!("Failed to release enable line: {}", e);
                first_error.get_or_insert(e.into());
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("MAX14906 removed");
                Ok(())
            }
        }
    }

    fn check_reg_address(addr: u8) -> Result<()> {
        if addr > MAX14906_MAX_REG_ADDRESS {
            return Err(Max14906Error::InvalidArgument(format!(
                "Register address 0x{:02X} out of range",
                addr
            )));
        }
        Ok(())
    }

    /// Write a device register
    ///
    /// # Arguments
    ///
    /// * `addr` - Register address (0x00-0x1F)
    /// * `val` - Register value
    pub fn reg_write(&mut self, addr: u8, val: u8) -> Result<()> {
        Self::check_reg_address(addr)?;

        let len = encode_write(&mut self.buf, self.chip_address, addr, val, self.crc_enabled);
        self.spi.transfer(&mut self.buf[..len], true)?;

        debug!("reg 0x{:02X} <- 0x{:02X}", addr, val);
        Ok(())
    }

    /// Read a device register
    ///
    /// # Arguments
    ///
    /// * `addr` - Register address (0x00-0x1F)
    ///
    /// # Returns
    ///
    /// * `Result<u8>` - Register value
    ///
    /// # Errors
    ///
    /// Returns `CrcMismatch` when CRC mode is on and the response fails the
    /// check; the received value is discarded.
    pub fn reg_read(&mut self, addr: u8) -> Result<u8> {
        Self::check_reg_address(addr)?;

        let len = encode_read(&mut self.buf, self.chip_address, addr, self.crc_enabled);
        self.spi.transfer(&mut self.buf[..len], true)?;

        let val = decode_read(&self.buf[..len], self.crc_enabled).map_err(|e| {
            warn!("Read of reg 0x{:02X} rejected: {}", addr, e);
            e
        })?;

        debug!("reg 0x{:02X} -> 0x{:02X}", addr, val);
        Ok(val)
    }

    /// Update the bits of a register selected by `mask`
    ///
    /// `val` must already be shifted into the field position
    /// (see [`field_prep`]).
    pub fn reg_update(&mut self, addr: u8, mask: u8, val: u8) -> Result<()> {
        let mut reg_val = self.reg_read(addr)?;

        reg_val &= !mask;
        reg_val |= mask & val;

        self.reg_write(addr, reg_val)
    }

    /// Read and clear the four latched fault registers
    pub fn read_faults(&mut self) -> Result<FaultStatus> {
        Ok(FaultStatus {
            overload: self.reg_read(MAX14906_OVR_LD_REG)?,
            open_wire: self.reg_read(MAX14906_OPN_WIR_FLT_REG)?,
            short_vdd: self.reg_read(MAX14906_SHD_VDD_FLT_REG)?,
            global: self.reg_read(MAX14906_GLOBAL_FLT_REG)?,
        })
    }

    pub fn crc_enabled(&self) -> bool {
        self.crc_enabled
    }

    pub fn chip_address(&self) -> u8 {
        self.chip_address
    }

    pub fn has_enable_line(&self) -> bool {
        self.enable.is_some()
    }
}

/// Tear down a descriptor that may not exist
///
/// # Errors
///
/// Returns `NoDevice` for `None` without touching any hardware.
pub fn remove<S: SpiBus, G: EnableLine>(desc: Option<Max14906<S, G>>) -> Result<()> {
    match desc {
        Some(desc) => desc.remove(),
        None => Err(Max14906Error::NoDevice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::bus_trait::{MockEnableLine, MockSpiBus};
    use crate::transport::{SimulatedEnableLine, SimulatedMax14906, TransportError};
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn sim_device(crc: bool) -> (SimulatedMax14906, Max14906<SimulatedMax14906>) {
        let sim = SimulatedMax14906::new(crc, 0);
        let dev = Max14906::init(InitParam::new(sim.clone(), crc, 0)).unwrap();
        (sim, dev)
    }

    #[test]
    fn test_init_puts_all_channels_in_high_z() {
        for crc in [false, true] {
            let (sim, mut dev) = sim_device(crc);

            for ch in 0..MAX14906_CHANNELS {
                assert_eq!(dev.ch_func_get(ch).unwrap(), ChannelFunction::HighZ);
                assert_eq!(dev.climit_get(ch).unwrap(), CurrentLimit::Cl130);
            }

            assert_eq!(sim.register(MAX14906_SETOUT_REG), 0xF0);
            assert_eq!(sim.register(MAX14906_CONFIG_DO_REG), 0xFF);
            assert_eq!(sim.register(MAX14906_CONFIG_CURR_LIM_REG), 0x55);
            assert_eq!(sim.crc_error_count(), 0);
        }
    }

    #[test]
    fn test_init_clears_latched_faults() {
        let sim = SimulatedMax14906::new(true, 0);
        sim.set_register(MAX14906_OVR_LD_REG, 0x01);
        sim.set_register(MAX14906_GLOBAL_FLT_REG, 0x20);

        let mut dev = Max14906::init(InitParam::new(sim.clone(), true, 0)).unwrap();

        assert_eq!(sim.register(MAX14906_OVR_LD_REG), 0);
        assert_eq!(sim.register(MAX14906_GLOBAL_FLT_REG), 0);
        assert!(dev.read_faults().unwrap().is_clear());
    }

    #[test]
    fn test_init_drives_enable_line_high() {
        let sim = SimulatedMax14906::new(false, 1);
        let line = SimulatedEnableLine::new();
        let dev = Max14906::init(InitParam {
            spi: sim.clone(),
            enable: Some(line.clone()),
            crc_enabled: false,
            chip_address: 1,
        })
        .unwrap();

        assert!(dev.has_enable_line());
        assert_eq!(line.history(), vec![LineLevel::High]);
        assert_eq!(sim.register(MAX14906_SETOUT_REG), 0xF0);
    }

    #[test]
    fn test_init_rejects_chip_address_and_releases_bus() {
        let sim = SimulatedMax14906::new(false, 0);

        let result = Max14906::init(InitParam::new(sim.clone(), false, 4));

        assert!(matches!(result, Err(Max14906Error::InvalidArgument(_))));
        assert_eq!(sim.transfer_count(), 0);
        assert!(sim.is_released());
    }

    #[test]
    fn test_init_failure_releases_enable_then_bus() {
        let mut spi = MockSpiBus::new();
        let mut enable = MockEnableLine::new();
        let mut seq = Sequence::new();

        enable
            .expect_set_level()
            .with(eq(LineLevel::High))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        spi.expect_transfer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(TransportError::Spi("no ack".to_string())));
        enable
            .expect_release()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        spi.expect_release()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let result = Max14906::init(InitParam {
            spi,
            enable: Some(enable),
            crc_enabled: false,
            chip_address: 0,
        });

        match result {
            Err(Max14906Error::Transport(TransportError::Spi(msg))) => assert_eq!(msg, "no ack"),
            other => panic!("Expected transport error, got: {:?}", other),
        }
    }

    #[test]
    fn test_init_enable_failure_releases_handles() {
        let mut spi = MockSpiBus::new();
        let mut enable = MockEnableLine::new();

        enable
            .expect_set_level()
            .returning(|_| Err(TransportError::Gpio("pin busy".to_string())));
        enable.expect_release().times(1).returning(|| Ok(()));
        spi.expect_transfer().never();
        spi.expect_release().times(1).returning(|| Ok(()));

        let result = Max14906::init(InitParam {
            spi,
            enable: Some(enable),
            crc_enabled: true,
            chip_address: 0,
        });

        assert!(matches!(
            result,
            Err(Max14906Error::Transport(TransportError::Gpio(_)))
        ));
    }

    #[test]
    fn test_write_then_read_round_trip() {
        for crc in [false, true] {
            let (_sim, mut dev) = sim_device(crc);

            for (addr, val) in [(MAX14906_CONFIG1_REG, 0x5A), (MAX14906_CONFIG_MASK_REG, 0xFF), (0x1F, 0x00)] {
                dev.reg_write(addr, val).unwrap();
                assert_eq!(dev.reg_read(addr).unwrap(), val);
            }
        }
    }

    #[test]
    fn test_write_frame_on_the_wire() {
        let mut spi = MockSpiBus::new();
        spi.expect_transfer().times(1).returning(|buf, cs_change| {
            assert_eq!(&buf[..], &[0x1B, 0xFF, 0x08][..]);
            assert!(cs_change);
            Ok(())
        });

        let mut dev: Max14906<MockSpiBus> = Max14906 {
            spi,
            enable: None,
            crc_enabled: true,
            chip_address: 0,
            buf: [0; MAX14906_FRAME_SIZE_CRC],
        };

        dev.reg_write(MAX14906_CONFIG_DO_REG, 0xFF).unwrap();
    }

    #[test]
    fn test_read_with_corrupted_crc_fails() {
        let (sim, mut dev) = sim_device(true);
        dev.reg_write(MAX14906_CONFIG1_REG, 0x42).unwrap();

        sim.corrupt_next_response();

        assert!(matches!(
            dev.reg_read(MAX14906_CONFIG1_REG),
            Err(Max14906Error::CrcMismatch { .. })
        ));
        // The next clean read still works
        assert_eq!(dev.reg_read(MAX14906_CONFIG1_REG).unwrap(), 0x42);
    }

    #[test]
    fn test_update_with_corrupted_read_does_not_write() {
        let (sim, mut dev) = sim_device(true);
        let writes_before = sim.writes().len();

        sim.corrupt_next_response();
        let result = dev.reg_update(MAX14906_CONFIG1_REG, 0x0F, 0x0F);

        assert!(matches!(result, Err(Max14906Error::CrcMismatch { .. })));
        assert_eq!(sim.writes().len(), writes_before);
    }

    #[test]
    fn test_transport_error_propagates() {
        let (sim, mut dev) = sim_device(false);
        sim.fail_next_transfer("bus stuck");

        match dev.reg_write(MAX14906_CONFIG1_REG, 0x01) {
            Err(Max14906Error::Transport(TransportError::Spi(msg))) => assert_eq!(msg, "bus stuck"),
            other => panic!("Expected transport error, got: {:?}", other),
        }
    }

    #[test]
    fn test_reg_update_merges_masked_bits() {
        let (sim, mut dev) = sim_device(false);
        dev.reg_write(MAX14906_CONFIG2_REG, 0b1010_1010).unwrap();

        dev.reg_update(MAX14906_CONFIG2_REG, 0b0000_1111, 0b1111_0101).unwrap();

        assert_eq!(sim.register(MAX14906_CONFIG2_REG), 0b1010_0101);
    }

    #[test]
    fn test_register_address_out_of_range() {
        let (sim, mut dev) = sim_device(false);
        let transfers = sim.transfer_count();

        assert!(matches!(dev.reg_write(0x20, 0), Err(Max14906Error::InvalidArgument(_))));
        assert!(matches!(dev.reg_read(0xFF), Err(Max14906Error::InvalidArgument(_))));
        assert_eq!(sim.transfer_count(), transfers);
    }

    #[test]
    fn test_read_faults_reports_and_clears() {
        let (sim, mut dev) = sim_device(true);
        sim.set_register(MAX14906_OPN_WIR_FLT_REG, 0x04);
        sim.set_register(MAX14906_SHD_VDD_FLT_REG, 0x02);

        let faults = dev.read_faults().unwrap();
        assert_eq!(faults.open_wire, 0x04);
        assert_eq!(faults.short_vdd, 0x02);
        assert!(!faults.is_clear());

        assert!(dev.read_faults().unwrap().is_clear());
    }

    #[test]
    fn test_remove_floats_channels_and_releases() {
        let sim = SimulatedMax14906::new(true, 0);
        let line = SimulatedEnableLine::new();
        let mut dev = Max14906::init(InitParam {
            spi: sim.clone(),
            enable: Some(line.clone()),
            crc_enabled: true,
            chip_address: 0,
        })
        .unwrap();
        dev.ch_func(2, ChannelFunction::Output).unwrap();

        dev.remove().unwrap();

        assert_eq!(sim.register(MAX14906_SETOUT_REG) & 0xF0, 0xF0);
        assert!(sim.is_released());
        assert_eq!(line.history(), vec![LineLevel::High, LineLevel::HighZ]);
        assert!(line.is_released());
    }

    #[test]
    fn test_remove_keeps_going_after_channel_failure() {
        let (sim, mut dev) = sim_device(false);
        dev.ch_func(0, ChannelFunction::Output).unwrap();
        dev.ch_func(3, ChannelFunction::Output).unwrap();

        sim.fail_next_transfer("glitch");
        let result = dev.remove();

        assert!(matches!(result, Err(Max14906Error::Transport(_))));
        // Channel 0 failed, channel 3 was still floated and the bus released
        assert_eq!(sim.register(MAX14906_SETOUT_REG) & ch_dir_mask(0), 0);
        assert_ne!(sim.register(MAX14906_SETOUT_REG) & ch_dir_mask(3), 0);
        assert!(sim.is_released());
    }

    #[test]
    fn test_remove_none_is_no_device() {
        let result = remove::<SimulatedMax14906, NoEnableLine>(None);
        assert!(matches!(result, Err(Max14906Error::NoDevice)));
    }

    #[test]
    fn test_remove_some_delegates() {
        let (sim, dev) = sim_device(false);
        remove(Some(dev)).unwrap();
        assert!(sim.is_released());
    }
}
