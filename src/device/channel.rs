//! # Channel Operations
//!
//! Per-channel level, function and current limit on top of register access.

use tracing::debug;

use super::Max14906;
use crate::error::{Max14906Error, Result};
use crate::protocol::registers::*;
use crate::transport::{EnableLine, SpiBus};

fn check_channel(ch: u8) -> Result<()> {
    if ch >= MAX14906_CHANNELS {
        return Err(Max14906Error::InvalidArgument(format!(
            "Channel {} out of range (0-{})",
            ch,
            MAX14906_CHANNELS - 1
        )));
    }
    Ok(())
}

impl<S: SpiBus, G: EnableLine> Max14906<S, G> {
    /// Read the voltage level of a channel (input or output)
    ///
    /// # Arguments
    ///
    /// * `ch` - Channel index (0-3)
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - `true` if the line is high
    pub fn ch_get(&mut self, ch: u8) -> Result<bool> {
        check_channel(ch)?;

        let reg_val = self.reg_read(MAX14906_DOILEVEL_REG)?;
        Ok(field_get(doi_level_mask(ch), reg_val) != 0)
    }

    /// Drive an output channel high or low
    ///
    /// # Arguments
    ///
    /// * `ch` - Channel index (0-3)
    /// * `high` - Requested level
    pub fn ch_set(&mut self, ch: u8, high: bool) -> Result<()> {
        check_channel(ch)?;

        let mask = higho_mask(ch);
        self.reg_update(MAX14906_SETOUT_REG, mask, if high { mask } else { 0 })
    }

    /// Configure a channel's function
    ///
    /// The output mode field is always written before the direction bit.
    /// High-Z is the push-pull mode with the direction set to input; input is
    /// the high-side mode with the direction set to input; output only clears
    /// the direction bit and keeps the current mode.
    ///
    /// # Arguments
    ///
    /// * `ch` - Channel index (0-3)
    /// * `function` - Requested function
    ///
    /// # Errors
    ///
    /// Stops at the first failing register update.
    pub fn ch_func(&mut self, ch: u8, function: ChannelFunction) -> Result<()> {
        check_channel(ch)?;

        let mode_mask = do_mode_mask(ch);
        let dir_mask = ch_dir_mask(ch);

        let direction = match function {
            ChannelFunction::HighZ => {
                self.reg_update(
                    MAX14906_CONFIG_DO_REG,
                    mode_mask,
                    field_prep(mode_mask, OutputMode::PushPull as u8),
                )?;
                ChannelFunction::Input as u8
            }
            ChannelFunction::Input => {
                self.reg_update(
                    MAX14906_CONFIG_DO_REG,
                    mode_mask,
                    field_prep(mode_mask, OutputMode::HighSide as u8),
                )?;
                ChannelFunction::Input as u8
            }
            ChannelFunction::Output => ChannelFunction::Output as u8,
        };

        self.reg_update(MAX14906_SETOUT_REG, dir_mask, field_prep(dir_mask, direction))?;

        debug!("Channel {} -> {:?}", ch, function);
        Ok(())
    }

    /// Read back a channel's function from the direction bit and mode field
    pub fn ch_func_get(&mut self, ch: u8) -> Result<ChannelFunction> {
        check_channel(ch)?;

        let setout = self.reg_read(MAX14906_SETOUT_REG)?;
        if field_get(ch_dir_mask(ch), setout) == 0 {
            return Ok(ChannelFunction::Output);
        }

        let config_do = self.reg_read(MAX14906_CONFIG_DO_REG)?;
        match OutputMode::from_bits(field_get(do_mode_mask(ch), config_do)) {
            OutputMode::PushPull => Ok(ChannelFunction::HighZ),
            _ => Ok(ChannelFunction::Input),
        }
    }

    /// Set the current limit of an output channel
    pub fn climit_set(&mut self, ch: u8, climit: CurrentLimit) -> Result<()> {
        check_channel(ch)?;

        let mask = climit_mask(ch);
        self.reg_update(MAX14906_CONFIG_CURR_LIM_REG, mask, field_prep(mask, climit as u8))
    }

    /// Read the current limit of an output channel
    pub fn climit_get(&mut self, ch: u8) -> Result<CurrentLimit> {
        check_channel(ch)?;

        let reg_val = self.reg_read(MAX14906_CONFIG_CURR_LIM_REG)?;
        Ok(CurrentLimit::from_bits(field_get(climit_mask(ch), reg_val)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::InitParam;
    use crate::transport::SimulatedMax14906;

    fn sim_device() -> (SimulatedMax14906, Max14906<SimulatedMax14906>) {
        let sim = SimulatedMax14906::new(true, 0);
        let dev = Max14906::init(InitParam::new(sim.clone(), true, 0)).unwrap();
        (sim, dev)
    }

    #[test]
    fn test_channel_bounds_issue_no_transfer() {
        let (sim, mut dev) = sim_device();
        let transfers = sim.transfer_count();

        assert!(matches!(dev.ch_get(4), Err(Max14906Error::InvalidArgument(_))));
        assert!(matches!(dev.ch_set(4, true), Err(Max14906Error::InvalidArgument(_))));
        assert!(matches!(
            dev.ch_func(7, ChannelFunction::Output),
            Err(Max14906Error::InvalidArgument(_))
        ));
        assert!(matches!(dev.ch_func_get(4), Err(Max14906Error::InvalidArgument(_))));
        assert!(matches!(
            dev.climit_set(4, CurrentLimit::Cl600),
            Err(Max14906Error::InvalidArgument(_))
        ));
        assert!(matches!(dev.climit_get(255), Err(Max14906Error::InvalidArgument(_))));

        assert_eq!(sim.transfer_count(), transfers);
    }

    #[test]
    fn test_high_z_writes_mode_before_direction() {
        let (sim, mut dev) = sim_device();
        dev.ch_func(1, ChannelFunction::Output).unwrap();
        let start = sim.writes().len();

        dev.ch_func(1, ChannelFunction::HighZ).unwrap();

        let writes = &sim.writes()[start..];
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].0, MAX14906_CONFIG_DO_REG);
        assert_eq!(writes[1].0, MAX14906_SETOUT_REG);
    }

    #[test]
    fn test_input_writes_mode_before_direction() {
        let (sim, mut dev) = sim_device();
        let start = sim.writes().len();

        dev.ch_func(2, ChannelFunction::Input).unwrap();

        let writes = &sim.writes()[start..];
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], (MAX14906_CONFIG_DO_REG, 0b1100_1111));
        assert_eq!(writes[1].0, MAX14906_SETOUT_REG);
        assert_eq!(dev.ch_func_get(2).unwrap(), ChannelFunction::Input);
    }

    #[test]
    fn test_output_only_touches_direction() {
        let (sim, mut dev) = sim_device();
        let start = sim.writes().len();

        dev.ch_func(0, ChannelFunction::Output).unwrap();

        let writes = &sim.writes()[start..];
        assert_eq!(writes, &[(MAX14906_SETOUT_REG, 0xE0)]);
        assert_eq!(dev.ch_func_get(0).unwrap(), ChannelFunction::Output);
        // Mode field keeps the push-pull setting from high-Z
        assert_eq!(sim.register(MAX14906_CONFIG_DO_REG), 0xFF);
    }

    #[test]
    fn test_ch_func_stops_after_mode_failure() {
        let (sim, mut dev) = sim_device();
        dev.ch_func(3, ChannelFunction::Output).unwrap();
        let start = sim.writes().len();

        sim.fail_next_transfer("mode read failed");
        assert!(dev.ch_func(3, ChannelFunction::HighZ).is_err());

        assert_eq!(sim.writes().len(), start);
        assert_eq!(dev.ch_func_get(3).unwrap(), ChannelFunction::Output);
    }

    #[test]
    fn test_output_level_set_and_get() {
        let (sim, mut dev) = sim_device();
        dev.ch_func(1, ChannelFunction::Output).unwrap();

        dev.ch_set(1, true).unwrap();
        assert!(dev.ch_get(1).unwrap());
        assert_eq!(sim.register(MAX14906_SETOUT_REG) & higho_mask(1), higho_mask(1));

        dev.ch_set(1, false).unwrap();
        assert!(!dev.ch_get(1).unwrap());
        assert_eq!(sim.register(MAX14906_SETOUT_REG) & higho_mask(1), 0);
    }

    #[test]
    fn test_ch_set_only_touches_own_bit() {
        let (sim, mut dev) = sim_device();

        dev.ch_set(0, true).unwrap();
        dev.ch_set(2, true).unwrap();
        dev.ch_set(0, false).unwrap();

        assert_eq!(sim.register(MAX14906_SETOUT_REG), 0xF0 | higho_mask(2));
    }

    #[test]
    fn test_input_level_get() {
        let (sim, mut dev) = sim_device();
        dev.ch_func(3, ChannelFunction::Input).unwrap();

        sim.set_input_level(3, true);
        assert!(dev.ch_get(3).unwrap());
        assert!(!dev.ch_get(2).unwrap());

        sim.set_input_level(3, false);
        assert!(!dev.ch_get(3).unwrap());
    }

    #[test]
    fn test_current_limit_set_and_get() {
        let (sim, mut dev) = sim_device();

        dev.climit_set(0, CurrentLimit::Cl1200).unwrap();
        dev.climit_set(2, CurrentLimit::Cl600).unwrap();

        assert_eq!(dev.climit_get(0).unwrap(), CurrentLimit::Cl1200);
        assert_eq!(dev.climit_get(1).unwrap(), CurrentLimit::Cl130);
        assert_eq!(dev.climit_get(2).unwrap(), CurrentLimit::Cl600);
        assert_eq!(dev.climit_get(3).unwrap(), CurrentLimit::Cl130);
        assert_eq!(sim.register(MAX14906_CONFIG_CURR_LIM_REG), 0b0100_0111);
    }

    #[test]
    fn test_climit_get_with_corrupted_response() {
        let (sim, mut dev) = sim_device();
        sim.corrupt_next_response();

        assert!(matches!(dev.climit_get(0), Err(Max14906Error::CrcMismatch { .. })));
    }
}
