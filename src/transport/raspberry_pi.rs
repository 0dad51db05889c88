//! # Raspberry Pi Transport
//!
//! SPI bus and enable line for a MAX14906 wired to the Raspberry Pi 40-pin
//! header, using the `rppal` crate.
//!
//! ```text
//! Pi Pin │ BCM GPIO │ MAX14906 │ Function
//! ───────┼──────────┼──────────┼─────────────
//! 19     │ GPIO 10  │ SDI      │ SPI data out
//! 21     │ GPIO 9   │ SDO      │ SPI data in
//! 23     │ GPIO 11  │ CLK      │ SPI clock
//! 24     │ GPIO 8   │ CS       │ Chip select
//! any    │ any      │ EN       │ Enable (optional)
//! ```
//!
//! spidev deasserts chip select at the end of every transfer, which is the
//! behaviour the driver asks for with `cs_change`.

use rppal::gpio::{Gpio, IoPin, Mode as PinMode};
use rppal::spi::{BitOrder, Bus, Mode, SlaveSelect, Spi};
use tracing::{debug, info};

use super::bus_trait::{EnableLine, LineLevel, SpiBus, TransportError};

/// SPI bus handle on a Raspberry Pi
pub struct RaspberryPiSpi {
    spi: Option<Spi>,
    bus_info: String,
}

impl std::fmt::Debug for RaspberryPiSpi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaspberryPiSpi")
            .field("bus_info", &self.bus_info)
            .finish_non_exhaustive()
    }
}

impl RaspberryPiSpi {
    /// Open an SPI bus in mode 0, MSB first
    ///
    /// # Arguments
    ///
    /// * `bus` - SPI controller (0 or 1)
    /// * `chip_select` - Hardware chip select line (0-2)
    /// * `max_speed_hz` - Clock rate
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Spi` for unknown bus/chip select numbers or if
    /// the spidev node cannot be opened.
    pub fn open(bus: u8, chip_select: u8, max_speed_hz: u32) -> Result<Self, TransportError> {
        let spi_bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            _ => {
                return Err(TransportError::Spi(format!(
                    "Invalid SPI bus {}, only 0 and 1 are supported",
                    bus
                )))
            }
        };

        let slave_select = match chip_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            _ => {
                return Err(TransportError::Spi(format!(
                    "Invalid chip select {}, only 0-2 are supported",
                    chip_select
                )))
            }
        };

        let spi = Spi::new(spi_bus, slave_select, max_speed_hz, Mode::Mode0)
            .map_err(|e| TransportError::Spi(format!("Failed to open SPI{}: {}", bus, e)))?;
        spi.set_bit_order(BitOrder::MsbFirst)
            .map_err(|e| TransportError::Spi(format!("Failed to set bit order: {}", e)))?;

        let bus_info = format!("SPI{}.{} @ {} Hz", bus, chip_select, max_speed_hz);
        info!("Opened {}", bus_info);

        Ok(Self {
            spi: Some(spi),
            bus_info,
        })
    }
}

impl SpiBus for RaspberryPiSpi {
    fn transfer(&mut self, buf: &mut [u8], _cs_change: bool) -> Result<(), TransportError> {
        let spi = self
            .spi
            .as_ref()
            .ok_or_else(|| TransportError::Spi("bus already released".to_string()))?;

        let tx = buf.to_vec();
        spi.transfer(buf, &tx)
            .map_err(|e| TransportError::Spi(format!("Transfer on {} failed: {}", self.bus_info, e)))?;

        Ok(())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        if self.spi.take().is_some() {
            debug!("Released {}", self.bus_info);
        }
        Ok(())
    }
}

/// Enable line on a BCM GPIO
pub struct RaspberryPiEnableLine {
    pin: Option<IoPin>,
    gpio: u8,
}

impl std::fmt::Debug for RaspberryPiEnableLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaspberryPiEnableLine")
            .field("gpio", &self.gpio)
            .finish_non_exhaustive()
    }
}

impl RaspberryPiEnableLine {
    /// Claim a GPIO as the enable line, initially an input (high-Z)
    pub fn open(gpio: u8) -> Result<Self, TransportError> {
        let controller = Gpio::new()
            .map_err(|e| TransportError::Gpio(format!("Failed to open GPIO controller: {}", e)))?;
        let mut pin = controller
            .get(gpio)
            .map_err(|e| TransportError::Gpio(format!("Failed to claim GPIO {}: {}", gpio, e)))?
            .into_io(PinMode::Input);

        // Leave the line floating once the handle is dropped
        pin.set_reset_on_drop(false);

        Ok(Self {
            pin: Some(pin),
            gpio,
        })
    }
}

impl EnableLine for RaspberryPiEnableLine {
    fn set_level(&mut self, level: LineLevel) -> Result<(), TransportError> {
        let pin = self
            .pin
            .as_mut()
            .ok_or_else(|| TransportError::Gpio(format!("GPIO {} already released", self.gpio)))?;

        match level {
            LineLevel::High => {
                pin.set_high();
                pin.set_mode(PinMode::Output);
            }
            LineLevel::Low => {
                pin.set_low();
                pin.set_mode(PinMode::Output);
            }
            LineLevel::HighZ => pin.set_mode(PinMode::Input),
        }

        debug!("Enable line GPIO {} -> {:?}", self.gpio, level);
        Ok(())
    }

    fn release(&mut self) -> Result<(), TransportError> {
        self.pin.take();
        Ok(())
    }
}
