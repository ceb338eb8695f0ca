//! ADS1015 arc-voltage sensor
//!
//! 12-bit I2C ADC wired to the plasma torch voltage divider. The
//! device free-runs in continuous conversion mode; each read fetches
//! the latest conversion from register 0.

use arcstep_core::traits::{ArcVoltageSensor, SensorError};
use arcstep_hal::I2cBus;

/// Fixed 7-bit bus address (ADDR pin to ground)
pub const ADDRESS: u8 = 0x48;

/// Conversion register
const REG_CONVERSION: u8 = 0x00;

/// Config-register write: AIN0/AIN1 differential, +-2.048V range,
/// continuous conversion, 3300 SPS
const CONFIG: [u8; 3] = [0x01, 0x42, 0x63];

/// Sample value corresponding to the target torch height
const MIDSCALE: i32 = 1024;

/// ADS1015 on a shared I2C bus
pub struct Ads1015<B> {
    bus: B,
}

impl<B: I2cBus> Ads1015<B> {
    /// Bring the converter up in continuous mode.
    ///
    /// The bus must already be configured for 400 kHz fast mode
    /// ([`arcstep_hal::I2cConfig::FAST`]).
    pub fn new(bus: B) -> Result<Self, SensorError> {
        let mut sensor = Self { bus };
        sensor
            .bus
            .write(ADDRESS, &CONFIG)
            .map_err(|_| SensorError::Bus)?;
        Ok(sensor)
    }

    /// Latest 12-bit conversion (left-aligned on the wire)
    pub fn read_raw(&mut self) -> Result<u16, SensorError> {
        let mut reading = [0u8; 2];
        self.bus
            .write_read(ADDRESS, &[REG_CONVERSION], &mut reading)
            .map_err(|_| SensorError::Bus)?;
        Ok((((reading[0] as u16) << 8) | reading[1] as u16) >> 4)
    }

    /// Release the bus handle
    pub fn release(self) -> B {
        self.bus
    }
}

impl<B: I2cBus> ArcVoltageSensor for Ads1015<B> {
    fn read_sample(&mut self) -> Result<i32, SensorError> {
        Ok(self.read_raw()? as i32 - MIDSCALE)
    }
}
