use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_ADDRESS: u8 = 0x28;
pub const DEFAULT_SPI_DIVISOR: u16 = 4;
pub const QUEUE_CAPACITY: usize = 8;
/// System clock the tick counts are measured against.
pub const TICK_RATE_HZ: u32 = 10_000_000;
/// 40 ticks per I2C bit at the default tick rate, 250 kHz.
pub const DEFAULT_I2C_HALF_PERIOD: u32 = 20;
/// Shortest SCL half period that still leaves the ACK pull settled on the
/// bus before the host samples it: three debounce samples plus one tick of
/// output latency have to fit in the two low halves around the ACK slot.
pub const MIN_I2C_HALF_PERIOD: u32 = 2;

/// Build-time constants of the bridge. There is no way to change them on a
/// running [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// 7-bit peripheral address.
    pub address: u8,
    /// SPI half period in ticks.
    pub spi_divisor: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            spi_divisor: DEFAULT_SPI_DIVISOR,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.address {
            0x80..=0xff => return Err(ConfigError::AddressOutOfRange(self.address)),
            0x00..=0x07 | 0x78..=0x7f => return Err(ConfigError::ReservedAddress(self.address)),
            _ => {}
        }
        if self.spi_divisor == 0 {
            return Err(ConfigError::ZeroDivisor);
        }
        Ok(())
    }

    pub fn spi_clock_hz(&self) -> f64 {
        TICK_RATE_HZ as f64 / (2.0 * self.spi_divisor as f64)
    }

    /// Chip-select low time of one transfer: setup, eight bits, hold.
    pub fn frame_ticks(&self) -> u64 {
        18 * self.spi_divisor as u64
    }
}

/// Settings for a [`Testbench`](crate::Testbench) around the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub bridge: BridgeConfig,
    pub i2c_half_period: u32,
    /// Bytes the SPI peer answers with, one per transfer.
    pub peer_responses: Vec<u8>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            i2c_half_period: DEFAULT_I2C_HALF_PERIOD,
            peer_responses: Vec::new(),
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bridge.validate()?;
        if self.i2c_half_period < MIN_I2C_HALF_PERIOD {
            return Err(ConfigError::HalfPeriodTooShort {
                half_period: self.i2c_half_period,
                min: MIN_I2C_HALF_PERIOD,
            });
        }
        Ok(())
    }
}
