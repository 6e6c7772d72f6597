//! Bus-side models that sit outside the bridge: a bit-banged I2C host that
//! drives the wires tick by tick, and an SPI peer that decodes what the
//! bridge clocks out.

pub mod i2c;
pub mod spi;

pub use i2c::{HostDrive, I2cFrame, I2cHost};
pub use spi::{SpiFrame, SpiPeer};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRate(pub f64); // Hz

impl SampleRate {
    pub fn seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / self.0
    }
}

/// Ticks covered by a decoded frame; `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSpan {
    pub start: u64,
    pub end: u64,
}

impl TickSpan {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn to_seconds(&self, rate: SampleRate) -> (f64, f64) {
        (rate.seconds(self.start), rate.seconds(self.end))
    }
}
