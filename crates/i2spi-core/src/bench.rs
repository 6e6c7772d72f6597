//! Bridge wired to an I2C host and an SPI peer.
//!
//! The I2C wires are open drain: each one reads high only while neither the
//! host nor the bridge pulls it low. Bridge outputs reach the bus one tick
//! after they are produced.

use i2spi_decode::{I2cFrame, I2cHost, SpiFrame, SpiPeer};

use crate::bridge::{Bridge, BridgeEvent, BridgeStats, Inputs, Outputs};
use crate::config::BenchConfig;
use crate::error::ConfigError;

pub struct Testbench {
    config: BenchConfig,
    bridge: Bridge,
    host: I2cHost,
    peer: SpiPeer,
    outputs: Outputs,
    reset_ticks: u64,
    events: Vec<BridgeEvent>,
}

impl Testbench {
    pub fn new(config: BenchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bridge = Bridge::new(config.bridge)?;
        let outputs = bridge.outputs();
        Ok(Self {
            host: I2cHost::new(config.i2c_half_period),
            peer: SpiPeer::with_responses(config.peer_responses.iter().copied()),
            config,
            bridge,
            outputs,
            reset_ticks: 0,
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Queues a write transaction to `address`.
    pub fn write(&mut self, address: u8, data: &[u8]) {
        self.host.write(address, data);
    }

    /// Queues a write that ends without STOP.
    pub fn write_held(&mut self, address: u8, data: &[u8]) {
        self.host.write_held(address, data);
    }

    /// Queues a transaction with an explicit header byte.
    pub fn transaction(&mut self, header: u8, data: &[u8]) {
        self.host.transaction(header, data);
    }

    /// Holds reset for the next `ticks` ticks.
    pub fn hold_reset(&mut self, ticks: u64) {
        self.reset_ticks = ticks;
    }

    pub fn step(&mut self) {
        let drive = self.host.drive();
        let scl = drive.scl && !self.outputs.scl_pull;
        let sda = drive.sda && !self.outputs.sda_pull;
        let inputs = Inputs {
            reset: self.reset_ticks > 0,
            ..Inputs::new(scl, sda, self.peer.miso())
        };
        self.reset_ticks = self.reset_ticks.saturating_sub(1);

        self.outputs = self.bridge.tick(inputs);
        self.host.advance(sda);
        self.peer.observe(self.outputs.sclk, self.outputs.mosi, self.outputs.cs_n);
        self.events.extend(self.bridge.drain_events());
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Host finished, bridge drained and peer deselected.
    pub fn is_idle(&self) -> bool {
        self.host.is_idle() && self.bridge.is_quiescent() && !self.peer.is_selected() && self.reset_ticks == 0
    }

    /// Steps until idle; returns `false` if `limit` ticks pass first.
    pub fn run_until_idle(&mut self, limit: u64) -> bool {
        for _ in 0..limit {
            if self.is_idle() {
                return true;
            }
            self.step();
        }
        self.is_idle()
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn outputs(&self) -> Outputs {
        self.outputs
    }

    pub fn stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    pub fn i2c_frames(&self) -> &[I2cFrame] {
        self.host.frames()
    }

    pub fn spi_frames(&self) -> &[SpiFrame] {
        self.peer.frames()
    }

    pub fn take_i2c_frames(&mut self) -> Vec<I2cFrame> {
        self.host.take_frames()
    }

    pub fn take_spi_frames(&mut self) -> Vec<SpiFrame> {
        self.peer.take_frames()
    }

    pub fn events(&self) -> &[BridgeEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.events)
    }
}
