//! Top-level lockstep step function.
//!
//! Every component is advanced once per [`Bridge::tick`], and every
//! component reads only what the others held *before* the tick. Signals
//! crossing a component boundary therefore take one tick.

use std::collections::VecDeque;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::BridgeConfig;
use crate::error::ConfigError;
use crate::queue::{ByteQueue, Push};
use crate::receiver::{I2cReceiver, ReceivedByte, RxEvent, RxState};
use crate::sequencer::{SeqState, Sequencer};
use crate::sync::LineSync;
use crate::transmitter::{SpiTransmitter, TxState};

/// Undrained events kept by a [`Bridge`]; older ones are discarded first.
pub const EVENT_BACKLOG: usize = 4096;

/// Sampled inputs for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inputs {
    pub scl: bool,
    pub sda: bool,
    pub miso: bool,
    pub reset: bool,
    pub enable: bool,
}

impl Inputs {
    /// Released I2C bus, clock enabled, reset deasserted.
    pub const IDLE: Self = Self::new(true, true, false);

    pub const fn new(scl: bool, sda: bool, miso: bool) -> Self {
        Self {
            scl,
            sda,
            miso,
            reset: false,
            enable: true,
        }
    }
}

/// Line drive for one tick. The two `*_pull` fields are open-drain
/// enables: asserted pulls the wire low, otherwise it floats high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outputs {
    pub scl_pull: bool,
    pub sda_pull: bool,
    pub sclk: bool,
    pub mosi: bool,
    pub cs_n: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub ticks: u64,
    pub resets: u64,
    /// Address phases acknowledged.
    pub transactions: u64,
    pub transactions_nacked: u64,
    pub bytes_received: u64,
    pub bytes_dropped: u64,
    pub spi_transfers: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    Matched { tick: u64, header: u8 },
    Nacked { tick: u64, header: u8 },
    Received { tick: u64, byte: ReceivedByte },
    Dropped { tick: u64, value: u8 },
    Transferred { tick: u64, sent: u8, received: u8 },
}

impl BridgeEvent {
    pub fn tick(&self) -> u64 {
        match *self {
            BridgeEvent::Matched { tick, .. }
            | BridgeEvent::Nacked { tick, .. }
            | BridgeEvent::Received { tick, .. }
            | BridgeEvent::Dropped { tick, .. }
            | BridgeEvent::Transferred { tick, .. } => tick,
        }
    }
}

pub struct Bridge {
    config: BridgeConfig,
    sync: LineSync,
    receiver: I2cReceiver,
    queue: ByteQueue,
    sequencer: Sequencer,
    transmitter: SpiTransmitter,
    stats: BridgeStats,
    events: VecDeque<BridgeEvent>,
    in_reset: bool,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            sync: LineSync::new(),
            receiver: I2cReceiver::new(config.address),
            queue: ByteQueue::new(),
            sequencer: Sequencer::new(),
            transmitter: SpiTransmitter::new(config.spi_divisor),
            stats: BridgeStats::default(),
            events: VecDeque::new(),
            in_reset: false,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn tick(&mut self, inputs: Inputs) -> Outputs {
        if inputs.reset {
            if !self.in_reset {
                debug!("reset asserted at tick {}", self.stats.ticks);
                self.stats.resets += 1;
            }
            self.in_reset = true;
            self.clear();
            return self.outputs();
        }
        self.in_reset = false;
        if !inputs.enable {
            return self.outputs();
        }

        let tick = self.stats.ticks;
        self.stats.ticks += 1;

        // Everything below reads the state as it was before this tick.
        let lines = self.sync;
        let rx_event = self.receiver.event();
        let take = self.sequencer.wants_byte();
        let trigger = self.sequencer.trigger();
        let spi_ready = self.transmitter.is_idle();
        let spi_done = self.transmitter.done();

        self.sync.sample(inputs.scl, inputs.sda);
        self.receiver.step(&lines);
        let incoming = match rx_event {
            Some(RxEvent::Byte(byte)) => Some(byte.value),
            _ => None,
        };
        let (popped, pushed) = self.queue.cycle(incoming, take);
        self.sequencer.step(popped, spi_ready, spi_done);
        self.transmitter.step(trigger, inputs.miso);

        self.record(tick, rx_event, pushed, spi_done);
        self.outputs()
    }

    pub fn outputs(&self) -> Outputs {
        Outputs {
            scl_pull: false,
            sda_pull: self.receiver.sda_pull(),
            sclk: self.transmitter.sclk(),
            mosi: self.transmitter.mosi(),
            cs_n: self.transmitter.cs_n(),
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Takes the events recorded since the last drain. Callers driving
    /// [`Bridge::tick`] directly should drain regularly: only the newest
    /// [`EVENT_BACKLOG`] events are kept. [`BridgeStats`] counts everything.
    pub fn drain_events(&mut self) -> std::collections::vec_deque::Drain<'_, BridgeEvent> {
        self.events.drain(..)
    }

    pub fn receiver_state(&self) -> RxState {
        self.receiver.state()
    }

    pub fn sequencer_state(&self) -> SeqState {
        self.sequencer.state()
    }

    pub fn transmitter_state(&self) -> TxState {
        self.transmitter.state()
    }

    pub fn queue(&self) -> &ByteQueue {
        &self.queue
    }

    /// Nothing received, queued or on the SPI side.
    pub fn is_quiescent(&self) -> bool {
        self.receiver.received().is_none()
            && self.queue.is_empty()
            && self.sequencer.state() == SeqState::Idle
            && self.transmitter.is_idle()
    }

    fn clear(&mut self) {
        self.sync.reset();
        self.receiver.reset();
        self.queue.clear();
        self.sequencer.reset();
        self.transmitter.reset();
    }

    fn push_event(&mut self, event: BridgeEvent) {
        if self.events.len() == EVENT_BACKLOG {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn record(&mut self, tick: u64, rx_event: Option<RxEvent>, pushed: Option<Push>, spi_done: bool) {
        match rx_event {
            Some(RxEvent::Matched { header }) => {
                self.stats.transactions += 1;
                self.push_event(BridgeEvent::Matched { tick, header });
            }
            Some(RxEvent::Nacked { header }) => {
                self.stats.transactions_nacked += 1;
                self.push_event(BridgeEvent::Nacked { tick, header });
            }
            Some(RxEvent::Byte(byte)) => {
                self.stats.bytes_received += 1;
                self.push_event(BridgeEvent::Received { tick, byte });
                if pushed == Some(Push::Dropped) {
                    warn!("queue full, dropped {:#04x}", byte.value);
                    self.stats.bytes_dropped += 1;
                    self.push_event(BridgeEvent::Dropped { tick, value: byte.value });
                }
            }
            None => {}
        }

        if spi_done {
            let sent = self.transmitter.sent();
            let received = self.transmitter.received();
            debug!("transfer {} complete: {:#04x}", self.stats.spi_transfers, sent);
            self.stats.spi_transfers += 1;
            self.push_event(BridgeEvent::Transferred { tick, sent, received });
        }
    }
}

#[cfg(test)]
mod bridge_tests {
    use super::*;

    fn bridge(divisor: u16) -> Bridge {
        Bridge::new(BridgeConfig {
            spi_divisor: divisor,
            ..Default::default()
        })
        .unwrap()
    }

    /// Holds the I2C wires for `ticks`, with SDA wired-AND against the bridge.
    fn hold(bridge: &mut Bridge, scl: bool, sda: bool, ticks: usize) {
        for _ in 0..ticks {
            let pull = bridge.outputs().sda_pull;
            bridge.tick(Inputs::new(scl, sda && !pull, false));
        }
    }

    fn send_byte(bridge: &mut Bridge, value: u8) {
        for bit in (0..8).rev() {
            let sda = (value >> bit) & 1 != 0;
            hold(bridge, false, sda, 6);
            hold(bridge, true, sda, 12);
            hold(bridge, false, sda, 6);
        }
        hold(bridge, false, true, 6);
        hold(bridge, true, true, 12);
        hold(bridge, false, true, 6);
    }

    fn start(bridge: &mut Bridge) {
        hold(bridge, true, true, 6);
        hold(bridge, true, false, 6);
        hold(bridge, false, false, 6);
    }

    fn assert_initial(bridge: &Bridge) {
        let fresh = super::Bridge::new(*bridge.config()).unwrap();
        assert_eq!(bridge.sync, fresh.sync);
        assert_eq!(bridge.receiver, fresh.receiver);
        assert_eq!(bridge.queue, fresh.queue);
        assert_eq!(bridge.sequencer, fresh.sequencer);
        assert_eq!(bridge.transmitter, fresh.transmitter);
        assert_eq!(bridge.outputs(), fresh.outputs());
    }

    #[test]
    fn rejects_invalid_config() {
        let result = Bridge::new(BridgeConfig {
            address: 0x90,
            ..Default::default()
        });

        assert!(matches!(result, Err(ConfigError::AddressOutOfRange(0x90))));
    }

    #[test]
    fn initial_outputs_released() {
        let bridge = bridge(4);

        assert_eq!(
            bridge.outputs(),
            Outputs {
                scl_pull: false,
                sda_pull: false,
                sclk: false,
                mosi: false,
                cs_n: true,
            }
        );
        assert!(bridge.is_quiescent());
    }

    #[test]
    fn data_byte_reaches_spi() {
        // Arrange
        let mut bridge = bridge(1);
        start(&mut bridge);
        send_byte(&mut bridge, 0x50);

        // Act
        send_byte(&mut bridge, 0x3c);
        hold(&mut bridge, false, true, 40);

        // Assert
        let stats = bridge.stats();
        assert_eq!(stats.transactions, 1);
        assert_eq!(stats.bytes_received, 1);
        assert_eq!(stats.spi_transfers, 1);
        let sent: Vec<u8> = bridge
            .drain_events()
            .filter_map(|e| match e {
                BridgeEvent::Transferred { sent, .. } => Some(sent),
                _ => None,
            })
            .collect();
        assert_eq!(sent, vec![0x3c]);
        assert!(bridge.is_quiescent());
    }

    #[test]
    fn reset_from_any_point_restores_initial_state() {
        for stop_at in [0usize, 20, 150, 500, 700] {
            // Arrange
            let mut bridge = bridge(3);
            start(&mut bridge);
            send_byte(&mut bridge, 0x50);
            send_byte(&mut bridge, 0xA5);
            hold(&mut bridge, false, true, stop_at);

            // Act
            bridge.tick(Inputs { reset: true, ..Inputs::IDLE });

            // Assert
            assert_initial(&bridge);
            assert_eq!(bridge.stats().resets, 1);
        }
    }

    #[test]
    fn held_reset_counts_once() {
        let mut bridge = bridge(2);

        for _ in 0..5 {
            bridge.tick(Inputs { reset: true, ..Inputs::IDLE });
        }
        bridge.tick(Inputs::IDLE);
        bridge.tick(Inputs { reset: true, ..Inputs::IDLE });

        assert_eq!(bridge.stats().resets, 2);
        assert_eq!(bridge.stats().ticks, 1);
    }

    #[test]
    fn undrained_events_are_capped() {
        // Arrange
        let mut bridge = bridge(1);
        start(&mut bridge);
        send_byte(&mut bridge, 0x50);

        // Act
        let sent = EVENT_BACKLOG as u64 + 3;
        for i in 0..sent {
            send_byte(&mut bridge, i as u8);
        }
        hold(&mut bridge, false, true, 40);

        // Assert
        let events: Vec<BridgeEvent> = bridge.drain_events().collect();
        assert_eq!(events.len(), EVENT_BACKLOG);
        assert!(matches!(
            events.last(),
            Some(BridgeEvent::Transferred { sent: last, .. }) if *last == (sent - 1) as u8
        ));
        assert_eq!(bridge.stats().bytes_received, sent);
        assert_eq!(bridge.drain_events().count(), 0);
    }

    #[test]
    fn sda_glitch_is_not_a_start() {
        // Arrange
        let mut bridge = bridge(2);
        hold(&mut bridge, true, true, 6);

        // Act
        hold(&mut bridge, true, false, 2);
        hold(&mut bridge, true, true, 6);

        // Assert
        assert_eq!(bridge.receiver_state(), RxState::Idle);
        assert_initial(&bridge);
    }

    #[test]
    fn reset_wins_over_disabled_clock() {
        // Arrange
        let mut bridge = bridge(2);
        start(&mut bridge);

        // Act
        bridge.tick(Inputs {
            reset: true,
            enable: false,
            ..Inputs::IDLE
        });

        // Assert
        assert_initial(&bridge);
    }

    #[test]
    fn disabled_clock_holds_state() {
        // Arrange
        let mut bridge = bridge(2);
        start(&mut bridge);
        let before = (bridge.receiver.clone(), bridge.sync, bridge.outputs(), bridge.stats());

        // Act
        for _ in 0..10 {
            bridge.tick(Inputs {
                enable: false,
                ..Inputs::new(false, true, false)
            });
        }

        // Assert
        assert_eq!((bridge.receiver.clone(), bridge.sync, bridge.outputs(), bridge.stats()), before);
    }

    #[test]
    fn wrong_address_never_touches_spi() {
        // Arrange
        let mut bridge = bridge(1);
        start(&mut bridge);

        // Act
        send_byte(&mut bridge, 0x55 << 1);
        send_byte(&mut bridge, 0x01);
        hold(&mut bridge, false, true, 40);

        // Assert
        assert_eq!(bridge.receiver_state(), RxState::Nack);
        assert_eq!(bridge.stats().transactions_nacked, 1);
        assert_eq!(bridge.stats().bytes_received, 0);
        assert!(bridge.queue().is_empty());
        assert_eq!(bridge.stats().spi_transfers, 0);
    }
}
