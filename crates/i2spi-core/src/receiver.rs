//! I2C write-only peripheral state machine.
//!
//! Works purely on the synchronized wires from [`LineSync`]. Bits are
//! sampled on SCL rising edges. The acknowledge pull is applied after the
//! eighth falling edge and released after the ninth, so SDA never moves
//! while SCL is high.

use log::{debug, info};

use crate::sync::{BusCondition, LineSync, Wire};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedByte {
    pub value: u8,
    /// First data byte since START: the target register on the SPI side.
    pub is_register: bool,
}

/// Per-tick pulse describing what the receiver just did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    Matched { header: u8 },
    Nacked { header: u8 },
    Byte(ReceivedByte),
}

/// Progress through the ninth (acknowledge) clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPhase {
    /// Byte complete, waiting for SCL to drop before pulling SDA.
    Pending,
    /// SDA pulled, waiting for the host to raise SCL.
    Driven,
    /// Host has clocked the ACK; release on the next falling edge.
    Clocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Idle,
    Address,
    AckAddr(AckPhase),
    Data,
    AckData(AckPhase),
    Nack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cReceiver {
    address: u8,
    state: RxState,
    shift: u8,
    bits: u8,
    first_data: bool,
    active: bool,
    sda_pull: bool,
    event: Option<RxEvent>,
}

impl I2cReceiver {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            state: RxState::Idle,
            shift: 0,
            bits: 0,
            first_data: false,
            active: false,
            sda_pull: false,
            event: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.address);
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// Transaction open between START and STOP.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Open-drain enable for SDA.
    pub fn sda_pull(&self) -> bool {
        self.sda_pull
    }

    pub fn event(&self) -> Option<RxEvent> {
        self.event
    }

    pub fn received(&self) -> Option<ReceivedByte> {
        match self.event {
            Some(RxEvent::Byte(byte)) => Some(byte),
            _ => None,
        }
    }

    pub fn step(&mut self, lines: &LineSync) {
        self.event = None;

        match lines.condition() {
            Some(BusCondition::Start) => {
                if self.active {
                    debug!("i2c: repeated start");
                } else {
                    debug!("i2c: start");
                }
                self.begin();
                return;
            }
            Some(BusCondition::Stop) => {
                debug!("i2c: stop");
                self.state = RxState::Idle;
                self.active = false;
                self.sda_pull = false;
                return;
            }
            None => {}
        }

        let rose = lines.rising(Wire::Scl);
        let fell = lines.falling(Wire::Scl);
        let sda = lines.stable(Wire::Sda);

        self.state = match self.state {
            RxState::Idle => RxState::Idle,
            RxState::Address => match self.clock_in(rose, sda) {
                Some(header) => self.check_header(header),
                None => RxState::Address,
            },
            RxState::AckAddr(phase) => match self.acknowledge(phase, rose, fell) {
                Some(next) => RxState::AckAddr(next),
                None => RxState::Data,
            },
            RxState::Data => match self.clock_in(rose, sda) {
                Some(value) => {
                    let byte = ReceivedByte {
                        value,
                        is_register: std::mem::take(&mut self.first_data),
                    };
                    debug!("i2c: received {:#04x} (register: {})", value, byte.is_register);
                    self.event = Some(RxEvent::Byte(byte));
                    RxState::AckData(AckPhase::Pending)
                }
                None => RxState::Data,
            },
            RxState::AckData(phase) => match self.acknowledge(phase, rose, fell) {
                Some(next) => RxState::AckData(next),
                None => RxState::Data,
            },
            RxState::Nack => {
                self.sda_pull = false;
                RxState::Nack
            }
        };
    }

    fn begin(&mut self) {
        self.state = RxState::Address;
        self.shift = 0;
        self.bits = 0;
        self.first_data = true;
        self.active = true;
        self.sda_pull = false;
    }

    fn clock_in(&mut self, rose: bool, sda: bool) -> Option<u8> {
        if !rose {
            return None;
        }
        self.shift = self.shift << 1 | sda as u8;
        self.bits += 1;
        if self.bits < 8 {
            return None;
        }
        self.bits = 0;
        Some(std::mem::take(&mut self.shift))
    }

    fn check_header(&mut self, header: u8) -> RxState {
        let write = header & 0x1 == 0;
        if header >> 1 == self.address && write {
            debug!("i2c: address {:#04x} matched", self.address);
            self.event = Some(RxEvent::Matched { header });
            RxState::AckAddr(AckPhase::Pending)
        } else {
            info!(
                "i2c: not acknowledging {:#04x} ({})",
                header >> 1,
                if write { "write" } else { "read" }
            );
            self.event = Some(RxEvent::Nacked { header });
            RxState::Nack
        }
    }

    /// Returns the next phase, or `None` once the acknowledge clock is over.
    fn acknowledge(&mut self, phase: AckPhase, rose: bool, fell: bool) -> Option<AckPhase> {
        match phase {
            AckPhase::Pending if fell => {
                self.sda_pull = true;
                Some(AckPhase::Driven)
            }
            AckPhase::Driven if rose => Some(AckPhase::Clocked),
            AckPhase::Clocked if fell => {
                self.sda_pull = false;
                self.bits = 0;
                self.shift = 0;
                None
            }
            _ => Some(phase),
        }
    }
}
