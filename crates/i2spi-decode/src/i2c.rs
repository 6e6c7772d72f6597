//! Bit-banged I2C host.
//!
//! The host owns only its own drive levels. The bench combines them with
//! whatever the peripheral pulls low (open drain), and feeds the resulting
//! SDA level back through [`I2cHost::advance`] so ACK slots can be sampled.

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

/// One transaction as the host saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct I2cFrame {
    pub address: u8,
    pub rw: bool,
    pub data: Vec<u8>,
    /// Header byte acknowledged.
    pub acked: bool,
    /// One entry per data byte actually clocked out.
    pub data_acks: Vec<bool>,
}

impl I2cFrame {
    fn open(header: u8) -> Self {
        Self {
            address: header >> 1,
            rw: header & 0x1 != 0,
            data: Vec::new(),
            acked: false,
            data_acks: Vec::new(),
        }
    }

    /// Every byte, header included, was acknowledged.
    pub fn fully_acked(&self) -> bool {
        self.acked && self.data_acks.iter().all(|&ack| ack)
    }
}

/// Levels the host applies this tick; `true` releases the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostDrive {
    pub scl: bool,
    pub sda: bool,
}

impl HostDrive {
    pub const IDLE: Self = Self::new(true, true);

    const fn new(scl: bool, sda: bool) -> Self {
        Self { scl, sda }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Start,
    Header(u8),
    Data(u8),
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    drive: HostDrive,
    remaining: u32,
    sample_ack: bool,
}

pub struct I2cHost {
    half: u32,
    ops: VecDeque<Op>,
    segments: VecDeque<Segment>,
    current: Option<Segment>,
    frame: Option<I2cFrame>,
    awaiting_header_ack: bool,
    frames: Vec<I2cFrame>,
}

impl I2cHost {
    /// `half_period` is the number of ticks per SCL half period.
    pub fn new(half_period: u32) -> Self {
        Self {
            half: half_period.max(1),
            ops: VecDeque::new(),
            segments: VecDeque::new(),
            current: None,
            frame: None,
            awaiting_header_ack: false,
            frames: Vec::new(),
        }
    }

    /// Queues START, `address`+W, each byte of `data`, STOP.
    pub fn write(&mut self, address: u8, data: &[u8]) {
        self.transaction((address & 0x7f) << 1, data);
    }

    /// Queues a transaction with an explicit header byte, read bit included.
    pub fn transaction(&mut self, header: u8, data: &[u8]) {
        self.ops.push_back(Op::Start);
        self.ops.push_back(Op::Header(header));
        self.ops.extend(data.iter().map(|&b| Op::Data(b)));
        self.ops.push_back(Op::Stop);
    }

    /// Queues START, `address`+W and `data` but no STOP, so the next queued
    /// transaction opens with a repeated START.
    pub fn write_held(&mut self, address: u8, data: &[u8]) {
        self.ops.push_back(Op::Start);
        self.ops.push_back(Op::Header((address & 0x7f) << 1));
        self.ops.extend(data.iter().map(|&b| Op::Data(b)));
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.segments.is_empty() && self.ops.is_empty()
    }

    /// Drive levels for the current tick.
    pub fn drive(&self) -> HostDrive {
        self.current.map(|s| s.drive).unwrap_or(HostDrive::IDLE)
    }

    /// Ends the current tick. `sda_line` is the resolved bus level this tick.
    pub fn advance(&mut self, sda_line: bool) {
        if let Some(seg) = self.current.as_mut() {
            seg.remaining -= 1;
            if seg.remaining > 0 {
                return;
            }
            let sample_ack = seg.sample_ack;
            self.current = None;
            if sample_ack {
                self.record_ack(!sda_line);
            }
        }
        self.current = self.next_segment();
    }

    pub fn frames(&self) -> &[I2cFrame] {
        &self.frames
    }

    pub fn take_frames(&mut self) -> Vec<I2cFrame> {
        std::mem::take(&mut self.frames)
    }

    fn next_segment(&mut self) -> Option<Segment> {
        while self.segments.is_empty() {
            let op = self.ops.pop_front()?;
            self.expand(op);
        }
        self.segments.pop_front()
    }

    fn expand(&mut self, op: Op) {
        match op {
            Op::Start => {
                if let Some(frame) = self.frame.take() {
                    debug!("i2c host: repeated start after {:#04x}", frame.address);
                    self.frames.push(frame);
                }
                self.push(true, true, 1);
                self.push(true, false, 1);
                self.push(false, false, 1);
            }
            Op::Header(header) => {
                self.frame = Some(I2cFrame::open(header));
                self.awaiting_header_ack = true;
                self.push_byte(header);
            }
            Op::Data(byte) => {
                if let Some(frame) = self.frame.as_mut() {
                    frame.data.push(byte);
                }
                self.push_byte(byte);
            }
            Op::Stop => {
                self.push(false, false, 1);
                self.push(true, false, 1);
                self.push(true, true, 1);
                if let Some(frame) = self.frame.take() {
                    self.frames.push(frame);
                }
            }
        }
    }

    fn push_byte(&mut self, byte: u8) {
        for bit in (0..8).rev() {
            let sda = (byte >> bit) & 0x1 != 0;
            self.push(false, sda, 1);
            self.push(true, sda, 2);
            self.push(false, sda, 1);
        }
        // ACK slot: released SDA, sampled at the end of the first high half.
        self.push(false, true, 1);
        self.segments.push_back(Segment {
            drive: HostDrive::new(true, true),
            remaining: self.half,
            sample_ack: true,
        });
        self.push(true, true, 1);
        self.push(false, true, 1);
    }

    fn push(&mut self, scl: bool, sda: bool, halves: u32) {
        self.segments.push_back(Segment {
            drive: HostDrive::new(scl, sda),
            remaining: self.half * halves,
            sample_ack: false,
        });
    }

    fn record_ack(&mut self, acked: bool) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        if std::mem::take(&mut self.awaiting_header_ack) {
            frame.acked = acked;
        } else {
            frame.data_acks.push(acked);
        }
        if !acked {
            debug!("i2c host: NACK from {:#04x}, abandoning transaction", frame.address);
            while matches!(self.ops.front(), Some(Op::Data(_))) {
                self.ops.pop_front();
            }
        }
    }
}
