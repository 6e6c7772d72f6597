//! Mode-0 SPI peer: decodes chip-select framed bytes and answers on MISO.

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::TickSpan;

/// One chip-select pulse as seen by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiFrame {
    pub cpol: bool,
    pub cpha: bool,
    pub bytes: Vec<u8>,
    /// SCLK rising edges seen while selected.
    pub bits: u32,
    /// Ticks with chip-select low.
    pub span: TickSpan,
    /// Byte shifted back to the controller.
    pub response: u8,
    /// SCLK idled low at both chip-select edges and exactly one byte was clocked.
    pub clean: bool,
}

impl SpiFrame {
    pub fn byte(&self) -> Option<u8> {
        match self.bytes.as_slice() {
            [b] => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Selected {
    start: u64,
    shift: u8,
    bits: u32,
    response: u8,
    sent: u32,
    clean: bool,
}

pub struct SpiPeer {
    responses: VecDeque<u8>,
    default_response: u8,
    tick: u64,
    prev_sclk: bool,
    prev_cs_n: bool,
    miso: bool,
    selected: Option<Selected>,
    frames: Vec<SpiFrame>,
}

impl Default for SpiPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiPeer {
    pub fn new() -> Self {
        Self {
            responses: VecDeque::new(),
            default_response: 0x00,
            tick: 0,
            prev_sclk: false,
            prev_cs_n: true,
            miso: false,
            selected: None,
            frames: Vec::new(),
        }
    }

    /// Bytes to answer with, one per frame; once exhausted the peer answers 0x00.
    pub fn with_responses(responses: impl IntoIterator<Item = u8>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            ..Self::new()
        }
    }

    pub fn miso(&self) -> bool {
        self.miso
    }

    pub fn is_selected(&self) -> bool {
        self.selected.is_some()
    }

    /// Feeds the controller's outputs for one tick.
    pub fn observe(&mut self, sclk: bool, mosi: bool, cs_n: bool) {
        if self.prev_cs_n && !cs_n {
            let response = self.responses.pop_front().unwrap_or(self.default_response);
            self.selected = Some(Selected {
                start: self.tick,
                shift: 0,
                bits: 0,
                response,
                sent: 1,
                clean: !sclk,
            });
            self.miso = response & 0x80 != 0;
        }

        if let Some(sel) = self.selected.as_mut() {
            if !cs_n {
                if sclk && !self.prev_sclk {
                    sel.shift = sel.shift << 1 | mosi as u8;
                    sel.bits += 1;
                } else if !sclk && self.prev_sclk && sel.sent < 8 {
                    self.miso = (sel.response << sel.sent) & 0x80 != 0;
                    sel.sent += 1;
                }
            } else {
                self.finish(!sclk);
            }
        }

        self.prev_sclk = sclk;
        self.prev_cs_n = cs_n;
        self.tick += 1;
    }

    pub fn frames(&self) -> &[SpiFrame] {
        &self.frames
    }

    pub fn take_frames(&mut self) -> Vec<SpiFrame> {
        std::mem::take(&mut self.frames)
    }

    fn finish(&mut self, sclk_low: bool) {
        let Some(sel) = self.selected.take() else {
            return;
        };
        let frame = SpiFrame {
            cpol: false,
            cpha: false,
            bytes: if sel.bits >= 8 { vec![sel.shift] } else { Vec::new() },
            bits: sel.bits,
            span: TickSpan {
                start: sel.start,
                end: self.tick,
            },
            response: sel.response,
            clean: sel.clean && sclk_low && sel.bits == 8,
        };
        debug!(
            "spi peer: frame {:02X?} ({} bits, {} ticks)",
            frame.bytes,
            frame.bits,
            frame.span.len()
        );
        self.frames.push(frame);
        self.miso = false;
    }
}

#[cfg(test)]
mod spi_tests {
    use super::*;

    /// Clocks `byte` out as a mode-0 controller with `half` ticks per half period.
    fn clock_out(peer: &mut SpiPeer, byte: u8, half: usize) -> u8 {
        let mut rx = 0u8;
        peer.observe(false, false, true);
        for bit in (0..8).rev() {
            let mosi = (byte >> bit) & 1 != 0;
            for _ in 0..half {
                peer.observe(false, mosi, false);
            }
            rx = rx << 1 | peer.miso() as u8;
            for _ in 0..half {
                peer.observe(true, mosi, false);
            }
        }
        for _ in 0..half {
            peer.observe(false, false, false);
        }
        peer.observe(false, false, true);
        rx
    }

    #[test]
    fn decodes_one_byte_per_chip_select() {
        // Arrange
        let mut peer = SpiPeer::new();

        // Act
        clock_out(&mut peer, 0xA5, 2);
        clock_out(&mut peer, 0x01, 2);

        // Assert
        let frames = peer.take_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].byte(), Some(0xA5));
        assert_eq!(frames[1].byte(), Some(0x01));
        assert!(frames.iter().all(|f| f.clean && f.bits == 8));
    }

    #[test]
    fn answers_msb_first() {
        // Arrange
        let mut peer = SpiPeer::with_responses([0xC3]);

        // Act
        let rx = clock_out(&mut peer, 0x00, 1);

        // Assert
        assert_eq!(rx, 0xC3);
        assert_eq!(peer.frames()[0].response, 0xC3);
        assert!(!peer.miso());
    }

    #[test]
    fn short_frame_is_not_clean() {
        // Arrange
        let mut peer = SpiPeer::new();

        // Act
        peer.observe(false, false, false);
        peer.observe(true, true, false);
        peer.observe(false, true, false);
        peer.observe(false, false, true);

        // Assert
        let frame = &peer.frames()[0];
        assert_eq!(frame.bits, 1);
        assert_eq!(frame.byte(), None);
        assert!(!frame.clean);
        assert_eq!(frame.span, TickSpan { start: 0, end: 3 });
    }
}
