//! Mode-0 SPI controller for single-byte transfers.
//!
//! Timing is counted in half periods of `divisor` ticks: one for setup with
//! the MSB already on MOSI, sixteen for the eight clocks, one for hold.
//! Chip-select is therefore low for exactly `18 * divisor` ticks.

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Setup,
    Transfer,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiTransmitter {
    divisor: u16,
    state: TxState,
    ticks: u16,
    /// Bits sampled from MISO in the current transfer.
    bits: u8,
    tx_shift: u8,
    rx_shift: u8,
    received: u8,
    sclk: bool,
    mosi: bool,
    cs_n: bool,
    done: bool,
}

impl SpiTransmitter {
    pub fn new(divisor: u16) -> Self {
        Self {
            divisor: divisor.max(1),
            state: TxState::Idle,
            ticks: 0,
            bits: 0,
            tx_shift: 0,
            rx_shift: 0,
            received: 0,
            sclk: false,
            mosi: false,
            cs_n: true,
            done: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.divisor);
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == TxState::Idle
    }

    pub fn sclk(&self) -> bool {
        self.sclk
    }

    pub fn mosi(&self) -> bool {
        self.mosi
    }

    pub fn cs_n(&self) -> bool {
        self.cs_n
    }

    /// One-tick pulse at the end of the eighth bit.
    pub fn done(&self) -> bool {
        self.done
    }

    /// Byte being (or last) sent.
    pub fn sent(&self) -> u8 {
        self.tx_shift
    }

    /// Byte captured from MISO by the last completed transfer.
    pub fn received(&self) -> u8 {
        self.received
    }

    /// Advances one tick. `start` is ignored unless idle.
    pub fn step(&mut self, start: Option<u8>, miso: bool) {
        self.done = false;

        match self.state {
            TxState::Idle => {
                if let Some(byte) = start {
                    self.tx_shift = byte;
                    self.rx_shift = 0;
                    self.bits = 0;
                    self.ticks = 0;
                    self.cs_n = false;
                    self.mosi = byte & 0x80 != 0;
                    self.state = TxState::Setup;
                }
            }
            TxState::Setup => {
                if self.half_elapsed() {
                    self.rising(miso);
                    self.state = TxState::Transfer;
                }
            }
            TxState::Transfer => {
                if self.half_elapsed() {
                    if self.sclk {
                        self.sclk = false;
                        if self.bits < 8 {
                            self.mosi = (self.tx_shift << self.bits) & 0x80 != 0;
                        }
                    } else if self.bits == 8 {
                        self.received = self.rx_shift;
                        self.done = true;
                        self.state = TxState::Hold;
                        debug!("spi: sent {:#04x}, received {:#04x}", self.tx_shift, self.received);
                    } else {
                        self.rising(miso);
                    }
                }
            }
            TxState::Hold => {
                if self.half_elapsed() {
                    self.cs_n = true;
                    self.mosi = false;
                    self.state = TxState::Idle;
                }
            }
        }
    }

    fn rising(&mut self, miso: bool) {
        self.sclk = true;
        self.rx_shift = self.rx_shift << 1 | miso as u8;
        self.bits += 1;
    }

    fn half_elapsed(&mut self) -> bool {
        if self.ticks + 1 >= self.divisor {
            self.ticks = 0;
            true
        } else {
            self.ticks += 1;
            false
        }
    }
}
