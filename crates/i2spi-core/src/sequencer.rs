/// Stages of moving one queued byte into the SPI transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqState {
    Idle,
    Load,
    Wait,
}

/// Drains the byte queue into the SPI transmitter, one transfer in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequencer {
    state: SeqState,
    pending: u8,
    start: bool,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub const fn new() -> Self {
        Self {
            state: SeqState::Idle,
            pending: 0,
            start: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> SeqState {
        self.state
    }

    /// Ready to take the next byte off the queue this tick.
    pub fn wants_byte(&self) -> bool {
        self.state == SeqState::Idle
    }

    /// Start trigger with its payload, high for exactly one tick.
    pub fn trigger(&self) -> Option<u8> {
        self.start.then_some(self.pending)
    }

    /// `popped` is the byte the queue handed over this tick, `spi_ready` and
    /// `spi_done` the transmitter's outputs from the previous tick.
    pub fn step(&mut self, popped: Option<u8>, spi_ready: bool, spi_done: bool) {
        self.start = false;
        self.state = match self.state {
            SeqState::Idle => match popped {
                Some(byte) => {
                    self.pending = byte;
                    SeqState::Load
                }
                None => SeqState::Idle,
            },
            // Hold the trigger back while the previous transfer is still in
            // its chip-select hold.
            SeqState::Load if spi_ready => {
                self.start = true;
                SeqState::Wait
            }
            SeqState::Load => SeqState::Load,
            SeqState::Wait if spi_done => SeqState::Idle,
            SeqState::Wait => SeqState::Wait,
        };
    }
}

#[cfg(test)]
mod sequencer_tests {
    use super::*;

    #[test]
    fn idle_without_bytes() {
        let mut seq = Sequencer::new();

        seq.step(None, true, false);

        assert_eq!(seq.state(), SeqState::Idle);
        assert_eq!(seq.trigger(), None);
    }

    #[test]
    fn load_wait_idle() {
        // Arrange
        let mut seq = Sequencer::new();

        // Act & Assert
        seq.step(Some(0xA5), true, false);
        assert_eq!(seq.state(), SeqState::Load);
        assert_eq!(seq.trigger(), None);

        seq.step(None, true, false);
        assert_eq!(seq.state(), SeqState::Wait);
        assert_eq!(seq.trigger(), Some(0xA5));
        assert!(!seq.wants_byte());

        seq.step(None, false, false);
        assert_eq!(seq.trigger(), None);
        assert_eq!(seq.state(), SeqState::Wait);

        seq.step(None, false, true);
        assert_eq!(seq.state(), SeqState::Idle);
        assert!(seq.wants_byte());
    }

    #[test]
    fn load_waits_for_transmitter() {
        // Arrange
        let mut seq = Sequencer::new();
        seq.step(Some(0x01), false, false);

        // Act
        seq.step(None, false, false);
        seq.step(None, false, false);

        // Assert
        assert_eq!(seq.state(), SeqState::Load);
        assert_eq!(seq.trigger(), None);

        seq.step(None, true, false);
        assert_eq!(seq.trigger(), Some(0x01));
    }
}
