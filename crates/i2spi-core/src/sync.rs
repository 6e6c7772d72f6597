//! Input synchronizer and edge detector for the two I2C wires.
//!
//! A wire's stable level only changes once the last three samples agree,
//! so a glitch shorter than three ticks never produces an edge.

const HISTORY_MASK: u8 = 0b111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    Scl,
    Sda,
}

/// Bus framing conditions derived from the synchronized wires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCondition {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Line {
    history: u8,
    level: bool,
    rose: bool,
    fell: bool,
}

impl Line {
    /// Both wires float high through the bus pull-ups.
    const fn released() -> Self {
        Self {
            history: HISTORY_MASK,
            level: true,
            rose: false,
            fell: false,
        }
    }

    fn sample(&mut self, raw: bool) {
        self.history = (self.history << 1 | raw as u8) & HISTORY_MASK;
        self.rose = false;
        self.fell = false;
        match self.history {
            HISTORY_MASK if !self.level => {
                self.level = true;
                self.rose = true;
            }
            0 if self.level => {
                self.level = false;
                self.fell = true;
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSync {
    scl: Line,
    sda: Line,
}

impl Default for LineSync {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSync {
    pub const fn new() -> Self {
        Self {
            scl: Line::released(),
            sda: Line::released(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn sample(&mut self, scl: bool, sda: bool) {
        self.scl.sample(scl);
        self.sda.sample(sda);
    }

    pub fn stable(&self, wire: Wire) -> bool {
        self.line(wire).level
    }

    pub fn rising(&self, wire: Wire) -> bool {
        self.line(wire).rose
    }

    pub fn falling(&self, wire: Wire) -> bool {
        self.line(wire).fell
    }

    /// START or STOP: SDA moves while SCL has been held high.
    pub fn condition(&self) -> Option<BusCondition> {
        if !self.scl.level || self.scl.rose {
            return None;
        }
        if self.sda.fell {
            Some(BusCondition::Start)
        } else if self.sda.rose {
            Some(BusCondition::Stop)
        } else {
            None
        }
    }

    fn line(&self, wire: Wire) -> &Line {
        match wire {
            Wire::Scl => &self.scl,
            Wire::Sda => &self.sda,
        }
    }
}
