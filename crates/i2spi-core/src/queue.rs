use crate::config::QUEUE_CAPACITY;

/// Outcome of offering a byte to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Queued,
    /// Queue was full; the incoming byte is gone and the queued ones are untouched.
    Dropped,
}

/// Fixed-capacity FIFO between the I2C receiver and the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteQueue {
    slots: [u8; QUEUE_CAPACITY],
    write: usize,
    read: usize,
    len: usize,
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteQueue {
    pub const fn new() -> Self {
        Self {
            slots: [0; QUEUE_CAPACITY],
            write: 0,
            read: 0,
            len: 0,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == QUEUE_CAPACITY
    }

    pub fn push(&mut self, byte: u8) -> Push {
        if self.is_full() {
            return Push::Dropped;
        }
        self.slots[self.write] = byte;
        self.write = (self.write + 1) % QUEUE_CAPACITY;
        self.len += 1;
        self.check();
        Push::Queued
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.slots[self.read];
        self.read = (self.read + 1) % QUEUE_CAPACITY;
        self.len -= 1;
        self.check();
        Some(byte)
    }

    /// One clock of simultaneous write and read. Both sides act on the
    /// occupancy from before this tick: a full queue drops the incoming byte
    /// even when a byte leaves in the same tick, and a byte written this tick
    /// cannot be read until the next.
    pub fn cycle(&mut self, incoming: Option<u8>, take: bool) -> (Option<u8>, Option<Push>) {
        let was_full = self.is_full();
        let popped = if take { self.pop() } else { None };
        let pushed = incoming.map(|byte| if was_full { Push::Dropped } else { self.push(byte) });
        (popped, pushed)
    }

    /// Queued bytes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len).map(move |i| self.slots[(self.read + i) % QUEUE_CAPACITY])
    }

    fn check(&self) {
        debug_assert!(self.len <= QUEUE_CAPACITY);
        debug_assert_eq!(
            (self.read + self.len) % QUEUE_CAPACITY,
            self.write,
            "occupancy out of step with cursors"
        );
    }
}
