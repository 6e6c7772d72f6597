use std::collections::VecDeque;

use crate::bridge::BridgeEvent;
use crate::config::TICK_RATE_HZ;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub tick: u64,
    pub direction: Direction,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Byte accepted from the I2C host.
    Rx,
    /// Byte clocked out to the SPI peer.
    Tx,
    /// Byte lost to a full queue.
    Dropped,
    /// Header byte the bridge refused.
    Nack,
}

impl Direction {
    fn prefix(&self) -> &'static str {
        match self {
            Direction::Rx => "RX: ",
            Direction::Tx => "TX: ",
            Direction::Dropped => "DROP: ",
            Direction::Nack => "NACK: ",
        }
    }
}

pub struct LogStore {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    filter_rx: bool,
    filter_tx: bool,
}

impl LogStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
            filter_rx: true,
            filter_tx: true,
        }
    }

    pub fn set_filter(&mut self, show_rx: bool, show_tx: bool) {
        self.filter_rx = show_rx;
        self.filter_tx = show_tx;
    }

    pub fn push(&mut self, tick: u64, direction: Direction, data: Vec<u8>) {
        self.entries.push_back(LogEntry {
            tick,
            direction,
            data,
        });

        if self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn record(&mut self, event: &BridgeEvent) {
        match *event {
            BridgeEvent::Received { tick, byte } => self.push(tick, Direction::Rx, vec![byte.value]),
            BridgeEvent::Transferred { tick, sent, .. } => self.push(tick, Direction::Tx, vec![sent]),
            BridgeEvent::Dropped { tick, value } => self.push(tick, Direction::Dropped, vec![value]),
            BridgeEvent::Nacked { tick, header } => self.push(tick, Direction::Nack, vec![header]),
            BridgeEvent::Matched { .. } => {}
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_text(&self, show_timestamp: bool) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            match entry.direction {
                Direction::Rx if !self.filter_rx => continue,
                Direction::Tx if !self.filter_tx => continue,
                _ => {}
            }

            if show_timestamp {
                let micros = entry.tick as f64 * 1e6 / TICK_RATE_HZ as f64;
                result.push_str(&format!("[{micros:>12.1} us] "));
            }
            result.push_str(entry.direction.prefix());
            for byte in &entry.data {
                result.push_str(&format!("{byte:02X} "));
            }
            result.push('\n');
        }
        result
    }
}

#[cfg(test)]
mod logbuf_tests {
    use super::*;
    use crate::receiver::ReceivedByte;

    #[test]
    fn oldest_entries_evicted() {
        // Arrange
        let mut log = LogStore::new(2);

        // Act
        for tick in 0..3 {
            log.push(tick, Direction::Rx, vec![tick as u8]);
        }

        // Assert
        let ticks: Vec<u64> = log.entries().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![1, 2]);
    }

    #[test]
    fn records_bridge_events() {
        // Arrange
        let mut log = LogStore::new(16);
        let events = [
            BridgeEvent::Matched { tick: 1, header: 0x50 },
            BridgeEvent::Received {
                tick: 2,
                byte: ReceivedByte { value: 0x01, is_register: true },
            },
            BridgeEvent::Transferred { tick: 3, sent: 0x01, received: 0xff },
        ];

        // Act
        for event in &events {
            log.record(event);
        }

        // Assert
        assert!(!log.is_empty());
        assert_eq!(log.len(), 2);
        assert_eq!(log.to_text(false), "RX: 01 \nTX: 01 \n");
    }

    #[test]
    fn filters_and_timestamps() {
        // Arrange
        let mut log = LogStore::new(16);
        log.push(10, Direction::Rx, vec![0xA5]);
        log.push(20, Direction::Tx, vec![0xA5]);
        log.push(30, Direction::Dropped, vec![0x09]);

        // Act
        log.set_filter(false, true);
        let text = log.to_text(true);

        // Assert
        assert_eq!(text, "[         2.0 us] TX: A5 \n[         3.0 us] DROP: 09 \n");
    }
}
