//! I2C peripheral to SPI controller bridge, modelled as lockstep state
//! machines advanced once per tick.

pub mod bench;
pub mod bridge;
pub mod config;
pub mod error;
pub mod logbuf;
pub mod queue;
pub mod receiver;
pub mod sequencer;
pub mod service;
pub mod sync;
pub mod transmitter;

pub use bench::Testbench;
pub use bridge::{Bridge, BridgeEvent, BridgeStats, Inputs, Outputs, EVENT_BACKLOG};
pub use config::{BenchConfig, BridgeConfig, DEFAULT_ADDRESS, MIN_I2C_HALF_PERIOD, QUEUE_CAPACITY, TICK_RATE_HZ};
pub use error::{ConfigError, ServiceError};
pub use logbuf::{Direction, LogEntry, LogStore};
pub use queue::{ByteQueue, Push};
pub use receiver::{AckPhase, I2cReceiver, ReceivedByte, RxEvent, RxState};
pub use sequencer::{SeqState, Sequencer};
pub use service::{BridgeService, ServiceEvent};
pub use sync::{BusCondition, LineSync, Wire};
pub use transmitter::{SpiTransmitter, TxState};
