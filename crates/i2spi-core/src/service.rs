use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use i2spi_decode::{I2cFrame, SpiFrame};
use log::{error, info};
use parking_lot::Mutex;

use crate::bench::Testbench;
use crate::bridge::BridgeStats;
use crate::config::BenchConfig;
use crate::error::ServiceError;
use crate::logbuf::LogStore;

/// Ticks simulated between polls of the command channel.
const CHUNK_TICKS: u64 = 1024;
const LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Opened,
    I2cFrame(I2cFrame),
    SpiFrame(SpiFrame),
    Stats(BridgeStats),
    /// All queued transactions have drained through to the SPI side.
    Idle,
    Closed,
    Error(String),
}

enum Command {
    Write { address: u8, data: Vec<u8> },
    Transaction { header: u8, data: Vec<u8> },
    Reset,
    GetStats,
    Close,
}

/// Runs a [`Testbench`] on a worker thread.
pub struct BridgeService {
    cfg: BenchConfig,
    tx_cmd: Sender<Command>,
    rx_evt: Receiver<ServiceEvent>,
    log: Arc<Mutex<LogStore>>,
}

impl BridgeService {
    pub fn open(cfg: BenchConfig) -> Result<Self, ServiceError> {
        let bench = Testbench::new(cfg.clone())?;
        let (tx_cmd, rx_cmd) = unbounded::<Command>();
        let (tx_evt, rx_evt) = unbounded::<ServiceEvent>();
        let log = Arc::new(Mutex::new(LogStore::new(LOG_ENTRIES)));
        let worker_log = Arc::clone(&log);

        std::thread::Builder::new()
            .name("i2spi-bridge".into())
            .spawn(move || run_worker(bench, rx_cmd, tx_evt, worker_log))?;

        info!("bridge service started at address {:#04x}", cfg.bridge.address);
        Ok(Self {
            cfg,
            tx_cmd,
            rx_evt,
            log,
        })
    }

    pub fn write(&self, address: u8, data: Vec<u8>) -> Result<(), ServiceError> {
        self.send(Command::Write { address, data })
    }

    pub fn transaction(&self, header: u8, data: Vec<u8>) -> Result<(), ServiceError> {
        self.send(Command::Transaction { header, data })
    }

    pub fn reset(&self) -> Result<(), ServiceError> {
        self.send(Command::Reset)
    }

    pub fn request_stats(&self) -> Result<(), ServiceError> {
        self.send(Command::GetStats)
    }

    pub fn close(&self) {
        let _ = self.tx_cmd.send(Command::Close);
    }

    pub fn events(&self) -> &Receiver<ServiceEvent> {
        &self.rx_evt
    }

    pub fn log(&self) -> Arc<Mutex<LogStore>> {
        Arc::clone(&self.log)
    }

    pub fn config(&self) -> &BenchConfig {
        &self.cfg
    }

    fn send(&self, cmd: Command) -> Result<(), ServiceError> {
        self.tx_cmd.send(cmd).map_err(|_| ServiceError::Disconnected)
    }
}

impl Drop for BridgeService {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    mut bench: Testbench,
    rx_cmd: Receiver<Command>,
    tx_evt: Sender<ServiceEvent>,
    log: Arc<Mutex<LogStore>>,
) {
    let _ = tx_evt.send(ServiceEvent::Opened);
    let mut busy = false;

    loop {
        loop {
            match rx_cmd.try_recv() {
                Ok(Command::Write { address, data }) => {
                    bench.write(address, &data);
                    busy = true;
                }
                Ok(Command::Transaction { header, data }) => {
                    bench.transaction(header, &data);
                    busy = true;
                }
                Ok(Command::Reset) => {
                    bench.hold_reset(2);
                    busy = true;
                }
                Ok(Command::GetStats) => {
                    let _ = tx_evt.send(ServiceEvent::Stats(bench.stats()));
                }
                Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                    info!("bridge service stopped after {} ticks", bench.stats().ticks);
                    let _ = tx_evt.send(ServiceEvent::Closed);
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        if !busy {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }

        let idle = bench.run_until_idle(CHUNK_TICKS);
        {
            let mut log = log.lock();
            for event in bench.take_events() {
                log.record(&event);
            }
        }
        for frame in bench.take_i2c_frames() {
            if !frame.acked {
                info!("transaction to {:#04x} was not acknowledged", frame.address);
            }
            let _ = tx_evt.send(ServiceEvent::I2cFrame(frame));
        }
        for frame in bench.take_spi_frames() {
            if !frame.clean {
                error!("malformed SPI frame {:?}", frame);
                let _ = tx_evt.send(ServiceEvent::Error(format!("malformed SPI frame over ticks {:?}", frame.span)));
            }
            let _ = tx_evt.send(ServiceEvent::SpiFrame(frame));
        }
        if idle {
            busy = false;
            let _ = tx_evt.send(ServiceEvent::Idle);
        }
    }
}

#[cfg(test)]
mod service_tests {
    use super::*;

    fn collect_until_idle(service: &BridgeService) -> Vec<ServiceEvent> {
        let mut events = Vec::new();
        loop {
            let event = service
                .events()
                .recv_timeout(Duration::from_secs(10))
                .expect("service stalled");
            let done = matches!(event, ServiceEvent::Idle);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn forwards_write_to_spi() {
        // Arrange
        let service = BridgeService::open(BenchConfig::default()).unwrap();

        // Act
        service.write(0x28, vec![0x01, 0xA5]).unwrap();
        let events = collect_until_idle(&service);

        // Assert
        assert!(matches!(events[0], ServiceEvent::Opened));
        let spi: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ServiceEvent::SpiFrame(f) => f.byte(),
                _ => None,
            })
            .collect();
        assert_eq!(spi, vec![0x01, 0xA5]);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServiceEvent::I2cFrame(f) if f.fully_acked())));
        assert!(service.log().lock().to_text(false).contains("TX: A5"));
    }

    #[test]
    fn reports_stats_and_closes() {
        // Arrange
        let service = BridgeService::open(BenchConfig::default()).unwrap();
        service.transaction(0x51, vec![]).unwrap();
        collect_until_idle(&service);

        // Act
        service.request_stats().unwrap();
        service.close();

        // Assert
        let mut stats = None;
        let mut closed = false;
        while let Ok(event) = service.events().recv_timeout(Duration::from_secs(10)) {
            match event {
                ServiceEvent::Stats(s) => stats = Some(s),
                ServiceEvent::Closed => {
                    closed = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(closed);
        let stats = stats.unwrap();
        assert_eq!(stats.transactions_nacked, 1);
        assert_eq!(stats.spi_transfers, 0);
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = BenchConfig {
            i2c_half_period: 0,
            ..Default::default()
        };

        assert!(matches!(BridgeService::open(cfg), Err(ServiceError::Config(_))));
    }
}
