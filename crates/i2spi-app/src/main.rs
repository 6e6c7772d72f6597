use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use i2spi_core::{
    BenchConfig, BridgeConfig, BridgeService, BridgeStats, LogStore, ServiceEvent, Testbench,
    DEFAULT_ADDRESS, TICK_RATE_HZ,
};
use i2spi_decode::{I2cFrame, SampleRate, SpiFrame};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Simulates the I2C to SPI bridge tick by tick
#[derive(Parser)]
#[command(name = "i2spi", version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scenario to completion and report what reached the SPI side
    Run {
        /// JSON scenario file; the two-byte register write is used if omitted
        #[arg(long)]
        scenario: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Print the byte trace
        #[arg(long)]
        trace: bool,
    },
    /// Forward hex lines from stdin as write transactions
    Shell {
        /// Bridge address (hex)
        #[arg(long, value_parser = parse_hex, default_value = "28")]
        address: u8,

        /// SPI half period in ticks
        #[arg(long, default_value_t = 4)]
        divisor: u16,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Scenario {
    #[serde(default)]
    bench: BenchConfig,
    transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Transaction {
    #[serde(default = "default_address")]
    address: u8,
    #[serde(default)]
    read: bool,
    #[serde(with = "hex::serde", default)]
    data: Vec<u8>,
}

#[derive(Serialize)]
struct Report<'a> {
    i2c: &'a [I2cFrame],
    spi: &'a [SpiFrame],
    stats: BridgeStats,
}

/// Register write used when no scenario file is given.
const BUILTIN_PAYLOAD: [u8; 2] = [0x01, 0xA5];
const RUN_LIMIT: u64 = 50_000_000;
const SHELL_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    match cli.command {
        Command::Run {
            scenario,
            json,
            trace,
        } => run(scenario, json, trace),
        Command::Shell { address, divisor } => shell(address, divisor),
    }
}

fn default_address() -> u8 {
    DEFAULT_ADDRESS
}

fn parse_hex(s: &str) -> Result<u8, std::num::ParseIntError> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16)
}

fn load_scenario(path: Option<PathBuf>) -> Result<Scenario> {
    let Some(path) = path else {
        return Ok(Scenario {
            bench: BenchConfig::default(),
            transactions: vec![Transaction {
                address: DEFAULT_ADDRESS,
                read: false,
                data: BUILTIN_PAYLOAD.to_vec(),
            }],
        });
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
}

fn run(path: Option<PathBuf>, json: bool, trace: bool) -> Result<()> {
    let scenario = load_scenario(path)?;
    let mut bench = Testbench::new(scenario.bench.clone())?;
    for t in &scenario.transactions {
        if t.read {
            bench.transaction((t.address & 0x7f) << 1 | 1, &t.data);
        } else {
            bench.write(t.address, &t.data);
        }
    }

    if !bench.run_until_idle(RUN_LIMIT) {
        bail!("bridge still busy after {RUN_LIMIT} ticks");
    }
    info!("scenario finished after {} ticks", bench.stats().ticks);

    if json {
        let report = Report {
            i2c: bench.i2c_frames(),
            spi: bench.spi_frames(),
            stats: bench.stats(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&bench);
    }

    if trace {
        let mut log = LogStore::new(usize::MAX);
        for event in bench.events() {
            log.record(event);
        }
        print!("{}", log.to_text(true));
    }
    Ok(())
}

fn print_report(bench: &Testbench) {
    let rate = SampleRate(TICK_RATE_HZ as f64);

    println!("I2C:");
    for frame in bench.i2c_frames() {
        let status = if frame.fully_acked() {
            "ACK"
        } else if frame.acked {
            "partial"
        } else {
            "NACK"
        };
        println!(
            "  {:#04x} {} [{}] {}",
            frame.address,
            if frame.rw { "R" } else { "W" },
            hex::encode_upper(&frame.data),
            status
        );
    }

    println!("SPI:");
    for frame in bench.spi_frames() {
        let (start, end) = frame.span.to_seconds(rate);
        match frame.byte() {
            Some(byte) if frame.clean => println!(
                "  {:02X} -> {:02X}  {:.2}..{:.2} us",
                byte,
                frame.response,
                start * 1e6,
                end * 1e6
            ),
            _ => println!("  malformed ({} bits)  {:.2}..{:.2} us", frame.bits, start * 1e6, end * 1e6),
        }
    }

    let stats = bench.stats();
    println!(
        "ticks {}  transactions {} (nacked {})  received {}  dropped {}  transfers {}",
        stats.ticks,
        stats.transactions,
        stats.transactions_nacked,
        stats.bytes_received,
        stats.bytes_dropped,
        stats.spi_transfers
    );
}

fn shell(address: u8, divisor: u16) -> Result<()> {
    let cfg = BenchConfig {
        bridge: BridgeConfig {
            address,
            spi_divisor: divisor,
        },
        ..Default::default()
    };
    let service = BridgeService::open(cfg)?;

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let cleaned: String = line
            .split_whitespace()
            .map(|s| s.trim_start_matches("0x").trim_start_matches("0X"))
            .collect();
        if cleaned.is_empty() {
            continue;
        }
        let data = match hex::decode(&cleaned) {
            Ok(data) => data,
            Err(e) => {
                warn!("ignoring {line:?}: {e}");
                continue;
            }
        };

        service.write(address, data)?;
        wait_idle(&service)?;
    }

    service.request_stats()?;
    loop {
        if let ServiceEvent::Stats(stats) = service.events().recv_timeout(SHELL_TIMEOUT)? {
            println!("{}", serde_json::to_string(&stats)?);
            break;
        }
    }
    service.close();
    Ok(())
}

fn wait_idle(service: &BridgeService) -> Result<()> {
    loop {
        match service.events().recv_timeout(SHELL_TIMEOUT)? {
            ServiceEvent::I2cFrame(frame) if !frame.fully_acked() => {
                println!("NACK from {:#04x}", frame.address)
            }
            ServiceEvent::SpiFrame(frame) => match frame.byte() {
                Some(byte) => println!("SPI {byte:02X} -> {:02X}", frame.response),
                None => println!("SPI malformed ({} bits)", frame.bits),
            },
            ServiceEvent::Error(msg) => warn!("{msg}"),
            ServiceEvent::Idle => return Ok(()),
            ServiceEvent::Closed => bail!("bridge service closed"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod main_tests {
    use super::*;

    #[test]
    fn scenario_payloads_are_hex() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "bench": { "bridge": { "spi_divisor": 2 } },
                "transactions": [
                    { "data": "01a5" },
                    { "address": 81, "read": true }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.bench.bridge.spi_divisor, 2);
        assert_eq!(scenario.bench.bridge.address, DEFAULT_ADDRESS);
        assert_eq!(scenario.transactions[0].address, DEFAULT_ADDRESS);
        assert_eq!(scenario.transactions[0].data, vec![0x01, 0xA5]);
        assert!(scenario.transactions[1].read);
        assert!(scenario.transactions[1].data.is_empty());
    }

    #[test]
    fn builtin_scenario_is_register_write() {
        let scenario = load_scenario(None).unwrap();

        assert_eq!(scenario.transactions.len(), 1);
        assert_eq!(scenario.transactions[0].data, BUILTIN_PAYLOAD.to_vec());
    }

    #[test]
    fn address_accepts_prefix() {
        assert_eq!(parse_hex("0x28"), Ok(0x28));
        assert_eq!(parse_hex("3B"), Ok(0x3b));
        assert!(parse_hex("1ff").is_err());
    }
}
