//! spibridge-sim - In-memory board for spibridge
//!
//! This crate provides a simulated GPIO bank, a pair of simulated hardware
//! SPI ports and a cycle counter, so the full dispatcher can run without a
//! board. It's useful for testing and for trying scripts on a workstation.
//!
//! # Example
//!
//! ```
//! use spibridge_core::{ConfigTable, WriteItem, WriteOutcome};
//! use spibridge_sim::{SimBus, SimConfig};
//!
//! let mut bus: SimBus = SimConfig::default().wire(6, 8).open();
//! let table = ConfigTable::parse("mode=0,sck=5,mosi=6,miso=8,cs=7,duplex=1").unwrap();
//! bus.setup(0, &table).unwrap();
//! let sampled = bus.write(0, 8, &[WriteItem::Word(0x3C)]).unwrap();
//! assert_eq!(sampled, WriteOutcome::Sampled(0x3C));
//! ```
//!
//! # Options
//!
//! - `pins=N` - number of board pins (default 18)
//! - `loopback=1` - hardware ports echo what they send
//! - `wire=OUT-IN` - connect GPIO output `OUT` to input `IN` (repeatable)

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use spibridge_core::channel::HwPort;
use spibridge_core::config::parse_int;
use spibridge_core::{CycleCounter, PinId, SpiBus, DEFAULT_PIN_COUNT};

pub mod gpio;
pub mod spi;

#[cfg(test)]
mod scenarios;

pub use gpio::{LineEvent, PinState, SimGpio};
pub use spi::{SimSpi, SimTransfer};

/// Errors reported by the simulated peripherals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// Pin number beyond the simulated board
    NoSuchPin(PinId),
    /// Pin marked broken with [`SimGpio::break_pin`]
    Broken(PinId),
    /// Transfer or finalize on a port that is not initialized
    PortDown(HwPort),
    /// Failure requested by the test
    Injected(&'static str),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchPin(pin) => write!(f, "pin {} does not exist", pin),
            Self::Broken(pin) => write!(f, "pin {} is broken", pin),
            Self::PortDown(port) => write!(f, "{} is not initialized", port),
            Self::Injected(what) => write!(f, "injected {} failure", what),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SimError {}

/// Counter that advances a fixed step every time it is read
#[derive(Debug, Clone)]
pub struct SimCycleCounter {
    now: u32,
    step: u32,
    reads: u64,
}

impl SimCycleCounter {
    /// Create a counter starting at `start`
    pub fn new(start: u32, step: u32) -> Self {
        Self {
            now: start,
            step: step.max(1),
            reads: 0,
        }
    }

    /// Number of times the counter was read
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl Default for SimCycleCounter {
    fn default() -> Self {
        // Large steps keep simulated bit periods short
        Self::new(0, 64)
    }
}

impl CycleCounter for SimCycleCounter {
    fn cycles(&mut self) -> u32 {
        self.reads += 1;
        self.now = self.now.wrapping_add(self.step);
        self.now
    }
}

/// Dispatcher running on the simulator
pub type SimBus = SpiBus<SimGpio, SimSpi, SimCycleCounter>;

/// Configuration of a simulated board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Number of GPIO pins
    pub pin_count: u16,
    /// Hardware ports echo transmit data
    pub loopback: bool,
    /// GPIO wires as (output, input)
    pub wires: Vec<(PinId, PinId)>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pin_count: DEFAULT_PIN_COUNT,
            loopback: false,
            wires: Vec::new(),
        }
    }
}

impl SimConfig {
    /// Add a GPIO wire from output `from` to input `to`
    pub fn wire(mut self, from: PinId, to: PinId) -> Self {
        self.wires.push((from, to));
        self
    }

    /// Enable hardware loopback
    pub fn with_loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Build a dispatcher on a fresh simulated board
    pub fn open(&self) -> SimBus {
        let mut gpio = SimGpio::new(self.pin_count);
        for &(from, to) in &self.wires {
            gpio.wire(from, to);
        }
        log::info!(
            "sim: board with {} pins, {} wires, hw loopback {}",
            self.pin_count,
            self.wires.len(),
            if self.loopback { "on" } else { "off" }
        );
        SpiBus::with_pin_count(
            gpio,
            SimSpi::new(self.loopback),
            SimCycleCounter::default(),
            self.pin_count,
        )
    }
}

/// Parse simulator options
///
/// Supported options:
/// - `pins=N`
/// - `loopback=1` / `loopback=true`
/// - `wire=OUT-IN`
pub fn parse_options(options: &[(&str, &str)]) -> Result<SimConfig, String> {
    let mut config = SimConfig::default();

    for (key, value) in options {
        match *key {
            "pins" => {
                config.pin_count = value
                    .parse()
                    .map_err(|_| format!("Invalid pins value: {}", value))?;
            }
            "loopback" => {
                config.loopback = match *value {
                    "1" | "true" | "on" => true,
                    "0" | "false" | "off" => false,
                    _ => return Err(format!("Invalid loopback value: {}", value)),
                };
            }
            "wire" => {
                let (from, to) = value
                    .split_once('-')
                    .and_then(|(a, b)| Some((pin(a)?, pin(b)?)))
                    .ok_or_else(|| format!("Invalid wire '{}', expected OUT-IN", value))?;
                config.wires.push((from, to));
            }
            _ => {
                log::warn!("sim: Unknown option: {}={}", key, value);
            }
        }
    }

    if let Some((from, to)) = config
        .wires
        .iter()
        .find(|(a, b)| *a >= config.pin_count || *b >= config.pin_count)
    {
        return Err(format!(
            "Wire {}-{} is outside the {} board pins",
            from, to, config.pin_count
        ));
    }

    Ok(config)
}

fn pin(s: &str) -> Option<PinId> {
    parse_int(s.trim()).and_then(|n| PinId::try_from(n).ok())
}

/// Describe a configuration the way [`parse_options`] reads it
pub fn describe(config: &SimConfig) -> String {
    let mut parts = Vec::new();
    parts.push(format!("pins={}", config.pin_count));
    if config.loopback {
        parts.push("loopback=1".to_string());
    }
    for (from, to) in &config.wires {
        parts.push(format!("wire={}-{}", from, to));
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("loopback", "1"), ("wire", "6-8"), ("pins", "32")]).unwrap();
        assert!(config.loopback);
        assert_eq!(config.wires, [(6, 8)]);
        assert_eq!(config.pin_count, 32);
        assert_eq!(describe(&config), "pins=32,loopback=1,wire=6-8");

        assert!(parse_options(&[("wire", "6")]).is_err());
        assert!(parse_options(&[("wire", "6-40")]).is_err());
        assert!(parse_options(&[("loopback", "maybe")]).is_err());
    }

    #[test]
    fn test_counter_advances() {
        let mut counter = SimCycleCounter::new(u32::MAX, 2);
        assert_eq!(counter.cycles(), 1);
        assert_eq!(counter.cycles(), 3);
        assert_eq!(counter.reads(), 2);
    }
}
