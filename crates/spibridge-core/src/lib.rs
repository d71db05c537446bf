//! spibridge-core - SPI channel layer for microcontrollers
//!
//! This crate exposes three independently configurable SPI channels behind a
//! single operation surface:
//!
//! - channel 0 is bit-banged over four GPIO lines with cycle-counter timing
//! - channels 1 and 2 forward to a blocking hardware SPI primitive
//!
//! The platform is reached only through the traits in [`hal`], so the same
//! dispatcher runs on a microcontroller, on Linux (gpiocdev/spidev backends)
//! or against the in-memory simulator used by the tests.
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for [`Error`]
//! - `cortex-m` - Provide a [`timing::DwtCounter`] backed by the DWT unit
//!
//! # Example
//!
//! ```ignore
//! use spibridge_core::{ConfigTable, SpiBus, WriteItem};
//!
//! let mut bus = SpiBus::new(gpio, spi, counter);
//! let config = ConfigTable::new()
//!     .with("mode", 0)
//!     .with("sck", 5)
//!     .with("mosi", 6)
//!     .with("miso", 8)
//!     .with("cs", 7);
//! bus.setup(0, &config)?;
//! bus.write(0, 8, &[WriteItem::Bytes(b"\x9f".to_vec())])?;
//! let id = bus.read_bytes(0, 3)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bitbang;
pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod hal;
pub mod hardware;
pub mod pins;
pub mod registry;
pub mod timing;

#[cfg(test)]
mod mock;

pub use bus::{ReadOutcome, SpiBus, WriteItem, WriteOutcome, DEFAULT_PIN_COUNT, MAX_READ_BYTES};
pub use channel::{BitWidth, ChannelId, SpiMode};
pub use config::{ConfigTable, ConfigValue};
pub use error::{Error, Field, Result};
pub use hal::{CycleCounter, GpioHal, Level, PinDirection, PinId, SpiHal};
