//! spibridge-linux-spi - Hardware channels over Linux spidev
//!
//! Channels 1 and 2 of a spibridge bus are forwarded to `/dev/spidevX.Y`
//! character devices. The node of each channel is chosen at start-up; the
//! mode, clock and word width come from the channel's setup.
//!
//! # Options
//!
//! - `spi1=/dev/spidevX.Y` - node for channel 1
//! - `spi2=/dev/spidevX.Y` - node for channel 2
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to the `/dev/spidevX.Y` nodes
//!
//! 16-bit words are passed to the kernel in host byte order, which matches
//! the little-endian buffers of the core on the usual ARM and x86 hosts.

pub mod device;
pub mod error;

pub use device::{parse_options, LinuxSpi, LinuxSpiConfig, OPTION_KEYS};
pub use error::{LinuxSpiError, Result};
