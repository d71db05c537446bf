//! spibridge-linux-gpio - Software channel lines over Linux gpiocdev
//!
//! This crate lets channel 0 of a spibridge bus bit-bang on the GPIO lines of
//! a Linux GPIO chip, using the character device interface through the
//! gpiocdev crate. Board pin `n` is line offset `n` of the chip.
//!
//! The software channel times its bits with a cycle counter;
//! [`MonotonicCounter`] emulates one from the monotonic clock.
//!
//! # Options
//!
//! - `dev=/dev/gpiochipN` - chip device path
//! - `gpiochip=N` - chip number, shorthand for `dev=/dev/gpiochipN`
//! - `pins=N` - number of board pins (default 18)
//! - `clock_mhz=N` - core clock emulated by the counter (default 100)
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support
//! - Read/write access to `/dev/gpiochipN`

pub mod clock;
pub mod error;
pub mod gpio;

use spibridge_core::DEFAULT_PIN_COUNT;

pub use clock::{MonotonicCounter, DEFAULT_CLOCK_MHZ};
pub use error::{LinuxGpioError, Result};
pub use gpio::LinuxGpio;

/// Option keys understood by [`parse_options`]
pub const OPTION_KEYS: &[&str] = &["dev", "gpiochip", "pins", "clock_mhz"];

/// GPIO side of a Linux board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxGpioConfig {
    /// Chip device path
    pub device: String,
    /// Number of board pins
    pub pin_count: u16,
    /// Emulated core clock for the cycle counter
    pub clock_mhz: u32,
}

impl Default for LinuxGpioConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            pin_count: DEFAULT_PIN_COUNT,
            clock_mhz: DEFAULT_CLOCK_MHZ,
        }
    }
}

impl LinuxGpioConfig {
    /// Open the chip and build the matching counter
    pub fn open(&self) -> Result<(LinuxGpio, MonotonicCounter)> {
        let gpio = LinuxGpio::open(&self.device)?;
        if u32::from(self.pin_count) > gpio.num_lines() {
            log::warn!(
                "linux_gpio: {} board pins but {} only has {} lines",
                self.pin_count,
                gpio.path(),
                gpio.num_lines()
            );
        }
        Ok((gpio, MonotonicCounter::new(self.clock_mhz)))
    }
}

/// Parse GPIO options
///
/// Supported options:
/// - `dev=/dev/gpiochipN` or `gpiochip=N`
/// - `pins=N`
/// - `clock_mhz=N`
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxGpioConfig, String> {
    let mut config = LinuxGpioConfig::default();
    let mut gpiochip: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "gpiochip" => {
                let n: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid gpiochip number: {}", value))?;
                if n > 9 {
                    return Err(format!("gpiochip number {} out of range (0-9)", n));
                }
                gpiochip = Some(n);
            }
            "pins" => {
                config.pin_count = value
                    .parse()
                    .map_err(|_| format!("Invalid pins value: {}", value))?;
            }
            "clock_mhz" => {
                config.clock_mhz = value
                    .parse()
                    .ok()
                    .filter(|mhz| *mhz > 0)
                    .ok_or_else(|| format!("Invalid clock_mhz value: {}", value))?;
            }
            _ => {
                log::warn!("linux_gpio: Unknown option: {}={}", key, value);
            }
        }
    }

    match (config.device.is_empty(), gpiochip) {
        (false, Some(_)) => return Err("Only one of dev= or gpiochip= can be specified".into()),
        (true, Some(n)) => config.device = format!("/dev/gpiochip{}", n),
        (true, None) => {
            return Err("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N".into())
        }
        (false, None) => {}
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options = [("gpiochip", "1"), ("pins", "28"), ("clock_mhz", "48")];
        let config = parse_options(&options).unwrap();
        assert_eq!(config.device, "/dev/gpiochip1");
        assert_eq!(config.pin_count, 28);
        assert_eq!(config.clock_mhz, 48);

        let config = parse_options(&[("dev", "/dev/gpiochip4")]).unwrap();
        assert_eq!(config.device, "/dev/gpiochip4");
        assert_eq!(config.pin_count, DEFAULT_PIN_COUNT);
        assert_eq!(config.clock_mhz, DEFAULT_CLOCK_MHZ);
    }

    #[test]
    fn test_parse_options_errors() {
        assert!(parse_options(&[]).is_err());
        assert!(parse_options(&[("gpiochip", "10")]).is_err());
        assert!(parse_options(&[("dev", "/dev/gpiochip0"), ("gpiochip", "0")]).is_err());
        assert!(parse_options(&[("gpiochip", "0"), ("clock_mhz", "0")]).is_err());
    }
}
