//! GPIO lines over the character device interface
//!
//! Board pin `n` is line offset `n` of one chip. Every bound pin holds its
//! own line request so that pins can be taken and given back one at a time
//! as channels are set up and torn down.

use std::collections::HashMap;

use gpiocdev::line::{Bias, Offset, Value};
use gpiocdev::request::{Config, Request};
use gpiocdev::Chip;

use spibridge_core::{GpioHal, Level, PinDirection, PinId};

use crate::error::{LinuxGpioError, Result};

/// Consumer label shown by `gpioinfo`
const CONSUMER: &str = "spibridge";

/// GPIO chip implementing [`GpioHal`]
pub struct LinuxGpio {
    path: String,
    num_lines: u32,
    requests: HashMap<Offset, Request>,
}

impl LinuxGpio {
    /// Open the chip at `path`
    pub fn open(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }

        let chip_err = |source| LinuxGpioError::ChipOpenFailed {
            path: path.to_string(),
            source,
        };
        let chip = Chip::from_path(path).map_err(chip_err)?;
        let info = chip.info().map_err(chip_err)?;

        log::info!(
            "linux_gpio: Opened {} ({}, {} lines)",
            path,
            info.label,
            info.num_lines
        );

        Ok(Self {
            path: path.to_string(),
            num_lines: info.num_lines,
            requests: HashMap::new(),
        })
    }

    /// Chip device path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of lines on the chip
    pub fn num_lines(&self) -> u32 {
        self.num_lines
    }

    /// Whether `offset` is currently requested
    pub fn is_bound(&self, offset: Offset) -> bool {
        self.requests.contains_key(&offset)
    }

    fn request(&self, offset: Offset, direction: PinDirection) -> Result<Request> {
        let mut cfg = Config::default();
        match direction {
            PinDirection::Output => {
                cfg.with_line(offset).as_output(Value::Inactive);
            }
            PinDirection::InputPullUp => {
                cfg.with_line(offset).as_input().with_bias(Bias::PullUp);
            }
        }

        Request::from_config(cfg)
            .on_chip(&self.path)
            .with_consumer(CONSUMER)
            .request()
            .map_err(|source| LinuxGpioError::LineRequestFailed { offset, source })
    }
}

impl GpioHal for LinuxGpio {
    type Handle = Offset;
    type Error = LinuxGpioError;

    fn bind(&mut self, pin: PinId, direction: PinDirection) -> Result<Offset> {
        let offset = Offset::from(pin);
        if offset >= self.num_lines {
            return Err(LinuxGpioError::NoSuchLine {
                path: self.path.clone(),
                offset,
                lines: self.num_lines,
            });
        }

        // The kernel refuses a second request for a line we already hold
        self.requests.remove(&offset);
        let request = self.request(offset, direction)?;
        log::debug!("linux_gpio: Line {} bound as {:?}", offset, direction);
        self.requests.insert(offset, request);
        Ok(offset)
    }

    fn release(&mut self, offset: Offset) {
        let Some(request) = self.requests.remove(&offset) else {
            log::warn!("linux_gpio: Line {} released but not bound", offset);
            return;
        };

        let mut cfg = Config::default();
        cfg.with_line(offset).as_input().with_bias(Bias::PullUp);
        if let Err(e) = request.reconfigure(&cfg) {
            log::error!("Failed to park GPIO line {}: {}", offset, e);
        }
        log::debug!("linux_gpio: Line {} released", offset);
    }

    fn set_level(&mut self, offset: Offset, level: Level) {
        let Some(request) = self.requests.get(&offset) else {
            log::error!("linux_gpio: Line {} is not bound, ignoring {:?}", offset, level);
            return;
        };
        let value = match level {
            Level::High => Value::Active,
            Level::Low => Value::Inactive,
        };
        if let Err(e) = request.set_value(offset, value) {
            log::error!("Failed to set GPIO line {}: {}", offset, e);
        }
    }

    fn read_level(&mut self, offset: Offset) -> bool {
        let Some(request) = self.requests.get(&offset) else {
            log::error!("linux_gpio: Line {} is not bound", offset);
            return true;
        };
        match request.value(offset) {
            Ok(value) => value == Value::Active,
            Err(e) => {
                log::error!("Failed to read GPIO line {}: {}", offset, e);
                true
            }
        }
    }
}
