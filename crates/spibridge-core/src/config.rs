//! Channel configuration records
//!
//! A [`ConfigTable`] is what a caller hands to `setup`: an ordered set of
//! `key -> value` entries where each value carries its own type tag. Tables
//! can be built in code or parsed from the `key=value,key=value` option
//! grammar:
//!
//! ```text
//! mode=1,sck=5,mosi=6,miso=8,cs=7,speed=1000
//! ```
//!
//! [`validate`] checks a table against a channel in a fixed field order and
//! produces a [`ChannelSetup`] staging record. Nothing is committed to the
//! registry or to the pins until the whole record has been validated.
//!
//! # Keys
//!
//! | Key | Channels | Required | Meaning |
//! |-----|----------|----------|---------|
//! | `mode` | all | yes | clock mode 0-3 |
//! | `speed` | all | no | clock in kHz (100-5000 software, 400-50000 hardware) |
//! | `cs` | all | yes | chip select pin |
//! | `duplex` / `rw` | all | no | full duplex when `1` or `true` |
//! | `sck` | 0 | yes | clock pin |
//! | `mosi` | 0 | yes | data out pin |
//! | `miso` | 0 | no | data in pin |

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::ops::RangeInclusive;

use crate::channel::{ChannelId, SpiMode};
use crate::error::{Error, Field, Result};
use crate::hal::PinId;

/// Accepted software channel speed in kHz
pub const SOFT_SPEED_KHZ: RangeInclusive<i64> = 100..=5000;

/// Accepted hardware channel speed in kHz
pub const HW_SPEED_KHZ: RangeInclusive<i64> = 400..=50_000;

/// Software channel calibration constant (`divisor = SOFT_SPEED_SCALE / kHz`)
pub const SOFT_SPEED_SCALE: u32 = 50_000;

/// Software channel divisor used when no speed is given
pub const DEFAULT_SOFT_DIVISOR: u32 = 500;

/// Hardware channel clock used when no speed is given
pub const DEFAULT_HW_SPEED_HZ: u32 = 1_000_000;

/// Tagged configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// Integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// Anything else
    Text(String),
}

impl ConfigValue {
    /// Parse a textual option value
    ///
    /// Decimal and `0x` prefixed hex become integers, `true`/`false` become
    /// booleans, everything else stays text.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let Some(n) = parse_int(value) {
            return Self::Int(n);
        }
        match value {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(value.to_string()),
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

macro_rules! config_value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ConfigValue {
                fn from(n: $t) -> Self {
                    Self::Int(n as i64)
                }
            }
        )*
    };
}

config_value_from_int!(i32, i64, u8, u16, u32);

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Parse a decimal or `0x` hex integer, with optional leading minus
pub fn parse_int(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Configuration record passed to `setup`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTable {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace an entry
    ///
    /// `rw` is stored as `duplex`, so both spellings name the same entry.
    pub fn insert(&mut self, key: &str, value: impl Into<ConfigValue>) {
        let key = if key == "rw" { "duplex" } else { key };
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Look up an entry
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build a table from `(key, value)` option pairs
    pub fn from_options(options: &[(&str, &str)]) -> Self {
        let mut table = Self::new();
        for (key, value) in options {
            table.insert(key, ConfigValue::parse(value));
        }
        table
    }

    /// Parse a `key=value,key=value` option string
    pub fn parse(s: &str) -> core::result::Result<Self, String> {
        let mut options = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("Invalid option '{}', expected key=value", part))?;
            options.push((key.trim(), value.trim()));
        }
        Ok(Self::from_options(&options))
    }
}

/// Clock setting resolved for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSpeed {
    /// Software channel: cycle-counter ticks per half bit
    Divisor(u32),
    /// Hardware channel: clock frequency in Hz
    Hertz(u32),
}

/// Pins of the software channel besides chip select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftPins {
    /// Clock
    pub sck: PinId,
    /// Data out
    pub mosi: PinId,
    /// Data in (optional, required for reads)
    pub miso: Option<PinId>,
}

/// Fully validated setup request, not yet applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSetup {
    /// Clock mode
    pub mode: SpiMode,
    /// Clock speed
    pub speed: ClockSpeed,
    /// Chip select pin
    pub chip_select: PinId,
    /// Return sampled input from writes
    pub full_duplex: bool,
    /// Software channel lines (`None` for hardware channels)
    pub soft_pins: Option<SoftPins>,
}

const KNOWN_KEYS: &[&str] = &["mode", "speed", "cs", "duplex", "sck", "mosi", "miso"];

/// Validate a configuration table for channel `id`
///
/// Fields are checked in the order mode, speed, cs, duplex, then (software
/// channel only) sck, mosi, miso. The first violation is returned.
pub fn validate(id: ChannelId, table: &ConfigTable, pin_count: u16) -> Result<ChannelSetup> {
    for (key, value) in table.iter() {
        if !KNOWN_KEYS.contains(&key) {
            log::warn!("spi: channel {}: ignoring unknown option {}={}", id, key, value);
        }
    }

    let mode = match table.get("mode") {
        None => return Err(Error::MissingField(Field::Mode)),
        Some(value) => {
            let raw = value.as_int().ok_or(Error::WrongType(Field::Mode))?;
            SpiMode::new(raw)?
        }
    };

    let speed = match table.get("speed") {
        None if id.is_software() => ClockSpeed::Divisor(DEFAULT_SOFT_DIVISOR),
        None => ClockSpeed::Hertz(DEFAULT_HW_SPEED_HZ),
        Some(value) => {
            let khz = value.as_int().ok_or(Error::WrongType(Field::Speed))?;
            if id.is_software() {
                if !SOFT_SPEED_KHZ.contains(&khz) {
                    return Err(Error::SpeedOutOfRange);
                }
                ClockSpeed::Divisor(SOFT_SPEED_SCALE / khz as u32)
            } else {
                if !HW_SPEED_KHZ.contains(&khz) {
                    return Err(Error::SpeedOutOfRange);
                }
                ClockSpeed::Hertz(khz as u32 * 1000)
            }
        }
    };

    let chip_select = required_pin(table, Field::ChipSelect, pin_count)?;

    let full_duplex = match table.get("duplex") {
        None => false,
        Some(ConfigValue::Int(n)) => *n == 1,
        Some(ConfigValue::Bool(b)) => *b,
        Some(ConfigValue::Text(_)) => return Err(Error::WrongType(Field::FullDuplex)),
    };

    let soft_pins = if id.is_software() {
        let sck = required_pin(table, Field::Sck, pin_count)?;
        let mosi = required_pin(table, Field::Mosi, pin_count)?;
        let miso = optional_pin(table, Field::Miso, pin_count)?;
        Some(SoftPins { sck, mosi, miso })
    } else {
        None
    };

    Ok(ChannelSetup {
        mode,
        speed,
        chip_select,
        full_duplex,
        soft_pins,
    })
}

fn required_pin(table: &ConfigTable, field: Field, pin_count: u16) -> Result<PinId> {
    optional_pin(table, field, pin_count)?.ok_or(Error::MissingField(field))
}

fn optional_pin(table: &ConfigTable, field: Field, pin_count: u16) -> Result<Option<PinId>> {
    let Some(value) = table.get(field.key()) else {
        return Ok(None);
    };
    let raw = value.as_int().ok_or(Error::WrongType(field))?;
    if raw < 0 || raw >= pin_count as i64 {
        return Err(Error::InvalidPin(field));
    }
    Ok(Some(raw as PinId))
}
