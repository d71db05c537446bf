//! Channel identifiers, clock modes and word widths

use core::fmt;

use crate::error::{Error, Result};

/// Number of channels on the bus
pub const CHANNEL_COUNT: usize = 3;

/// Validated channel id (0, 1 or 2)
///
/// Raw ids coming from callers are converted exactly once; everything past
/// that point indexes the registry without further bounds checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u8);

impl ChannelId {
    /// The bit-banged channel
    pub const SOFTWARE: Self = Self(0);
    /// First hardware channel
    pub const HW1: Self = Self(1);
    /// Second hardware channel
    pub const HW2: Self = Self(2);

    /// All channel ids in order
    pub const ALL: [Self; CHANNEL_COUNT] = [Self::SOFTWARE, Self::HW1, Self::HW2];

    /// Validate a raw id
    pub fn new(raw: i64) -> Result<Self> {
        match raw {
            0..=2 => Ok(Self(raw as u8)),
            _ => Err(Error::InvalidChannelId),
        }
    }

    /// Registry slot index
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// What backs this channel
    pub fn kind(self) -> ChannelKind {
        match self.0 {
            0 => ChannelKind::Software,
            1 => ChannelKind::Hardware(HwPort::Spi1),
            _ => ChannelKind::Hardware(HwPort::Spi2),
        }
    }

    /// Whether this is the bit-banged channel
    pub fn is_software(self) -> bool {
        self.kind() == ChannelKind::Software
    }
}

impl TryFrom<i64> for ChannelId {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        Self::new(raw)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hardware SPI port behind a hardware channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwPort {
    /// Port used by channel 1
    Spi1,
    /// Port used by channel 2
    Spi2,
}

impl fmt::Display for HwPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi1 => write!(f, "SPI1"),
            Self::Spi2 => write!(f, "SPI2"),
        }
    }
}

/// Implementation backing a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// GPIO bit-banging
    Software,
    /// Hardware SPI controller
    Hardware(HwPort),
}

/// Clock polarity/phase mode (0-3)
///
/// | Mode | Idle | Active edge |
/// |------|------|-------------|
/// | 0    | low  | rising      |
/// | 1    | low  | falling     |
/// | 2    | high | falling     |
/// | 3    | high | rising      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpiMode(u8);

impl SpiMode {
    /// Mode 0
    pub const MODE_0: Self = Self(0);
    /// Mode 1
    pub const MODE_1: Self = Self(1);
    /// Mode 2
    pub const MODE_2: Self = Self(2);
    /// Mode 3
    pub const MODE_3: Self = Self(3);

    /// All modes in order
    pub const ALL: [Self; 4] = [Self::MODE_0, Self::MODE_1, Self::MODE_2, Self::MODE_3];

    /// Validate a raw mode number
    pub fn new(raw: i64) -> Result<Self> {
        match raw {
            0..=3 => Ok(Self(raw as u8)),
            _ => Err(Error::ModeOutOfRange),
        }
    }

    /// Raw mode number
    pub fn number(self) -> u8 {
        self.0
    }

    /// Clock level between transfers
    pub fn idle_high(self) -> bool {
        self.0 >= 2
    }

    /// Whether data is captured on the rising edge
    pub fn rising_edge(self) -> bool {
        matches!(self.0, 0 | 3)
    }

    /// Clock level driven before the active edge of each bit
    pub fn leading_level(self) -> bool {
        !self.rising_edge()
    }

    /// Clock level reached by the active edge
    pub fn active_level(self) -> bool {
        self.rising_edge()
    }
}

impl fmt::Display for SpiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer word width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitWidth {
    /// 8-bit words
    Bits8,
    /// 16-bit words
    Bits16,
}

impl BitWidth {
    /// Validate a raw bit width
    pub fn new(raw: i64) -> Result<Self> {
        match raw {
            8 => Ok(Self::Bits8),
            16 => Ok(Self::Bits16),
            _ => Err(Error::InvalidBitWidth),
        }
    }

    /// Number of bits per word
    pub fn bits(self) -> u8 {
        match self {
            Self::Bits8 => 8,
            Self::Bits16 => 16,
        }
    }

    /// Largest value a word can hold
    pub fn max_value(self) -> u16 {
        match self {
            Self::Bits8 => 0xFF,
            Self::Bits16 => 0xFFFF,
        }
    }

    /// Mask selecting the most significant bit of a word
    pub fn msb(self) -> u16 {
        match self {
            Self::Bits8 => 0x80,
            Self::Bits16 => 0x8000,
        }
    }

    /// Number of buffer bytes per word
    pub fn bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
        }
    }

    /// Range-check a caller value for this width
    pub fn check(self, value: i64) -> Result<u16> {
        if (0..=self.max_value() as i64).contains(&value) {
            Ok(value as u16)
        } else {
            Err(Error::OutOfRangeValue)
        }
    }
}
