//! Error types for spibridge-core
//!
//! Every failure the dispatcher can report maps to a stable negative result
//! code (see [`Error::code`]). Callers that only speak integers, such as a
//! script front end, forward that code unchanged.

use core::fmt;

/// Configuration record field, used to pick the field-specific error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Clock polarity/phase mode
    Mode,
    /// Clock speed in kHz
    Speed,
    /// Chip select pin
    ChipSelect,
    /// Full-duplex flag
    FullDuplex,
    /// Software channel clock pin
    Sck,
    /// Software channel data-out pin
    Mosi,
    /// Software channel data-in pin
    Miso,
}

impl Field {
    /// Key under which the field appears in a configuration record
    pub fn key(self) -> &'static str {
        match self {
            Self::Mode => "mode",
            Self::Speed => "speed",
            Self::ChipSelect => "cs",
            Self::FullDuplex => "duplex",
            Self::Sck => "sck",
            Self::Mosi => "mosi",
            Self::Miso => "miso",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Channel errors
    /// Channel id is not 0, 1 or 2
    InvalidChannelId,
    /// Channel has not been set up (or was deinitialized)
    NotConfigured,
    /// No configuration record was supplied to setup
    MissingConfiguration,

    // Setup validation errors
    /// A configuration field holds a value of the wrong type
    WrongType(Field),
    /// A required configuration field is absent
    MissingField(Field),
    /// Mode is outside 0..=3
    ModeOutOfRange,
    /// Speed is outside the channel's supported range
    SpeedOutOfRange,
    /// A pin number does not exist on this board
    InvalidPin(Field),

    // Transfer errors
    /// Bit width is neither 8 nor 16
    InvalidBitWidth,
    /// Write called without any values
    NothingToWrite,
    /// A value does not fit the requested bit width
    OutOfRangeValue,
    /// Read count is zero
    NothingToRead,
    /// Read requested on the software channel without a MISO pin
    MisoNotConfigured,
    /// Bulk read larger than the transfer buffer
    SizeLimitExceeded,

    // Platform errors
    /// The hardware primitive (SPI controller or GPIO line) reported a failure
    HardwareInitFailure,
}

impl Error {
    /// Stable negative result code for this error
    ///
    /// Setup validation codes are field specific; transfer-time codes
    /// follow the per-operation values of the firmware this layer replaces.
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidChannelId => -1,
            Self::NotConfigured | Self::MissingConfiguration => -2,
            Self::WrongType(field) | Self::InvalidPin(field) => wrong_type_code(field),
            Self::MissingField(field) => missing_field_code(field),
            Self::ModeOutOfRange => -3,
            Self::SpeedOutOfRange => -5,
            Self::InvalidBitWidth => -4,
            Self::NothingToWrite | Self::NothingToRead => -4,
            Self::MisoNotConfigured | Self::SizeLimitExceeded => -5,
            Self::HardwareInitFailure => -15,
            Self::OutOfRangeValue => -16,
        }
    }
}

fn wrong_type_code(field: Field) -> i32 {
    match field {
        Field::Mode => -3,
        Field::Speed => -6,
        Field::ChipSelect => -7,
        Field::FullDuplex => -9,
        Field::Sck => -10,
        Field::Mosi => -12,
        Field::Miso => -14,
    }
}

fn missing_field_code(field: Field) -> i32 {
    match field {
        Field::Mode => -4,
        Field::ChipSelect => -8,
        Field::Sck => -11,
        Field::Mosi => -13,
        // Optional fields never produce MissingField
        Field::Speed | Field::FullDuplex | Field::Miso => -2,
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChannelId => write!(f, "channel id must be 0, 1 or 2"),
            Self::NotConfigured => write!(f, "channel not yet initialized"),
            Self::MissingConfiguration => write!(f, "configuration table needed"),
            Self::WrongType(field) => write!(f, "wrong value type for '{}'", field),
            Self::MissingField(field) => write!(f, "missing required field '{}'", field),
            Self::ModeOutOfRange => write!(f, "mode must be 0, 1, 2 or 3"),
            Self::SpeedOutOfRange => write!(f, "speed out of range for this channel"),
            Self::InvalidPin(field) => write!(f, "pin for '{}' does not exist", field),
            Self::InvalidBitWidth => write!(f, "bit width must be 8 or 16"),
            Self::NothingToWrite => write!(f, "nothing to write"),
            Self::OutOfRangeValue => write!(f, "value out of range for bit width"),
            Self::NothingToRead => write!(f, "nothing to read"),
            Self::MisoNotConfigured => write!(f, "MISO not yet initialized"),
            Self::SizeLimitExceeded => {
                write!(f, "at most {} bytes can be read", crate::bus::MAX_READ_BYTES)
            }
            Self::HardwareInitFailure => write!(f, "hardware SPI failure"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
