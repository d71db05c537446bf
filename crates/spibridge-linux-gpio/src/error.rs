//! Error types for the GPIO character device backend

use thiserror::Error;

/// Linux GPIO specific errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// Failed to open GPIO chip
    #[error("Failed to open GPIO chip '{path}': {source}")]
    ChipOpenFailed {
        path: String,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to request a GPIO line
    #[error("Failed to request GPIO line {offset}: {source}")]
    LineRequestFailed {
        offset: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Board pin beyond the lines of the chip
    #[error("GPIO line {offset} does not exist on {path} ({lines} lines)")]
    NoSuchLine {
        path: String,
        offset: u32,
        lines: u32,
    },

    /// GPIO chip or device not specified
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,
}

/// Result type for Linux GPIO operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
