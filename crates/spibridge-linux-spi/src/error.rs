//! Error types for the spidev ports

use spibridge_core::channel::HwPort;
use thiserror::Error;

/// spidev specific errors
#[derive(Debug, Error)]
pub enum LinuxSpiError {
    /// No device path was given for the port
    #[error("No device for {0}. Use spi1=/dev/spidevX.Y or spi2=/dev/spidevX.Y")]
    NoDevice(HwPort),

    /// Operation on a port that was never initialized
    #[error("{0} is not open")]
    PortNotOpen(HwPort),

    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set SPI mode
    #[error("Failed to set SPI mode to {mode}: {source}")]
    SetModeFailed {
        mode: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set bits per word
    #[error("Failed to set bits per word to {bits}: {source}")]
    SetBitsPerWordFailed {
        bits: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set clock speed
    #[error("Failed to set clock speed to {speed} Hz: {source}")]
    SetSpeedFailed {
        speed: u32,
        #[source]
        source: std::io::Error,
    },

    /// SPI transfer failed
    #[error("SPI transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Transfer larger than one ioctl can carry
    #[error("Transfer of {0} bytes is too large")]
    TooLarge(usize),
}

/// Result type for spidev operations
pub type Result<T> = std::result::Result<T, LinuxSpiError>;
