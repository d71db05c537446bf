//! Hardware SPI adapter
//!
//! Channels 1 and 2 do no bit-level work of their own. Each operation is
//! turned into one [`TransferSegment`] and handed to the platform's
//! [`SpiHal`]. A receive buffer is attached only when the caller wants the
//! input (full duplex or an explicit read).
//!
//! Any HAL failure becomes [`Error::HardwareInitFailure`]; the cause is
//! logged but not reported separately.

use bitflags::bitflags;

use crate::channel::{BitWidth, HwPort, SpiMode};
use crate::error::{Error, Result};
use crate::hal::{PinId, SpiHal};

bitflags! {
    /// Clock and bit-order settings of a hardware port
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HwModeFlags: u8 {
        /// Data sampled on the rising clock edge
        const CLOCK_RISING_EDGE  = 1 << 0;
        /// Data sampled on the falling clock edge
        const CLOCK_FALLING_EDGE = 1 << 1;
        /// Clock idles high
        const CLOCK_IDLE_HIGH    = 1 << 2;
        /// Clock idles low
        const CLOCK_IDLE_LOW     = 1 << 3;
        /// Most significant bit first
        const MSB_FIRST          = 1 << 4;
        /// Least significant bit first
        const LSB_FIRST          = 1 << 5;
    }
}

impl HwModeFlags {
    /// Device encoding of a clock mode (always MSB first)
    pub fn from_mode(mode: SpiMode) -> Self {
        let edge = if mode.rising_edge() {
            Self::CLOCK_RISING_EDGE
        } else {
            Self::CLOCK_FALLING_EDGE
        };
        let idle = if mode.idle_high() {
            Self::CLOCK_IDLE_HIGH
        } else {
            Self::CLOCK_IDLE_LOW
        };
        edge | idle | Self::MSB_FIRST
    }

    /// Clock mode number described by these flags
    pub fn spi_mode(self) -> SpiMode {
        let idle_high = self.contains(Self::CLOCK_IDLE_HIGH);
        let rising = self.contains(Self::CLOCK_RISING_EDGE);
        match (idle_high, rising) {
            (false, true) => SpiMode::MODE_0,
            (false, false) => SpiMode::MODE_1,
            (true, false) => SpiMode::MODE_2,
            (true, true) => SpiMode::MODE_3,
        }
    }
}

/// Hardware port configuration handed to the HAL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwDevice {
    /// Controller
    pub port: HwPort,
    /// Chip select pin
    pub chip_select: PinId,
    /// Clock frequency in Hz
    pub speed_hz: u32,
    /// Clock and bit-order flags
    pub mode: HwModeFlags,
    /// Word width of the next transfer
    pub bits: u8,
}

impl HwDevice {
    /// Create a device description with 8-bit words
    pub fn new(port: HwPort, chip_select: PinId, speed_hz: u32, mode: SpiMode) -> Self {
        Self {
            port,
            chip_select,
            speed_hz,
            mode: HwModeFlags::from_mode(mode),
            bits: BitWidth::Bits8.bits(),
        }
    }
}

/// One blocking transfer
///
/// `len` counts words. Each buffer, when present, holds at least
/// `len * bytes_per_word` bytes.
#[derive(Debug)]
pub struct TransferSegment<'a> {
    /// Data to send (`None` clocks out zeros)
    pub tx: Option<&'a [u8]>,
    /// Where to store received data (`None` discards it)
    pub rx: Option<&'a mut [u8]>,
    /// Number of words
    pub len: usize,
}

/// Bring up a hardware port
pub fn initialize<S: SpiHal>(spi: &mut S, device: &HwDevice) -> Result<()> {
    spi.initialize(device).map_err(|e| {
        log::error!("spi: error initializing hw {}: {}", device.port, e);
        Error::HardwareInitFailure
    })?;
    log::info!(
        "spi: {} up (mode={}, speed={} kHz, cs={})",
        device.port,
        device.mode.spi_mode(),
        device.speed_hz / 1000,
        device.chip_select
    );
    Ok(())
}

/// Shut a hardware port down; failures are logged only
pub fn finalize<S: SpiHal>(spi: &mut S, device: &HwDevice) {
    if let Err(e) = spi.finalize(device) {
        log::error!("spi: error finalizing hw {}: {}", device.port, e);
    }
}

/// Run one transfer of `count` words of `width` on `device`
pub fn transfer<S: SpiHal>(
    spi: &mut S,
    device: &mut HwDevice,
    tx: Option<&[u8]>,
    rx: Option<&mut [u8]>,
    width: BitWidth,
    count: usize,
) -> Result<()> {
    debug_assert!(tx.map_or(true, |b| b.len() >= count * width.bytes()));
    debug_assert!(rx.as_ref().map_or(true, |b| b.len() >= count * width.bytes()));

    device.bits = width.bits();
    let mut segment = TransferSegment { tx, rx, len: count };
    spi.transfer(device, &mut segment).map_err(|e| {
        log::error!("spi: {} transfer of {} words failed: {}", device.port, count, e);
        Error::HardwareInitFailure
    })
}

/// Send one word, returning the word received alongside it when `capture` is set
pub fn write_word<S: SpiHal>(
    spi: &mut S,
    device: &mut HwDevice,
    word: u16,
    width: BitWidth,
    capture: bool,
) -> Result<u16> {
    let tx = word.to_le_bytes();
    let tx = &tx[..width.bytes()];
    if capture {
        let mut rx = [0u8; 2];
        transfer(spi, device, Some(tx), Some(&mut rx[..width.bytes()]), width, 1)?;
        Ok(u16::from_le_bytes(rx) & width.max_value())
    } else {
        transfer(spi, device, Some(tx), None, width, 1)?;
        Ok(0)
    }
}

/// Receive one word
pub fn read_word<S: SpiHal>(spi: &mut S, device: &mut HwDevice, width: BitWidth) -> Result<u16> {
    let mut rx = [0u8; 2];
    transfer(spi, device, None, Some(&mut rx[..width.bytes()]), width, 1)?;
    Ok(u16::from_le_bytes(rx) & width.max_value())
}

/// Send a byte string in one block, returning the last byte received when `capture` is set
pub fn write_block<S: SpiHal>(
    spi: &mut S,
    device: &mut HwDevice,
    bytes: &[u8],
    rx: Option<&mut [u8]>,
) -> Result<Option<u8>> {
    match rx {
        Some(rx) => {
            let rx = &mut rx[..bytes.len()];
            transfer(spi, device, Some(bytes), Some(&mut *rx), BitWidth::Bits8, bytes.len())?;
            Ok(rx.last().copied())
        }
        None => {
            transfer(spi, device, Some(bytes), None, BitWidth::Bits8, bytes.len())?;
            Ok(None)
        }
    }
}

/// Fill `buf` with one block read
pub fn read_block<S: SpiHal>(spi: &mut S, device: &mut HwDevice, buf: &mut [u8]) -> Result<()> {
    let len = buf.len();
    transfer(spi, device, None, Some(buf), BitWidth::Bits8, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSpi;

    #[test]
    fn test_mode_flags() {
        assert_eq!(
            HwModeFlags::from_mode(SpiMode::MODE_0),
            HwModeFlags::CLOCK_RISING_EDGE | HwModeFlags::CLOCK_IDLE_LOW | HwModeFlags::MSB_FIRST
        );
        assert_eq!(
            HwModeFlags::from_mode(SpiMode::MODE_2),
            HwModeFlags::CLOCK_FALLING_EDGE | HwModeFlags::CLOCK_IDLE_HIGH | HwModeFlags::MSB_FIRST
        );
        for mode in SpiMode::ALL {
            assert_eq!(HwModeFlags::from_mode(mode).spi_mode(), mode);
        }
    }

    #[test]
    fn test_write_word_sets_width() {
        let mut spi = MockSpi::default();
        let mut device = HwDevice::new(HwPort::Spi1, 3, 1_000_000, SpiMode::MODE_0);

        write_word(&mut spi, &mut device, 0xBEEF, BitWidth::Bits16, false).unwrap();
        assert_eq!(device.bits, 16);
        assert_eq!(spi.sent, [0xEF, 0xBE]);
        assert_eq!(spi.rx_requested, 0);
    }

    #[test]
    fn test_capture_reads_back() {
        let mut spi = MockSpi {
            loopback: true,
            ..Default::default()
        };
        let mut device = HwDevice::new(HwPort::Spi2, 3, 1_000_000, SpiMode::MODE_3);
        let rx = write_word(&mut spi, &mut device, 0x5A, BitWidth::Bits8, true).unwrap();
        assert_eq!(rx, 0x5A);
        assert_eq!(spi.rx_requested, 1);
    }

    #[test]
    fn test_failure_maps_to_hardware_error() {
        let mut spi = MockSpi {
            fail: true,
            ..Default::default()
        };
        let mut device = HwDevice::new(HwPort::Spi1, 3, 1_000_000, SpiMode::MODE_0);
        assert_eq!(
            read_word(&mut spi, &mut device, BitWidth::Bits8),
            Err(Error::HardwareInitFailure)
        );
    }
}
