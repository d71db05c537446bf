//! spidev ports
//!
//! Each hardware channel maps to one `/dev/spidevX.Y` node. The kernel owns
//! the chip select line of the node, so [`HwDevice::chip_select`] is only
//! reported in the logs. Every transfer is a single `SPI_IOC_MESSAGE(1)`
//! carrying the word width and clock of the device.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

use spibridge_core::channel::HwPort;
use spibridge_core::hardware::{HwDevice, TransferSegment};
use spibridge_core::SpiHal;

use crate::error::{LinuxSpiError, Result};

/// Option keys understood by [`parse_options`]
pub const OPTION_KEYS: &[&str] = &["spi1", "spi2"];

mod ioctl {
    use nix::ioctl_write_ptr;

    const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of `struct spi_ioc_transfer`
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// `SPI_IOC_MESSAGE(n)`, i.e. `_IOW(SPI_IOC_MAGIC, 0, char[n * 32])`
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// Kernel `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Device nodes backing the two hardware channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinuxSpiConfig {
    /// Node for channel 1 (e.g. "/dev/spidev0.0")
    pub spi1: Option<String>,
    /// Node for channel 2
    pub spi2: Option<String>,
}

impl LinuxSpiConfig {
    /// Node configured for `port`
    pub fn device(&self, port: HwPort) -> Option<&str> {
        match port {
            HwPort::Spi1 => self.spi1.as_deref(),
            HwPort::Spi2 => self.spi2.as_deref(),
        }
    }
}

#[derive(Debug)]
struct OpenPort {
    path: String,
    file: File,
    bits: u8,
}

/// spidev controller pair implementing [`SpiHal`]
#[derive(Debug)]
pub struct LinuxSpi {
    config: LinuxSpiConfig,
    ports: HashMap<HwPort, OpenPort>,
}

impl LinuxSpi {
    /// Create the controller pair; nothing is opened until a channel is set up
    pub fn new(config: LinuxSpiConfig) -> Self {
        Self {
            config,
            ports: HashMap::new(),
        }
    }

    /// Configured device nodes
    pub fn config(&self) -> &LinuxSpiConfig {
        &self.config
    }

    /// Whether `port` is currently open
    pub fn is_open(&self, port: HwPort) -> bool {
        self.ports.contains_key(&port)
    }

    fn open(&self, device: &HwDevice) -> Result<OpenPort> {
        let path = self
            .config
            .device(device.port)
            .ok_or(LinuxSpiError::NoDevice(device.port))?
            .to_string();

        log::debug!("linux_spi: Opening {} for {}", path, device.port);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: path.clone(),
                source: e,
            })?;
        let fd = file.as_raw_fd();

        let mode = device.mode.spi_mode().number();
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| LinuxSpiError::SetModeFailed {
                mode,
                source: io::Error::from(e),
            })?;
        }

        set_bits_per_word(fd, device.bits)?;

        let speed = device.speed_hz;
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed).map_err(|e| {
                LinuxSpiError::SetSpeedFailed {
                    speed,
                    source: io::Error::from(e),
                }
            })?;
        }

        log::info!(
            "linux_spi: Opened {} as {} (mode={}, speed={} kHz, cs={})",
            path,
            device.port,
            mode,
            speed / 1000,
            device.chip_select
        );

        Ok(OpenPort {
            path,
            file,
            bits: device.bits,
        })
    }
}

fn set_bits_per_word(fd: libc::c_int, bits: u8) -> Result<()> {
    unsafe {
        ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
            LinuxSpiError::SetBitsPerWordFailed {
                bits,
                source: io::Error::from(e),
            }
        })?;
    }
    Ok(())
}

impl SpiHal for LinuxSpi {
    type Error = LinuxSpiError;

    fn initialize(&mut self, device: &HwDevice) -> Result<()> {
        // Re-initializing a port reopens it with the new settings
        self.ports.remove(&device.port);
        let port = self.open(device)?;
        self.ports.insert(device.port, port);
        Ok(())
    }

    fn transfer(&mut self, device: &HwDevice, segment: &mut TransferSegment<'_>) -> Result<()> {
        let port = self
            .ports
            .get_mut(&device.port)
            .ok_or(LinuxSpiError::PortNotOpen(device.port))?;
        let fd = port.file.as_raw_fd();

        if port.bits != device.bits {
            set_bits_per_word(fd, device.bits)?;
            port.bits = device.bits;
        }

        let bytes = segment.len * (device.bits as usize / 8);
        let len = u32::try_from(bytes).map_err(|_| LinuxSpiError::TooLarge(bytes))?;
        let transfer = SpiIocTransfer {
            tx_buf: segment.tx.map_or(0, |tx| tx[..bytes].as_ptr() as u64),
            rx_buf: segment
                .rx
                .as_deref_mut()
                .map_or(0, |rx| rx[..bytes].as_mut_ptr() as u64),
            len,
            speed_hz: device.speed_hz,
            bits_per_word: device.bits,
            ..Default::default()
        };

        log::trace!(
            "linux_spi: {} {} bytes on {} ({} bit words)",
            device.port,
            bytes,
            port.path,
            device.bits
        );

        let ptr = &transfer as *const SpiIocTransfer;
        let ret = unsafe { libc::ioctl(fd, ioctl::spi_ioc_message(1), ptr) };
        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn finalize(&mut self, device: &HwDevice) -> Result<()> {
        let port = self
            .ports
            .remove(&device.port)
            .ok_or(LinuxSpiError::PortNotOpen(device.port))?;
        log::debug!("linux_spi: Closed {}", port.path);
        Ok(())
    }
}

/// Parse spidev options
///
/// Supported options:
/// - `spi1=/dev/spidevX.Y` - node for channel 1
/// - `spi2=/dev/spidevX.Y` - node for channel 2
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxSpiConfig, String> {
    let mut config = LinuxSpiConfig::default();

    for (key, value) in options {
        match *key {
            "spi1" | "spi2" => {
                if value.is_empty() {
                    return Err(format!("Empty device path for {}", key));
                }
                let slot = if *key == "spi1" {
                    &mut config.spi1
                } else {
                    &mut config.spi2
                };
                *slot = Some(value.to_string());
            }
            _ => {
                log::warn!("linux_spi: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibridge_core::SpiMode;

    #[test]
    fn test_transfer_struct_layout() {
        assert_eq!(
            std::mem::size_of::<SpiIocTransfer>(),
            ioctl::SPI_IOC_TRANSFER_SIZE
        );
        assert_eq!(ioctl::spi_ioc_message(1), 0x4020_6b00);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("spi1", "/dev/spidev0.0"), ("bogus", "1")]).unwrap();
        assert_eq!(config.device(HwPort::Spi1), Some("/dev/spidev0.0"));
        assert_eq!(config.device(HwPort::Spi2), None);
        assert!(parse_options(&[("spi2", "")]).is_err());
    }

    #[test]
    fn test_port_without_node() {
        let mut spi = LinuxSpi::new(LinuxSpiConfig::default());
        let device = HwDevice::new(HwPort::Spi2, 4, 1_000_000, SpiMode::MODE_0);
        assert!(matches!(
            spi.initialize(&device),
            Err(LinuxSpiError::NoDevice(HwPort::Spi2))
        ));
        assert!(!spi.is_open(HwPort::Spi2));
    }

    #[test]
    fn test_missing_node_fails_to_open() {
        let mut spi = LinuxSpi::new(LinuxSpiConfig {
            spi1: Some("/nonexistent/spidev9.9".into()),
            spi2: None,
        });
        let device = HwDevice::new(HwPort::Spi1, 4, 1_000_000, SpiMode::MODE_0);
        assert!(matches!(
            spi.initialize(&device),
            Err(LinuxSpiError::OpenFailed { .. })
        ));
    }

    #[test]
    fn test_unopened_port() {
        let mut spi = LinuxSpi::new(LinuxSpiConfig::default());
        let device = HwDevice::new(HwPort::Spi1, 4, 1_000_000, SpiMode::MODE_0);
        let mut segment = TransferSegment {
            tx: None,
            rx: None,
            len: 1,
        };
        assert!(matches!(
            spi.transfer(&device, &mut segment),
            Err(LinuxSpiError::PortNotOpen(HwPort::Spi1))
        ));
        assert!(matches!(
            spi.finalize(&device),
            Err(LinuxSpiError::PortNotOpen(HwPort::Spi1))
        ));
    }
}
