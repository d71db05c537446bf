//! Simulated hardware SPI ports
//!
//! Each port records the device it was initialized with and every transfer
//! it runs. Receive buffers are filled from the transmit data in loopback
//! mode, otherwise from a per-port response queue and then a fill byte.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use spibridge_core::channel::HwPort;
use spibridge_core::hardware::{HwDevice, TransferSegment};
use spibridge_core::SpiHal;

use crate::SimError;

/// Byte returned when nothing else is available
pub const DEFAULT_FILL: u8 = 0xFF;

/// One recorded transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTransfer {
    /// Port the transfer ran on
    pub port: HwPort,
    /// Word width
    pub bits: u8,
    /// Number of words
    pub len: usize,
    /// Bytes sent (`None` when the caller sent zeros)
    pub tx: Option<Vec<u8>>,
    /// Whether the caller asked for received data
    pub rx: bool,
}

#[derive(Debug, Default)]
struct Port {
    device: Option<HwDevice>,
    responses: VecDeque<u8>,
}

/// In-memory SPI controller pair implementing [`SpiHal`]
#[derive(Debug)]
pub struct SimSpi {
    ports: [Port; 2],
    loopback: bool,
    fill: u8,
    fail_initialize: bool,
    fail_transfer: bool,
    log: Vec<SimTransfer>,
}

impl Default for SimSpi {
    fn default() -> Self {
        Self::new(false)
    }
}

fn slot(port: HwPort) -> usize {
    match port {
        HwPort::Spi1 => 0,
        HwPort::Spi2 => 1,
    }
}

impl SimSpi {
    /// Create both ports, echoing transmit data when `loopback` is set
    pub fn new(loopback: bool) -> Self {
        Self {
            ports: Default::default(),
            loopback,
            fill: DEFAULT_FILL,
            fail_initialize: false,
            fail_transfer: false,
            log: Vec::new(),
        }
    }

    /// Byte used for reads with nothing queued
    pub fn set_fill(&mut self, fill: u8) {
        self.fill = fill;
    }

    /// Queue bytes to be received on `port`
    pub fn queue_response(&mut self, port: HwPort, bytes: &[u8]) {
        self.ports[slot(port)].responses.extend(bytes.iter().copied());
    }

    /// Make `initialize` fail
    pub fn fail_initialize(&mut self, fail: bool) {
        self.fail_initialize = fail;
    }

    /// Make `transfer` fail
    pub fn fail_transfers(&mut self, fail: bool) {
        self.fail_transfer = fail;
    }

    /// Device a port was initialized with, if it is up
    pub fn device(&self, port: HwPort) -> Option<&HwDevice> {
        self.ports[slot(port)].device.as_ref()
    }

    /// Every transfer so far
    pub fn transfers(&self) -> &[SimTransfer] {
        &self.log
    }

    /// Bytes sent on `port`, concatenated
    pub fn sent(&self, port: HwPort) -> Vec<u8> {
        self.log
            .iter()
            .filter(|t| t.port == port)
            .filter_map(|t| t.tx.as_deref())
            .flatten()
            .copied()
            .collect()
    }

    fn next_rx(&mut self, port: HwPort) -> u8 {
        let fill = self.fill;
        self.ports[slot(port)].responses.pop_front().unwrap_or(fill)
    }
}

impl SpiHal for SimSpi {
    type Error = SimError;

    fn initialize(&mut self, device: &HwDevice) -> Result<(), SimError> {
        if self.fail_initialize {
            return Err(SimError::Injected("initialize"));
        }
        self.ports[slot(device.port)].device = Some(*device);
        log::debug!("sim: {} initialized at {} Hz", device.port, device.speed_hz);
        Ok(())
    }

    fn transfer(
        &mut self,
        device: &HwDevice,
        segment: &mut TransferSegment<'_>,
    ) -> Result<(), SimError> {
        if self.ports[slot(device.port)].device.is_none() {
            return Err(SimError::PortDown(device.port));
        }
        if self.fail_transfer {
            return Err(SimError::Injected("transfer"));
        }

        let bytes = segment.len * (device.bits as usize / 8);
        let tx = segment.tx.map(|tx| tx[..bytes].to_vec());
        if let Some(rx) = segment.rx.as_deref_mut() {
            for (i, byte) in rx[..bytes].iter_mut().enumerate() {
                *byte = match (&tx, self.loopback) {
                    (Some(tx), true) => tx[i],
                    (None, true) => 0,
                    _ => self.next_rx(device.port),
                };
            }
        }
        self.log.push(SimTransfer {
            port: device.port,
            bits: device.bits,
            len: segment.len,
            tx,
            rx: segment.rx.is_some(),
        });
        Ok(())
    }

    fn finalize(&mut self, device: &HwDevice) -> Result<(), SimError> {
        match self.ports[slot(device.port)].device.take() {
            Some(_) => Ok(()),
            None => Err(SimError::PortDown(device.port)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibridge_core::SpiMode;

    fn device(port: HwPort) -> HwDevice {
        HwDevice::new(port, 4, 1_000_000, SpiMode::MODE_0)
    }

    #[test]
    fn test_transfer_needs_initialized_port() {
        let mut spi = SimSpi::default();
        let dev = device(HwPort::Spi2);
        let tx = [1u8];
        let mut segment = TransferSegment {
            tx: Some(&tx),
            rx: None,
            len: 1,
        };
        assert_eq!(
            spi.transfer(&dev, &mut segment),
            Err(SimError::PortDown(HwPort::Spi2))
        );

        spi.initialize(&dev).unwrap();
        spi.transfer(&dev, &mut segment).unwrap();
        assert_eq!(spi.sent(HwPort::Spi2), [1]);
        assert!(spi.sent(HwPort::Spi1).is_empty());

        spi.finalize(&dev).unwrap();
        assert!(spi.device(HwPort::Spi2).is_none());
    }

    #[test]
    fn test_responses_then_fill() {
        let mut spi = SimSpi::default();
        let dev = device(HwPort::Spi1);
        spi.initialize(&dev).unwrap();
        spi.queue_response(HwPort::Spi1, &[0x12, 0x34]);

        let mut rx = [0u8; 3];
        let mut segment = TransferSegment {
            tx: None,
            rx: Some(&mut rx),
            len: 3,
        };
        spi.transfer(&dev, &mut segment).unwrap();
        assert_eq!(rx, [0x12, 0x34, DEFAULT_FILL]);
        assert_eq!(spi.transfers()[0].tx, None);
        assert!(spi.transfers()[0].rx);
    }

    #[test]
    fn test_loopback_echoes() {
        let mut spi = SimSpi::new(true);
        let mut dev = device(HwPort::Spi1);
        dev.bits = 16;
        spi.initialize(&dev).unwrap();

        let tx = [0xCD, 0xAB];
        let mut rx = [0u8; 2];
        let mut segment = TransferSegment {
            tx: Some(&tx),
            rx: Some(&mut rx),
            len: 1,
        };
        spi.transfer(&dev, &mut segment).unwrap();
        assert_eq!(rx, tx);
    }
}
