//! Minimal HAL doubles for unit tests inside this crate

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::vec::Vec;

use crate::hal::{CycleCounter, GpioHal, Level, PinDirection, PinId, SpiHal};
use crate::hardware::{HwDevice, TransferSegment};

#[derive(Debug, Default)]
pub struct MockGpio {
    bound: BTreeMap<PinId, PinDirection>,
    levels: BTreeMap<PinId, bool>,
    parked: BTreeSet<PinId>,
    releases: usize,
    /// Output pin whose level is seen on an input pin
    pub loopback: Option<(PinId, PinId)>,
    /// Levels returned by successive reads of unlooped inputs
    pub input: VecDeque<bool>,
    /// Every level written, in order
    pub trace: Vec<(PinId, bool)>,
}

impl MockGpio {
    pub fn direction(&self, pin: PinId) -> Option<PinDirection> {
        self.bound.get(&pin).copied()
    }

    pub fn parked(&self, pin: PinId) -> bool {
        self.parked.contains(&pin)
    }

    pub fn releases(&self) -> usize {
        self.releases
    }

    pub fn level(&self, pin: PinId) -> Option<bool> {
        self.levels.get(&pin).copied()
    }
}

impl GpioHal for MockGpio {
    type Handle = PinId;
    type Error = &'static str;

    fn bind(&mut self, pin: PinId, direction: PinDirection) -> Result<PinId, Self::Error> {
        self.parked.remove(&pin);
        self.bound.insert(pin, direction);
        Ok(pin)
    }

    fn release(&mut self, pin: PinId) {
        self.bound.remove(&pin);
        self.levels.remove(&pin);
        self.parked.insert(pin);
        self.releases += 1;
    }

    fn set_level(&mut self, pin: PinId, level: Level) {
        let high = level == Level::High;
        self.levels.insert(pin, high);
        self.trace.push((pin, high));
    }

    fn read_level(&mut self, pin: PinId) -> bool {
        match self.loopback {
            Some((from, to)) if to == pin => self.levels.get(&from).copied().unwrap_or(false),
            _ => self.input.pop_front().unwrap_or(true),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockSpi {
    pub sent: Vec<u8>,
    pub rx_requested: usize,
    pub loopback: bool,
    pub fail: bool,
}

impl SpiHal for MockSpi {
    type Error = &'static str;

    fn initialize(&mut self, _device: &HwDevice) -> Result<(), Self::Error> {
        if self.fail {
            return Err("init failed");
        }
        Ok(())
    }

    fn transfer(
        &mut self,
        device: &HwDevice,
        segment: &mut TransferSegment<'_>,
    ) -> Result<(), Self::Error> {
        if self.fail {
            return Err("transfer failed");
        }
        let bytes = segment.len * (device.bits as usize / 8);
        if let Some(tx) = segment.tx {
            self.sent.extend_from_slice(&tx[..bytes]);
        }
        if let Some(rx) = segment.rx.as_deref_mut() {
            self.rx_requested += 1;
            match (self.loopback, segment.tx) {
                (true, Some(tx)) => rx[..bytes].copy_from_slice(&tx[..bytes]),
                _ => rx[..bytes].fill(0xA5),
            }
        }
        Ok(())
    }

    fn finalize(&mut self, _device: &HwDevice) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Counter that advances a fixed step on every read
#[derive(Debug, Default)]
pub struct MockCounter {
    now: u32,
}

impl CycleCounter for MockCounter {
    fn cycles(&mut self) -> u32 {
        self.now = self.now.wrapping_add(100);
        self.now
    }
}
