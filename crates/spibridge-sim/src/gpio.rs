//! Simulated GPIO bank
//!
//! Every pin keeps its direction and last driven level. Input pins read, in
//! order of precedence: the level of the output wired to them, then bits
//! queued for that pin, then the pull-up (high).

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use spibridge_core::{GpioHal, Level, PinDirection, PinId};

use crate::SimError;

/// State of one simulated pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    /// Bound by a channel
    Bound(PinDirection),
    /// Released to input with pull-up
    Parked,
}

/// One level change driven on an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    /// Pin that was driven
    pub pin: PinId,
    /// New level
    pub high: bool,
}

/// In-memory GPIO bank implementing [`GpioHal`]
#[derive(Debug)]
pub struct SimGpio {
    pin_count: u16,
    state: BTreeMap<PinId, PinState>,
    levels: BTreeMap<PinId, bool>,
    wires: BTreeMap<PinId, PinId>,
    queued: BTreeMap<PinId, VecDeque<bool>>,
    broken: Vec<PinId>,
    trace: Vec<LineEvent>,
    binds: usize,
    releases: usize,
}

impl SimGpio {
    /// Create a bank of `pin_count` pins, all unbound
    pub fn new(pin_count: u16) -> Self {
        Self {
            pin_count,
            state: BTreeMap::new(),
            levels: BTreeMap::new(),
            wires: BTreeMap::new(),
            queued: BTreeMap::new(),
            broken: Vec::new(),
            trace: Vec::new(),
            binds: 0,
            releases: 0,
        }
    }

    /// Connect output `from` to input `to`
    pub fn wire(&mut self, from: PinId, to: PinId) {
        self.wires.insert(to, from);
    }

    /// Remove the wire feeding `to`
    pub fn unwire(&mut self, to: PinId) {
        self.wires.remove(&to);
    }

    /// Queue bits to be returned by successive reads of `pin`
    pub fn queue_bits(&mut self, pin: PinId, bits: impl IntoIterator<Item = bool>) {
        self.queued.entry(pin).or_default().extend(bits);
    }

    /// Queue a word MSB first, as the bit-bang engine samples it
    pub fn queue_word(&mut self, pin: PinId, word: u16, bits: u8) {
        let bits = (0..bits).rev().map(|i| word & (1 << i) != 0);
        self.queue_bits(pin, bits);
    }

    /// Queue bytes MSB first
    pub fn queue_bytes(&mut self, pin: PinId, bytes: &[u8]) {
        for &byte in bytes {
            self.queue_word(pin, byte as u16, 8);
        }
    }

    /// Make binding `pin` fail
    pub fn break_pin(&mut self, pin: PinId) {
        self.broken.push(pin);
    }

    /// Current state of `pin`, `None` if it was never touched
    pub fn state(&self, pin: PinId) -> Option<PinState> {
        self.state.get(&pin).copied()
    }

    /// Direction of a bound pin
    pub fn direction(&self, pin: PinId) -> Option<PinDirection> {
        match self.state(pin)? {
            PinState::Bound(direction) => Some(direction),
            PinState::Parked => None,
        }
    }

    /// Whether `pin` was released to input with pull-up
    pub fn is_parked(&self, pin: PinId) -> bool {
        self.state(pin) == Some(PinState::Parked)
    }

    /// Last level driven on a bound pin
    pub fn level(&self, pin: PinId) -> Option<bool> {
        self.levels.get(&pin).copied()
    }

    /// Every level change so far
    pub fn trace(&self) -> &[LineEvent] {
        &self.trace
    }

    /// Levels driven on `pin`, in order
    pub fn levels_of(&self, pin: PinId) -> Vec<bool> {
        self.trace
            .iter()
            .filter(|e| e.pin == pin)
            .map(|e| e.high)
            .collect()
    }

    /// Forget the recorded trace
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Number of successful binds and releases
    pub fn bind_counts(&self) -> (usize, usize) {
        (self.binds, self.releases)
    }
}

impl Default for SimGpio {
    fn default() -> Self {
        Self::new(spibridge_core::DEFAULT_PIN_COUNT)
    }
}

impl GpioHal for SimGpio {
    type Handle = PinId;
    type Error = SimError;

    fn bind(&mut self, pin: PinId, direction: PinDirection) -> Result<PinId, SimError> {
        if pin >= self.pin_count {
            return Err(SimError::NoSuchPin(pin));
        }
        if self.broken.contains(&pin) {
            return Err(SimError::Broken(pin));
        }
        self.state.insert(pin, PinState::Bound(direction));
        self.levels.remove(&pin);
        self.binds += 1;
        Ok(pin)
    }

    fn release(&mut self, pin: PinId) {
        self.state.insert(pin, PinState::Parked);
        self.levels.remove(&pin);
        self.releases += 1;
    }

    fn set_level(&mut self, pin: PinId, level: Level) {
        if self.direction(pin) != Some(PinDirection::Output) {
            log::error!("sim: pin {} is not an output, ignoring level {:?}", pin, level);
            return;
        }
        let high = level == Level::High;
        self.levels.insert(pin, high);
        self.trace.push(LineEvent { pin, high });
    }

    fn read_level(&mut self, pin: PinId) -> bool {
        if let Some(from) = self.wires.get(&pin) {
            return self.levels.get(from).copied().unwrap_or(false);
        }
        self.queued
            .get_mut(&pin)
            .and_then(VecDeque::pop_front)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_checks_pin_range() {
        let mut gpio = SimGpio::new(4);
        assert_eq!(gpio.bind(3, PinDirection::Output), Ok(3));
        assert_eq!(gpio.bind(4, PinDirection::Output), Err(SimError::NoSuchPin(4)));
        gpio.break_pin(2);
        assert_eq!(gpio.bind(2, PinDirection::Output), Err(SimError::Broken(2)));
    }

    #[test]
    fn test_input_sources() {
        let mut gpio = SimGpio::default();
        gpio.bind(1, PinDirection::Output).unwrap();
        gpio.bind(2, PinDirection::InputPullUp).unwrap();

        // Pull-up when nothing is queued
        assert!(gpio.read_level(2));

        gpio.queue_word(2, 0b10, 2);
        assert!(gpio.read_level(2));
        assert!(!gpio.read_level(2));

        gpio.wire(1, 2);
        gpio.set_level(1, Level::Low);
        assert!(!gpio.read_level(2));
        gpio.set_level(1, Level::High);
        assert!(gpio.read_level(2));
    }

    #[test]
    fn test_release_parks_pin() {
        let mut gpio = SimGpio::default();
        gpio.bind(5, PinDirection::Output).unwrap();
        gpio.set_level(5, Level::High);
        gpio.release(5);
        assert!(gpio.is_parked(5));
        assert_eq!(gpio.level(5), None);

        // Driving a parked pin is ignored
        gpio.set_level(5, Level::Low);
        assert_eq!(gpio.levels_of(5), [true]);
        assert_eq!(gpio.bind_counts(), (1, 1));
    }
}
