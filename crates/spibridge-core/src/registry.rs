//! Per-channel live state
//!
//! Exactly one slot per [`ChannelId`]. A slot holds the last committed
//! configuration, the full-duplex flag and the `initialized` gate. Slots are
//! replaced wholesale on setup; deinit only clears the gate.

use crate::bitbang::SoftLines;
use crate::channel::{ChannelId, SpiMode, CHANNEL_COUNT};
use crate::error::{Error, Result};
use crate::hal::PinId;
use crate::hardware::HwDevice;

/// Bound software channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftChannel<H> {
    /// Clock mode
    pub mode: SpiMode,
    /// Counter cycles per half bit
    pub divisor: u32,
    /// GPIO handles
    pub lines: SoftLines<H>,
    /// Physical pins behind `lines`
    pub pins: SoftLines<PinId>,
}

/// Committed configuration of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelConfig<H> {
    /// Bit-banged over GPIO
    Software(SoftChannel<H>),
    /// Hardware controller
    Hardware(HwDevice),
}

/// One registry slot
#[derive(Debug, Clone, Copy)]
pub struct ChannelSlot<H> {
    /// Last committed configuration
    pub config: Option<ChannelConfig<H>>,
    /// Writes return sampled input instead of a count
    pub full_duplex: bool,
    initialized: bool,
}

impl<H> Default for ChannelSlot<H> {
    fn default() -> Self {
        Self {
            config: None,
            full_duplex: false,
            initialized: false,
        }
    }
}

impl<H> ChannelSlot<H> {
    /// Whether transfers are allowed on this channel
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// The three channel slots
#[derive(Debug)]
pub struct ChannelRegistry<H> {
    slots: [ChannelSlot<H>; CHANNEL_COUNT],
}

impl<H> Default for ChannelRegistry<H> {
    fn default() -> Self {
        Self {
            slots: core::array::from_fn(|_| ChannelSlot::default()),
        }
    }
}

impl<H: Copy> ChannelRegistry<H> {
    /// Create a registry with every channel uninitialized
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `id`
    pub fn get(&self, id: ChannelId) -> &ChannelSlot<H> {
        &self.slots[id.index()]
    }

    /// Mutable slot of `id`
    pub fn get_mut(&mut self, id: ChannelId) -> &mut ChannelSlot<H> {
        &mut self.slots[id.index()]
    }

    /// Commit a configuration and mark the channel initialized
    pub fn set(&mut self, id: ChannelId, config: ChannelConfig<H>, full_duplex: bool) {
        self.slots[id.index()] = ChannelSlot {
            config: Some(config),
            full_duplex,
            initialized: true,
        };
    }

    /// Clear the initialized gate, returning the configuration that was live
    pub fn clear(&mut self, id: ChannelId) -> Option<ChannelConfig<H>> {
        let slot = &mut self.slots[id.index()];
        if !slot.initialized {
            return None;
        }
        slot.initialized = false;
        slot.config
    }

    /// Whether `id` is initialized
    pub fn is_initialized(&self, id: ChannelId) -> bool {
        self.slots[id.index()].initialized
    }

    /// Live configuration of an initialized channel
    pub fn live(&self, id: ChannelId) -> Result<(ChannelConfig<H>, bool)> {
        let slot = &self.slots[id.index()];
        match (slot.initialized, slot.config) {
            (true, Some(config)) => Ok((config, slot.full_duplex)),
            _ => Err(Error::NotConfigured),
        }
    }
}
