//! Pin binding table
//!
//! Every GPIO line used by a channel is recorded here, keyed by physical pin.
//! A pin belongs to at most one channel at a time. Binding a pin that is
//! already owned releases the old binding first and logs the transfer, so
//! the previous owner loses the line visibly instead of silently.
//!
//! Hardware chip-select pins are driven by the SPI controller, not by us.
//! They are recorded as *claims*: ownership without a GPIO handle. Releasing
//! a claim still parks the line as an input with pull-up.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use crate::channel::ChannelId;
use crate::error::{Error, Result};
use crate::hal::{GpioHal, PinDirection, PinId};

/// What a pin is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    /// Chip select
    ChipSelect,
    /// Clock
    Sck,
    /// Data out
    Mosi,
    /// Data in
    Miso,
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChipSelect => write!(f, "CS"),
            Self::Sck => write!(f, "SCK"),
            Self::Mosi => write!(f, "MOSI"),
            Self::Miso => write!(f, "MISO"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Binding<H> {
    owner: ChannelId,
    role: PinRole,
    handle: Option<H>,
}

/// Table of pins currently owned by channels
#[derive(Debug)]
pub struct PinBindings<H> {
    table: BTreeMap<PinId, Binding<H>>,
}

impl<H> Default for PinBindings<H> {
    fn default() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }
}

impl<H: Copy + fmt::Debug> PinBindings<H> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `pin` to `owner` in `role`, releasing any previous binding
    pub fn bind<G>(
        &mut self,
        gpio: &mut G,
        pin: PinId,
        owner: ChannelId,
        role: PinRole,
        direction: PinDirection,
    ) -> Result<H>
    where
        G: GpioHal<Handle = H>,
    {
        self.evict(gpio, pin, owner, role);

        let handle = gpio.bind(pin, direction).map_err(|e| {
            log::error!("spi: failed to bind pin {} as {}: {}", pin, role, e);
            Error::HardwareInitFailure
        })?;
        log::debug!(
            "spi: pin {} bound to channel {} as {} ({:?})",
            pin,
            owner,
            role,
            direction
        );
        self.table.insert(
            pin,
            Binding {
                owner,
                role,
                handle: Some(handle),
            },
        );
        Ok(handle)
    }

    /// Record ownership of a pin that the hardware drives itself
    pub fn claim<G>(&mut self, gpio: &mut G, pin: PinId, owner: ChannelId, role: PinRole)
    where
        G: GpioHal<Handle = H>,
    {
        self.evict(gpio, pin, owner, role);
        log::debug!("spi: pin {} claimed by channel {} as {}", pin, owner, role);
        self.table.insert(
            pin,
            Binding {
                owner,
                role,
                handle: None,
            },
        );
    }

    /// Release `pin`, returning it to input with pull-up
    ///
    /// Releasing a free pin is a no-op. Returns whether the pin was bound.
    pub fn release<G>(&mut self, gpio: &mut G, pin: PinId) -> bool
    where
        G: GpioHal<Handle = H>,
    {
        match self.table.remove(&pin) {
            Some(binding) => {
                Self::free(gpio, pin, binding);
                true
            }
            None => false,
        }
    }

    /// Release every pin still owned by `owner`, returning how many were freed
    pub fn release_channel<G>(&mut self, gpio: &mut G, owner: ChannelId) -> usize
    where
        G: GpioHal<Handle = H>,
    {
        let owned: Vec<PinId> = self.pins_of(owner).collect();
        for &pin in &owned {
            self.release(gpio, pin);
        }
        owned.len()
    }

    /// Current owner and role of `pin`
    pub fn owner(&self, pin: PinId) -> Option<(ChannelId, PinRole)> {
        self.table.get(&pin).map(|b| (b.owner, b.role))
    }

    /// GPIO handle of a bound pin
    pub fn handle(&self, pin: PinId) -> Option<H> {
        self.table.get(&pin).and_then(|b| b.handle)
    }

    /// Pins owned by `owner`, in pin order
    pub fn pins_of(&self, owner: ChannelId) -> impl Iterator<Item = PinId> + '_ {
        self.table
            .iter()
            .filter(move |(_, b)| b.owner == owner)
            .map(|(pin, _)| *pin)
    }

    /// Number of bound or claimed pins
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no pin is bound
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn evict<G>(&mut self, gpio: &mut G, pin: PinId, owner: ChannelId, role: PinRole)
    where
        G: GpioHal<Handle = H>,
    {
        let Some(previous) = self.table.remove(&pin) else {
            return;
        };
        if previous.owner != owner {
            log::info!(
                "spi: pin {} moves from channel {} ({}) to channel {} ({})",
                pin,
                previous.owner,
                previous.role,
                owner,
                role
            );
        } else if previous.role != role {
            log::warn!(
                "spi: channel {} reuses pin {} ({} -> {})",
                owner,
                pin,
                previous.role,
                role
            );
        }
        if let Some(handle) = previous.handle {
            gpio.release(handle);
        }
    }

    fn free<G>(gpio: &mut G, pin: PinId, binding: Binding<H>)
    where
        G: GpioHal<Handle = H>,
    {
        match binding.handle {
            Some(handle) => gpio.release(handle),
            // Claimed pins were never bound by us; park them explicitly
            None => match gpio.bind(pin, PinDirection::InputPullUp) {
                Ok(handle) => gpio.release(handle),
                Err(e) => log::error!("spi: failed to park pin {}: {}", pin, e),
            },
        }
        log::debug!(
            "spi: pin {} ({}) released by channel {}",
            pin,
            binding.role,
            binding.owner
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGpio;

    #[test]
    fn test_bind_and_release() {
        let mut gpio = MockGpio::default();
        let mut pins = PinBindings::new();

        let h = pins
            .bind(&mut gpio, 5, ChannelId::SOFTWARE, PinRole::Sck, PinDirection::Output)
            .unwrap();
        assert_eq!(h, 5);
        assert_eq!(pins.owner(5), Some((ChannelId::SOFTWARE, PinRole::Sck)));
        assert_eq!(gpio.direction(5), Some(PinDirection::Output));

        assert!(pins.release(&mut gpio, 5));
        assert_eq!(pins.owner(5), None);
        assert_eq!(gpio.direction(5), None);
        assert!(gpio.parked(5));

        // Releasing a free pin is harmless
        assert!(!pins.release(&mut gpio, 5));
    }

    #[test]
    fn test_rebinding_transfers_ownership() {
        let mut gpio = MockGpio::default();
        let mut pins = PinBindings::new();

        pins.bind(&mut gpio, 7, ChannelId::SOFTWARE, PinRole::ChipSelect, PinDirection::Output)
            .unwrap();
        pins.claim(&mut gpio, 7, ChannelId::HW1, PinRole::ChipSelect);
        assert_eq!(pins.owner(7), Some((ChannelId::HW1, PinRole::ChipSelect)));
        assert_eq!(pins.handle(7), None);
        assert_eq!(gpio.releases(), 1);

        // The old owner no longer frees the pin
        assert_eq!(pins.release_channel(&mut gpio, ChannelId::SOFTWARE), 0);
        assert_eq!(pins.owner(7), Some((ChannelId::HW1, PinRole::ChipSelect)));
    }

    #[test]
    fn test_release_channel_frees_only_its_pins() {
        let mut gpio = MockGpio::default();
        let mut pins = PinBindings::new();
        for (pin, role) in [(5, PinRole::Sck), (6, PinRole::Mosi), (7, PinRole::ChipSelect)] {
            pins.bind(&mut gpio, pin, ChannelId::SOFTWARE, role, PinDirection::Output)
                .unwrap();
        }
        pins.claim(&mut gpio, 9, ChannelId::HW2, PinRole::ChipSelect);

        assert_eq!(pins.release_channel(&mut gpio, ChannelId::SOFTWARE), 3);
        assert_eq!(pins.len(), 1);
        assert_eq!(pins.release_channel(&mut gpio, ChannelId::HW2), 1);
        assert!(pins.is_empty());
        assert!(gpio.parked(9));
    }
}
