//! Platform collaborator traits
//!
//! The core never touches registers. Everything platform specific is reached
//! through three small traits:
//!
//! - [`GpioHal`] - bind, release, drive and sample individual GPIO lines
//! - [`SpiHal`] - initialize, transfer on and finalize a hardware SPI port
//! - [`CycleCounter`] - a free-running counter used for bit-period timing
//!
//! All calls are blocking. Implementations report failures through their own
//! error type; the core logs the error and folds it into
//! [`Error::HardwareInitFailure`](crate::Error::HardwareInitFailure).

use core::fmt;

use crate::hardware::{HwDevice, TransferSegment};

/// Logical board pin number
pub type PinId = u16;

/// Output level of a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Driven low
    Low,
    /// Driven high
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Direction a pin is bound with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    /// Push-pull output
    Output,
    /// Input with pull-up (also the safe state of a released pin)
    InputPullUp,
}

/// GPIO line access
pub trait GpioHal {
    /// Handle returned when a pin is bound
    type Handle: Copy + fmt::Debug;
    /// Platform error type
    type Error: fmt::Display;

    /// Acquire `pin` with the given direction
    fn bind(&mut self, pin: PinId, direction: PinDirection) -> Result<Self::Handle, Self::Error>;

    /// Release a bound line, leaving it as an input with pull-up
    fn release(&mut self, handle: Self::Handle);

    /// Drive an output line
    fn set_level(&mut self, handle: Self::Handle, level: Level);

    /// Sample a line, `true` when high
    fn read_level(&mut self, handle: Self::Handle) -> bool;
}

/// Blocking hardware SPI controller access
pub trait SpiHal {
    /// Platform error type
    type Error: fmt::Display;

    /// Bring up the port described by `device`
    fn initialize(&mut self, device: &HwDevice) -> Result<(), Self::Error>;

    /// Run one transfer segment on an initialized port
    ///
    /// `segment.len` counts words of `device.bits` bits. Buffers hold 16-bit
    /// words little-endian.
    fn transfer(
        &mut self,
        device: &HwDevice,
        segment: &mut TransferSegment<'_>,
    ) -> Result<(), Self::Error>;

    /// Shut the port down
    fn finalize(&mut self, device: &HwDevice) -> Result<(), Self::Error>;
}

/// Free-running cycle counter
///
/// The counter may wrap; consumers only look at wrapping differences.
pub trait CycleCounter {
    /// Current counter value
    fn cycles(&mut self) -> u32;
}
