//! Bit-banged SPI engine
//!
//! The software channel drives SCK, MOSI and CS and samples MISO directly.
//! Line access goes through [`BitbangSpiMaster`], which [`SoftSpi`]
//! implements on top of a [`GpioHal`] and a [`CycleCounter`].
//!
//! ## Transfer sequence
//!
//! For one word of N bits (N = 8 or 16), MSB first:
//!
//! 1. SCK to the mode's idle level
//! 2. CS low, wait one bit period
//! 3. per bit: SCK to the leading level, present the bit on MOSI, wait,
//!    SCK to the active level, wait, sample MISO if capturing
//! 4. SCK back to idle, CS high
//!
//! Reads present zeros on MOSI and always capture.

use crate::channel::{BitWidth, SpiMode};
use crate::hal::{CycleCounter, GpioHal, Level};
use crate::timing::busy_wait;

/// Low-level line operations needed to bit-bang SPI
pub trait BitbangSpiMaster {
    /// Set chip select (CS is active low, so `active=true` means CS=0)
    fn set_cs(&mut self, active: bool);

    /// Set clock line value
    fn set_sck(&mut self, high: bool);

    /// Set MOSI line value
    fn set_mosi(&mut self, high: bool);

    /// Sample MISO, `None` when no MISO line is bound
    fn get_miso(&mut self) -> Option<bool>;

    /// Wait one calibrated bit period
    fn bit_delay(&mut self);
}

/// GPIO handles of the software channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftLines<H> {
    /// Clock
    pub sck: H,
    /// Data out
    pub mosi: H,
    /// Data in
    pub miso: Option<H>,
    /// Chip select
    pub cs: H,
}

/// Bit-bang master borrowing the platform GPIO and cycle counter
pub struct SoftSpi<'a, G: GpioHal, C> {
    gpio: &'a mut G,
    counter: &'a mut C,
    lines: SoftLines<G::Handle>,
    divisor: u32,
}

impl<'a, G: GpioHal, C: CycleCounter> SoftSpi<'a, G, C> {
    /// Wrap bound lines; `divisor` is the bit period in counter cycles
    pub fn new(
        gpio: &'a mut G,
        counter: &'a mut C,
        lines: SoftLines<G::Handle>,
        divisor: u32,
    ) -> Self {
        Self {
            gpio,
            counter,
            lines,
            divisor,
        }
    }
}

impl<G: GpioHal, C: CycleCounter> BitbangSpiMaster for SoftSpi<'_, G, C> {
    fn set_cs(&mut self, active: bool) {
        self.gpio.set_level(self.lines.cs, Level::from(!active));
    }

    fn set_sck(&mut self, high: bool) {
        self.gpio.set_level(self.lines.sck, Level::from(high));
    }

    fn set_mosi(&mut self, high: bool) {
        self.gpio.set_level(self.lines.mosi, Level::from(high));
    }

    fn get_miso(&mut self) -> Option<bool> {
        let miso = self.lines.miso?;
        Some(self.gpio.read_level(miso))
    }

    fn bit_delay(&mut self) {
        busy_wait(self.counter, self.divisor);
    }
}

/// Put the bus in its idle state: clock at the mode's idle level, CS high
pub fn idle<M: BitbangSpiMaster + ?Sized>(master: &mut M, mode: SpiMode) {
    master.set_sck(mode.idle_high());
    master.set_cs(false);
}

/// Clock one word out (and optionally in)
///
/// Returns the captured word, or 0 when nothing was captured.
pub fn transfer_word<M: BitbangSpiMaster + ?Sized>(
    master: &mut M,
    mode: SpiMode,
    width: BitWidth,
    out: u16,
    capture: bool,
) -> u16 {
    master.set_sck(mode.idle_high());
    master.set_cs(true);
    master.bit_delay();

    let msb = width.msb();
    let mut tx = out;
    let mut rx = 0u16;
    for _ in 0..width.bits() {
        master.set_sck(mode.leading_level());
        master.set_mosi(tx & msb != 0);
        master.bit_delay();

        master.set_sck(mode.active_level());
        master.bit_delay();

        if capture {
            if let Some(bit) = master.get_miso() {
                rx = (rx << 1) | bit as u16;
            }
        }
        tx <<= 1;
    }

    idle(master, mode);
    rx & width.max_value()
}

/// Send one word, returning the input sampled alongside it when `capture` is set
pub fn write_word<M: BitbangSpiMaster + ?Sized>(
    master: &mut M,
    mode: SpiMode,
    width: BitWidth,
    word: u16,
    capture: bool,
) -> u16 {
    transfer_word(master, mode, width, word, capture)
}

/// Receive one word while sending zeros
pub fn read_word<M: BitbangSpiMaster + ?Sized>(
    master: &mut M,
    mode: SpiMode,
    width: BitWidth,
) -> u16 {
    transfer_word(master, mode, width, 0, true)
}
