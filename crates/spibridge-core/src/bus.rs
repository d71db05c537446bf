//! Transaction dispatcher
//!
//! [`SpiBus`] is the public operation surface. It owns the platform HALs,
//! the channel registry and the pin binding table, and routes every call to
//! the bit-bang engine (channel 0) or the hardware adapter (channels 1, 2).
//!
//! Every operation validates the raw channel id first. All operations except
//! [`SpiBus::setup`] then fail with [`Error::NotConfigured`] until the
//! channel has been set up.
//!
//! # Example
//!
//! ```ignore
//! let mut bus = SpiBus::new(gpio, spi, counter);
//! let table = ConfigTable::parse("mode=0,sck=5,mosi=6,miso=8,cs=7")?;
//! bus.setup(0, &table)?;
//! bus.write(0, 8, &[WriteItem::Word(0x9F)])?;
//! let id = bus.read_bytes(0, 3)?;
//! ```

use alloc::vec;
use alloc::vec::Vec;

use crate::bitbang::{self, BitbangSpiMaster, SoftLines, SoftSpi};
use crate::channel::{BitWidth, ChannelId, ChannelKind, HwPort};
use crate::config::{self, ChannelSetup, ClockSpeed, ConfigTable, SoftPins};
use crate::error::{Error, Result};
use crate::hal::{CycleCounter, GpioHal, PinDirection, PinId, SpiHal};
use crate::hardware::{self, HwDevice};
use crate::pins::{PinBindings, PinRole};
use crate::registry::{ChannelConfig, ChannelRegistry, SoftChannel};

/// Largest bulk read, in bytes
pub const MAX_READ_BYTES: usize = 512;

/// Board pin count used by [`SpiBus::new`]
pub const DEFAULT_PIN_COUNT: u16 = 18;

/// One argument of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteItem {
    /// A single word
    Word(i64),
    /// A sequence of words
    Words(Vec<i64>),
    /// Raw bytes, always sent as 8-bit words
    Bytes(Vec<u8>),
}

/// Result of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Number of words sent (full duplex off)
    Count(usize),
    /// Last word sampled while sending (full duplex on)
    Sampled(u16),
}

impl WriteOutcome {
    /// Integer a script caller sees
    pub fn value(self) -> i64 {
        match self {
            Self::Count(n) => n as i64,
            Self::Sampled(word) => word as i64,
        }
    }
}

/// Result of a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `count == 1`
    Word(u16),
    /// `count > 1`
    Words(Vec<u16>),
}

/// Write argument after range checking
#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Word(u16),
    Block(&'a [u8]),
}

impl Chunk<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Word(_) => 1,
            Self::Block(bytes) => bytes.len(),
        }
    }
}

/// Check every write argument before anything goes on the wire
fn resolve(items: &[WriteItem], width: BitWidth) -> Result<Vec<Chunk<'_>>> {
    let mut chunks = Vec::with_capacity(items.len());
    for item in items {
        match item {
            WriteItem::Word(value) => chunks.push(Chunk::Word(width.check(*value)?)),
            WriteItem::Words(values) => {
                for value in values {
                    chunks.push(Chunk::Word(width.check(*value)?));
                }
            }
            WriteItem::Bytes(bytes) if !bytes.is_empty() => chunks.push(Chunk::Block(bytes)),
            WriteItem::Bytes(_) => {}
        }
    }
    Ok(chunks)
}

/// Three-channel SPI dispatcher over platform HALs
pub struct SpiBus<G: GpioHal, S, C> {
    gpio: G,
    spi: S,
    counter: C,
    pin_count: u16,
    registry: ChannelRegistry<G::Handle>,
    pins: PinBindings<G::Handle>,
}

impl<G: GpioHal, S: SpiHal, C: CycleCounter> SpiBus<G, S, C> {
    /// Create a bus for a board with [`DEFAULT_PIN_COUNT`] pins
    pub fn new(gpio: G, spi: S, counter: C) -> Self {
        Self::with_pin_count(gpio, spi, counter, DEFAULT_PIN_COUNT)
    }

    /// Create a bus for a board with pins `0..pin_count`
    pub fn with_pin_count(gpio: G, spi: S, counter: C, pin_count: u16) -> Self {
        Self {
            gpio,
            spi,
            counter,
            pin_count,
            registry: ChannelRegistry::new(),
            pins: PinBindings::new(),
        }
    }

    /// Configure channel `id`
    ///
    /// `None` stands for a call without any table and gives
    /// [`Error::MissingConfiguration`]; a table without `mode` is reported as
    /// a missing field instead.
    ///
    /// The table is fully validated before anything changes; a rejected
    /// table leaves the channel exactly as it was. A valid table replaces
    /// the previous setup: the old pins are released (and a hardware port
    /// finalized) before the new ones are bound.
    pub fn setup<'t>(
        &mut self,
        id: i64,
        table: impl Into<Option<&'t ConfigTable>>,
    ) -> Result<()> {
        let id = ChannelId::new(id)?;
        let table = table.into().ok_or(Error::MissingConfiguration)?;
        let setup = config::validate(id, table, self.pin_count)?;

        self.teardown(id);

        let config = match (id.kind(), setup.speed, setup.soft_pins) {
            (ChannelKind::Software, ClockSpeed::Divisor(divisor), Some(pins)) => {
                ChannelConfig::Software(self.bring_up_software(id, &setup, divisor, pins)?)
            }
            (ChannelKind::Hardware(port), ClockSpeed::Hertz(hz), None) => {
                ChannelConfig::Hardware(self.bring_up_hardware(id, port, &setup, hz)?)
            }
            _ => return Err(Error::MissingConfiguration),
        };
        self.registry.set(id, config, setup.full_duplex);
        Ok(())
    }

    /// Send words and byte strings
    ///
    /// Returns the number of words sent, or with full duplex on the last
    /// word sampled while sending.
    pub fn write(
        &mut self,
        id: i64,
        bit_width: i64,
        items: &[WriteItem],
    ) -> Result<WriteOutcome> {
        let id = ChannelId::new(id)?;
        let (config, full_duplex) = self.registry.live(id)?;
        let width = BitWidth::new(bit_width)?;
        if items.is_empty() {
            return Err(Error::NothingToWrite);
        }

        let chunks = resolve(items, width)?;
        // Empty sequences and strings are valid; they just send nothing
        let count: usize = chunks.iter().map(Chunk::len).sum();
        let last = self.transmit(&config, width, &chunks, full_duplex)?;
        log::debug!("spi: channel {} wrote {} words ({} bits)", id, count, width.bits());
        Ok(if full_duplex {
            WriteOutcome::Sampled(last)
        } else {
            WriteOutcome::Count(count)
        })
    }

    /// Send `value` `count` times with full duplex forced off
    ///
    /// The channel's full-duplex flag is restored afterwards, whether or
    /// not the writes succeeded.
    pub fn repeat_write(
        &mut self,
        id: i64,
        bit_width: i64,
        value: i64,
        count: usize,
    ) -> Result<usize> {
        let id = ChannelId::new(id)?;
        let (config, _) = self.registry.live(id)?;
        let width = BitWidth::new(bit_width)?;
        let word = width.check(value)?;

        let saved = core::mem::replace(&mut self.registry.get_mut(id).full_duplex, false);
        let capture = self.registry.get(id).full_duplex;
        let chunk = [Chunk::Word(word)];
        let mut result = Ok(());
        for _ in 0..count {
            if let Err(e) = self.transmit(&config, width, &chunk, capture) {
                result = Err(e);
                break;
            }
        }
        self.registry.get_mut(id).full_duplex = saved;

        result?;
        log::debug!("spi: channel {} repeated 0x{:x} {} times", id, word, count);
        Ok(count)
    }

    /// Receive `count` words
    ///
    /// Hardware channels only support single-word reads here; a larger
    /// `count` yields an empty sequence.
    pub fn read(&mut self, id: i64, bit_width: i64, count: usize) -> Result<ReadOutcome> {
        let id = ChannelId::new(id)?;
        let (config, _) = self.registry.live(id)?;
        let width = BitWidth::new(bit_width)?;
        if count == 0 {
            return Err(Error::NothingToRead);
        }

        match config {
            ChannelConfig::Software(soft) => {
                if soft.lines.miso.is_none() {
                    return Err(Error::MisoNotConfigured);
                }
                let mut master =
                    SoftSpi::new(&mut self.gpio, &mut self.counter, soft.lines, soft.divisor);
                if count == 1 {
                    let word = bitbang::read_word(&mut master, soft.mode, width);
                    return Ok(ReadOutcome::Word(word));
                }
                let words = (0..count)
                    .map(|_| bitbang::read_word(&mut master, soft.mode, width))
                    .collect();
                Ok(ReadOutcome::Words(words))
            }
            ChannelConfig::Hardware(mut device) => {
                if count == 1 {
                    let word = hardware::read_word(&mut self.spi, &mut device, width)?;
                    return Ok(ReadOutcome::Word(word));
                }
                log::warn!(
                    "spi: channel {}: multi-word read is not supported on {}, returning nothing",
                    id,
                    device.port
                );
                Ok(ReadOutcome::Words(Vec::new()))
            }
        }
    }

    /// Receive `count` bytes (1 to [`MAX_READ_BYTES`])
    pub fn read_bytes(
        &mut self,
        id: i64,
        count: usize,
    ) -> Result<heapless::Vec<u8, MAX_READ_BYTES>> {
        let id = ChannelId::new(id)?;
        let (config, _) = self.registry.live(id)?;
        if let ChannelConfig::Software(soft) = &config {
            if soft.lines.miso.is_none() {
                return Err(Error::MisoNotConfigured);
            }
        }
        if count == 0 {
            return Err(Error::NothingToRead);
        }
        if count > MAX_READ_BYTES {
            return Err(Error::SizeLimitExceeded);
        }

        let mut buf = [0u8; MAX_READ_BYTES];
        match config {
            ChannelConfig::Software(soft) => {
                let mut master =
                    SoftSpi::new(&mut self.gpio, &mut self.counter, soft.lines, soft.divisor);
                for byte in &mut buf[..count] {
                    *byte = bitbang::read_word(&mut master, soft.mode, BitWidth::Bits8) as u8;
                }
            }
            ChannelConfig::Hardware(mut device) => {
                hardware::read_block(&mut self.spi, &mut device, &mut buf[..count])?;
            }
        }
        log::debug!("spi: channel {} read {} bytes", id, count);
        heapless::Vec::from_slice(&buf[..count]).map_err(|_| Error::SizeLimitExceeded)
    }

    /// Tear channel `id` down and release its pins
    pub fn deinit(&mut self, id: i64) -> Result<()> {
        let id = ChannelId::new(id)?;
        if !self.registry.is_initialized(id) {
            return Err(Error::NotConfigured);
        }
        let freed = self.teardown(id);
        log::info!("spi: channel {} deinitialized ({} pins released)", id, freed);
        Ok(())
    }

    /// Whether channel `id` accepts transfers
    pub fn is_initialized(&self, id: ChannelId) -> bool {
        self.registry.is_initialized(id)
    }

    /// Full-duplex flag of channel `id`
    pub fn full_duplex(&self, id: ChannelId) -> bool {
        self.registry.get(id).full_duplex
    }

    /// Channel state
    pub fn registry(&self) -> &ChannelRegistry<G::Handle> {
        &self.registry
    }

    /// Pin ownership table
    pub fn pins(&self) -> &PinBindings<G::Handle> {
        &self.pins
    }

    /// Number of pins on the board
    pub fn pin_count(&self) -> u16 {
        self.pin_count
    }

    /// GPIO backend
    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    /// Mutable GPIO backend
    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }

    /// SPI backend
    pub fn spi(&self) -> &S {
        &self.spi
    }

    /// Mutable SPI backend
    pub fn spi_mut(&mut self) -> &mut S {
        &mut self.spi
    }

    /// Finalize a live hardware port and release everything `id` owns
    fn teardown(&mut self, id: ChannelId) -> usize {
        if let Some(ChannelConfig::Hardware(device)) = self.registry.clear(id) {
            hardware::finalize(&mut self.spi, &device);
        }
        self.pins.release_channel(&mut self.gpio, id)
    }

    fn bring_up_software(
        &mut self,
        id: ChannelId,
        setup: &ChannelSetup,
        divisor: u32,
        pins: SoftPins,
    ) -> Result<SoftChannel<G::Handle>> {
        let pins = SoftLines {
            sck: pins.sck,
            mosi: pins.mosi,
            miso: pins.miso,
            cs: setup.chip_select,
        };
        let lines = match self.bind_soft_lines(id, &pins) {
            Ok(lines) => lines,
            Err(e) => {
                self.pins.release_channel(&mut self.gpio, id);
                return Err(e);
            }
        };

        let mut master = SoftSpi::new(&mut self.gpio, &mut self.counter, lines, divisor);
        master.set_mosi(false);
        bitbang::idle(&mut master, setup.mode);

        log::info!(
            "spi: channel {} up (software, mode={}, divisor={}, sck={}, mosi={}, miso={:?}, cs={})",
            id,
            setup.mode,
            divisor,
            pins.sck,
            pins.mosi,
            pins.miso,
            pins.cs
        );
        Ok(SoftChannel {
            mode: setup.mode,
            divisor,
            lines,
            pins,
        })
    }

    fn bind_soft_lines(
        &mut self,
        id: ChannelId,
        pins: &SoftLines<PinId>,
    ) -> Result<SoftLines<G::Handle>> {
        let cs = self.bind_line(id, pins.cs, PinRole::ChipSelect, PinDirection::Output)?;
        let sck = self.bind_line(id, pins.sck, PinRole::Sck, PinDirection::Output)?;
        let mosi = self.bind_line(id, pins.mosi, PinRole::Mosi, PinDirection::Output)?;
        let miso = match pins.miso {
            Some(pin) => Some(self.bind_line(id, pin, PinRole::Miso, PinDirection::InputPullUp)?),
            None => None,
        };
        Ok(SoftLines { sck, mosi, miso, cs })
    }

    /// Bind a line for `id`, sharing the handle if this setup already bound the pin
    fn bind_line(
        &mut self,
        id: ChannelId,
        pin: PinId,
        role: PinRole,
        direction: PinDirection,
    ) -> Result<G::Handle> {
        let shared = self.pins.owner(pin).zip(self.pins.handle(pin));
        if let Some(((owner, previous), handle)) = shared {
            if owner == id {
                log::warn!(
                    "spi: channel {} uses pin {} as both {} and {}",
                    id,
                    pin,
                    previous,
                    role
                );
                return Ok(handle);
            }
        }
        self.pins.bind(&mut self.gpio, pin, id, role, direction)
    }

    fn bring_up_hardware(
        &mut self,
        id: ChannelId,
        port: HwPort,
        setup: &ChannelSetup,
        hz: u32,
    ) -> Result<HwDevice> {
        self.pins.claim(&mut self.gpio, setup.chip_select, id, PinRole::ChipSelect);
        let device = HwDevice::new(port, setup.chip_select, hz, setup.mode);
        if let Err(e) = hardware::initialize(&mut self.spi, &device) {
            self.pins.release_channel(&mut self.gpio, id);
            return Err(e);
        }
        Ok(device)
    }

    /// Put resolved chunks on the wire, returning the last sampled word
    fn transmit(
        &mut self,
        config: &ChannelConfig<G::Handle>,
        width: BitWidth,
        chunks: &[Chunk<'_>],
        capture: bool,
    ) -> Result<u16> {
        let mut last = 0;
        match config {
            ChannelConfig::Software(soft) => {
                let mut master =
                    SoftSpi::new(&mut self.gpio, &mut self.counter, soft.lines, soft.divisor);
                for chunk in chunks {
                    match chunk {
                        Chunk::Word(word) => {
                            last =
                                bitbang::write_word(&mut master, soft.mode, width, *word, capture);
                        }
                        Chunk::Block(bytes) => {
                            for &byte in bytes.iter() {
                                last = bitbang::write_word(
                                    &mut master,
                                    soft.mode,
                                    BitWidth::Bits8,
                                    byte as u16,
                                    capture,
                                );
                            }
                        }
                    }
                }
            }
            ChannelConfig::Hardware(device) => {
                let mut device = *device;
                for chunk in chunks {
                    match chunk {
                        Chunk::Word(word) => {
                            last = hardware::write_word(
                                &mut self.spi,
                                &mut device,
                                *word,
                                width,
                                capture,
                            )?;
                        }
                        Chunk::Block(bytes) if capture => {
                            let mut rx = vec![0u8; bytes.len()];
                            let sampled = hardware::write_block(
                                &mut self.spi,
                                &mut device,
                                bytes,
                                Some(&mut rx),
                            )?;
                            if let Some(byte) = sampled {
                                last = byte as u16;
                            }
                        }
                        Chunk::Block(bytes) => {
                            hardware::write_block(&mut self.spi, &mut device, bytes, None)?;
                        }
                    }
                }
            }
        }
        Ok(last)
    }
}
