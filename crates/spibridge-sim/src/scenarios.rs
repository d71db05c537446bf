//! End-to-end behavior of the dispatcher on the simulated board

use alloc::vec;
use alloc::vec::Vec;

use spibridge_core::channel::HwPort;
use spibridge_core::pins::PinRole;
use spibridge_core::{
    ChannelId, ConfigTable, Error, PinDirection, ReadOutcome, SpiMode, WriteItem, WriteOutcome,
};

use crate::{SimBus, SimConfig};

const SCK: u16 = 5;
const MOSI: u16 = 6;
const CS: u16 = 7;
const MISO: u16 = 8;

fn soft(mode: i64) -> ConfigTable {
    ConfigTable::new()
        .with("mode", mode)
        .with("sck", SCK)
        .with("mosi", MOSI)
        .with("cs", CS)
}

fn open() -> SimBus {
    SimConfig::default().open()
}

#[test]
fn test_setup_deinit_resetup() {
    let mut bus = open();
    bus.setup(0, &soft(0).with("miso", MISO)).unwrap();
    assert!(bus.is_initialized(ChannelId::SOFTWARE));
    assert_eq!(bus.gpio().direction(MISO), Some(PinDirection::InputPullUp));

    bus.deinit(0).unwrap();
    assert!(!bus.is_initialized(ChannelId::SOFTWARE));
    for pin in [SCK, MOSI, CS, MISO] {
        assert!(bus.gpio().is_parked(pin), "pin {}", pin);
    }
    assert_eq!(bus.read(0, 8, 1), Err(Error::NotConfigured));

    let moved = ConfigTable::parse("mode=3,sck=1,mosi=2,cs=3,speed=5000").unwrap();
    bus.setup(0, &moved).unwrap();
    assert_eq!(bus.gpio().direction(1), Some(PinDirection::Output));
    assert_eq!(bus.pins().len(), 3);
    assert_eq!(bus.write(0, 8, &[WriteItem::Word(0x81)]), Ok(WriteOutcome::Count(1)));
}

#[test]
fn test_write_range_limits() {
    let mut bus = open();
    bus.setup(0, &soft(0)).unwrap();
    bus.setup(1, &ConfigTable::new().with("mode", 0).with("cs", 4)).unwrap();

    for id in [0, 1] {
        assert_eq!(bus.write(id, 8, &[WriteItem::Word(255)]), Ok(WriteOutcome::Count(1)));
        assert_eq!(bus.write(id, 8, &[WriteItem::Word(256)]), Err(Error::OutOfRangeValue));
        assert_eq!(bus.write(id, 16, &[WriteItem::Word(65535)]), Ok(WriteOutcome::Count(1)));
        assert_eq!(bus.write(id, 16, &[WriteItem::Word(65536)]), Err(Error::OutOfRangeValue));
    }
    assert_eq!(bus.spi().sent(HwPort::Spi1), [0xFF, 0xFF, 0xFF]);
}

#[test]
fn test_repeat_write_keeps_duplex_flag() {
    for duplex in [false, true] {
        let mut bus = open();
        bus.setup(0, &soft(1).with("duplex", duplex)).unwrap();
        bus.gpio_mut().clear_trace();

        assert_eq!(bus.repeat_write(0, 8, 0xAA, 5), Ok(5));
        assert_eq!(bus.full_duplex(ChannelId::SOFTWARE), duplex);

        // Five CS pulses, one per word
        let cs = bus.gpio().levels_of(CS);
        assert_eq!(cs.iter().filter(|high| !**high).count(), 5);
    }
}

#[test]
fn test_hardware_repeat_write_sends_only() {
    let mut bus = open();
    bus.setup(1, &ConfigTable::parse("mode=0,cs=4,rw=1").unwrap()).unwrap();
    assert!(bus.full_duplex(ChannelId::HW1));

    assert_eq!(bus.repeat_write(1, 8, 0xAA, 5), Ok(5));
    assert!(bus.full_duplex(ChannelId::HW1));

    let transfers = bus.spi().transfers();
    assert_eq!(transfers.len(), 5);
    for transfer in transfers {
        assert_eq!(transfer.port, HwPort::Spi1);
        assert!(!transfer.rx);
    }
    assert_eq!(bus.spi().sent(HwPort::Spi1), [0xAA; 5]);

    // Full duplex is back for plain writes
    bus.spi_mut().queue_response(HwPort::Spi1, &[0x3C]);
    assert_eq!(bus.write(1, 8, &[WriteItem::Word(1)]), Ok(WriteOutcome::Sampled(0x3C)));
}

#[test]
fn test_read_bytes_limits() {
    let mut bus = open();
    bus.setup(0, &soft(0).with("miso", MISO)).unwrap();
    bus.setup(2, &ConfigTable::new().with("mode", 0).with("cs", 9)).unwrap();

    for id in [0, 2] {
        assert_eq!(bus.read_bytes(id, 0), Err(Error::NothingToRead));
        assert_eq!(bus.read_bytes(id, 513), Err(Error::SizeLimitExceeded));
        assert_eq!(bus.read_bytes(id, 512).map(|b| b.len()), Ok(512));
    }

    // Hardware reads are one block transfer
    let transfers = bus.spi().transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].len, 512);
    assert_eq!(transfers[0].tx, None);
}

#[test]
fn test_mode1_read_needs_miso() {
    let mut bus = open();
    bus.setup(0, &soft(1)).unwrap();
    assert_eq!(bus.read(0, 8, 1), Err(Error::MisoNotConfigured));
    assert_eq!(bus.read(0, 8, 1).map_err(Error::code), Err(-5));

    bus.setup(0, &soft(1).with("miso", MISO)).unwrap();
    bus.gpio_mut().queue_word(MISO, 0xC5, 8);
    bus.gpio_mut().clear_trace();
    assert_eq!(bus.read(0, 8, 1), Ok(ReadOutcome::Word(0xC5)));

    // Mode 1: idle low, each bit driven high then sampled after the falling edge
    let mut expected = vec![false];
    for _ in 0..8 {
        expected.extend([true, false]);
    }
    expected.push(false);
    assert_eq!(bus.gpio().levels_of(SCK), expected);
    assert!(bus.gpio().levels_of(MOSI).iter().all(|high| !high));
    assert_eq!(bus.gpio().levels_of(CS), [false, true]);
}

#[test]
fn test_loopback_every_mode() {
    for mode in SpiMode::ALL {
        let mut bus = SimConfig::default().wire(MOSI, MISO).open();
        let table = soft(mode.number() as i64).with("miso", MISO).with("duplex", 1);
        bus.setup(0, &table).unwrap();
        assert_eq!(
            bus.write(0, 8, &[WriteItem::Word(0x3C)]),
            Ok(WriteOutcome::Sampled(0x3C)),
            "mode {}",
            mode
        );
        assert_eq!(
            bus.write(0, 16, &[WriteItem::Words(vec![0x1234, 0xBEEF])]),
            Ok(WriteOutcome::Sampled(0xBEEF)),
            "mode {}",
            mode
        );
    }
}

#[test]
fn test_multi_word_reads() {
    let mut bus = open();
    bus.setup(0, &soft(0).with("miso", MISO)).unwrap();
    bus.setup(1, &ConfigTable::new().with("mode", 2).with("cs", 10)).unwrap();

    bus.gpio_mut().queue_word(MISO, 0x0102, 16);
    bus.gpio_mut().queue_word(MISO, 0x0304, 16);
    assert_eq!(bus.read(0, 16, 2), Ok(ReadOutcome::Words(vec![0x0102, 0x0304])));

    bus.spi_mut().queue_response(HwPort::Spi1, &[0x34, 0x12]);
    assert_eq!(bus.read(1, 16, 1), Ok(ReadOutcome::Word(0x1234)));
    assert_eq!(bus.read(1, 8, 3), Ok(ReadOutcome::Words(Vec::new())));
}

#[test]
fn test_hardware_lifecycle() {
    let mut bus = open();
    let table = ConfigTable::parse("mode=1,cs=11,speed=20000,rw=1").unwrap();
    bus.setup(2, &table).unwrap();

    let device = *bus.spi().device(HwPort::Spi2).unwrap();
    assert_eq!(device.speed_hz, 20_000_000);
    assert_eq!(device.mode.spi_mode(), SpiMode::MODE_1);
    assert_eq!(bus.pins().owner(11), Some((ChannelId::HW2, PinRole::ChipSelect)));

    bus.spi_mut().queue_response(HwPort::Spi2, &[0, 0, 0x5A]);
    let items = [WriteItem::Bytes(b"abc".to_vec())];
    assert_eq!(bus.write(2, 8, &items), Ok(WriteOutcome::Sampled(0x5A)));

    // Re-setup finalizes the old port first
    bus.setup(2, &table.clone().with("speed", 400)).unwrap();
    assert_eq!(bus.spi().device(HwPort::Spi2).map(|d| d.speed_hz), Some(400_000));

    bus.deinit(2).unwrap();
    assert!(bus.spi().device(HwPort::Spi2).is_none());
    assert!(bus.gpio().is_parked(11));
}

#[test]
fn test_hardware_failures() {
    let mut bus = open();
    bus.spi_mut().fail_initialize(true);
    let table = ConfigTable::new().with("mode", 0).with("cs", 4);
    assert_eq!(bus.setup(1, &table).map_err(Error::code), Err(-15));
    assert!(!bus.is_initialized(ChannelId::HW1));

    bus.spi_mut().fail_initialize(false);
    bus.setup(1, &table).unwrap();
    bus.spi_mut().fail_transfers(true);
    assert_eq!(bus.repeat_write(1, 8, 1, 3).map_err(Error::code), Err(-15));
    assert_eq!(bus.read_bytes(1, 4).map_err(Error::code), Err(-15));
}

#[test]
fn test_gpio_failure_during_setup() {
    let mut bus = open();
    bus.gpio_mut().break_pin(MOSI);
    assert_eq!(bus.setup(0, &soft(0)), Err(Error::HardwareInitFailure));
    assert!(!bus.is_initialized(ChannelId::SOFTWARE));
    // Lines bound before the failure are given back
    assert!(bus.pins().is_empty());
    assert!(bus.gpio().is_parked(SCK));
}

#[test]
fn test_pin_outside_board() {
    let mut bus = SimConfig {
        pin_count: 8,
        ..SimConfig::default()
    }
    .open();
    assert_eq!(bus.setup(0, &soft(0).with("miso", 8)).map_err(Error::code), Err(-14));
    bus.setup(0, &soft(0)).unwrap();
    assert_eq!(bus.pins().len(), 3);
}
