//! Backend registration and dispatch
//!
//! A backend is a set of platform collaborators (GPIO lines, hardware SPI
//! ports and a cycle counter) wrapped in a [`SpiBus`]. The CLI only talks
//! to the bus through [`Bridge`], so every backend runs the same scripts.

use spibridge_core::{
    ConfigTable, CycleCounter, GpioHal, ReadOutcome, Result as CoreResult, SpiBus, SpiHal,
    WriteItem, WriteOutcome,
};

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "sim")]
    backends.push(BackendInfo {
        name: "sim",
        aliases: &["dummy"],
        description: "In-memory board for testing (pins=<n>,loopback=1,wire=<out>-<in>)",
    });

    #[cfg(feature = "linux")]
    backends.push(BackendInfo {
        name: "linux",
        aliases: &["linux_gpio"],
        description: "Linux gpiochip + spidev (gpiochip=<n>,spi1=<dev>,spi2=<dev>,clock_mhz=<n>)",
    });

    backends
}

/// Generate help text listing all available backends
pub fn backend_help() -> String {
    let backends = available_backends();

    if backends.is_empty() {
        return "No backends available (recompile with backend features enabled)".to_string();
    }

    let mut help = String::from("Available backends:\n");
    for b in &backends {
        help.push_str(&format!("  {:8} - {}\n", b.name, b.description));
        if !b.aliases.is_empty() {
            help.push_str(&format!("  {:8}   aliases: {}\n", "", b.aliases.join(", ")));
        }
    }
    help
}

/// Generate a short list of backend names for CLI help
pub fn backend_names_short() -> String {
    let backends = available_backends();
    let names: Vec<&str> = backends.iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Resolve a backend name or alias
pub fn find_backend(name: &str) -> Option<&'static str> {
    available_backends()
        .into_iter()
        .find(|b| b.name == name || b.aliases.contains(&name))
        .map(|b| b.name)
}

/// Operation surface of a running bus, independent of its backend
pub trait Bridge {
    /// Configure a channel; `None` means no table was given at all
    fn setup(&mut self, id: i64, table: Option<&ConfigTable>) -> CoreResult<()>;
    /// Send words and byte strings
    fn write(&mut self, id: i64, bit_width: i64, items: &[WriteItem]) -> CoreResult<WriteOutcome>;
    /// Send one value repeatedly
    fn repeat_write(&mut self, id: i64, bit_width: i64, value: i64, count: usize)
        -> CoreResult<usize>;
    /// Receive words
    fn read(&mut self, id: i64, bit_width: i64, count: usize) -> CoreResult<ReadOutcome>;
    /// Receive bytes
    fn read_bytes(&mut self, id: i64, count: usize) -> CoreResult<Vec<u8>>;
    /// Tear a channel down
    fn deinit(&mut self, id: i64) -> CoreResult<()>;
}

impl<G: GpioHal, S: SpiHal, C: CycleCounter> Bridge for SpiBus<G, S, C> {
    fn setup(&mut self, id: i64, table: Option<&ConfigTable>) -> CoreResult<()> {
        SpiBus::setup(self, id, table)
    }

    fn write(&mut self, id: i64, bit_width: i64, items: &[WriteItem]) -> CoreResult<WriteOutcome> {
        SpiBus::write(self, id, bit_width, items)
    }

    fn repeat_write(
        &mut self,
        id: i64,
        bit_width: i64,
        value: i64,
        count: usize,
    ) -> CoreResult<usize> {
        SpiBus::repeat_write(self, id, bit_width, value, count)
    }

    fn read(&mut self, id: i64, bit_width: i64, count: usize) -> CoreResult<ReadOutcome> {
        SpiBus::read(self, id, bit_width, count)
    }

    fn read_bytes(&mut self, id: i64, count: usize) -> CoreResult<Vec<u8>> {
        SpiBus::read_bytes(self, id, count).map(|bytes| bytes.to_vec())
    }

    fn deinit(&mut self, id: i64) -> CoreResult<()> {
        SpiBus::deinit(self, id)
    }
}

/// Execute a function with the specified backend
///
/// The backend string can be just the name (e.g., "sim") or include
/// parameters (e.g., "sim:wire=6-8").
#[allow(unused_variables)]
pub fn with_backend<F>(backend: &str, f: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut dyn Bridge) -> Result<(), Box<dyn std::error::Error>>,
{
    let (name, options) = parse_backend_string(backend);

    let canonical_name = match find_backend(name) {
        Some(n) => n,
        None => return Err(unknown_backend_error(name)),
    };

    match canonical_name {
        #[cfg(feature = "sim")]
        "sim" => {
            let config = spibridge_sim::parse_options(&options)
                .map_err(|e| format!("Invalid sim parameters: {}", e))?;
            log::info!("Opening simulated board ({})", spibridge_sim::describe(&config));
            let mut bus = config.open();
            f(&mut bus)
        }

        #[cfg(feature = "linux")]
        "linux" => {
            use spibridge_linux_gpio as gpio;
            use spibridge_linux_spi as spi;

            let (gpio_options, spi_options) = split_linux_options(&options);
            let gpio_config = gpio::parse_options(&gpio_options)
                .map_err(|e| format!("Invalid linux parameters: {}", e))?;
            let spi_config = spi::parse_options(&spi_options)
                .map_err(|e| format!("Invalid linux parameters: {}", e))?;

            log::info!("Opening Linux board...");
            let (lines, counter) = gpio_config.open().map_err(|e| {
                format!(
                    "Failed to open GPIO chip: {}\n\
                     Make sure the chip exists and you have read/write permissions.",
                    e
                )
            })?;
            let ports = spi::LinuxSpi::new(spi_config);
            let mut bus = SpiBus::with_pin_count(lines, ports, counter, gpio_config.pin_count);
            f(&mut bus)
        }

        _ => Err(unknown_backend_error(name)),
    }
}

/// Split `linux` options between the GPIO and spidev crates
#[cfg(feature = "linux")]
fn split_linux_options<'a>(
    options: &[(&'a str, &'a str)],
) -> (Vec<(&'a str, &'a str)>, Vec<(&'a str, &'a str)>) {
    let mut gpio = Vec::new();
    let mut spi = Vec::new();
    for &(key, value) in options {
        if spibridge_linux_spi::OPTION_KEYS.contains(&key) {
            spi.push((key, value));
        } else if spibridge_linux_gpio::OPTION_KEYS.contains(&key) {
            gpio.push((key, value));
        } else {
            log::warn!("linux: Unknown option: {}={}", key, value);
        }
    }
    (gpio, spi)
}

/// Parse a backend string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_backend_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn unknown_backend_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown backend: {}\n\n", name);
    msg.push_str(&backend_help());
    msg.push_str("\nUse 'spibridge list-backends' for more details");
    msg.into()
}
