//! Cycle counter for hosts without a cycle register

use std::time::Instant;

use spibridge_core::CycleCounter;

/// Default clock the counter emulates
pub const DEFAULT_CLOCK_MHZ: u32 = 100;

/// [`CycleCounter`] derived from the monotonic clock
///
/// Elapsed time is scaled to cycles of a `clock_mhz` core so that software
/// channel divisors keep their meaning on a host.
#[derive(Debug, Clone)]
pub struct MonotonicCounter {
    start: Instant,
    clock_mhz: u32,
}

impl MonotonicCounter {
    /// Create a counter emulating a `clock_mhz` core
    pub fn new(clock_mhz: u32) -> Self {
        Self {
            start: Instant::now(),
            clock_mhz: clock_mhz.max(1),
        }
    }

    /// Emulated core clock
    pub fn clock_mhz(&self) -> u32 {
        self.clock_mhz
    }
}

impl Default for MonotonicCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_MHZ)
    }
}

impl CycleCounter for MonotonicCounter {
    fn cycles(&mut self) -> u32 {
        let nanos = self.start.elapsed().as_nanos();
        // Truncation wraps the counter like a hardware register
        (nanos * self.clock_mhz as u128 / 1000) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibridge_core::timing::busy_wait;
    use std::time::Duration;

    #[test]
    fn test_counter_advances_with_time() {
        let mut counter = MonotonicCounter::new(1000);
        let before = counter.cycles();
        std::thread::sleep(Duration::from_millis(1));
        let after = counter.cycles();
        assert!(after.wrapping_sub(before) >= 1_000_000);
    }

    #[test]
    fn test_busy_wait_takes_time() {
        let mut counter = MonotonicCounter::new(100);
        let start = Instant::now();
        // 100_000 cycles at 100 MHz is one millisecond
        busy_wait(&mut counter, 100_000);
        assert!(start.elapsed() >= Duration::from_millis(1));
    }
}
