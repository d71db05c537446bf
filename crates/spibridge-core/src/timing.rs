//! Bit-period timing
//!
//! The software channel times each half bit by spinning on a free-running
//! cycle counter until it has advanced by the channel's divisor. The mapping
//! from kHz to divisor is calibrated for one core clock; on a faster or
//! slower core the resulting SPI clock scales with it.

use crate::hal::CycleCounter;

/// Spin until `counter` has advanced by at least `cycles`
pub fn busy_wait<C: CycleCounter + ?Sized>(counter: &mut C, cycles: u32) {
    let start = counter.cycles();
    while counter.cycles().wrapping_sub(start) < cycles {
        core::hint::spin_loop();
    }
}

/// Cycle counter backed by the Cortex-M DWT unit
#[cfg(feature = "cortex-m")]
pub struct DwtCounter {
    _private: (),
}

#[cfg(feature = "cortex-m")]
impl DwtCounter {
    /// Enable trace and the DWT cycle counter
    pub fn new(dcb: &mut cortex_m::peripheral::DCB, dwt: &mut cortex_m::peripheral::DWT) -> Self {
        dcb.enable_trace();
        dwt.enable_cycle_counter();
        Self { _private: () }
    }
}

#[cfg(feature = "cortex-m")]
impl CycleCounter for DwtCounter {
    fn cycles(&mut self) -> u32 {
        cortex_m::peripheral::DWT::cycle_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stepper {
        now: u32,
        step: u32,
        reads: u32,
    }

    impl CycleCounter for Stepper {
        fn cycles(&mut self) -> u32 {
            self.reads += 1;
            self.now = self.now.wrapping_add(self.step);
            self.now
        }
    }

    #[test]
    fn test_waits_for_divisor() {
        let mut counter = Stepper {
            now: 0,
            step: 10,
            reads: 0,
        };
        busy_wait(&mut counter, 50);
        // One read for the start point, five more to advance 50 cycles
        assert_eq!(counter.reads, 6);
    }

    #[test]
    fn test_handles_wraparound() {
        let mut counter = Stepper {
            now: u32::MAX - 15,
            step: 10,
            reads: 0,
        };
        busy_wait(&mut counter, 30);
        assert_eq!(counter.reads, 4);
    }
}
