// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};

const MAX_WAIT_UNITS: usize = 7;

/// A busy-spin backoff helper used on the bounded spin loops the commit and
/// read-barrier slow paths fall into when they observe a locked header.
///
/// Each call to [`BusyBreaker::spin`] doubles the number of `spin_loop` hints
/// emitted, up to [`MAX_WAIT_UNITS`], then saturates. It never blocks the
/// thread (no OS mutex, no sleep) -- it only hints to the CPU that this is a
/// spin-wait loop so it can reduce its own contention on the shared bus.
#[derive(Default)]
pub struct BusyBreaker {
    unit: AtomicUsize,
}

impl BusyBreaker {
    /// Keeps the CPU busy but hints that it may reschedule.
    ///
    /// `core::hint::spin_loop()` lowers to a `pause`-equivalent instruction
    /// where available; on targets without one this degrades to a plain busy
    /// loop.
    pub fn spin(&self) {
        let unit = self.unit.load(Ordering::Acquire).min(MAX_WAIT_UNITS);
        for _ in 0..(1 << unit) {
            core::hint::spin_loop();
        }
        if unit < MAX_WAIT_UNITS {
            self.unit.store(unit + 1, Ordering::Release);
        }
    }

    /// Resets the breaker to its initial backoff.
    pub fn reset(&self) {
        self.unit.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_does_not_panic_and_reset_rewinds() {
        let b = BusyBreaker::default();
        for _ in 0..(MAX_WAIT_UNITS + 3) {
            b.spin();
        }
        b.reset();
        assert_eq!(b.unit.load(Ordering::Acquire), 0);
    }
}
