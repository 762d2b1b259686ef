// SPDX-License-Identifier: Apache-2.0

//! The global clock and the singleton inevitable slot.
//!
//! `global_cur_time` is always even except for the brief window during which
//! exactly one thread holds it at [`INEVITABLE`]. The inevitable mutex is not
//! what *represents* inevitability (the clock sentinel does); the mutex only
//! serializes the handful of threads racing to become inevitable or to read
//! the clock while it is held.

use crate::header::INEVITABLE;
use log::trace;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Global revision clock shared by every transaction on this [`crate::Stm`].
pub struct GlobalClock {
    cur_time: AtomicUsize,
    inevitable_mutex: Mutex<()>,
}

impl Default for GlobalClock {
    fn default() -> Self {
        GlobalClock {
            cur_time: AtomicUsize::new(2),
            inevitable_mutex: Mutex::new(()),
        }
    }
}

impl GlobalClock {
    /// Reads the clock, blocking on the inevitable mutex (without actually
    /// taking it for the read) whenever another thread currently holds the
    /// clock at `INEVITABLE`. Matches the "any non-inevitable operation that
    /// needs to read the clock blocks while another thread is inevitable"
    /// rule.
    pub fn get(&self) -> usize {
        loop {
            let t = self.cur_time.load(Ordering::SeqCst);
            if t != INEVITABLE {
                return t;
            }
            trace!("global clock held INEVITABLE; waiting on inevitable mutex");
            let _guard = self.inevitable_mutex.lock().expect("inevitable mutex poisoned");
            // Falls through and re-reads; by the time we have the mutex the
            // inevitable holder has either released it or is about to.
        }
    }

    /// Peeks the raw clock word without blocking on the sentinel. Used by
    /// commit's CAS attempts, which must observe `INEVITABLE` directly
    /// rather than spin past it.
    pub fn peek(&self) -> usize {
        self.cur_time.load(Ordering::SeqCst)
    }

    pub fn cas(&self, current: usize, new: usize) -> Result<usize, usize> {
        self.cur_time
            .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
    }

    /// Acquires the inevitable mutex for the duration of the closure. Callers
    /// use this both to transition the clock to `INEVITABLE` and to release
    /// it afterwards.
    pub fn with_inevitable_mutex<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inevitable_mutex.lock().expect("inevitable mutex poisoned");
        f()
    }
}
