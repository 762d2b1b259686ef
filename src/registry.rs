// SPDX-License-Identifier: Apache-2.0

//! Process-wide bookkeeping shared by every descriptor on one [`crate::Stm`]:
//! the counter that hands out unique odd lock tokens, and a small map from
//! "currently-held lock token" to "that thread's start_time", which is all
//! the *abort-the-younger* contention policy needs to make its decision --
//! the lock token observed on a conflicting object's header already
//! identifies the owning thread.

use crate::header::LOCKED;
use log::warn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Fatal: the process has created roughly `2^(bits-17)` descriptors and
/// exhausted the odd lock-token space. The original leaves recycling
/// unaddressed (see the open question in the design notes); this crate does
/// the same and treats exhaustion as a process-fatal condition.
const LOCK_TOKEN_EXHAUSTED: &str = "lock token space exhausted: too many descriptors created";

pub struct Registry {
    next_lock_token: AtomicUsize,
    start_times: Mutex<HashMap<usize, usize>>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry {
            // LOCKED + 3 matches the reference implementation's initial
            // value; the first descriptor created receives LOCKED + 3, an
            // odd value, and every later one is 2 higher.
            next_lock_token: AtomicUsize::new(LOCKED.wrapping_add(3)),
            start_times: Mutex::new(HashMap::new()),
        }
    }
}

impl Registry {
    /// Allocates a fresh, globally unique odd lock token `>= LOCKED`.
    pub fn alloc_lock_token(&self) -> usize {
        let token = self.next_lock_token.fetch_add(2, Ordering::SeqCst);
        if token < LOCKED {
            // Wrapped around usize::MAX; we have truly run out.
            warn!("{}", LOCK_TOKEN_EXHAUSTED);
            panic!("{}", LOCK_TOKEN_EXHAUSTED);
        }
        debug_assert_eq!(token % 2, 1);
        token
    }

    pub fn record_start_time(&self, token: usize, start_time: usize) {
        self.start_times
            .lock()
            .expect("start-time registry poisoned")
            .insert(token, start_time);
    }

    pub fn forget(&self, token: usize) {
        self.start_times.lock().expect("start-time registry poisoned").remove(&token);
    }

    /// Looks up the `start_time` of whichever thread currently owns `token`,
    /// if it is still active. Used by the contention policy to compare
    /// ages without any cross-thread signaling.
    pub fn start_time_of(&self, token: usize) -> Option<usize> {
        self.start_times.lock().expect("start-time registry poisoned").get(&token).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_distinct_odd_tokens() {
        let registry = Registry::default();
        let a = registry.alloc_lock_token();
        let b = registry.alloc_lock_token();
        assert_ne!(a, b);
        assert_eq!(a % 2, 1);
        assert_eq!(b % 2, 1);
        assert!(a >= LOCKED);
    }

    #[test]
    fn start_time_lookup_reflects_record_and_forget() {
        let registry = Registry::default();
        let token = registry.alloc_lock_token();
        assert_eq!(registry.start_time_of(token), None);
        registry.record_start_time(token, 10);
        assert_eq!(registry.start_time_of(token), Some(10));
        registry.forget(token);
        assert_eq!(registry.start_time_of(token), None);
    }
}
