// SPDX-License-Identifier: Apache-2.0

//! Contention management: deciding what a thread does when it discovers a
//! conflicting lock already held by another thread.
//!
//! Only the two policies the design explicitly keeps in scope are
//! implemented: *abort the younger* (by `start_time`, used as the
//! deterministic/testing policy) and the default, *wait for the other
//! thread* (same comparison, but the younger side backs off and retries its
//! lock acquisition instead of aborting the whole transaction).
//!
//! Both policies only ever decide *this* thread's own behavior: there is no
//! cross-thread signaling to remotely abort a peer, since the only contact
//! point between two threads here is a CAS on a shared header word.

use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentionPolicy {
    /// Younger thread always aborts immediately. Deterministic: useful for
    /// tests that want to pin down exactly which side loses a race.
    AbortYounger,
    /// Younger thread backs off and retries instead of aborting, giving the
    /// older (already in-flight) commit a chance to finish and release the
    /// lock. This is the default.
    WaitForOther,
}

/// What the calling thread should do about a conflicting lock it observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Abort the calling transaction now.
    AbortSelf,
    /// Back off (spin/sleep) and retry the lock acquisition.
    Wait,
}

impl ContentionPolicy {
    /// `owner_token` is the lock token observed on the contended header;
    /// `our_start_time` is this thread's own snapshot time. When the owner's
    /// start_time cannot be found (it has already finished and released the
    /// registry entry), both policies simply wait -- the lock is about to be
    /// freed.
    pub fn decide(self, registry: &Registry, owner_token: usize, our_start_time: usize) -> Decision {
        let owner_start_time = match registry.start_time_of(owner_token) {
            Some(t) => t,
            None => return Decision::Wait,
        };

        // "We started after the other thread" (we are the younger side).
        let we_are_younger = our_start_time >= owner_start_time;

        match (self, we_are_younger) {
            (ContentionPolicy::AbortYounger, true) => Decision::AbortSelf,
            (ContentionPolicy::AbortYounger, false) => Decision::Wait,
            (ContentionPolicy::WaitForOther, true) => Decision::Wait,
            (ContentionPolicy::WaitForOther, false) => Decision::Wait,
        }
    }
}
