// SPDX-License-Identifier: Apache-2.0

//! Bounded, approximate membership filter used to dedup the read set and to
//! promote hot reads to local copies.

use crate::object::RawPtr;

const SLOTS: usize = 64;
const HOT_THRESHOLD: u8 = 3;

#[derive(Clone, Copy)]
struct Slot {
    addr: usize,
    hits: u8,
}

const EMPTY: Slot = Slot { addr: 0, hits: 0 };

/// Outcome of [`RecentReadsCache::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCacheResult {
    /// Not previously sampled in this slot; insert into the read set.
    New,
    /// Sampled before, not yet hot.
    Present,
    /// Sampled often enough to be worth promoting straight to a local copy.
    PresentAndHot,
}

/// A small, fixed-size hash-sampled filter: not a true set (distinct
/// addresses can alias into the same slot and evict each other), which is
/// fine -- a false "New" only costs a redundant read-set entry, never an
/// incorrect validation.
pub struct RecentReadsCache {
    slots: [Slot; SLOTS],
}

impl Default for RecentReadsCache {
    fn default() -> Self {
        RecentReadsCache { slots: [EMPTY; SLOTS] }
    }
}

impl RecentReadsCache {
    fn index(addr: usize) -> usize {
        // Pointers are usually at least 8-byte aligned; shift away the
        // low bits before sampling so adjacent allocations don't all map
        // to the same slot.
        (addr >> 3) % SLOTS
    }

    pub fn add(&mut self, p: RawPtr) -> ReadCacheResult {
        let addr = p.addr();
        let idx = Self::index(addr);
        let slot = &mut self.slots[idx];
        if slot.addr == addr && slot.hits > 0 {
            if slot.hits >= HOT_THRESHOLD {
                return ReadCacheResult::PresentAndHot;
            }
            slot.hits += 1;
            ReadCacheResult::Present
        } else {
            *slot = Slot { addr, hits: 1 };
            ReadCacheResult::New
        }
    }

    pub fn clear(&mut self) {
        self.slots = [EMPTY; SLOTS];
    }
}
