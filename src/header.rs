// SPDX-License-Identifier: Apache-2.0

//! Object header protocol: the two machine words every managed object
//! carries, and the flag bits and revision-word encoding layered on top of
//! them.
//!
//! `h_tid` packs a type id in the low half of the word and a set of flags in
//! the high half (starting at bit `usize::BITS / 2`). `h_revision` is
//! polymorphic: its least significant bit discriminates a revision timestamp
//! (odd) from a chain pointer (even).

use std::sync::atomic::{AtomicUsize, Ordering};

const FLAG_SHIFT: u32 = usize::BITS / 2;

/// Object is visible to other threads and immutable in place.
pub const GLOBAL: usize = 1 << FLAG_SHIFT;
/// Some newer revision may exist further along the chain.
pub const POSSIBLY_OUTDATED: usize = 1 << (FLAG_SHIFT + 1);
/// Global object not yet superseded, or local copy not yet mutated.
pub const NOT_WRITTEN: usize = 1 << (FLAG_SHIFT + 2);
/// A private, writable duplicate owned by exactly one transaction.
pub const LOCAL_COPY: usize = 1 << (FLAG_SHIFT + 3);
/// Scratch bit reserved for the external root-enumeration callback.
pub const VISITED: usize = 1 << (FLAG_SHIFT + 4);
/// Set once an object has been assigned an identity hash.
pub const HASH_FIELD: usize = 1 << (FLAG_SHIFT + 5);

/// Flags a freshly-allocated, never-written global object starts with.
pub const PREBUILT: usize = GLOBAL | NOT_WRITTEN;

/// Revision of the first publication of a prebuilt object.
pub const REV_INITIAL: usize = 1;
/// Tag carried alongside a cached identity hash so a chain walk knows to
/// forward it onto the new head.
pub const REV_FLAG_NEW_HASH: usize = 2;

const TYPE_ID_MASK: usize = (1usize << FLAG_SHIFT) - 1;

/// Every revision word `>=` this threshold is a lock token. Lock tokens
/// themselves are always odd; `LOCKED` itself is an even baseline, never a
/// value actually stored in `h_revision`.
pub const LOCKED: usize = usize::MAX & !0xFFFF;
/// Sentinel global-clock value held by the unique inevitable transaction.
pub const INEVITABLE: usize = usize::MAX;

/// Two atomic machine words shared by every managed object.
#[repr(C)]
pub struct Header {
    pub h_tid: AtomicUsize,
    pub h_revision: AtomicUsize,
}

impl Header {
    pub fn new(type_id: usize, flags: usize, revision: usize) -> Self {
        debug_assert_eq!(type_id & !TYPE_ID_MASK, 0, "type id overflows reserved bits");
        Header {
            h_tid: AtomicUsize::new(type_id | flags),
            h_revision: AtomicUsize::new(revision),
        }
    }

    #[inline]
    pub fn flags(&self) -> usize {
        self.h_tid.load(Ordering::SeqCst) & !TYPE_ID_MASK
    }

    #[inline]
    pub fn type_id(&self) -> usize {
        self.h_tid.load(Ordering::SeqCst) & TYPE_ID_MASK
    }

    #[inline]
    pub fn test_flag(&self, flag: usize) -> bool {
        self.flags() & flag != 0
    }

    #[inline]
    pub fn set_flags(&self, flag: usize) {
        self.h_tid.fetch_or(flag, Ordering::SeqCst);
    }

    #[inline]
    pub fn clear_flags(&self, flag: usize) {
        self.h_tid.fetch_and(!flag, Ordering::SeqCst);
    }

    #[inline]
    pub fn revision(&self) -> usize {
        self.h_revision.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_revision(&self, value: usize) {
        self.h_revision.store(value, Ordering::SeqCst);
    }

    #[inline]
    pub fn cas_revision(&self, current: usize, new: usize) -> Result<usize, usize> {
        self.h_revision
            .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
    }
}

/// `true` when `v` is a revision timestamp rather than a chain pointer.
#[inline]
pub fn is_timestamp(v: usize) -> bool {
    v & 1 == 1
}

/// `true` when `v` is a lock token (always an odd value `>= LOCKED`).
#[inline]
pub fn is_locked(v: usize) -> bool {
    v >= LOCKED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prebuilt_flags_roundtrip() {
        let h = Header::new(7, PREBUILT, REV_INITIAL);
        assert!(h.test_flag(GLOBAL));
        assert!(h.test_flag(NOT_WRITTEN));
        assert!(!h.test_flag(LOCAL_COPY));
        assert_eq!(h.type_id(), 7);
        assert_eq!(h.revision(), REV_INITIAL);
        assert!(is_timestamp(h.revision()));
    }

    #[test]
    fn locked_threshold_is_even_and_below_inevitable() {
        assert_eq!(LOCKED % 2, 0);
        assert!(LOCKED < INEVITABLE);
        assert!(is_locked(LOCKED + 3));
        assert!(!is_locked(LOCKED - 2));
    }

    #[test]
    fn flag_bits_do_not_collide_with_type_id() {
        for flag in [GLOBAL, POSSIBLY_OUTDATED, NOT_WRITTEN, LOCAL_COPY, VISITED, HASH_FIELD] {
            assert_eq!(flag & TYPE_ID_MASK, 0);
        }
    }
}
