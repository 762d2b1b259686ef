// SPDX-License-Identifier: Apache-2.0

//! Per-transaction mapping from a global original to the local copy a
//! write barrier allocated for it.
//!
//! Iteration order must be deterministic so that [`crate::commit`]'s lock
//! acquisition phase always walks conflicting gcroots in the same relative
//! order across threads -- a `BTreeMap` keyed by the global pointer's
//! address gives a total order shared by every thread without any
//! coordination.

use crate::object::RawPtr;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct G2L {
    map: BTreeMap<RawPtr, RawPtr>,
}

impl G2L {
    pub fn get(&self, original: RawPtr) -> Option<RawPtr> {
        self.map.get(&original).copied()
    }

    pub fn contains(&self, original: RawPtr) -> bool {
        self.map.contains_key(&original)
    }

    pub fn insert(&mut self, original: RawPtr, copy: RawPtr) {
        self.map.insert(original, copy);
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates `(original, copy)` pairs in a fixed, address-order sequence.
    pub fn iter(&self) -> impl Iterator<Item = (RawPtr, RawPtr)> + '_ {
        self.map.iter().map(|(&r, &l)| (r, l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::new_global;

    #[test]
    fn insert_get_and_deterministic_order() {
        let mut g2l = G2L::default();
        let a = new_global(1usize);
        let b = new_global(2usize);
        let c = new_global(3usize);

        let copy_a = new_global(10usize);
        let copy_b = new_global(20usize);

        g2l.insert(b.raw(), copy_b.raw());
        g2l.insert(a.raw(), copy_a.raw());

        assert_eq!(g2l.get(a.raw()), Some(copy_a.raw()));
        assert!(!g2l.contains(c.raw()));

        let order: Vec<_> = g2l.iter().map(|(r, _)| r).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted, "G2L must iterate in address order");
    }
}
