// SPDX-License-Identifier: Apache-2.0

//! The GC-facing seam: the two operations an external collector needs from
//! the core, and the default stand-in collaborator this crate ships so the
//! core can be exercised and tested without wiring up a real collector.
//!
//! Both operations here are intentionally thin. The core never reasons
//! about generations, nurseries, or reclamation -- it only needs a way to
//! get a local copy of a global object ([`crate::object::duplicate`]) and a
//! way to tell an external visitor which pointers a transaction currently
//! holds live.

use crate::descriptor::Descriptor;
use crate::header::VISITED;
use crate::object::RawPtr;

/// Enumerates every pointer a transaction currently considers live: both
/// sides of its G2L map (the global original and its local copy) plus
/// whatever remains unpublished in its read set. A real collector calls
/// this during a scan phase to find transactional roots it would otherwise
/// have no way to discover, since the G2L map and read set are private to
/// one descriptor.
///
/// `VISITED` is reserved entirely for the caller: this function never reads
/// or relies on it, only sets it while enumerating so a caller that wants a
/// "first time this pointer was seen this scan" signal gets one for free,
/// then leaves clearing it (between scans) to the caller.
pub fn enumerate_roots(desc: &Descriptor, mut visit: impl FnMut(RawPtr)) {
    for (r, l) in desc.g2l.iter() {
        mark_and_visit(r, &mut visit);
        mark_and_visit(l, &mut visit);
    }
    for r in desc.read_set.iter() {
        mark_and_visit(*r, &mut visit);
    }
}

fn mark_and_visit(p: RawPtr, visit: &mut impl FnMut(RawPtr)) {
    p.header().set_flags(VISITED);
    visit(p);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::new_global;
    use crate::registry::Registry;

    #[test]
    fn enumerate_roots_visits_both_sides_of_g2l_and_read_set() {
        let registry = Registry::default();
        let mut desc = Descriptor::new(registry.alloc_lock_token());

        let g = new_global(1usize);
        let l = crate::object::duplicate(g);
        desc.g2l.insert(g.raw(), l.raw());

        let read_only = new_global(2usize);
        desc.read_set.push(read_only.raw());

        let mut seen = Vec::new();
        enumerate_roots(&desc, |p| seen.push(p));

        assert!(seen.contains(&g.raw()));
        assert!(seen.contains(&l.raw()));
        assert!(seen.contains(&read_only.raw()));
        assert!(g.header().test_flag(VISITED));
    }
}
