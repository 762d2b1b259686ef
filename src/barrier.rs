// SPDX-License-Identifier: Apache-2.0

//! Read and write barriers: the mutator-facing operations that keep a
//! transaction's view of the heap consistent.

use crate::breaker::BusyBreaker;
use crate::clock::GlobalClock;
use crate::config::StmConfig;
use crate::descriptor::Descriptor;
use crate::error::{AbortReason, SpinloopReason, TransactionError};
use crate::header::{is_locked, is_timestamp, POSSIBLY_OUTDATED};
use crate::object::{duplicate, GcPtr, RawPtr};
use crate::recent_reads::ReadCacheResult;
use crate::registry::Registry;
use log::trace;
use std::cell::Cell;

/// The shared, thread-local collaborators every barrier call needs: the
/// global clock, the lock-token/start-time registry, the configured
/// behavior, and a backoff helper for bounded spins.
pub struct BarrierCtx<'a> {
    pub clock: &'a GlobalClock,
    pub registry: &'a Registry,
    pub config: &'a StmConfig,
    pub breaker: &'a BusyBreaker,
}

fn abort(desc: &mut Descriptor, reason: AbortReason) -> TransactionError {
    crate::abort::abort_transaction(desc, reason)
}

/// The "LatestGlobalRevision" slow path, operating on type-erased pointers:
/// walks the chain until it finds the odd revision this transaction must
/// observe.
fn latest_global_revision_raw(ctx: &BarrierCtx, desc: &mut Descriptor, start: RawPtr) -> Result<RawPtr, TransactionError> {
    let mut path: Vec<RawPtr> = Vec::new();
    let mut r = start;
    loop {
        let v = r.header().revision();
        if !is_timestamp(v) {
            path.push(r);
            r = RawPtr::from_addr(v);
            continue;
        }
        if v <= desc.start_time {
            break;
        }
        if is_locked(v) {
            desc.record_spinloop(SpinloopReason::SpinDuringReadWalk);
            ctx.breaker.spin();
            continue;
        }
        // v > start_time, v < LOCKED: too new for our snapshot.
        if crate::validate::validate(desc, ctx.registry) {
            desc.start_time = ctx.clock.get();
            continue;
        } else {
            return Err(abort(desc, AbortReason::ChainWalkStaleOnRead));
        }
    }

    desc.readonly_updates = desc.readonly_updates.wrapping_add(1);
    if path.len() > 1 && desc.readonly_updates % ctx.config.chain_compression_period == 0 {
        trace!("compressing {} chain node(s)", path.len() - 1);
        for node in path.iter().take(path.len() - 1) {
            node.header().set_revision(r.addr());
        }
    }
    Ok(r)
}

fn record_read_and_maybe_promote<T: Clone>(desc: &mut Descriptor, r: GcPtr<T>) -> GcPtr<T> {
    match desc.recent_reads.add(r.raw()) {
        ReadCacheResult::New => {
            desc.read_set.push(r.raw());
            r
        }
        ReadCacheResult::Present => r,
        ReadCacheResult::PresentAndHot => localize(desc, r),
    }
}

fn localize<T: Clone>(desc: &mut Descriptor, r: GcPtr<T>) -> GcPtr<T> {
    if let Some(existing) = desc.g2l.get(r.raw()) {
        return unsafe { existing.cast::<T>() };
    }
    let l = duplicate(r);
    debug_assert!(l.header().test_flag(crate::header::LOCAL_COPY));
    debug_assert!(l.header().test_flag(crate::header::NOT_WRITTEN));
    l.header().set_revision(r.raw().addr());
    desc.g2l.insert(r.raw(), l.raw());
    l
}

/// `ReadBarrier(P)`: returns the object this transaction must observe.
pub fn read_barrier<T: Clone>(ctx: &BarrierCtx, desc: &mut Descriptor, g: GcPtr<T>) -> Result<GcPtr<T>, TransactionError> {
    if !g.header().test_flag(POSSIBLY_OUTDATED) {
        return Ok(record_read_and_maybe_promote(desc, g));
    }
    let raw = latest_global_revision_raw(ctx, desc, g.raw())?;
    let r = unsafe { raw.cast::<T>() };
    if r.header().test_flag(POSSIBLY_OUTDATED) {
        if let Some(l) = desc.g2l.get(r.raw()) {
            return Ok(unsafe { l.cast::<T>() });
        }
    }
    Ok(record_read_and_maybe_promote(desc, r))
}

/// `ReadBarrierFromContainer(P, C, offset)`: like [`read_barrier`], but `P`
/// is read out of `slot`, a field reachable from `container` (rather than
/// a bare root the mutator is holding directly). When the barrier finds a
/// newer revision than `slot` currently holds, and `container` is not
/// itself a published global object, `slot` is rewritten in place to point
/// directly at the result -- so the next access through that same field
/// skips the chain walk entirely. If `container` is already global, the
/// slot is left untouched: patching a field inside a published object
/// without going through its own write barrier would let another thread
/// observe a half-updated object.
pub fn read_barrier_from_container<T: Clone>(
    ctx: &BarrierCtx,
    desc: &mut Descriptor,
    container: RawPtr,
    slot: &Cell<GcPtr<T>>,
) -> Result<GcPtr<T>, TransactionError> {
    let g = slot.get();
    if !g.header().test_flag(POSSIBLY_OUTDATED) {
        return Ok(record_read_and_maybe_promote(desc, g));
    }
    let raw = latest_global_revision_raw(ctx, desc, g.raw())?;
    let r = unsafe { raw.cast::<T>() };
    let container_is_local = !container.header().test_flag(crate::header::GLOBAL);

    if r.header().test_flag(POSSIBLY_OUTDATED) {
        if let Some(l) = desc.g2l.get(r.raw()) {
            let found = unsafe { l.cast::<T>() };
            if container_is_local {
                slot.set(found);
            }
            return Ok(found);
        }
    }

    if container_is_local && r.raw() != g.raw() {
        slot.set(r);
    }
    Ok(record_read_and_maybe_promote(desc, r))
}

/// `RepeatReadBarrier(P)`: the caller already holds a known-observed R; only
/// the G2L lookup is needed, never a chain walk.
pub fn repeat_read_barrier<T>(desc: &Descriptor, r: GcPtr<T>) -> GcPtr<T> {
    match desc.g2l.get(r.raw()) {
        Some(l) => unsafe { l.cast::<T>() },
        None => r,
    }
}

/// `WriteBarrier(P)`: returns a writable local copy `W`, clearing
/// `NOT_WRITTEN` on it and setting `POSSIBLY_OUTDATED` on the global
/// original `R` it supersedes -- in both the already-local and the
/// localize-from-global cases.
pub fn write_barrier<T: Clone>(ctx: &BarrierCtx, desc: &mut Descriptor, p: GcPtr<T>) -> Result<GcPtr<T>, TransactionError> {
    let (w, r) = if !p.header().test_flag(crate::header::GLOBAL) {
        // Already local: W = P, R = the back-reference it carries.
        let r = unsafe { RawPtr::from_addr(p.header().revision()).cast::<T>() };
        (p, r)
    } else {
        let r = if p.header().test_flag(POSSIBLY_OUTDATED) {
            unsafe { latest_global_revision_raw(ctx, desc, p.raw())?.cast::<T>() }
        } else {
            p
        };
        (localize(desc, r), r)
    };
    w.header().clear_flags(crate::header::NOT_WRITTEN);
    r.header().set_flags(POSSIBLY_OUTDATED);
    Ok(w)
}

/// `WriteBarrierFromReady(R)`: `R` is already known to be the chain head (a
/// prior read barrier's result); skip straight to localization. Same flag
/// bookkeeping as [`write_barrier`].
pub fn write_barrier_from_ready<T: Clone>(desc: &mut Descriptor, r: GcPtr<T>) -> GcPtr<T> {
    let (w, r) = if !r.header().test_flag(crate::header::GLOBAL) {
        let original = unsafe { RawPtr::from_addr(r.header().revision()).cast::<T>() };
        (r, original)
    } else {
        (localize(desc, r), r)
    };
    w.header().clear_flags(crate::header::NOT_WRITTEN);
    r.header().set_flags(POSSIBLY_OUTDATED);
    w
}

/// Canonicalizes a pointer to its global original: walks to the latest
/// global revision if `p` is global, or follows the back-reference if `p`
/// is a local copy.
fn canonicalize(p: RawPtr) -> RawPtr {
    let h = p.header();
    if h.test_flag(crate::header::LOCAL_COPY) {
        RawPtr::from_addr(h.revision())
    } else {
        let mut cur = p;
        loop {
            let v = cur.header().revision();
            if is_timestamp(v) {
                return cur;
            }
            cur = RawPtr::from_addr(v);
        }
    }
}

/// `PtrEq(P1, P2)`: transactional identity -- equal canonical forms.
pub fn ptr_eq<T>(p1: GcPtr<T>, p2: GcPtr<T>) -> bool {
    canonicalize(p1.raw()) == canonicalize(p2.raw())
}

/// Identity hash consistent with [`ptr_eq`]: a global original and its
/// in-flight local copy hash identically because both canonicalize to the
/// same head.
pub fn ptr_hash<T>(p: GcPtr<T>) -> usize {
    let canon = canonicalize(p.raw());
    let h = canon.header();
    if !h.test_flag(crate::header::HASH_FIELD) {
        h.set_flags(crate::header::HASH_FIELD);
    }
    canon.addr()
}
