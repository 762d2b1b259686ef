// SPDX-License-Identifier: Apache-2.0

//! Two-phase commit.
//!
//! Phase 0 materializes the write set out of the descriptor's G2L map into
//! `gcroots` (entries that were localized but never actually written are
//! promoted to global in place and discarded instead). Phase 1 acquires a
//! lock on every gcroot's global original. Phase 2 reserves a new even
//! timestamp off the global clock. Phase 3 publishes the new copies and
//! links the old chain heads to them, with an explicit fence between the
//! two so no other thread can observe a chain link before the revision it
//! points at is itself published. Phase 4 tears the transaction down.

use crate::barrier::BarrierCtx;
use crate::descriptor::{ActiveState, Descriptor, GcRoot};
use crate::error::{AbortReason, SpinloopReason, TransactionError};
use crate::header::{self, is_locked, is_timestamp};
use crate::object::RawPtr;
use crate::policy::Decision;
use log::{debug, trace};
use std::cell::Cell;
use std::sync::atomic::{fence, Ordering};

fn abort(desc: &mut Descriptor, reason: AbortReason) -> TransactionError {
    crate::abort::abort_transaction(desc, reason)
}

/// Phase 0: walks the G2L map in its deterministic address order, splitting
/// it into gcroots that need locking and never-written copies that can be
/// promoted and discarded immediately.
fn materialize_write_set(desc: &mut Descriptor) {
    let entries: Vec<(RawPtr, RawPtr)> = desc.g2l.iter().collect();
    for (r_old, l) in entries {
        l.header().clear_flags(header::LOCAL_COPY);
        if l.header().test_flag(header::NOT_WRITTEN) {
            l.header().set_flags(header::GLOBAL | header::POSSIBLY_OUTDATED);
        } else {
            l.header().set_flags(header::GLOBAL | header::NOT_WRITTEN);
            desc.gcroots.push(GcRoot {
                l,
                r_old,
                prior: Cell::new(0),
            });
        }
    }
}

/// Phase 1: CAS every gcroot's global original from its last-observed odd
/// timestamp to this transaction's lock token, applying the configured
/// contention policy whenever it finds the object already locked.
fn acquire_locks(ctx: &BarrierCtx, desc: &mut Descriptor) -> Result<(), TransactionError> {
    let n = desc.gcroots.len();
    for i in 0..n {
        let r_old = desc.gcroots[i].r_old;
        loop {
            let v = r_old.header().revision();
            if !is_timestamp(v) {
                return Err(abort(desc, AbortReason::ChainWalkStaleOnWriteLock));
            }
            if is_locked(v) {
                if v == desc.lock_token {
                    break;
                }
                // An inevitable transaction must never abort: it always
                // waits out contention regardless of the configured policy.
                let decision = if desc.is_inevitable() {
                    Decision::Wait
                } else {
                    ctx.config.contention_policy.decide(ctx.registry, v, desc.start_time)
                };
                match decision {
                    Decision::AbortSelf => return Err(abort(desc, AbortReason::ChainWalkStaleOnWriteLock)),
                    Decision::Wait => {
                        desc.record_spinloop(SpinloopReason::SpinDuringLockAcquire);
                        ctx.breaker.spin();
                        continue;
                    }
                }
            }
            match r_old.header().cas_revision(v, desc.lock_token) {
                Ok(prior) => {
                    desc.gcroots[i].prior.set(prior);
                    break;
                }
                Err(_) => continue,
            }
        }
    }
    Ok(())
}

/// Reserves the timestamp this transaction's writes will publish under.
/// Handles the inevitable sentinel by releasing our locks, waiting for the
/// inevitable holder to finish, and redoing phase 1.
fn reserve_timestamp(ctx: &BarrierCtx, desc: &mut Descriptor) -> Result<usize, TransactionError> {
    loop {
        let current = ctx.clock.peek();
        if current == header::INEVITABLE {
            debug!("commit waiting out an inevitable transaction");
            crate::abort::release_locks(desc);
            ctx.clock.with_inevitable_mutex(|| {});
            acquire_locks(ctx, desc)?;
            continue;
        }
        match ctx.clock.cas(current, current + 2) {
            Ok(_) => return Ok(current),
            Err(_) => continue,
        }
    }
}

/// Phase 3: publish the new timestamp on every local copy first, fence, then
/// link each old chain head to its copy. The fence guarantees no other
/// thread's chain walk can dereference a copy whose own revision word isn't
/// visible yet.
fn update_chain_heads(desc: &Descriptor, new_time: usize) {
    let new_timestamp = new_time | 1;
    for root in &desc.gcroots {
        root.l.header().set_revision(new_timestamp);
    }
    fence(Ordering::SeqCst);
    for root in &desc.gcroots {
        root.r_old.header().set_revision(root.l.addr());
    }
}

/// `CommitTransaction`: runs all four phases. On success the descriptor is
/// torn down and ready for the next `BeginTransaction`; on failure the
/// descriptor has already been cleaned up (or, for an inevitable
/// transaction, the caller must treat the returned error as fatal).
pub fn commit_transaction(ctx: &BarrierCtx, desc: &mut Descriptor) -> Result<(), TransactionError> {
    materialize_write_set(desc);

    acquire_locks(ctx, desc)?;

    // An inevitable transaction already holds the clock at INEVITABLE for
    // its whole lifetime: its "reservation" is simply releasing that slot
    // back to the even value it captured when it became inevitable, and it
    // never revalidates (there is nothing newer it could have missed).
    let reserved = if desc.is_inevitable() {
        let released = desc.start_time + 2;
        ctx.clock
            .cas(header::INEVITABLE, released)
            .expect("this transaction is the sole inevitable holder");
        desc.start_time
    } else {
        let reserved = reserve_timestamp(ctx, desc)?;
        if reserved != desc.start_time && !crate::validate::validate_during_commit(desc, ctx.registry) {
            return Err(abort(desc, AbortReason::CommitValidation));
        }
        reserved
    };

    update_chain_heads(desc, reserved);

    trace!("committed {} gcroot(s) at time {}", desc.gcroots.len(), reserved + 1);
    desc.record_commit();
    desc.clear_transaction_state();
    desc.active = ActiveState::Inactive;
    Ok(())
}
