// SPDX-License-Identifier: Apache-2.0

//! Transitioning a transaction into, and back out of, inevitable mode.
//!
//! An inevitable transaction is the one transaction in the whole process
//! allowed to run without ever validating or aborting: everyone else
//! defers to it. The global clock's [`header::INEVITABLE`] sentinel is what
//! every other thread actually observes and respects; the inevitable mutex
//! here only serializes the handful of operations around the transition
//! itself (deciding who wins the race to become inevitable, and the commit
//! that ends it) so two threads can't simultaneously believe they won.

use crate::barrier::BarrierCtx;
use crate::descriptor::{ActiveState, Descriptor};
use crate::error::{AbortReason, TransactionError};
use crate::header::INEVITABLE;

/// `BeginInevitableTransaction`: starts a brand-new transaction directly in
/// inevitable mode. Blocks (via the clock's own wait loop) until any
/// currently-inevitable transaction has committed, then claims the slot.
pub fn begin_inevitable_transaction(ctx: &BarrierCtx, desc: &mut Descriptor) {
    debug_assert!(!desc.is_active());
    claim_inevitable_slot(ctx, desc);
    desc.begin(desc.start_time);
    desc.active = ActiveState::Inevitable;
}

/// `BecomeInevitable`: promotes an already-running regular transaction to
/// inevitable. On success the transaction keeps its existing read set and
/// write set -- nothing is thrown away, since inevitability only changes how
/// commit behaves, not what was read or written so far. On failure (another
/// thread already holds the slot and this transaction's own policy says to
/// give up instead of waiting) the transaction aborts with
/// [`AbortReason::ForcedAbortOnInevitable`].
pub fn become_inevitable(ctx: &BarrierCtx, desc: &mut Descriptor) -> Result<(), TransactionError> {
    debug_assert_eq!(desc.active, ActiveState::Regular);
    if !crate::validate::validate(desc, ctx.registry) {
        return Err(crate::abort::abort_transaction(desc, AbortReason::ForcedAbortOnInevitable));
    }
    claim_inevitable_slot(ctx, desc);
    desc.active = ActiveState::Inevitable;
    Ok(())
}

fn claim_inevitable_slot(ctx: &BarrierCtx, desc: &mut Descriptor) {
    loop {
        let current = ctx.clock.peek();
        if current == INEVITABLE {
            ctx.clock.with_inevitable_mutex(|| {});
            continue;
        }
        if ctx.clock.cas(current, INEVITABLE).is_ok() {
            desc.start_time = current;
            return;
        }
    }
}
