// SPDX-License-Identifier: Apache-2.0

//! Abort handling: undoing whatever partial commit progress a transaction
//! made before it discovered it had to give up.

use crate::descriptor::{ActiveState, Descriptor};
use crate::error::{AbortReason, TransactionError};
use log::debug;

/// Runs the full abort sequence -- record the reason, cancel any locks
/// already acquired, clear per-transaction state, and mark the descriptor
/// inactive -- before returning the error the caller propagates via `?`.
/// An inevitable transaction never actually aborts: it still records the
/// reason, but returns [`TransactionError::InevitableMustNotAbort`] without
/// touching its locks or state, since the caller is expected to treat that
/// variant as fatal.
pub fn abort_transaction(desc: &mut Descriptor, reason: AbortReason) -> TransactionError {
    desc.record_abort(reason);
    if desc.is_inevitable() {
        return TransactionError::InevitableMustNotAbort(reason);
    }
    cancel_locks(desc);
    desc.clear_transaction_state();
    desc.active = ActiveState::Inactive;
    TransactionError::Abort(reason)
}

/// `CancelLocks`: restores every gcroot this transaction had already locked
/// (via `AcquireLocks`) back to its prior revision. Gcroots whose `prior`
/// is still the zero sentinel were never locked and are left untouched.
pub fn cancel_locks(desc: &mut Descriptor) {
    for root in &desc.gcroots {
        let prior = root.prior.get();
        if prior != 0 {
            root.r_old.header().set_revision(prior);
        }
    }
    debug!("cancelled {} lock(s) during abort", desc.gcroots.len());
}

/// Like `cancel_locks`, but used mid-commit when a transaction must give up
/// its locks temporarily (to let an inevitable transaction through) without
/// actually aborting: the gcroots list is preserved and `prior` is reset to
/// the zero sentinel so `AcquireLocks` can cleanly redo its work.
pub fn release_locks(desc: &mut Descriptor) {
    for root in &desc.gcroots {
        let prior = root.prior.get();
        if prior != 0 {
            root.r_old.header().set_revision(prior);
            root.prior.set(0);
        }
    }
}
