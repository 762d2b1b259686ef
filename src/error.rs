// SPDX-License-Identifier: Apache-2.0

//! Closed error enumerations and the top-level transaction error.

use thiserror::Error;

/// The five reasons a transaction can abort. Kept as a closed enumeration so
/// per-reason diagnostic counters can be a fixed-size array rather than a
/// map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// `AcquireLocks` found the object's revision chain had moved past what
    /// this transaction observed while trying to CAS a lock token on.
    ChainWalkStaleOnWriteLock,
    /// The read-barrier slow path found a revision too new to fit this
    /// transaction's snapshot, and revalidation of the rest of the read set
    /// failed.
    ChainWalkStaleOnRead,
    /// Commit's `ValidateDuringCommit` found a read-set member superseded.
    CommitValidation,
    /// `BecomeInevitable` lost the race to another inevitable transaction.
    ForcedAbortOnInevitable,
    /// The mutator explicitly requested abort-and-retry.
    ExplicitAbortAndRetry,
}

impl AbortReason {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        match self {
            AbortReason::ChainWalkStaleOnWriteLock => 0,
            AbortReason::ChainWalkStaleOnRead => 1,
            AbortReason::CommitValidation => 2,
            AbortReason::ForcedAbortOnInevitable => 3,
            AbortReason::ExplicitAbortAndRetry => 4,
        }
    }
}

/// The three reasons a bounded spin loop can be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinloopReason {
    SpinDuringReadWalk,
    SpinInAbortCleanup,
    SpinDuringLockAcquire,
}

impl SpinloopReason {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        match self {
            SpinloopReason::SpinDuringReadWalk => 0,
            SpinloopReason::SpinInAbortCleanup => 1,
            SpinloopReason::SpinDuringLockAcquire => 2,
        }
    }
}

/// The error type threaded through barrier, validation, and commit calls.
///
/// An `Abort` is not a bug: it is the normal signal that the caller's
/// transaction attempt must unwind to the runtime's retry harness and run
/// again. It is handled, never printed as an unhandled failure, unless it
/// escapes an inevitable transaction (see [`TransactionError::InevitableMustNotAbort`]).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction aborted: {0:?}")]
    Abort(AbortReason),

    /// An inevitable transaction hit a code path that would normally abort.
    /// This is a protocol bug, not a recoverable condition -- inevitable
    /// transactions are specified to never abort.
    #[error("inevitable transaction attempted to abort (reason: {0:?})")]
    InevitableMustNotAbort(AbortReason),
}

impl TransactionError {
    pub fn reason(self) -> AbortReason {
        match self {
            TransactionError::Abort(r) => r,
            TransactionError::InevitableMustNotAbort(r) => r,
        }
    }
}
