// SPDX-License-Identifier: Apache-2.0

//! The per-thread transaction descriptor: everything one thread's in-flight
//! transaction needs that isn't shared global state.

use crate::error::{AbortReason, SpinloopReason};
use crate::g2l::G2L;
use crate::object::RawPtr;
use crate::recent_reads::RecentReadsCache;
use crate::rlog::AppendLog;
use std::cell::Cell;

/// One entry of the write set materialized at commit time: `l` is the local
/// copy being published, `r_old` is the global original it supersedes, and
/// `prior` is filled in during `AcquireLocks` with the revision `r_old` held
/// before the lock CAS, so `CancelLocks` can restore it on abort.
pub struct GcRoot {
    pub l: RawPtr,
    pub r_old: RawPtr,
    pub prior: Cell<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    Inactive,
    Regular,
    Inevitable,
}

/// Snapshot of a descriptor's diagnostic counters, returned by
/// [`crate::Transaction::diagnostics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Diagnostics {
    pub commits: u64,
    pub aborts: [u64; AbortReason::COUNT],
    pub spinloops: [u64; SpinloopReason::COUNT],
}

pub struct Descriptor {
    /// This thread's unique odd lock token, allocated once at `DescriptorInit`.
    pub lock_token: usize,
    pub start_time: usize,
    pub active: ActiveState,
    atomic_nesting: i64,

    pub read_set: AppendLog<RawPtr>,
    pub gcroots: Vec<GcRoot>,
    pub g2l: G2L,
    pub recent_reads: RecentReadsCache,

    /// Counts successful walks since the last chain compression, used to
    /// amortize the rewrite to roughly once every `chain_compression_period`
    /// walks.
    pub readonly_updates: u32,

    diagnostics: Diagnostics,
}

impl Descriptor {
    pub fn new(lock_token: usize) -> Self {
        Descriptor {
            lock_token,
            start_time: 0,
            active: ActiveState::Inactive,
            atomic_nesting: 0,
            read_set: AppendLog::default(),
            gcroots: Vec::new(),
            g2l: G2L::default(),
            recent_reads: RecentReadsCache::default(),
            readonly_updates: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn begin(&mut self, start_time: usize) {
        debug_assert_eq!(self.active, ActiveState::Inactive);
        self.start_time = start_time;
        self.active = ActiveState::Regular;
    }

    pub fn is_inevitable(&self) -> bool {
        self.active == ActiveState::Inevitable
    }

    pub fn is_active(&self) -> bool {
        self.active != ActiveState::Inactive
    }

    /// Clears read set, G2L, recent-reads cache, and gcroots. Shared by both
    /// commit teardown (phase 4) and abort.
    pub fn clear_transaction_state(&mut self) {
        self.read_set.clear();
        self.g2l.clear();
        self.recent_reads.clear();
        self.gcroots.clear();
        self.readonly_updates = 0;
    }

    pub fn record_abort(&mut self, reason: AbortReason) {
        self.diagnostics.aborts[reason.index()] += 1;
    }

    pub fn record_commit(&mut self) {
        self.diagnostics.commits += 1;
    }

    pub fn record_spinloop(&mut self, reason: SpinloopReason) {
        self.diagnostics.spinloops[reason.index()] += 1;
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn enter_atomic(&mut self) {
        self.atomic_nesting += 1;
    }

    pub fn exit_atomic(&mut self) {
        debug_assert!(self.atomic_nesting > 0, "exit_atomic without matching enter_atomic");
        self.atomic_nesting -= 1;
    }

    pub fn atomic_level(&self) -> i64 {
        self.atomic_nesting
    }
}
