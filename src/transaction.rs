// SPDX-License-Identifier: Apache-2.0

//! The public entry point: [`Stm`] owns the process-wide shared state (the
//! clock, the lock-token registry, and the configured policy); [`Transaction`]
//! is the handle a mutator's closure uses to read, write, and retry inside
//! one attempt. [`Stm::atomically`] is the retry harness: it keeps invoking
//! the closure against a fresh attempt until one of them commits.

use crate::barrier::BarrierCtx;
use crate::breaker::BusyBreaker;
use crate::clock::GlobalClock;
use crate::config::StmConfig;
use crate::descriptor::{Descriptor, Diagnostics};
use crate::error::{AbortReason, TransactionError};
use crate::object::{GcPtr, RawPtr};
use crate::registry::Registry;
use log::warn;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

struct StmInner {
    clock: GlobalClock,
    registry: Registry,
    config: StmConfig,
}

thread_local! {
    /// One descriptor and backoff helper per (thread, `Stm` instance). Keyed
    /// by the `Stm`'s `Arc` address so a thread touching several independent
    /// `Stm`s still gets one lock token and one write set per `Stm`, not a
    /// single shared one.
    static DESCRIPTORS: RefCell<HashMap<usize, (Descriptor, BusyBreaker)>> = RefCell::new(HashMap::new());
}

/// A handle to one extendable-timestamps runtime. Cheap to clone: internally
/// just an `Arc` around the shared clock, registry, and configuration.
pub struct Stm(Arc<StmInner>);

impl Clone for Stm {
    fn clone(&self) -> Self {
        Stm(self.0.clone())
    }
}

impl Default for Stm {
    fn default() -> Self {
        Self::new()
    }
}

impl Stm {
    /// Creates a runtime with [`StmConfig::default`].
    pub fn new() -> Self {
        Self::with_config(StmConfig::default())
    }

    /// Creates a runtime with an explicit configuration (contention policy,
    /// chain-compression period).
    pub fn with_config(config: StmConfig) -> Self {
        Stm(Arc::new(StmInner {
            clock: GlobalClock::default(),
            registry: Registry::default(),
            config,
        }))
    }

    pub fn config(&self) -> StmConfig {
        self.0.config
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    fn with_ctx<R>(&self, f: impl FnOnce(&BarrierCtx, &mut Descriptor) -> R) -> R {
        let key = self.key();
        let inner = &self.0;
        DESCRIPTORS.with(|cell| {
            let mut map = cell.borrow_mut();
            let entry = map
                .entry(key)
                .or_insert_with(|| (Descriptor::new(inner.registry.alloc_lock_token()), BusyBreaker::default()));
            let ctx = BarrierCtx {
                clock: &inner.clock,
                registry: &inner.registry,
                config: &inner.config,
                breaker: &entry.1,
            };
            f(&ctx, &mut entry.0)
        })
    }

    /// `DescriptorInit`/`BeginTransaction`: starts a fresh attempt for the
    /// calling thread on this descriptor (allocating it on first use).
    fn begin_transaction(&self) {
        self.with_ctx(|ctx, desc| {
            let start_time = ctx.clock.get();
            desc.begin(start_time);
            ctx.registry.record_start_time(desc.lock_token, start_time);
        });
    }

    /// `BeginInevitableTransaction`: starts a fresh attempt directly in
    /// inevitable mode.
    fn begin_inevitable_transaction(&self) {
        self.with_ctx(|ctx, desc| {
            crate::inevitable::begin_inevitable_transaction(ctx, desc);
            ctx.registry.record_start_time(desc.lock_token, desc.start_time);
        });
    }

    fn commit(&self) -> Result<(), TransactionError> {
        self.with_ctx(|ctx, desc| {
            let token = desc.lock_token;
            let result = crate::commit::commit_transaction(ctx, desc);
            ctx.registry.forget(token);
            result
        })
    }

    /// Runs `body` against fresh attempts until one commits, returning the
    /// attempt's value. `body` may be invoked more than once and must not
    /// have effects beyond the objects it reads and writes through its
    /// [`Transaction`] handle -- the usual software-transactional-memory
    /// rule against observable side effects inside the transactional body.
    ///
    /// Panics if an inevitable transaction ever tries to abort: that
    /// indicates a protocol bug (inevitable transactions are specified to
    /// never abort), not a recoverable race.
    pub fn atomically<F, R>(&self, body: F) -> R
    where
        F: Fn(&Transaction) -> Result<R, TransactionError>,
    {
        loop {
            self.begin_transaction();
            let txn = Transaction { stm: self };
            let outcome = body(&txn).and_then(|value| self.commit().map(|()| value));
            match outcome {
                Ok(value) => return value,
                Err(TransactionError::InevitableMustNotAbort(reason)) => {
                    panic!("inevitable transaction attempted to abort (reason: {:?})", reason);
                }
                Err(TransactionError::Abort(reason)) => {
                    warn!("transaction attempt aborted ({:?}); retrying", reason);
                }
            }
        }
    }

    /// Like [`Stm::atomically`], but the first (and only) attempt runs
    /// irrevocably: it can never abort and no other transaction on this
    /// runtime can commit concurrently with it. Intended for operations with
    /// externally visible side effects that cannot be safely retried.
    pub fn atomically_inevitable<F, R>(&self, body: F) -> R
    where
        F: FnOnce(&Transaction) -> R,
    {
        self.begin_inevitable_transaction();
        let txn = Transaction { stm: self };
        let value = body(&txn);
        match self.commit() {
            Ok(()) => value,
            Err(err) => panic!("inevitable transaction failed to commit: {:?}", err),
        }
    }

    /// Snapshot of this thread's descriptor diagnostics on this runtime.
    pub fn diagnostics(&self) -> Diagnostics {
        self.with_ctx(|_, desc| desc.diagnostics())
    }
}

/// The handle passed to an [`Stm::atomically`] body: every transactional
/// read, write, and control operation goes through here.
pub struct Transaction<'a> {
    stm: &'a Stm,
}

impl<'a> Transaction<'a> {
    /// `ReadBarrier(P)`.
    pub fn read<T: Clone>(&self, p: GcPtr<T>) -> Result<GcPtr<T>, TransactionError> {
        self.stm.with_ctx(|ctx, desc| crate::barrier::read_barrier(ctx, desc, p))
    }

    /// `RepeatReadBarrier(R)`: cheaper re-access of a pointer this
    /// transaction already read-barriered.
    pub fn repeat_read<T>(&self, r: GcPtr<T>) -> GcPtr<T> {
        self.stm.with_ctx(|_, desc| crate::barrier::repeat_read_barrier(desc, r))
    }

    /// `ReadBarrierFromContainer(P, C, offset)`: reads `slot`, a field
    /// reachable from `container`, instead of a root the mutator holds
    /// directly. Lets the barrier patch the field in place once it resolves
    /// to the latest revision, short-circuiting future chain walks through
    /// it.
    pub fn read_from_container<T: Clone>(&self, container: RawPtr, slot: &Cell<GcPtr<T>>) -> Result<GcPtr<T>, TransactionError> {
        self.stm
            .with_ctx(|ctx, desc| crate::barrier::read_barrier_from_container(ctx, desc, container, slot))
    }

    /// `WriteBarrier(P)`.
    pub fn write<T: Clone>(&self, p: GcPtr<T>) -> Result<GcPtr<T>, TransactionError> {
        self.stm.with_ctx(|ctx, desc| crate::barrier::write_barrier(ctx, desc, p))
    }

    /// `WriteBarrierFromReady(R)`: `r` is already known to be the current
    /// chain head, typically the result of a preceding [`Transaction::read`].
    pub fn write_from_ready<T: Clone>(&self, r: GcPtr<T>) -> GcPtr<T> {
        self.stm.with_ctx(|_, desc| crate::barrier::write_barrier_from_ready(desc, r))
    }

    /// `PtrEq`: transactional pointer identity.
    pub fn ptr_eq<T>(&self, a: GcPtr<T>, b: GcPtr<T>) -> bool {
        crate::barrier::ptr_eq(a, b)
    }

    /// Identity hash consistent with [`Transaction::ptr_eq`].
    pub fn ptr_hash<T>(&self, p: GcPtr<T>) -> usize {
        crate::barrier::ptr_hash(p)
    }

    /// Explicitly aborts and retries the current attempt, e.g. because a
    /// precondition the mutator checked itself (not through a barrier) no
    /// longer holds. Always returns `Err`; intended to be used as
    /// `return Err(txn.retry())`.
    pub fn retry(&self) -> TransactionError {
        self.stm
            .with_ctx(|_, desc| crate::abort::abort_transaction(desc, AbortReason::ExplicitAbortAndRetry))
    }

    /// `BecomeInevitable`: promotes the current attempt to inevitable
    /// in-place, keeping its existing read and write sets.
    pub fn become_inevitable(&self) -> Result<(), TransactionError> {
        self.stm.with_ctx(|ctx, desc| crate::inevitable::become_inevitable(ctx, desc))
    }

    pub fn is_inevitable(&self) -> bool {
        self.stm.with_ctx(|_, desc| desc.is_inevitable())
    }

    /// Marks entry into a nested `atomic` block. Flat nesting only: no
    /// partial-rollback-to-inner-boundary support, matching the atomic
    /// nesting counter's documented scope.
    pub fn enter_atomic(&self) {
        self.stm.with_ctx(|_, desc| desc.enter_atomic());
    }

    pub fn exit_atomic(&self) {
        self.stm.with_ctx(|_, desc| desc.exit_atomic());
    }

    pub fn atomic_level(&self) -> i64 {
        self.stm.with_ctx(|_, desc| desc.atomic_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::new_global;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    #[test]
    fn atomically_commits_a_simple_write() {
        let stm = Stm::new();
        let g = new_global(1usize);

        stm.atomically(|txn| -> Result<(), TransactionError> {
            let w = txn.write(g)?;
            unsafe {
                *w.data_mut() = 2;
            }
            Ok(())
        });

        let value = stm.atomically(|txn| -> Result<usize, TransactionError> {
            let r = txn.read(g)?;
            Ok(unsafe { *r.data() })
        });
        assert_eq!(value, 2);
    }

    #[test]
    fn atomically_retries_on_explicit_abort() {
        let stm = Stm::new();
        let attempts = StdArc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result = stm.atomically(move |txn| -> Result<u32, TransactionError> {
            let n = attempts_clone.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return Err(txn.retry());
            }
            Ok(42)
        });

        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn atomically_inevitable_never_retries() {
        let stm = Stm::new();
        let g = new_global(1usize);

        let value = stm.atomically_inevitable(|txn| {
            let w = txn.write(g).expect("inevitable write never aborts");
            unsafe {
                *w.data_mut() = 9;
            }
            9usize
        });
        assert_eq!(value, 9);
    }

    #[test]
    fn diagnostics_tracks_commits() {
        let stm = Stm::new();
        stm.atomically(|_txn| -> Result<(), TransactionError> { Ok(()) });
        assert_eq!(stm.diagnostics().commits, 1);
    }
}
