// SPDX-License-Identifier: Apache-2.0

//! Read-set revalidation.
//!
//! `Validate` and `ValidateDuringCommit` share the same walk: for every
//! object a transaction has read, its revision must either still be an odd
//! timestamp (unchanged), or be the transaction's own lock token (only
//! permitted during commit, where the transaction's own pending writes are
//! expected to show up locked). Any other state -- superseded (even
//! pointer) or locked by someone else -- means the snapshot the transaction
//! built its read set against is gone.

use crate::descriptor::Descriptor;
use crate::error::SpinloopReason;
use crate::header::is_timestamp;
use crate::object::RawPtr;
use crate::registry::Registry;
use log::debug;

fn walk(desc: &mut Descriptor, _registry: &Registry, my_lock: Option<usize>) -> bool {
    // Snapshot the pointers up front: RawPtr is Copy, and this sidesteps
    // holding an immutable borrow of desc.read_set while also needing &mut
    // desc to record spin diagnostics.
    let ptrs: Vec<RawPtr> = desc.read_set.iter().copied().collect();
    for r in ptrs {
        loop {
            let v = r.header().revision();
            if !is_timestamp(v) {
                return false;
            }
            if crate::header::is_locked(v) {
                if my_lock == Some(v) {
                    break;
                }
                desc.record_spinloop(SpinloopReason::SpinDuringReadWalk);
                core::hint::spin_loop();
                continue;
            }
            break;
        }
    }
    true
}

/// `Validate`: used outside commit, where the transaction holds no locks of
/// its own. Returns whether the read set is still consistent.
pub fn validate(desc: &mut Descriptor, registry: &Registry) -> bool {
    let ok = walk(desc, registry, None);
    if !ok {
        debug!("validation failed outside commit");
    }
    ok
}

/// `ValidateDuringCommit`: additionally tolerates read-set members locked by
/// this transaction's own lock token (its own pending writes).
pub fn validate_during_commit(desc: &mut Descriptor, registry: &Registry) -> bool {
    let my_lock = desc.lock_token;
    walk(desc, registry, Some(my_lock))
}
