// SPDX-License-Identifier: Apache-2.0

use criterion::Criterion;
use etstm::{new_global, Stm};

/// Single-threaded commit throughput: one read-modify-write transaction per
/// iteration against the same object, so every run contends the object's
/// own chain against itself across retries.
pub fn bnc_memory_usize(c: &mut Criterion) {
    let stm = Stm::new();
    let var = new_global(0usize);

    c.bench_function("bench_memory", |b| {
        b.iter(|| {
            stm.atomically(|txn| -> Result<(), etstm::TransactionError> {
                let w = txn.write(var)?;
                unsafe {
                    *w.data_mut() += 1;
                }
                Ok(())
            })
        })
    });
}
