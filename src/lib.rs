// Copyright 2020-2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! # etstm
//!
//! A software transactional memory core built on the extendable-timestamps
//! protocol: every object carries a small header (flags plus a polymorphic
//! revision word that is either an odd timestamp or an even chain pointer),
//! transactions snapshot a global clock on start, and commit is a four-phase
//! protocol that locks the write set, reserves a new timestamp, publishes,
//! and tears down.
//!
//! The garbage collector, the descriptor/list-buffer allocator a production
//! integration would use, and surface-level data structures built on top of
//! barriers are out of scope here; this crate is the synchronization core
//! those would sit on top of. [`object::duplicate`] stands in for the real
//! collector's local-copy allocation.
//!
//! Start with [`Stm`]: create one, then drive transactions through
//! [`Stm::atomically`].

pub mod abort;
pub mod barrier;
pub mod breaker;
pub mod clock;
pub mod commit;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod g2l;
pub mod gc;
pub mod header;
pub mod inevitable;
pub mod object;
pub mod policy;
pub mod recent_reads;
pub mod registry;
pub mod rlog;
pub mod transaction;
pub mod validate;

pub use config::StmConfig;
pub use descriptor::Diagnostics;
pub use error::{AbortReason, SpinloopReason, TransactionError};
pub use object::{duplicate, new_global, GcPtr};
pub use policy::ContentionPolicy;
pub use transaction::{Stm, Transaction};
