// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration, passed once to [`crate::Stm::with_config`] rather
//! than scattered as free-standing constants.

use crate::policy::ContentionPolicy;

/// Amortized frequency (1-in-N) at which a successful read-barrier chain
/// walk compresses the intermediate nodes it passed through. Any positive
/// constant is correct; this is purely a performance heuristic.
pub const DEFAULT_CHAIN_COMPRESSION_PERIOD: u32 = 148;

#[derive(Debug, Clone, Copy)]
pub struct StmConfig {
    pub chain_compression_period: u32,
    pub contention_policy: ContentionPolicy,
}

impl Default for StmConfig {
    fn default() -> Self {
        StmConfig {
            chain_compression_period: DEFAULT_CHAIN_COMPRESSION_PERIOD,
            contention_policy: ContentionPolicy::WaitForOther,
        }
    }
}
