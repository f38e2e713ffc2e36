//! Proof-of-work consensus core.
//!
//! Binds block headers to an epoch-keyed, memory-hard CPU hash, verifies
//! stored solutions against recomputed hashes and compact targets,
//! retargets difficulty over a windowed average of recent blocks, and
//! computes the block subsidy and funding-stream splits from the fixed
//! emission schedule.
//!
//! The host node supplies block storage, networking, and wallet concerns;
//! this crate consumes a [`chain::BlockIndex`] lookup and a frozen
//! [`params::ConsensusParams`] record and exposes pure predicates plus the
//! process-wide key manager in [`randomx`].

pub mod arith;
pub mod chain;
pub mod emission;
pub mod header;
pub mod params;
pub mod pow;
pub mod randomx;

pub use chain::{BlockIndex, ChainEntry, MemoryChain};
pub use emission::{block_subsidy, halving_index, COIN, MAX_MONEY};
pub use header::{BlockHeader, SOLUTION_BYTES};
pub use params::funding::{FundingStream, FundingStreamError, FundingStreamRecipient};
pub use params::{ConsensusParams, Network, NetworkUpgrade};
pub use pow::{block_proof, check_header_pow, check_solution, check_target, next_bits};
pub use randomx::{seed_height, EPOCH_BLOCKS, EPOCH_LAG, GENESIS_SEED};
