//! Header proof-of-work verification.
//!
//! Two independent predicates gate a header: the stored solution must
//! equal the recomputed keyed hash under the correct epoch seed, and the
//! solution's numeric value must sit under the compact target. A header is
//! accepted by the PoW core iff both hold.

use primitive_types::U256;
use tracing::{debug, warn};

use crate::arith::{decode_compact, u256_from_hash};
use crate::chain::BlockIndex;
use crate::header::{BlockHeader, SOLUTION_BYTES};
use crate::params::ConsensusParams;
use crate::randomx;

/// Verify that `header.solution` is the keyed hash of the header preimage
/// under the seed its height dictates.
///
/// With a predecessor index the epoch seed is resolved from the chain:
/// the genesis seed inside the first epoch span, the seed block's hash
/// afterwards. Without one (mining, stateless mempool checks) the key
/// manager's current main seed is used.
///
/// Returns `false` for malformed solutions, unresolvable seeds, hash
/// mismatches, and during shutdown.
pub fn check_solution(
    _params: &ConsensusParams,
    header: &BlockHeader,
    prev: Option<&dyn BlockIndex>,
) -> bool {
    let preimage = header.pow_preimage();

    let hash = match prev {
        Some(prev) => {
            let next_height = prev.height() + 1;
            let sh = randomx::seed_height(next_height);

            let seed = if sh == 0 {
                randomx::GENESIS_SEED
            } else {
                match prev.ancestor_at(sh) {
                    Some(seed_block) => seed_block.block_hash(),
                    None => {
                        warn!("[POW] no seed block at height {sh} for block {next_height}");
                        return false;
                    }
                }
            };

            debug!(
                "[POW] verifying block {} with seed height {} ({})",
                next_height,
                sh,
                hex::encode(&seed[..8])
            );

            match randomx::hash_with_seed(&seed, &preimage) {
                Some(hash) => hash,
                None => return false,
            }
        }
        None => match randomx::hash_with_main_seed(&preimage) {
            Some(hash) => hash,
            None => return false,
        },
    };

    if header.solution.len() != SOLUTION_BYTES {
        warn!("[POW] bad solution size {}", header.solution.len());
        return false;
    }

    if hash[..] != header.solution[..] {
        debug!(
            "[POW] solution mismatch: computed {} stored {}",
            hex::encode(hash),
            hex::encode(&header.solution)
        );
        return false;
    }

    true
}

/// Verify that a 32-byte hash value satisfies the compact target `bits`.
///
/// Rejects negative, zero, and overflowing encodings, and any target above
/// the network's proof-of-work limit.
pub fn check_target(hash: &[u8; 32], bits: u32, params: &ConsensusParams) -> bool {
    let (target, negative, overflow) = decode_compact(bits);

    if negative || overflow || target.is_zero() || target > params.pow_limit {
        return false;
    }

    u256_from_hash(hash) <= target
}

/// Full PoW acceptance: correct keyed solution and a solution value under
/// the header's own target.
pub fn check_header_pow(
    params: &ConsensusParams,
    header: &BlockHeader,
    prev: Option<&dyn BlockIndex>,
) -> bool {
    if !check_solution(params, header, prev) {
        return false;
    }
    // check_solution established the 32-byte shape.
    let mut solution = [0u8; 32];
    solution.copy_from_slice(&header.solution);
    check_target(&solution, header.bits, params)
}

/// Expected work of a block with target `bits`: `floor(2^256 / (target+1))`,
/// computed as `~target / (target+1) + 1` to stay inside 256 bits.
/// Invalid encodings contribute zero work.
pub fn block_proof(bits: u32) -> U256 {
    let (target, negative, overflow) = decode_compact(bits);
    if negative || overflow || target.is_zero() {
        return U256::zero();
    }
    (!target) / (target + U256::one()) + U256::one()
}
