//! Block header wire layout and the canonical proof-of-work preimage.

use serde::{Deserialize, Serialize};

/// Size of a stored PoW solution: the 32-byte keyed-hash output.
pub const SOLUTION_BYTES: usize = 32;

/// Fixed size of the hashing preimage:
/// `version | prev_hash | merkle_root | time | bits | nonce`.
pub const PREIMAGE_BYTES: usize = 4 + 32 + 32 + 4 + 4 + 32;

/// A block header in its consensus form.
///
/// `solution` stores the keyed-hash output for the header; it is excluded
/// from the PoW preimage because it is the value being proven.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: [u8; 32],
    pub solution: Vec<u8>,
}

impl BlockHeader {
    /// Canonical PoW preimage: the little-endian wire form of every field
    /// before `solution`, with the 32 nonce bytes appended last.
    ///
    /// Byte-identical across platforms; miners and validators must agree
    /// on this exact layout.
    pub fn pow_preimage(&self) -> [u8; PREIMAGE_BYTES] {
        let mut out = [0u8; PREIMAGE_BYTES];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..108].copy_from_slice(&self.nonce);
        out
    }

    /// Full wire serialization: the preimage followed by the solution bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREIMAGE_BYTES + self.solution.len());
        out.extend_from_slice(&self.pow_preimage());
        out.extend_from_slice(&self.solution);
        out
    }

    /// Block identity hash over the full serialization, solution included.
    pub fn block_hash(&self) -> [u8; 32] {
        *blake3::hash(&self.serialize()).as_bytes()
    }
}
