//! 256-bit target arithmetic and the compact ("nBits") encoding.
//!
//! The compact form packs a 256-bit target into 32 bits the same way the
//! Bitcoin family does: the high byte is a base-256 exponent, the low 23
//! bits are the mantissa, and bit 23 of the mantissa marks the (always
//! invalid for targets) negative sign.

use primitive_types::U256;

/// Decode a compact target into `(target, negative, overflow)`.
///
/// `negative` and `overflow` flag encodings that can never be valid
/// difficulty targets; callers reject them before comparing hashes.
pub fn decode_compact(bits: u32) -> (U256, bool, bool) {
    let size = bits >> 24;
    let word = bits & 0x007f_ffff;

    let target = if size <= 3 {
        U256::from(word >> (8 * (3 - size)))
    } else {
        U256::from(word) << (8 * (size - 3))
    };

    let negative = word != 0 && (bits & 0x0080_0000) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    (target, negative, overflow)
}

/// Encode a target in compact form. Inverse of [`decode_compact`] up to
/// mantissa truncation (the compact form keeps only the top 23 bits).
pub fn encode_compact(target: &U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact: u32 = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        ((*target >> (8 * (size - 3))).low_u64() & 0x00ff_ffff) as u32
    };

    // The mantissa sign bit must stay clear; shift into the exponent instead.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | ((size as u32) << 24)
}

/// Interpret a 32-byte hash as a little-endian 256-bit integer, matching
/// the byte order the hash engines emit.
pub fn u256_from_hash(hash: &[u8; 32]) -> U256 {
    U256::from_little_endian(hash)
}
