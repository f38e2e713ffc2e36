//! The keyed memory-hard hash primitive.
//!
//! Exposes the cache/VM surface the key manager drives: build a large
//! read-only dataset from a 32-byte seed (slow, done once per epoch key),
//! bind a per-thread VM to it, and hash arbitrary input through
//! dataset-dependent mixing. Hashing is pure CPU work over the VM's own
//! scratchpad; VMs are therefore not shareable between threads, while the
//! dataset behind them is immutable and freely shared.

use std::sync::Arc;

/// Length of a cache seed.
pub const SEED_BYTES: usize = 32;
/// Length of a hash output.
pub const HASH_BYTES: usize = 32;

/// Sizing knobs for the dataset and per-VM scratchpad.
///
/// Consensus only requires determinism; the sizes trade verification
/// latency against memory-hardness and can be shrunk for tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineParams {
    /// Shared dataset size per cache, in KiB. Rounded up to a power of
    /// two internally.
    pub dataset_kib: usize,
    /// Per-VM scratchpad size, in KiB. Rounded up to a power of two.
    pub scratch_kib: usize,
    /// Dependent-read mixing iterations per hash.
    pub mix_iters: u32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            dataset_kib: 256 * 1024,
            scratch_kib: 2 * 1024,
            mix_iters: 32_768,
        }
    }
}

impl EngineParams {
    /// Small sizing for tests: full code paths, negligible build time.
    pub const fn for_tests() -> Self {
        Self { dataset_kib: 64, scratch_kib: 16, mix_iters: 256 }
    }
}

/// SplitMix64, used for deterministic index streams.
#[derive(Clone)]
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    #[inline]
    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// Round a KiB size up to a power-of-two word count for mask indexing.
fn pow2_words(kib: usize) -> usize {
    let words = (kib.max(1) * 1024) / std::mem::size_of::<u64>();
    words.next_power_of_two()
}

/// An epoch key's read-only dataset. Building one is the expensive step;
/// every VM bound to the same seed shares a single instance.
pub struct Cache {
    seed: [u8; SEED_BYTES],
    params: EngineParams,
    mem: Box<[u64]>,
    mask: usize,
}

impl Cache {
    /// Expand `seed` into the full dataset. Deterministic: the same seed
    /// and params always produce identical memory.
    pub fn build(params: EngineParams, seed: [u8; SEED_BYTES]) -> Self {
        let words = pow2_words(params.dataset_kib);
        let mut mem = vec![0u64; words].into_boxed_slice();

        let mut reader = blake3::Hasher::new().update(&seed).finalize_xof();
        let mut block = [0u8; 8192];
        let mut filled = 0usize;
        while filled < words {
            reader.fill(&mut block);
            for chunk in block.chunks_exact(8) {
                if filled >= words {
                    break;
                }
                mem[filled] = u64::from_le_bytes(chunk.try_into().unwrap());
                filled += 1;
            }
        }

        Self { seed, params, mem, mask: words - 1 }
    }

    pub fn seed(&self) -> &[u8; SEED_BYTES] {
        &self.seed
    }

    pub fn params(&self) -> EngineParams {
        self.params
    }
}

/// A hashing VM bound to one cache.
///
/// Owns a mutable scratchpad, so a VM must stay on a single thread; the
/// shared cache reference keeps the dataset alive for as long as the VM
/// exists, whatever the registry does.
pub struct Vm {
    cache: Arc<Cache>,
    scratch: Vec<u64>,
    smask: usize,
}

impl Vm {
    pub fn new(cache: Arc<Cache>) -> Self {
        let words = pow2_words(cache.params.scratch_kib);
        Self { scratch: vec![0u64; words], smask: words - 1, cache }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Hash `input` under this VM's key. Deterministic for a fixed
    /// `(seed, input)` pair across threads, runs, and cache rebuilds.
    pub fn hash(&mut self, input: &[u8]) -> [u8; HASH_BYTES] {
        let digest = *blake3::hash(input).as_bytes();
        let mut a = u64::from_le_bytes(digest[0..8].try_into().unwrap());
        let mut b = u64::from_le_bytes(digest[8..16].try_into().unwrap());
        let mut acc = u64::from_le_bytes(digest[16..24].try_into().unwrap());
        let lane = u64::from_le_bytes(digest[24..32].try_into().unwrap());

        let base = &self.cache.mem;
        let bmask = self.cache.mask;

        // Fill the scratchpad from dataset reads keyed by the input digest.
        let mut sm = SplitMix64::new(a ^ lane.rotate_left(32));
        for slot in self.scratch.iter_mut() {
            let m = sm.next();
            let i1 = (m.rotate_left(17) as usize) & bmask;
            let i2 = (m.rotate_right(23) as usize) & bmask;
            *slot = base[i1] ^ base[i2] ^ m.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        }

        // Dependent-read mixing: each read's address comes from the value
        // of the previous one, with periodic write-back into the scratch.
        for i in 0..self.cache.params.mix_iters {
            let j1 = ((a ^ acc ^ u64::from(i).wrapping_mul(0x9E37_79B9)).rotate_left(17)
                as usize)
                & self.smask;
            let v1 = self.scratch[j1];

            let j2 = ((v1 ^ b).rotate_left(23) as usize) & self.smask;
            let v2 = self.scratch[j2];

            let j3 = ((v2 ^ acc).rotate_left(19) as usize) & bmask;
            let v3 = base[j3];

            let mix = v1 ^ v2.rotate_left(13) ^ v3.wrapping_mul(0x94D0_49BB_1331_11EB);
            a = a.rotate_left(13) ^ mix.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
            b = b.rotate_left(17) ^ (mix ^ acc).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            acc = acc.rotate_left(7) ^ (a ^ b).wrapping_mul(0xD6E8_FEB8_6659_FD93);

            if i % 4 == 0 {
                let jw = ((mix ^ b.rotate_left(11)).rotate_left(31) as usize) & self.smask;
                self.scratch[jw] = self.scratch[jw].wrapping_add(mix).rotate_left(41);
            }
        }

        // Final digest commits to the input, the mixed state, and a
        // state-addressed sample of both memories.
        let mut hasher = blake3::Hasher::new();
        hasher.update(&digest);
        hasher.update(&a.to_le_bytes());
        hasher.update(&b.to_le_bytes());
        hasher.update(&acc.to_le_bytes());
        hasher.update(&self.scratch[(acc as usize) & self.smask].to_le_bytes());
        hasher.update(&base[(a as usize) & bmask].to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}
