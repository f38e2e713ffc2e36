//! Process-wide key manager for the epoch-keyed hash engine.
//!
//! Header verification across a sync or reorg touches several epoch keys
//! at once, and building a key's dataset costs on the order of a second.
//! The manager amortises that cost: a registry maps each 32-byte seed to a
//! shared cache (bounded, LRU-evicted), and every OS thread keeps its own
//! VM per seed so hashing runs lock-free and in parallel.
//!
//! Eviction only drops the registry's reference; in-flight VMs share
//! ownership of their cache and keep it alive until they are dropped.

pub mod engine;

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use engine::{EngineParams, HASH_BYTES, SEED_BYTES};

/// Blocks per epoch; a power of two so the seed height is a bitmask.
pub const EPOCH_BLOCKS: u64 = 2048;

/// Height lag between a seed block and the first block keyed by it, so a
/// just-mined block can never flip its own key.
pub const EPOCH_LAG: u64 = 96;

/// Resident cache budget. Validation concurrently touches the current
/// epoch, its predecessor during the lag window, and a recent epoch or two
/// during reorg; five leaves headroom without risking multi-gigabyte
/// dataset pile-up.
pub const MAX_CACHES: usize = 5;

/// Seed keying the first epoch, before any seed block exists.
pub const GENESIS_SEED: [u8; SEED_BYTES] = [
    0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00,
];

/// Height of the block whose hash keys hashing at `height`.
///
/// Zero (the genesis seed) through the first epoch plus the lag window;
/// afterwards the largest epoch multiple not exceeding `height - LAG - 1`.
/// The first transition lands at height `EPOCH_BLOCKS + EPOCH_LAG + 1`.
pub fn seed_height(height: u64) -> u64 {
    if height <= EPOCH_BLOCKS + EPOCH_LAG {
        return 0;
    }
    (height - EPOCH_LAG - 1) & !(EPOCH_BLOCKS - 1)
}

struct CacheSlot {
    cache: Arc<engine::Cache>,
    last_used: Instant,
}

struct Registry {
    params: EngineParams,
    slots: HashMap<[u8; SEED_BYTES], CacheSlot>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry { params: EngineParams::default(), slots: HashMap::new() })
});

static MAIN_SEED: Lazy<Mutex<Option<[u8; SEED_BYTES]>>> = Lazy::new(|| Mutex::new(None));

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

struct VmSlot {
    vm: engine::Vm,
    last_used: Instant,
}

thread_local! {
    // VMs are per-thread by construction (mutable scratch) and dropped
    // with the thread. Bounded like the registry so a long sync cannot
    // pin an unbounded set of evicted caches through stale VMs.
    static THREAD_VMS: RefCell<HashMap<[u8; SEED_BYTES], VmSlot>> =
        RefCell::new(HashMap::new());
}

/// Replace the engine sizing for every cache built from now on.
///
/// Meant for tests and regtest tooling; existing caches are discarded so
/// mixed sizings can never coexist.
pub fn configure_engine(params: EngineParams) {
    let mut registry = REGISTRY.lock();
    if registry.params == params {
        return;
    }
    if !registry.slots.is_empty() {
        warn!(
            "[RANDOMX] engine reconfigured with {} resident caches; dropping them",
            registry.slots.len()
        );
        registry.slots.clear();
    }
    registry.params = params;
}

/// Idempotent startup: installs the genesis seed as the main key and
/// builds its cache. Also re-arms hashing after an explicit [`shutdown`].
pub fn init() {
    SHUTTING_DOWN.store(false, Ordering::SeqCst);
    {
        let mut main = MAIN_SEED.lock();
        if main.is_some() {
            return;
        }
        info!("[RANDOMX] initializing with genesis seed");
        *main = Some(GENESIS_SEED);
    }
    let mut registry = REGISTRY.lock();
    lookup_or_build(&mut registry, &GENESIS_SEED);
}

/// The seed mining and stateless verification currently key on.
pub fn main_seed() -> Option<[u8; SEED_BYTES]> {
    *MAIN_SEED.lock()
}

/// Point mining at a new epoch seed. Idempotent; pre-warms the registry so
/// the first block template does not pay the dataset build.
pub fn set_main_seed(seed: [u8; SEED_BYTES]) {
    {
        let mut main = MAIN_SEED.lock();
        if main.as_ref() == Some(&seed) {
            return;
        }
        info!("[RANDOMX] main seed set to {}", hex::encode(&seed[..8]));
        *main = Some(seed);
    }
    let mut registry = REGISTRY.lock();
    lookup_or_build(&mut registry, &seed);
}

/// Hash `input` under `seed`. Returns `None` only while shutting down.
///
/// Safe to call from any number of threads: distinct seeds hash fully in
/// parallel, and threads sharing a seed share one cache through their own
/// VMs. The registry lock is held only for slot bookkeeping and the
/// one-time dataset build per seed.
pub fn hash_with_seed(seed: &[u8; SEED_BYTES], input: &[u8]) -> Option<[u8; HASH_BYTES]> {
    if SHUTTING_DOWN.load(Ordering::SeqCst) {
        debug!("[RANDOMX] hash skipped, shutting down");
        return None;
    }

    let cache = {
        let mut registry = REGISTRY.lock();
        lookup_or_build(&mut registry, seed)
    };

    let out = THREAD_VMS.with(|cell| {
        let mut vms = cell.borrow_mut();

        let reusable = vms
            .get(seed)
            .map_or(false, |slot| Arc::ptr_eq(slot.vm.cache(), &cache));
        if !reusable {
            if !vms.contains_key(seed) && vms.len() >= MAX_CACHES {
                if let Some(stale) =
                    vms.iter().min_by_key(|(_, slot)| slot.last_used).map(|(k, _)| *k)
                {
                    vms.remove(&stale);
                }
            }
            vms.insert(
                *seed,
                VmSlot {
                    vm: engine::Vm::new(Arc::clone(&cache)),
                    last_used: Instant::now(),
                },
            );
        }

        let slot = vms.get_mut(seed).expect("thread-local VM present after insert");
        slot.last_used = Instant::now();
        slot.vm.hash(input)
    });

    Some(out)
}

/// Hash under the current main seed, initializing with the genesis seed on
/// first use. Returns `None` only while shutting down.
pub fn hash_with_main_seed(input: &[u8]) -> Option<[u8; HASH_BYTES]> {
    if SHUTTING_DOWN.load(Ordering::SeqCst) {
        debug!("[RANDOMX] hash skipped, shutting down");
        return None;
    }

    let seed = match main_seed() {
        Some(seed) => seed,
        None => {
            init();
            main_seed()?
        }
    };
    hash_with_seed(&seed, input)
}

/// Begin teardown: fail new hashes fast, give in-flight hashes a grace
/// period, then release this thread's VMs and every registry cache.
/// Idempotent. VMs owned by other threads survive until those threads
/// exit; their shared cache handles keep the datasets valid meanwhile.
pub fn shutdown() {
    if SHUTTING_DOWN.swap(true, Ordering::SeqCst) {
        debug!("[RANDOMX] shutdown already in progress");
        return;
    }
    info!("[RANDOMX] shutting down");

    THREAD_VMS.with(|cell| cell.borrow_mut().clear());
    std::thread::sleep(Duration::from_millis(100));

    REGISTRY.lock().slots.clear();
    *MAIN_SEED.lock() = None;

    info!("[RANDOMX] shutdown complete");
}

/// Fetch the cache for `seed`, building it if absent. Runs under the
/// registry lock so exactly one thread materialises any given seed.
fn lookup_or_build(
    registry: &mut Registry,
    seed: &[u8; SEED_BYTES],
) -> Arc<engine::Cache> {
    let now = Instant::now();

    if let Some(slot) = registry.slots.get_mut(seed) {
        slot.last_used = now;
        return Arc::clone(&slot.cache);
    }

    if registry.slots.len() >= MAX_CACHES {
        if let Some(stale) = registry
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(k, _)| *k)
        {
            info!("[RANDOMX] evicting cache for seed {}", hex::encode(&stale[..8]));
            registry.slots.remove(&stale);
        }
    }

    info!("[RANDOMX] building cache for seed {}", hex::encode(&seed[..8]));
    let cache = Arc::new(engine::Cache::build(registry.params, *seed));
    registry.slots.insert(
        *seed,
        CacheSlot { cache: Arc::clone(&cache), last_used: now },
    );
    cache
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_height_epoch_zero() {
        assert_eq!(seed_height(0), 0);
        assert_eq!(seed_height(1), 0);
        assert_eq!(seed_height(1000), 0);
        assert_eq!(seed_height(EPOCH_BLOCKS), 0);
        assert_eq!(seed_height(2144), 0, "lag window still keys on genesis");
    }

    #[test]
    fn seed_height_first_transition() {
        assert_eq!(seed_height(2145), 2048);
        assert_eq!(seed_height(2146), 2048);
        assert_eq!(seed_height(2048 + 2048 + EPOCH_LAG), 2048, "next lag window included");
        assert_eq!(seed_height(2048 + 2048 + EPOCH_LAG + 1), 4096);
    }

    #[test]
    fn seed_height_large_heights() {
        assert_eq!(seed_height(100_000), 98_304);
        assert_eq!(seed_height(1_000_000), 999_424);
    }

    #[test]
    fn seed_height_alignment_and_distance() {
        for height in (0..2_000_000).step_by(997) {
            let sh = seed_height(height);
            assert_eq!(sh % EPOCH_BLOCKS, 0, "unaligned seed height for {height}");
            assert!(sh <= height);
            if height > EPOCH_BLOCKS + EPOCH_LAG {
                let distance = height - sh;
                assert!(
                    (EPOCH_LAG + 1..=EPOCH_BLOCKS + EPOCH_LAG).contains(&distance),
                    "seed distance {distance} out of range at height {height}"
                );
            }
        }
    }

    #[test]
    fn genesis_seed_constant_shape() {
        assert_eq!(GENESIS_SEED[0], 0x08);
        assert!(GENESIS_SEED[1..].iter().all(|&b| b == 0));
    }
}
