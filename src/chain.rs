//! The block-index contract the consensus core consumes.
//!
//! Storage and networking live elsewhere; the core only needs to look up a
//! block's position, its stored difficulty bits and timestamp, and walk to
//! ancestors by height. [`MemoryChain`] is a small in-process
//! implementation used by tests and tooling.

use primitive_types::U256;

use crate::pow::verify::block_proof;

/// Number of ancestor timestamps feeding the median-time-past rule.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// A validated block's position in the active chain.
///
/// `ancestor_at` must resolve any height at or below `height()`; how the
/// walk is implemented (linear, skip list, index array) is up to the host.
pub trait BlockIndex {
    fn height(&self) -> u64;

    /// Compact difficulty target stored in this block's header.
    fn bits(&self) -> u32;

    /// Header timestamp.
    fn time(&self) -> u32;

    /// Identity hash of this block.
    fn block_hash(&self) -> [u8; 32];

    /// Total work of the chain up to and including this block.
    fn chain_work(&self) -> U256;

    /// The ancestor at exactly `height`, or `None` if `height` is above
    /// this block or outside the known chain.
    fn ancestor_at(&self, height: u64) -> Option<Box<dyn BlockIndex + '_>>;

    /// Median of the last [`MEDIAN_TIME_SPAN`] block times ending here.
    ///
    /// Used as both endpoints of the retarget timespan so that a miner
    /// cannot warp difficulty by lying about a single timestamp.
    fn median_time_past(&self) -> i64 {
        let mut times: Vec<i64> = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let start = self.height().saturating_sub(MEDIAN_TIME_SPAN as u64 - 1);
        for h in start..=self.height() {
            if let Some(anc) = self.ancestor_at(h) {
                times.push(i64::from(anc.time()));
            }
        }
        times.sort_unstable();
        times[times.len() / 2]
    }
}

/// One entry of an in-memory chain.
#[derive(Clone, Debug)]
pub struct ChainEntry {
    pub time: u32,
    pub bits: u32,
    pub hash: [u8; 32],
}

/// A contiguous run of block entries starting at `start_height`.
///
/// Heights map straight onto vector indices, so ancestor lookup is O(1).
#[derive(Clone, Debug, Default)]
pub struct MemoryChain {
    start_height: u64,
    entries: Vec<ChainEntry>,
    cumulative_work: Vec<U256>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain whose first entry sits at `start_height` rather than zero,
    /// for scenarios that only need the recent window of a tall chain.
    pub fn starting_at(start_height: u64) -> Self {
        Self { start_height, ..Self::default() }
    }

    pub fn push(&mut self, entry: ChainEntry) {
        let prev_work = self.cumulative_work.last().copied().unwrap_or_default();
        self.cumulative_work.push(prev_work + block_proof(entry.bits));
        self.entries.push(entry);
    }

    /// Append `count` entries with evenly spaced timestamps and constant
    /// difficulty bits; each entry gets a unique synthetic hash.
    pub fn extend_spaced(&mut self, count: u64, first_time: u32, spacing: u32, bits: u32) {
        for i in 0..count {
            let height = self.start_height + self.entries.len() as u64;
            let mut hash = [0u8; 32];
            hash[..8].copy_from_slice(&(height + 1).to_le_bytes());
            self.push(ChainEntry {
                time: first_time + (i as u32) * spacing,
                bits,
                hash,
            });
        }
    }

    pub fn tip_height(&self) -> Option<u64> {
        let len = self.entries.len() as u64;
        (len > 0).then(|| self.start_height + len - 1)
    }

    /// A [`BlockIndex`] view of the entry at `height`.
    pub fn index_at(&self, height: u64) -> Option<MemoryIndex<'_>> {
        let i = height.checked_sub(self.start_height)?;
        (i < self.entries.len() as u64).then(|| MemoryIndex { chain: self, height })
    }

    pub fn tip(&self) -> Option<MemoryIndex<'_>> {
        self.index_at(self.tip_height()?)
    }

    fn entry(&self, height: u64) -> &ChainEntry {
        &self.entries[(height - self.start_height) as usize]
    }
}

/// Borrowed view implementing [`BlockIndex`] over a [`MemoryChain`].
#[derive(Clone, Copy)]
pub struct MemoryIndex<'a> {
    chain: &'a MemoryChain,
    height: u64,
}

impl BlockIndex for MemoryIndex<'_> {
    fn height(&self) -> u64 {
        self.height
    }

    fn bits(&self) -> u32 {
        self.chain.entry(self.height).bits
    }

    fn time(&self) -> u32 {
        self.chain.entry(self.height).time
    }

    fn block_hash(&self) -> [u8; 32] {
        self.chain.entry(self.height).hash
    }

    fn chain_work(&self) -> U256 {
        self.chain.cumulative_work[(self.height - self.chain.start_height) as usize]
    }

    fn ancestor_at(&self, height: u64) -> Option<Box<dyn BlockIndex + '_>> {
        if height > self.height {
            return None;
        }
        let idx = self.chain.index_at(height)?;
        Some(Box::new(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spaced_chain(count: u64) -> MemoryChain {
        let mut chain = MemoryChain::new();
        chain.extend_spaced(count, 1_000_000, 60, 0x2000_ffff);
        chain
    }

    #[test]
    fn ancestor_lookup_by_height() {
        let chain = spaced_chain(50);
        let tip = chain.tip().unwrap();
        assert_eq!(tip.height(), 49);

        let anc = tip.ancestor_at(10).unwrap();
        assert_eq!(anc.height(), 10);
        assert_eq!(anc.time(), 1_000_000 + 10 * 60);

        assert!(tip.ancestor_at(50).is_none(), "ancestor above tip must fail");
    }

    #[test]
    fn ancestor_below_start_is_unknown() {
        let chain = {
            let mut c = MemoryChain::starting_at(1000);
            c.extend_spaced(20, 1_000_000, 60, 0x2000_ffff);
            c
        };
        let tip = chain.tip().unwrap();
        assert_eq!(tip.height(), 1019);
        assert!(tip.ancestor_at(999).is_none());
        assert_eq!(tip.ancestor_at(1000).unwrap().height(), 1000);
    }

    #[test]
    fn median_time_past_of_even_spacing() {
        let chain = spaced_chain(30);
        let tip = chain.tip().unwrap();
        // Heights 19..=29, median is the entry at height 24.
        assert_eq!(tip.median_time_past(), i64::from(1_000_000 + 24 * 60));
    }

    #[test]
    fn median_time_past_short_chain() {
        let chain = spaced_chain(3);
        let tip = chain.tip().unwrap();
        // Only 3 entries exist; median of [t0, t1, t2] is t1.
        assert_eq!(tip.median_time_past(), i64::from(1_000_000 + 60));
    }

    #[test]
    fn chain_work_accumulates_monotonically() {
        let chain = spaced_chain(20);
        let mut prev = U256::zero();
        for height in 0..20 {
            let work = chain.index_at(height).unwrap().chain_work();
            assert!(work > prev, "work must strictly grow at height {height}");
            prev = work;
        }
        // Each block contributes the same proof for constant bits.
        let step = chain.index_at(1).unwrap().chain_work() - chain.index_at(0).unwrap().chain_work();
        assert_eq!(chain.index_at(0).unwrap().chain_work(), step);
    }

    #[test]
    fn median_resists_a_single_outlier() {
        let mut chain = spaced_chain(20);
        chain.push(ChainEntry { time: u32::MAX, bits: 0x2000_ffff, hash: [9; 32] });
        let tip = chain.tip().unwrap();
        let median = tip.median_time_past();
        assert!(
            median < i64::from(u32::MAX),
            "one wild timestamp must not drag the median"
        );
    }
}
