//! Multi-block retarget scenarios over an in-memory chain.

use moneta_consensus::arith::{decode_compact, encode_compact};
use moneta_consensus::{next_bits, BlockIndex, ChainEntry, ConsensusParams, MemoryChain, Network};

/// Grow the chain block by block, stamping each new block with the bits the
/// retarget engine demands and a timestamp `spacing` after the tip.
fn advance(chain: &mut MemoryChain, params: &ConsensusParams, blocks: u64, spacing: u32) {
    for _ in 0..blocks {
        let (bits, time, height) = {
            let tip = chain.tip().expect("chain seeded");
            let bits = next_bits(params, Some(&tip as &dyn BlockIndex), None);
            (bits, tip.time() + spacing, tip.height() + 1)
        };
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&(height + 1).to_le_bytes());
        chain.push(ChainEntry { time, bits, hash });
    }
}

fn seeded_chain(params: &ConsensusParams) -> MemoryChain {
    let mut chain = MemoryChain::new();
    chain.push(ChainEntry {
        time: 1_700_000_000,
        bits: encode_compact(&params.pow_limit),
        hash: [1u8; 32],
    });
    chain
}

#[test]
fn bootstrap_stays_at_the_limit_until_the_window_fills() {
    let params = ConsensusParams::for_network(Network::Main);
    let limit = encode_compact(&params.pow_limit);
    let mut chain = seeded_chain(&params);

    advance(&mut chain, &params, 99, 60);
    // Every bootstrap block is stamped at the limit: the window is short.
    for height in 0..=99 {
        assert_eq!(chain.index_at(height).unwrap().bits(), limit);
    }
}

#[test]
fn on_schedule_chain_holds_its_difficulty() {
    let params = ConsensusParams::for_network(Network::Main);
    let limit = encode_compact(&params.pow_limit);
    let spacing = params.target_spacing(200) as u32;

    // Deep enough history that every median-time-past window is full.
    let mut chain = MemoryChain::new();
    chain.extend_spaced(120, 1_700_000_000, spacing, limit);
    advance(&mut chain, &params, 300, spacing);

    let tip = chain.tip().unwrap();
    assert_eq!(tip.bits(), limit, "on-schedule blocks must hold the limit difficulty");

    // And every block stamped along the way held it too.
    for height in 120..=tip.height() {
        assert_eq!(chain.index_at(height).unwrap().bits(), limit);
    }
}

#[test]
fn sustained_fast_blocks_ratchet_difficulty_up() {
    let params = ConsensusParams::for_network(Network::Main);
    let spacing = params.target_spacing(200) as u32;

    let mut chain = seeded_chain(&params);
    // Fill the window on schedule, then run hot at a third of the spacing.
    advance(&mut chain, &params, 150, spacing);
    let (settled, _, _) = decode_compact(chain.tip().unwrap().bits());

    advance(&mut chain, &params, 200, spacing / 3);
    let (hot, _, _) = decode_compact(chain.tip().unwrap().bits());

    assert!(hot < settled, "sustained fast blocks must shrink the target");
    // Each step is clamped, so 200 blocks cannot collapse the target to
    // nothing.
    assert!(hot > settled >> 60u32, "clamping must bound the total descent");
}

#[test]
fn difficulty_recovers_after_hashrate_leaves() {
    let params = ConsensusParams::for_network(Network::Main);
    let limit = encode_compact(&params.pow_limit);
    let spacing = params.target_spacing(200) as u32;

    let mut chain = seeded_chain(&params);
    advance(&mut chain, &params, 150, spacing);
    advance(&mut chain, &params, 150, spacing / 4);
    let (hard, _, _) = decode_compact(chain.tip().unwrap().bits());

    // Hashrate vanishes: blocks crawl in at four times the spacing.
    advance(&mut chain, &params, 400, spacing * 4);
    let (relaxed, _, _) = decode_compact(chain.tip().unwrap().bits());

    assert!(relaxed > hard, "slow blocks must grow the target again");
    let (limit_target, _, _) = decode_compact(limit);
    assert!(relaxed <= limit_target, "recovery never overshoots the limit");
}

#[test]
fn every_stamped_target_respects_the_limit() {
    let params = ConsensusParams::for_network(Network::Main);
    let spacing = params.target_spacing(200) as u32;

    let mut chain = seeded_chain(&params);
    advance(&mut chain, &params, 120, spacing);
    advance(&mut chain, &params, 120, spacing * 8);

    for height in 0..=chain.tip_height().unwrap() {
        let (target, neg, over) = decode_compact(chain.index_at(height).unwrap().bits());
        assert!(!neg && !over);
        assert!(target <= params.pow_limit, "height {height} exceeds the pow limit");
    }
}
