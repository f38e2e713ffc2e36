//! Windowed-average difficulty retargeting.
//!
//! Each block's required target is the mean of the previous window's
//! targets, scaled by a damped and clamped ratio of the actually observed
//! timespan to the expected one. Both timespan endpoints are
//! median-time-past values, which defeats time-warp games played with
//! individual timestamps.

use primitive_types::U256;

use crate::arith::{decode_compact, encode_compact};
use crate::chain::BlockIndex;
use crate::params::ConsensusParams;

/// Compute the compact target required for the block after `prev`.
///
/// `candidate_time` is consulted only for the testnet min-difficulty
/// exception and may be omitted when no candidate header exists yet.
///
/// Falls back to the proof-of-work limit when no predecessor exists or the
/// chain is shorter than the averaging window.
pub fn next_bits(
    params: &ConsensusParams,
    prev: Option<&dyn BlockIndex>,
    candidate_time: Option<u32>,
) -> u32 {
    let pow_limit_bits = encode_compact(&params.pow_limit);

    let prev = match prev {
        Some(prev) => prev,
        None => return pow_limit_bits,
    };

    if params.pow_no_retargeting {
        return prev.bits();
    }

    // Testnet exception: once the rule is enabled, a block arriving more
    // than six spacings late may be mined at minimum difficulty.
    if let Some(enabled_after) = params.allow_min_difficulty_after {
        if prev.height() >= enabled_after {
            if let Some(time) = candidate_time {
                let gap = params.target_spacing(prev.height() + 1) * 6;
                if i64::from(time) > i64::from(prev.time()) + gap {
                    return pow_limit_bits;
                }
            }
        }
    }

    let window = params.averaging_window;
    // The timespan anchor sits one block below the window, so the walk
    // needs `window` ancestors strictly beneath the tip.
    if prev.height() < window {
        return pow_limit_bits;
    }

    let mut total = U256::zero();
    for i in 0..window {
        let anc = match prev.ancestor_at(prev.height() - i) {
            Some(anc) => anc,
            None => return pow_limit_bits,
        };
        let (target, _, _) = decode_compact(anc.bits());
        total = total.saturating_add(target);
    }

    let first = match prev.ancestor_at(prev.height() - window) {
        Some(first) => first,
        None => return pow_limit_bits,
    };

    // Floor of the rational mean; flooring early is equivalent to
    // flooring after the later division by the window timespan.
    let avg = total / U256::from(window);

    calculate_next_work(
        params,
        avg,
        prev.median_time_past(),
        first.median_time_past(),
        prev.height() + 1,
    )
}

/// Retarget step on a precomputed window mean.
///
/// When a scale is applied, the mean is divided by the expected timespan
/// before multiplying by the observed one; this ordering keeps every
/// intermediate inside 256 bits and must not be reordered. An exactly
/// on-schedule window (damped timespan equal to expected) keeps the mean
/// untouched, so a window sitting at one target reproduces it bit-for-bit.
pub fn calculate_next_work(
    params: &ConsensusParams,
    avg: U256,
    last_mtp: i64,
    first_mtp: i64,
    next_height: u64,
) -> u32 {
    let expected = params.averaging_window_timespan(next_height);

    let mut actual = last_mtp - first_mtp;
    actual = expected + (actual - expected) / 4;
    actual = actual.clamp(
        params.min_actual_timespan(next_height),
        params.max_actual_timespan(next_height),
    );

    let mut new_target = if actual == expected {
        avg
    } else {
        avg / U256::from(expected as u64) * U256::from(actual as u64)
    };

    if new_target > params.pow_limit {
        new_target = params.pow_limit;
    }

    encode_compact(&new_target)
}
