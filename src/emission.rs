//! Block subsidy emission schedule.
//!
//! The curve is a slow linear ramp, a plateau, one long initial halving
//! epoch, then standard halvings on a fixed interval, with a hard supply
//! cutoff once the cap is effectively reached. All boundaries derive from
//! the four interval constants by integer floor division.

/// Monetas per coin (the smallest unit is 10^-8 coin).
pub const COIN: u64 = 100_000_000;

/// Last height of the slow-start ramp.
pub const SLOW_START_END: u64 = 20_000;

/// Last height of the 12.5-coin plateau.
pub const PLATEAU_END: u64 = 120_000;

/// Last height of the initial 6.25-coin halving epoch.
pub const INITIAL_HALVING_END: u64 = 1_171_200;

/// Blocks per standard halving epoch thereafter.
pub const STANDARD_HALVING_INTERVAL: u64 = 2_102_400;

/// Heights above this emit nothing; the supply cap is reached here.
pub const LAST_SUBSIDY_HEIGHT: u64 = 16_508_927;

/// Hard supply cap in monetas (21 million coins).
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Block subsidy at `height`, in monetas.
pub fn block_subsidy(height: u64) -> u64 {
    if height > LAST_SUBSIDY_HEIGHT {
        return 0;
    }

    // Genesis emits nothing.
    if height == 0 {
        return 0;
    }

    // Slow start: linear ramp from 0.25 to 12.5 coins across the first
    // 20,000 blocks.
    if height <= SLOW_START_END {
        return 25_000_000 + ((height - 1) * 1_225_000_000) / 19_999;
    }

    // Plateau at 12.5 coins.
    if height <= PLATEAU_END {
        return 1_250_000_000;
    }

    // Initial halving epoch at 6.25 coins.
    if height <= INITIAL_HALVING_END {
        return 625_000_000;
    }

    // Standard halvings from 3.125 coins.
    let halvings = (height - INITIAL_HALVING_END) / STANDARD_HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    312_500_000u64 >> halvings
}

/// Index of the halving epoch containing `height`: 0 through the plateau,
/// 1 for the initial halving epoch, then one per standard interval.
pub fn halving_index(height: u64) -> u64 {
    if height <= PLATEAU_END {
        return 0;
    }
    if height <= INITIAL_HALVING_END {
        return 1;
    }
    2 + (height - INITIAL_HALVING_END - 1) / STANDARD_HALVING_INTERVAL
}

/// First height of the first halving epoch. Funding periods are anchored
/// here so that unaligned stream starts can be offset-corrected.
pub fn first_halving_height() -> u64 {
    PLATEAU_END + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsidy_at_schedule_boundaries() {
        assert_eq!(block_subsidy(0), 0);
        assert_eq!(block_subsidy(1), 25_000_000);
        assert_eq!(block_subsidy(20_000), 1_250_000_000);
        assert_eq!(block_subsidy(20_001), 1_250_000_000);
        assert_eq!(block_subsidy(120_000), 1_250_000_000);
        assert_eq!(block_subsidy(120_001), 625_000_000);
        assert_eq!(block_subsidy(1_171_200), 625_000_000);
        assert_eq!(block_subsidy(1_171_201), 312_500_000);
        assert_eq!(block_subsidy(3_273_601), 156_250_000);
        assert_eq!(block_subsidy(16_508_927), block_subsidy(16_508_926));
        assert_eq!(block_subsidy(16_508_928), 0);
        assert_eq!(block_subsidy(u64::MAX), 0);
    }

    #[test]
    fn slow_start_ramp_is_monotone() {
        let mut prev = block_subsidy(1);
        for h in 2..=SLOW_START_END {
            let s = block_subsidy(h);
            assert!(s >= prev, "ramp decreased at height {h}");
            prev = s;
        }
        // The ramp tops out exactly at the plateau value.
        assert_eq!(block_subsidy(SLOW_START_END), 1_250_000_000);
    }

    #[test]
    fn total_supply_stays_under_the_cap() {
        let mut total: u64 = 0;
        for h in 0..=LAST_SUBSIDY_HEIGHT + 1 {
            total = total
                .checked_add(block_subsidy(h))
                .expect("cumulative supply overflowed u64");
        }
        assert!(total <= MAX_MONEY, "emitted {total} monetas, cap is {MAX_MONEY}");
        // The cutoff leaves the supply just shy of the full 21 million.
        assert!(total > MAX_MONEY - 2 * COIN, "emitted far less than the cap: {total}");
    }

    #[test]
    fn halving_index_matches_subsidy_steps() {
        assert_eq!(halving_index(0), 0);
        assert_eq!(halving_index(PLATEAU_END), 0);
        assert_eq!(halving_index(PLATEAU_END + 1), 1);
        assert_eq!(halving_index(INITIAL_HALVING_END), 1);
        assert_eq!(halving_index(INITIAL_HALVING_END + 1), 2);
        assert_eq!(
            halving_index(INITIAL_HALVING_END + STANDARD_HALVING_INTERVAL),
            2
        );
        assert_eq!(
            halving_index(INITIAL_HALVING_END + STANDARD_HALVING_INTERVAL + 1),
            3
        );
    }

    #[test]
    fn each_standard_epoch_halves_the_previous() {
        let mut height = INITIAL_HALVING_END + 1;
        let mut expected = 312_500_000u64;
        while expected > 0 {
            assert_eq!(block_subsidy(height), expected, "wrong subsidy entering epoch at {height}");
            height = match height.checked_add(STANDARD_HALVING_INTERVAL) {
                Some(h) if h <= LAST_SUBSIDY_HEIGHT => h,
                _ => break,
            };
            expected >>= 1;
        }
    }
}
