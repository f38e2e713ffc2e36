//! Frozen chain parameters, selected once at startup.
//!
//! Three profiles exist (main, test, regtest); everything the consensus
//! predicates consult — proof-of-work limits, the retarget window, upgrade
//! activation heights, funding streams — lives in one immutable record.
//! Regtest additionally exposes mutators so functional tests can reshape
//! activation heights and PoW behavior.

pub mod funding;

use primitive_types::U256;
use tracing::info;

use crate::emission::STANDARD_HALVING_INTERVAL;
use crate::header::BlockHeader;
use self::funding::{
    FundingStream, OnetimeLockboxDisbursement, MAX_FUNDING_STREAMS, MAX_LOCKBOX_DISBURSEMENTS,
};

/// Seconds per block before the spacing-halving upgrade activates.
pub const PRE_BLOSSOM_POW_TARGET_SPACING: i64 = 120;
/// Seconds per block once the spacing-halving upgrade is active.
pub const POST_BLOSSOM_POW_TARGET_SPACING: i64 = 60;

/// The selectable network profiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Regtest => "regtest",
        }
    }
}

/// Consensus branch points, in activation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum NetworkUpgrade {
    Sprout,
    TestDummy,
    Overwinter,
    Sapling,
    Blossom,
    Heartwood,
    Canopy,
    Nu5,
    Nu6,
    Nu6_1,
    Future,
}

pub const MAX_NETWORK_UPGRADES: usize = 11;

impl NetworkUpgrade {
    pub const ALL: [NetworkUpgrade; MAX_NETWORK_UPGRADES] = [
        NetworkUpgrade::Sprout,
        NetworkUpgrade::TestDummy,
        NetworkUpgrade::Overwinter,
        NetworkUpgrade::Sapling,
        NetworkUpgrade::Blossom,
        NetworkUpgrade::Heartwood,
        NetworkUpgrade::Canopy,
        NetworkUpgrade::Nu5,
        NetworkUpgrade::Nu6,
        NetworkUpgrade::Nu6_1,
        NetworkUpgrade::Future,
    ];

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|u| u == self).unwrap_or(0)
    }
}

/// Per-upgrade wire version and activation height.
///
/// `activation_height == None` means the upgrade never activates on this
/// network; `Some(0)` means active from genesis.
#[derive(Clone, Copy, Debug)]
pub struct UpgradeInfo {
    pub protocol_version: u32,
    pub activation_height: Option<u64>,
}

/// The frozen consensus parameter record.
#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub magic: [u8; 4],
    pub default_port: u16,

    pub equihash_n: u32,
    pub equihash_k: u32,

    pub pow_limit: U256,
    pub averaging_window: u64,
    pub max_adjust_down: u64,
    pub max_adjust_up: u64,
    pub pow_no_retargeting: bool,
    pub allow_min_difficulty_after: Option<u64>,

    pub pre_blossom_spacing: i64,
    pub post_blossom_spacing: i64,

    pub funding_period_length: u64,

    pub upgrades: [UpgradeInfo; MAX_NETWORK_UPGRADES],
    pub funding_streams: [Option<FundingStream>; MAX_FUNDING_STREAMS],
    pub lockbox_disbursements: [Option<OnetimeLockboxDisbursement>; MAX_LOCKBOX_DISBURSEMENTS],

    pub genesis: BlockHeader,
}

/// Merkle root of the genesis coinbase, fixed at chain birth.
const GENESIS_MERKLE_ROOT: [u8; 32] = [
    0x5a, 0x6c, 0x42, 0xd3, 0x7e, 0x6d, 0x48, 0x67, 0x6a, 0x65, 0x99, 0x35, 0x16, 0x65, 0xbf,
    0x80, 0x4b, 0x27, 0x60, 0x6d, 0x66, 0xfa, 0xaa, 0x1e, 0x7c, 0xf2, 0x95, 0x2c, 0x24, 0xaf,
    0x9f, 0x0f,
];

/// Stored solution of the genesis block.
const GENESIS_SOLUTION: [u8; 32] = [
    0x7a, 0x35, 0x11, 0x6c, 0x47, 0xfc, 0x0c, 0x0b, 0xdf, 0x95, 0x1e, 0xe4, 0x68, 0x7d, 0xaf,
    0xd2, 0x0b, 0x8f, 0x6b, 0xf6, 0x8d, 0x93, 0xc0, 0x70, 0x9e, 0xb4, 0x0b, 0x58, 0xd3, 0x84,
    0xf5, 0x00,
];

const GENESIS_TIME: u32 = 1_760_195_960;

fn genesis_header(bits: u32) -> BlockHeader {
    let mut nonce = [0u8; 32];
    nonce[31] = 0x54;
    BlockHeader {
        version: 4,
        prev_hash: [0u8; 32],
        merkle_root: GENESIS_MERKLE_ROOT,
        time: GENESIS_TIME,
        bits,
        nonce,
        solution: GENESIS_SOLUTION.to_vec(),
    }
}

/// Activation heights shared by all profiles: every upgrade switches on in
/// the first blocks so the whole feature set is live from the start.
fn sequential_upgrades() -> [UpgradeInfo; MAX_NETWORK_UPGRADES] {
    [
        UpgradeInfo { protocol_version: 170002, activation_height: Some(0) }, // Sprout
        UpgradeInfo { protocol_version: 170002, activation_height: None },    // TestDummy
        UpgradeInfo { protocol_version: 170005, activation_height: Some(1) },
        UpgradeInfo { protocol_version: 170007, activation_height: Some(2) },
        UpgradeInfo { protocol_version: 170009, activation_height: Some(3) },
        UpgradeInfo { protocol_version: 170011, activation_height: Some(4) },
        UpgradeInfo { protocol_version: 170013, activation_height: Some(5) },
        UpgradeInfo { protocol_version: 170100, activation_height: Some(6) },
        UpgradeInfo { protocol_version: 170120, activation_height: Some(7) },
        UpgradeInfo { protocol_version: 170140, activation_height: Some(8) },
        UpgradeInfo { protocol_version: 0x7FFF_FFFF, activation_height: None }, // Future
    ]
}

fn pow_limit_main() -> U256 {
    let mut bytes = [0xffu8; 32];
    bytes[0] = 0x00;
    U256::from_big_endian(&bytes)
}

fn pow_limit_regtest() -> U256 {
    U256::from_big_endian(&[0x0fu8; 32])
}

impl ConsensusParams {
    /// Build the parameter record for `network`.
    pub fn for_network(network: Network) -> Self {
        let params = match network {
            Network::Main => Self {
                network,
                magic: [0xb5, 0x0c, 0x07, 0x02],
                default_port: 8234,
                equihash_n: 200,
                equihash_k: 9,
                pow_limit: pow_limit_main(),
                averaging_window: 100,
                max_adjust_down: 32,
                max_adjust_up: 16,
                pow_no_retargeting: false,
                allow_min_difficulty_after: None,
                pre_blossom_spacing: PRE_BLOSSOM_POW_TARGET_SPACING,
                post_blossom_spacing: POST_BLOSSOM_POW_TARGET_SPACING,
                funding_period_length: STANDARD_HALVING_INTERVAL / 48,
                upgrades: sequential_upgrades(),
                funding_streams: std::array::from_fn(|_| None),
                lockbox_disbursements: std::array::from_fn(|_| None),
                genesis: genesis_header(0x2000_ffff),
            },
            Network::Test => Self {
                network,
                magic: [0xa7, 0x23, 0xe1, 0x6c],
                default_port: 18234,
                equihash_n: 200,
                equihash_k: 9,
                pow_limit: pow_limit_main(),
                averaging_window: 100,
                max_adjust_down: 32,
                max_adjust_up: 16,
                pow_no_retargeting: false,
                allow_min_difficulty_after: Some(299_187),
                pre_blossom_spacing: PRE_BLOSSOM_POW_TARGET_SPACING,
                post_blossom_spacing: POST_BLOSSOM_POW_TARGET_SPACING,
                funding_period_length: STANDARD_HALVING_INTERVAL / 48,
                upgrades: sequential_upgrades(),
                funding_streams: std::array::from_fn(|_| None),
                lockbox_disbursements: std::array::from_fn(|_| None),
                genesis: genesis_header(0x2000_ffff),
            },
            Network::Regtest => Self {
                network,
                magic: [0x81, 0x1d, 0x21, 0xf6],
                default_port: 18345,
                equihash_n: 48,
                equihash_k: 5,
                pow_limit: pow_limit_regtest(),
                averaging_window: 17,
                max_adjust_down: 0,
                max_adjust_up: 0,
                pow_no_retargeting: true,
                allow_min_difficulty_after: Some(0),
                pre_blossom_spacing: PRE_BLOSSOM_POW_TARGET_SPACING,
                post_blossom_spacing: POST_BLOSSOM_POW_TARGET_SPACING,
                funding_period_length: STANDARD_HALVING_INTERVAL / 48,
                upgrades: sequential_upgrades(),
                funding_streams: std::array::from_fn(|_| None),
                lockbox_disbursements: std::array::from_fn(|_| None),
                genesis: genesis_header(0x200f_0f0f),
            },
        };

        // The retarget sum of `averaging_window` targets must fit in 256
        // bits; a pow limit violating this cannot be averaged safely.
        assert!(
            U256::max_value() / params.pow_limit >= U256::from(params.averaging_window),
            "pow_limit too large for averaging window"
        );

        info!(
            "[PARAMS] selected network={} window={} port={}",
            params.network.as_str(),
            params.averaging_window,
            params.default_port
        );

        params
    }

    pub fn activation_height(&self, upgrade: NetworkUpgrade) -> Option<u64> {
        self.upgrades[upgrade.index()].activation_height
    }

    pub fn upgrade_active(&self, height: u64, upgrade: NetworkUpgrade) -> bool {
        match self.activation_height(upgrade) {
            Some(activation) => height >= activation,
            None => false,
        }
    }

    /// Target block spacing at `height`: halves once Blossom activates.
    pub fn target_spacing(&self, height: u64) -> i64 {
        if self.upgrade_active(height, NetworkUpgrade::Blossom) {
            self.post_blossom_spacing
        } else {
            self.pre_blossom_spacing
        }
    }

    /// Expected wall-clock span of one full averaging window.
    pub fn averaging_window_timespan(&self, height: u64) -> i64 {
        self.averaging_window as i64 * self.target_spacing(height)
    }

    /// Shortest accepted actual timespan (fastest allowed difficulty rise).
    pub fn min_actual_timespan(&self, height: u64) -> i64 {
        self.averaging_window_timespan(height) * (100 - self.max_adjust_up as i64) / 100
    }

    /// Longest accepted actual timespan (fastest allowed difficulty drop).
    pub fn max_actual_timespan(&self, height: u64) -> i64 {
        self.averaging_window_timespan(height) * (100 + self.max_adjust_down as i64) / 100
    }

    /// Regtest-only: move an upgrade's activation height.
    pub fn update_upgrade_height(&mut self, upgrade: NetworkUpgrade, height: Option<u64>) {
        assert_eq!(self.network, Network::Regtest, "upgrade heights are frozen outside regtest");
        self.upgrades[upgrade.index()].activation_height = height;
    }

    /// Regtest-only: override proof-of-work shape for a test scenario.
    pub fn update_pow_params(
        &mut self,
        max_adjust_down: u64,
        max_adjust_up: u64,
        pow_limit: U256,
        no_retargeting: bool,
    ) {
        assert_eq!(self.network, Network::Regtest, "pow parameters are frozen outside regtest");
        self.max_adjust_down = max_adjust_down;
        self.max_adjust_up = max_adjust_up;
        self.pow_limit = pow_limit;
        self.pow_no_retargeting = no_retargeting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::encode_compact;

    #[test]
    fn profiles_match_their_tables() {
        let main = ConsensusParams::for_network(Network::Main);
        assert_eq!(main.averaging_window, 100);
        assert_eq!(main.max_adjust_down, 32);
        assert_eq!(main.max_adjust_up, 16);
        assert!(!main.pow_no_retargeting);
        assert_eq!(main.allow_min_difficulty_after, None);
        assert_eq!((main.equihash_n, main.equihash_k), (200, 9));

        let test = ConsensusParams::for_network(Network::Test);
        assert_eq!(test.allow_min_difficulty_after, Some(299_187));
        assert_ne!(test.magic, main.magic);
        assert_ne!(test.default_port, main.default_port);

        let regtest = ConsensusParams::for_network(Network::Regtest);
        assert_eq!(regtest.averaging_window, 17);
        assert_eq!((regtest.max_adjust_down, regtest.max_adjust_up), (0, 0));
        assert!(regtest.pow_no_retargeting);
        assert_eq!(regtest.allow_min_difficulty_after, Some(0));
        assert_eq!((regtest.equihash_n, regtest.equihash_k), (48, 5));
    }

    #[test]
    fn upgrades_activate_sequentially() {
        let params = ConsensusParams::for_network(Network::Main);
        assert!(params.upgrade_active(0, NetworkUpgrade::Sprout));
        assert!(!params.upgrade_active(4, NetworkUpgrade::Canopy));
        assert!(params.upgrade_active(5, NetworkUpgrade::Canopy));
        assert!(params.upgrade_active(8, NetworkUpgrade::Nu6_1));
        assert!(!params.upgrade_active(u64::MAX, NetworkUpgrade::TestDummy));
        assert!(!params.upgrade_active(u64::MAX, NetworkUpgrade::Future));
    }

    #[test]
    fn spacing_halves_at_blossom() {
        let params = ConsensusParams::for_network(Network::Main);
        let blossom = params.activation_height(NetworkUpgrade::Blossom).unwrap();
        assert_eq!(params.target_spacing(blossom - 1), PRE_BLOSSOM_POW_TARGET_SPACING);
        assert_eq!(params.target_spacing(blossom), POST_BLOSSOM_POW_TARGET_SPACING);
        assert_eq!(
            params.averaging_window_timespan(blossom),
            100 * POST_BLOSSOM_POW_TARGET_SPACING
        );
    }

    #[test]
    fn timespan_clamps_bracket_the_expected_span() {
        let params = ConsensusParams::for_network(Network::Main);
        let h = 1000;
        let expected = params.averaging_window_timespan(h);
        assert_eq!(params.min_actual_timespan(h), expected * 84 / 100);
        assert_eq!(params.max_actual_timespan(h), expected * 132 / 100);

        // Regtest turns both adjustments off entirely.
        let regtest = ConsensusParams::for_network(Network::Regtest);
        let expected = regtest.averaging_window_timespan(h);
        assert_eq!(regtest.min_actual_timespan(h), expected);
        assert_eq!(regtest.max_actual_timespan(h), expected);
    }

    #[test]
    fn genesis_bits_sit_within_pow_limit() {
        for network in [Network::Main, Network::Test, Network::Regtest] {
            let params = ConsensusParams::for_network(network);
            let (target, neg, over) = crate::arith::decode_compact(params.genesis.bits);
            assert!(!neg && !over);
            assert!(
                target <= params.pow_limit,
                "{} genesis target above pow limit",
                network.as_str()
            );
            assert_eq!(params.genesis.solution.len(), crate::header::SOLUTION_BYTES);
        }
    }

    #[test]
    fn pow_limit_round_trips_compact() {
        let params = ConsensusParams::for_network(Network::Main);
        let bits = encode_compact(&params.pow_limit);
        let (decoded, _, _) = crate::arith::decode_compact(bits);
        // Compact keeps 23 mantissa bits, so the decoded limit is the
        // truncation of the full limit and never exceeds it.
        assert!(decoded <= params.pow_limit);
    }

    #[test]
    #[should_panic(expected = "frozen outside regtest")]
    fn mainnet_rejects_upgrade_mutation() {
        let mut params = ConsensusParams::for_network(Network::Main);
        params.update_upgrade_height(NetworkUpgrade::Canopy, Some(100));
    }

    #[test]
    fn regtest_mutators_apply() {
        let mut params = ConsensusParams::for_network(Network::Regtest);
        params.update_upgrade_height(NetworkUpgrade::Canopy, Some(1000));
        assert_eq!(params.activation_height(NetworkUpgrade::Canopy), Some(1000));

        params.update_pow_params(10, 5, pow_limit_main(), false);
        assert_eq!(params.max_adjust_down, 10);
        assert!(!params.pow_no_retargeting);
    }
}
