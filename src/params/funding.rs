//! Funding streams, the lockbox, and one-time lockbox disbursements.
//!
//! A funding stream redirects a fixed fraction of each block subsidy from
//! the miner to a recipient that rotates once per funding period. The
//! lockbox variant pays nobody directly; its share accrues until a later
//! upgrade disburses it through pre-declared one-time payments.
//!
//! Everything here is validated once at startup. The runtime queries
//! (`active_funding_streams`, `funding_stream_elements`,
//! `lockbox_disbursements_at`) are total functions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ConsensusParams, NetworkUpgrade};
use crate::emission::first_halving_height;

/// Fixed number of funding-stream slots, indexed by [`FundingStreamIndex`].
pub const MAX_FUNDING_STREAMS: usize = 7;

/// Fixed number of one-time lockbox disbursement slots.
pub const MAX_LOCKBOX_DISBURSEMENTS: usize = 10;

/// Identifies one funding-stream slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingStreamIndex {
    BootstrapPartners,
    Foundation,
    MajorGrants,
    CommunityGrants,
    Lockbox,
    CommunityGrantsH3,
    CoinholderFundH3,
}

impl FundingStreamIndex {
    pub const ALL: [FundingStreamIndex; MAX_FUNDING_STREAMS] = [
        FundingStreamIndex::BootstrapPartners,
        FundingStreamIndex::Foundation,
        FundingStreamIndex::MajorGrants,
        FundingStreamIndex::CommunityGrants,
        FundingStreamIndex::Lockbox,
        FundingStreamIndex::CommunityGrantsH3,
        FundingStreamIndex::CoinholderFundH3,
    ];

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|i| i == self).unwrap_or(0)
    }
}

/// Static description of a funding stream: who it is for and what share of
/// the subsidy it takes. Ordered by [`FundingStreamIndex`].
#[derive(Clone, Copy, Debug)]
pub struct FsInfo {
    pub recipient: &'static str,
    pub specification: &'static str,
    pub numerator: u64,
    pub denominator: u64,
}

impl FsInfo {
    /// This stream's slice of `subsidy`, rounded down.
    pub fn value(&self, subsidy: u64) -> u64 {
        subsidy * self.numerator / self.denominator
    }
}

pub const FUNDING_STREAM_INFO: [FsInfo; MAX_FUNDING_STREAMS] = [
    FsInfo {
        recipient: "Bootstrap Partners",
        specification: "https://moneta.example/spec/funding-r0",
        numerator: 7,
        denominator: 100,
    },
    FsInfo {
        recipient: "Moneta Foundation",
        specification: "https://moneta.example/spec/funding-r0",
        numerator: 5,
        denominator: 100,
    },
    FsInfo {
        recipient: "Major Grants",
        specification: "https://moneta.example/spec/funding-r0",
        numerator: 8,
        denominator: 100,
    },
    FsInfo {
        recipient: "Community Grants",
        specification: "https://moneta.example/spec/funding-r1",
        numerator: 8,
        denominator: 100,
    },
    FsInfo {
        recipient: "Lockbox",
        specification: "https://moneta.example/spec/funding-r1",
        numerator: 12,
        denominator: 100,
    },
    FsInfo {
        recipient: "Community Grants to third halving",
        specification: "https://moneta.example/spec/funding-r2",
        numerator: 8,
        denominator: 100,
    },
    FsInfo {
        recipient: "Coinholder-Controlled Fund to third halving",
        specification: "https://moneta.example/spec/funding-r2",
        numerator: 12,
        denominator: 100,
    },
];

/// Where one funding period's share goes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FundingStreamRecipient {
    /// A transparent address; the host wallet derives the script.
    Transparent(String),
    /// A shielded payment address.
    Sapling(String),
    /// No outward payment; the share accrues in the lockbox pool.
    Lockbox,
}

/// Sentinel address string that selects the lockbox.
pub const DEFERRED_POOL_ADDRESS: &str = "DEFERRED_POOL";

/// Configuration-time failures. Any of these aborts startup; the node never
/// runs with a malformed funding schedule.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FundingStreamError {
    #[error("funding stream starts before the Canopy upgrade is active")]
    CanopyNotActive,
    #[error("funding stream end height precedes its start height")]
    IllegalHeightRange,
    #[error("not enough recipients to cover every funding period")]
    InsufficientRecipients,
    #[error("lockbox recipients are not allowed before the NU6 upgrade")]
    Nu6NotActive,
    #[error("unrecognized funding recipient address: {0}")]
    InvalidAddress(String),
    #[error("one-time lockbox disbursements require the NU6.1 upgrade")]
    LockboxBeforeNu6_1,
}

/// A validated funding stream over the half-open height range
/// `[start_height, end_height)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingStream {
    start_height: u64,
    end_height: u64,
    recipients: Vec<FundingStreamRecipient>,
}

impl FundingStream {
    pub fn start_height(&self) -> u64 {
        self.start_height
    }

    pub fn end_height(&self) -> u64 {
        self.end_height
    }

    pub fn recipients(&self) -> &[FundingStreamRecipient] {
        &self.recipients
    }

    /// Validate a stream against the chain parameters. Checks, in order:
    /// Canopy active at the start, a sane height range, one recipient for
    /// every funding period, and no lockbox recipients before NU6.
    pub fn validate(
        params: &ConsensusParams,
        start_height: u64,
        end_height: u64,
        recipients: Vec<FundingStreamRecipient>,
    ) -> Result<Self, FundingStreamError> {
        if !params.upgrade_active(start_height, NetworkUpgrade::Canopy) {
            return Err(FundingStreamError::CanopyNotActive);
        }

        if end_height < start_height {
            return Err(FundingStreamError::IllegalHeightRange);
        }

        let expected = params.funding_period_index(start_height, end_height.saturating_sub(1)) + 1;
        if expected as usize > recipients.len() {
            return Err(FundingStreamError::InsufficientRecipients);
        }

        if !params.upgrade_active(start_height, NetworkUpgrade::Nu6)
            && recipients.iter().any(|r| *r == FundingStreamRecipient::Lockbox)
        {
            return Err(FundingStreamError::Nu6NotActive);
        }

        Ok(Self { start_height, end_height, recipients })
    }

    /// Parse address strings into recipients, then validate.
    ///
    /// `allow_deferred_pool` gates the lockbox sentinel so that ordinary
    /// streams cannot smuggle in a lockbox recipient.
    pub fn parse(
        params: &ConsensusParams,
        start_height: u64,
        end_height: u64,
        addresses: &[&str],
        allow_deferred_pool: bool,
    ) -> Result<Self, FundingStreamError> {
        let mut recipients = Vec::with_capacity(addresses.len());
        for addr in addresses {
            if allow_deferred_pool && *addr == DEFERRED_POOL_ADDRESS {
                recipients.push(FundingStreamRecipient::Lockbox);
                continue;
            }
            recipients.push(classify_address(addr)?);
        }
        Self::validate(params, start_height, end_height, recipients)
    }

    /// The recipient selected for `height`'s funding period.
    pub fn recipient(&self, params: &ConsensusParams, height: u64) -> &FundingStreamRecipient {
        let period = params.funding_period_index(self.start_height, height) as usize;
        // Parse-time validation guarantees a recipient for every period.
        assert!(
            period < self.recipients.len(),
            "funding period {period} out of range for stream starting at {}",
            self.start_height
        );
        &self.recipients[period]
    }
}

/// Classify an address string by its human-readable prefix. The full
/// address codec lives in the wallet; consensus only needs the kind.
fn classify_address(addr: &str) -> Result<FundingStreamRecipient, FundingStreamError> {
    if addr.len() < 4 {
        return Err(FundingStreamError::InvalidAddress(addr.to_string()));
    }
    if addr.starts_with("zs") || addr.starts_with("ztestsapling") {
        return Ok(FundingStreamRecipient::Sapling(addr.to_string()));
    }
    if addr.starts_with('t') {
        return Ok(FundingStreamRecipient::Transparent(addr.to_string()));
    }
    Err(FundingStreamError::InvalidAddress(addr.to_string()))
}

/// A pre-declared one-time payment out of the accumulated lockbox pool,
/// emitted at the activation height of its upgrade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnetimeLockboxDisbursement {
    upgrade: NetworkUpgrade,
    amount: u64,
    recipient: String,
}

impl OnetimeLockboxDisbursement {
    /// Parse a disbursement. Only transparent P2SH-style addresses are
    /// payable from the lockbox, and never before NU6.1.
    pub fn parse(
        upgrade: NetworkUpgrade,
        amount: u64,
        address: &str,
    ) -> Result<Self, FundingStreamError> {
        if upgrade < NetworkUpgrade::Nu6_1 {
            return Err(FundingStreamError::LockboxBeforeNu6_1);
        }
        match classify_address(address)? {
            FundingStreamRecipient::Transparent(recipient) => {
                Ok(Self { upgrade, amount, recipient })
            }
            _ => Err(FundingStreamError::InvalidAddress(address.to_string())),
        }
    }

    pub fn upgrade(&self) -> NetworkUpgrade {
        self.upgrade
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }
}

impl ConsensusParams {
    /// Index of the funding period containing `height` for a stream that
    /// starts at `start_height`.
    ///
    /// Streams need not start on a period boundary; the offset correction
    /// shortens the first period instead of shifting all of them.
    pub fn funding_period_index(&self, start_height: u64, height: u64) -> u64 {
        if start_height > height {
            return 0;
        }
        let period = self.funding_period_length as i64;
        let offset =
            (start_height as i64 - first_halving_height() as i64).rem_euclid(period);
        ((height - start_height) as i64 + offset) as u64 / self.funding_period_length
    }

    /// Install a validated funding stream parsed from address strings.
    pub fn add_funding_stream(
        &mut self,
        idx: FundingStreamIndex,
        start_height: u64,
        end_height: u64,
        addresses: &[&str],
    ) -> Result<(), FundingStreamError> {
        let stream = FundingStream::parse(self, start_height, end_height, addresses, false)?;
        self.funding_streams[idx.index()] = Some(stream);
        Ok(())
    }

    /// Install a lockbox stream: every funding period accrues to the pool.
    pub fn add_lockbox_stream(
        &mut self,
        idx: FundingStreamIndex,
        start_height: u64,
        end_height: u64,
    ) -> Result<(), FundingStreamError> {
        let periods =
            self.funding_period_index(start_height, end_height.saturating_sub(1)) + 1;
        let recipients = vec![FundingStreamRecipient::Lockbox; periods as usize];
        let stream = FundingStream::validate(self, start_height, end_height, recipients)?;
        self.funding_streams[idx.index()] = Some(stream);
        Ok(())
    }

    /// Install a one-time lockbox disbursement in slot `slot`.
    pub fn add_lockbox_disbursement(
        &mut self,
        slot: usize,
        upgrade: NetworkUpgrade,
        amount: u64,
        address: &str,
    ) -> Result<(), FundingStreamError> {
        let disbursement = OnetimeLockboxDisbursement::parse(upgrade, amount, address)?;
        self.lockbox_disbursements[slot] = Some(disbursement);
        Ok(())
    }

    /// The funding streams whose `[start, end)` range contains `height`.
    /// Empty before Canopy activates.
    pub fn active_funding_streams(&self, height: u64) -> Vec<(FsInfo, &FundingStream)> {
        let mut active = Vec::new();
        if !self.upgrade_active(height, NetworkUpgrade::Canopy) {
            return active;
        }
        for (slot, stream) in self.funding_streams.iter().enumerate() {
            if let Some(fs) = stream {
                if height >= fs.start_height && height < fs.end_height {
                    active.push((FUNDING_STREAM_INFO[slot], fs));
                }
            }
        }
        active
    }

    /// The `(recipient, amount)` pairs every block at `height` must pay,
    /// given its subsidy. The remainder of the subsidy goes to the miner.
    pub fn funding_stream_elements(
        &self,
        height: u64,
        subsidy: u64,
    ) -> Vec<(FundingStreamRecipient, u64)> {
        self.active_funding_streams(height)
            .into_iter()
            .map(|(info, fs)| (fs.recipient(self, height).clone(), info.value(subsidy)))
            .collect()
    }

    /// One-time lockbox disbursements falling due exactly at `height`.
    pub fn lockbox_disbursements_at(&self, height: u64) -> Vec<&OnetimeLockboxDisbursement> {
        let mut due = Vec::new();
        if !self.upgrade_active(height, NetworkUpgrade::Nu6_1) {
            return due;
        }
        for disbursement in self.lockbox_disbursements.iter().flatten() {
            if self.activation_height(disbursement.upgrade) == Some(height) {
                due.push(disbursement);
            }
        }
        due
    }
}
