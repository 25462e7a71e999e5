//! Ledger of deviations attributed to miners that under-claimed their reward.
//!
//! A block whose coinbase pays out less than the subsidy it was entitled to
//! permanently lowers the chain's supply. Once such a block has been found and
//! pinned to a miner address, the shortfall is an explained delta that later
//! comparisons correct for.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::address::validate_address;
use crate::block::{BlockData, BlockHash};
use crate::network::Network;
use crate::source::DeltaLedger;

/// A confirmed single-block mismatch and who it is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationRecord {
    pub height: u64,
    pub theoretical: u64,
    pub empirical: u64,
    /// `theoretical - empirical`; positive when the block under-claimed.
    pub deviation: i64,
    pub block_hash: BlockHash,
    pub miner_address: String,
}

/// Why a deviation could not be attributed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("deviation of {deviation} zatoshis is not an under-claim")]
    NotUnderClaim { deviation: i64 },
    #[error("block carries no coinbase data")]
    MissingCoinbase,
    #[error("coinbase pays no attributable address")]
    NoPayoutAddress,
    #[error("coinbase pays several candidate addresses: {0:?}")]
    AmbiguousPayout(Vec<String>),
    #[error("payout address {address} is not recognized: {reason}")]
    UnrecognizedAddress { address: String, reason: String },
    #[error("payout address {0} is not a known miner")]
    UnknownMiner(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ledger belongs to {found}, expected {expected}")]
    WrongNetwork { expected: Network, found: Network },
}

/// Per-miner aggregate of attributed deviations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MinerTotal {
    pub blocks: u64,
    pub deviation: i64,
}

#[derive(Serialize, Deserialize)]
struct LedgerFile {
    network: Network,
    records: Vec<DeviationRecord>,
}

/// `DeltaLedger` that attributes under-claimed subsidy to the block's miner.
#[derive(Debug, Clone)]
pub struct MinerLedger {
    network: Network,
    known_miners: Vec<String>,
    excluded: Vec<String>,
    records: BTreeMap<u64, DeviationRecord>,
}

impl MinerLedger {
    /// Create an empty ledger for `network`.
    pub fn new(network: Network) -> Self {
        MinerLedger {
            network,
            known_miners: Vec::new(),
            excluded: Vec::new(),
            records: BTreeMap::new(),
        }
    }

    /// Restrict attribution to these miner addresses. Empty accepts any
    /// valid transparent address.
    pub fn with_known_miners(mut self, known_miners: Vec<String>) -> Self {
        self.known_miners = known_miners;
        self
    }

    /// Addresses that are never the miner (funding streams, founders' reward).
    pub fn with_excluded(mut self, excluded: Vec<String>) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Attribute the mismatch at `block`, storing a record on success.
    ///
    /// `empirical` already includes every recorded deviation at or below the
    /// block, so the mismatch is added to an existing record at the same
    /// height rather than replacing it.
    pub fn attribute(
        &mut self,
        block: &BlockData,
        theoretical: u64,
        empirical: u64,
    ) -> Result<&DeviationRecord, Rejection> {
        let previous = self.records.get(&block.height).map_or(0, |r| r.deviation);
        let deviation = previous + (theoretical as i64 - empirical as i64);
        if deviation <= 0 {
            return Err(Rejection::NotUnderClaim { deviation });
        }

        let coinbase = block.coinbase.as_ref().ok_or(Rejection::MissingCoinbase)?;
        let candidates = coinbase.payout_addresses_excluding(&self.excluded);
        let miner = match candidates.as_slice() {
            [] => return Err(Rejection::NoPayoutAddress),
            [single] => single.to_string(),
            many => return Err(Rejection::AmbiguousPayout(many.iter().map(|a| a.to_string()).collect())),
        };

        validate_address(&miner, self.network).map_err(|e| Rejection::UnrecognizedAddress {
            address: miner.clone(),
            reason: e.to_string(),
        })?;

        if !self.known_miners.is_empty() && !self.known_miners.contains(&miner) {
            return Err(Rejection::UnknownMiner(miner));
        }

        let record = DeviationRecord {
            height: block.height,
            theoretical,
            empirical: (empirical as i64 - previous) as u64,
            deviation,
            block_hash: block.hash,
            miner_address: miner,
        };
        self.records.insert(block.height, record);
        Ok(&self.records[&block.height])
    }

    /// Records in height order.
    pub fn records(&self) -> impl Iterator<Item = &DeviationRecord> {
        self.records.values()
    }

    pub fn get(&self, height: u64) -> Option<&DeviationRecord> {
        self.records.get(&height)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of every recorded deviation.
    pub fn total_deviation(&self) -> i64 {
        self.records.values().map(|r| r.deviation).sum()
    }

    /// Deviations grouped by miner address.
    pub fn miner_totals(&self) -> BTreeMap<String, MinerTotal> {
        let mut totals: BTreeMap<String, MinerTotal> = BTreeMap::new();
        for record in self.records.values() {
            let entry = totals.entry(record.miner_address.clone()).or_default();
            entry.blocks += 1;
            entry.deviation += record.deviation;
        }
        totals
    }

    /// Load records saved by [`MinerLedger::save`] into this ledger.
    pub fn load(&mut self, path: &Path) -> Result<usize, LedgerError> {
        let file: LedgerFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        if file.network != self.network {
            return Err(LedgerError::WrongNetwork {
                expected: self.network,
                found: file.network,
            });
        }
        let count = file.records.len();
        for record in file.records {
            self.records.insert(record.height, record);
        }
        Ok(count)
    }

    /// Write every record to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let file = LedgerFile {
            network: self.network,
            records: self.records.values().cloned().collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

impl DeltaLedger for MinerLedger {
    fn cumulative_deviation(&self, height: u64) -> i64 {
        self.records.range(..=height).map(|(_, r)| r.deviation).sum()
    }

    fn record_and_attribute(&mut self, block: &BlockData, theoretical: u64, empirical: u64) -> bool {
        match self.attribute(block, theoretical, empirical) {
            Ok(record) => {
                info!(
                    height = record.height,
                    deviation = record.deviation,
                    claimed = ?block.claimed_subsidy(),
                    miner = %record.miner_address,
                    "attributed supply deviation"
                );
                true
            }
            Err(reason) => {
                warn!(height = block.height, hash = %block.hash, %reason, "could not attribute deviation");
                false
            }
        }
    }
}
