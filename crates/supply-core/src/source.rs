//! Capabilities the reconciler consumes: a chain data source and a delta ledger.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::BlockData;

/// How much of a block to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailLevel {
    /// Header fields and transaction ids.
    IdsOnly,
    /// Full transactions, needed to attribute a deviation to a miner.
    FullTxData,
}

impl DetailLevel {
    /// `getblock` verbosity for this level.
    pub fn verbosity(&self) -> u8 {
        match self {
            DetailLevel::IdsOnly => 1,
            DetailLevel::FullTxData => 2,
        }
    }
}

/// A node's view of the chain at one height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Cumulative issuance the node reports through this height, in zatoshis.
    pub observed_value: u64,
    /// The block at this height.
    pub block: BlockData,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("block {height} not found (tip is {tip:?})")]
    NotFound { height: u64, tip: Option<u64> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("node is not monitoring chain supply at height {height}")]
    Unmonitored { height: u64 },
}

impl SourceError {
    /// Only transport failures are worth retrying; everything else is a
    /// definitive answer from the source.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transport(_))
    }
}

/// Supplies a node's reported cumulative issuance and block contents.
pub trait ChainDataSource {
    /// Observed cumulative value and block data at `height`.
    fn observed_value(&mut self, height: u64, detail: DetailLevel) -> Result<Observation, SourceError>;

    /// Height of the source's best block.
    fn tip_height(&mut self) -> Result<u64, SourceError>;
}

/// Records and answers queries about already-explained deviations.
pub trait DeltaLedger {
    /// Sum of recorded deviations at or below `height` (0 if none).
    fn cumulative_deviation(&self, height: u64) -> i64;

    /// Try to explain the mismatch isolated at `block`. Returns `true` if the
    /// deviation was attributed and stored.
    fn record_and_attribute(&mut self, block: &BlockData, theoretical: u64, empirical: u64) -> bool;
}

impl<S: ChainDataSource + ?Sized> ChainDataSource for &mut S {
    fn observed_value(&mut self, height: u64, detail: DetailLevel) -> Result<Observation, SourceError> {
        (**self).observed_value(height, detail)
    }

    fn tip_height(&mut self) -> Result<u64, SourceError> {
        (**self).tip_height()
    }
}

impl<L: DeltaLedger + ?Sized> DeltaLedger for &mut L {
    fn cumulative_deviation(&self, height: u64) -> i64 {
        (**self).cumulative_deviation(height)
    }

    fn record_and_attribute(&mut self, block: &BlockData, theoretical: u64, empirical: u64) -> bool {
        (**self).record_and_attribute(block, theoretical, empirical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity() {
        assert_eq!(DetailLevel::IdsOnly.verbosity(), 1);
        assert_eq!(DetailLevel::FullTxData.verbosity(), 2);
    }

    #[test]
    fn test_only_transport_errors_retry() {
        assert!(SourceError::Transport("timed out".into()).is_retryable());
        assert!(!SourceError::NotFound { height: 5, tip: Some(4) }.is_retryable());
        assert!(!SourceError::Rpc { code: -8, message: "out of range".into() }.is_retryable());
        assert!(!SourceError::Malformed("no chainSupply".into()).is_retryable());
        assert!(!SourceError::Unmonitored { height: 1 }.is_retryable());
    }
}
