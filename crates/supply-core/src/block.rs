//! Block data returned alongside an observed supply value.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::coinbase::Coinbase;
use crate::hash::{display_hex_to_hash, hash_to_display_hex};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("invalid block hash {0:?}: expected 64 hex characters")]
    InvalidHash(String),
}

/// A block hash, stored in internal byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Parse the display-order hex a node reports.
    pub fn from_display_hex(display: &str) -> Result<Self, BlockError> {
        display_hex_to_hash(display)
            .map(BlockHash)
            .ok_or_else(|| BlockError::InvalidHash(display.to_string()))
    }

    /// Display-order hex.
    pub fn to_display_hex(&self) -> String {
        hash_to_display_hex(&self.0)
    }
}

impl core::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.to_display_hex())
    }
}

impl core::fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BlockHash({})", self.to_display_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_display_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_display_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// What a data source knows about one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub hash: BlockHash,
    /// Number of transactions in the block.
    pub tx_count: usize,
    /// Coinbase outputs; only present for full transaction queries.
    pub coinbase: Option<Coinbase>,
}

impl BlockData {
    /// Block data without transaction contents.
    pub fn ids_only(height: u64, hash: BlockHash, tx_count: usize) -> Self {
        BlockData {
            height,
            hash,
            tx_count,
            coinbase: None,
        }
    }

    /// Attach decoded coinbase outputs.
    pub fn with_coinbase(mut self, coinbase: Coinbase) -> Self {
        self.coinbase = Some(coinbase);
        self
    }

    /// Total value claimed by the coinbase, if known.
    pub fn claimed_subsidy(&self) -> Option<u64> {
        self.coinbase.as_ref().map(Coinbase::total_value)
    }

    /// Distinct coinbase payout addresses in first-seen order; empty without coinbase data.
    pub fn payout_addresses(&self) -> Vec<&str> {
        self.coinbase.as_ref().map(Coinbase::payout_addresses).unwrap_or_default()
    }
}
