//! Coinbase transaction outputs as reported by a node.
//!
//! The coinbase is the first transaction in a block. It claims the block
//! subsidy (plus fees) and pays it to the miner and any funding streams.

use serde::{Deserialize, Serialize};

/// A single transparent coinbase output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseOutput {
    /// Output value in zatoshis.
    pub value: u64,
    /// Addresses decoded from the output's scriptPubKey (empty for
    /// non-standard scripts).
    pub addresses: Vec<String>,
}

impl CoinbaseOutput {
    pub fn new(value: u64, addresses: Vec<String>) -> Self {
        CoinbaseOutput { value, addresses }
    }
}

/// The transparent outputs of a block's coinbase transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coinbase {
    pub outputs: Vec<CoinbaseOutput>,
}

impl Coinbase {
    pub fn new(outputs: Vec<CoinbaseOutput>) -> Self {
        Coinbase { outputs }
    }

    /// Sum of all transparent output values.
    pub fn total_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Distinct payout addresses in first-seen order.
    pub fn payout_addresses(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for address in self.outputs.iter().flat_map(|o| o.addresses.iter()) {
            if !seen.contains(&address.as_str()) {
                seen.push(address);
            }
        }
        seen
    }

    /// Distinct payout addresses, skipping any in `excluded`.
    ///
    /// Used to strip funding-stream and founders' reward recipients so that
    /// only the miner's own address remains.
    pub fn payout_addresses_excluding(&self, excluded: &[String]) -> Vec<&str> {
        self.payout_addresses()
            .into_iter()
            .filter(|a| !excluded.iter().any(|e| e == a))
            .collect()
    }
}
