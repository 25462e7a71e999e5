//! Supply integrity checking for Zcash-style chains.
//!
//! This crate provides pure Rust implementations of:
//! - The block subsidy schedule (slow-start ramp, halvings, block-spacing upgrade)
//! - A memoized cumulative-issuance table
//! - Transparent address validation for coinbase attribution
//! - A bisecting reconciler that localizes the block where observed supply
//!   first diverges from the schedule

pub mod address;
pub mod block;
pub mod cache;
pub mod coinbase;
pub mod hash;
pub mod ledger;
pub mod network;
pub mod reconcile;
pub mod source;
pub mod subsidy;

pub use address::{validate_address, AddressError, AddressType, ValidatedAddress};
pub use block::{BlockData, BlockError, BlockHash};
pub use cache::SupplyCache;
pub use coinbase::{Coinbase, CoinbaseOutput};
pub use ledger::{DeviationRecord, LedgerError, MinerLedger, MinerTotal, Rejection};
pub use network::{Network, NetworkParams, ParamsError, COIN};
pub use reconcile::{
    BisectOutcome, CancelFlag, ComparisonResult, ReconcileError, ReconcilePolicy, Reconciler, RunReport,
    UnresolvedDeviation,
};
pub use source::{ChainDataSource, DeltaLedger, DetailLevel, Observation, SourceError};
pub use subsidy::SubsidyModel;
