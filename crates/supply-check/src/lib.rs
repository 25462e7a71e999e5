//! Node-facing half of the supply checker.
//!
//! Connects the reconciler in `supply-core` to a zcashd-compatible node over
//! JSON-RPC and turns its results into reports.

pub mod config;
pub mod report;
pub mod rpc;

pub use config::Cli;
pub use report::{format_coins, SupplyReport};
pub use rpc::{ClientError, RpcChainSource, RpcConfig};
