//! Command-line configuration with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use supply_core::{MinerLedger, Network, NetworkParams, ReconcilePolicy};

use crate::rpc::RpcConfig;

#[derive(Parser, Debug)]
#[command(name = "supply-check")]
#[command(about = "Check a Zcash node's reported chain supply against the issuance schedule", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Network the node runs on (mainnet, testnet, regtest)
    #[arg(long, env = "SUPPLY_CHECK_NETWORK", default_value = "mainnet", value_parser = parse_network)]
    pub network: Network,

    /// Node JSON-RPC endpoint (default: http://127.0.0.1:<network rpc port>)
    #[arg(long, env = "SUPPLY_CHECK_RPC_URL")]
    pub rpc_url: Option<String>,

    /// RPC username
    #[arg(long, env = "SUPPLY_CHECK_RPC_USER")]
    pub rpc_user: Option<String>,

    /// RPC password
    #[arg(long, env = "SUPPLY_CHECK_RPC_PASSWORD", hide_env_values = true)]
    pub rpc_password: Option<String>,

    /// Check up to this height instead of the node's tip
    #[arg(long)]
    pub tip: Option<u64>,

    /// Override the block-spacing upgrade activation height
    #[arg(long)]
    pub activation_height: Option<u64>,

    /// Keep searching after an unattributable block
    #[arg(long)]
    pub find_all: bool,

    /// Only attribute deviations to these miner addresses (repeatable)
    #[arg(long = "known-miner", value_name = "ADDRESS")]
    pub known_miners: Vec<String>,

    /// Coinbase recipients that are never the miner (repeatable)
    #[arg(long = "exclude-address", value_name = "ADDRESS")]
    pub excluded_addresses: Vec<String>,

    /// Ledger file to load before and save after the run
    #[arg(long, value_name = "PATH")]
    pub ledger: Option<PathBuf>,

    /// Retries after a transport failure
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_network(s: &str) -> Result<Network, String> {
    Network::from_str(s).ok_or_else(|| format!("unknown network '{s}' (expected mainnet, testnet or regtest)"))
}

impl Cli {
    pub fn rpc_url(&self) -> String {
        self.rpc_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.network.default_rpc_port()))
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            ..RpcConfig::new(self.rpc_url())
        }
        .with_auth(self.rpc_user.clone(), self.rpc_password.clone())
    }

    /// Network parameters with any activation override applied. Not yet validated.
    pub fn network_params(&self) -> NetworkParams {
        let params = self.network.params();
        match self.activation_height {
            Some(height) => params.with_activation_height(Some(height)),
            None => params,
        }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            stop_on_first_failure: !self.find_all,
        }
    }

    /// Empty ledger carrying the attribution filters.
    pub fn miner_ledger(&self) -> MinerLedger {
        MinerLedger::new(self.network)
            .with_known_miners(self.known_miners.clone())
            .with_excluded(self.excluded_addresses.clone())
    }

    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["supply-check"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--network", "mainnet"]);
        assert_eq!(cli.network, Network::Mainnet);
        assert_eq!(cli.rpc_url(), "http://127.0.0.1:8232");
        assert!(cli.policy().stop_on_first_failure);
        assert_eq!(cli.network_params(), Network::Mainnet.params());
        assert_eq!(cli.log_level(), "info");
    }

    #[test]
    fn test_testnet_port_and_overrides() {
        let cli = parse(&[
            "--network",
            "test",
            "--activation-height",
            "600000",
            "--find-all",
            "--retries",
            "0",
            "--timeout-secs",
            "5",
            "-v",
        ]);
        assert_eq!(cli.network, Network::Testnet);
        assert_eq!(cli.rpc_url(), "http://127.0.0.1:18232");
        assert_eq!(cli.network_params().activation_height, Some(600_000));
        assert!(!cli.policy().stop_on_first_failure);

        let rpc = cli.rpc_config();
        assert_eq!(rpc.retries, 0);
        assert_eq!(rpc.timeout, Duration::from_secs(5));
        assert_eq!(cli.log_level(), "debug");
    }

    #[test]
    fn test_repeatable_addresses() {
        let cli = parse(&[
            "--network",
            "mainnet",
            "--known-miner",
            "t1Hxw6JqWMnhDK5jRCieg5bFHM2qt7UtQvu",
            "--known-miner",
            "t1ZXKD285AZdKs56b9ypo9FT4LMHKuJRw5N",
            "--exclude-address",
            "t3LmX1cxWPPPqL4TZHx42HU3U5ghbFjRiif",
        ]);
        assert_eq!(cli.known_miners.len(), 2);
        assert_eq!(cli.excluded_addresses, vec!["t3LmX1cxWPPPqL4TZHx42HU3U5ghbFjRiif".to_string()]);
        assert_eq!(cli.miner_ledger().network(), Network::Mainnet);
    }

    #[test]
    fn test_rejects_unknown_network() {
        assert!(Cli::try_parse_from(["supply-check", "--network", "signet"]).is_err());
    }
}
