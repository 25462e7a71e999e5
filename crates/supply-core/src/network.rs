//! Network definitions and issuance constants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum block subsidy in zatoshis (12.5 coins).
pub const MAX_BLOCK_SUBSIDY: u64 = 1_250_000_000;

/// Zatoshis per coin.
pub const COIN: u64 = 100_000_000;

/// Target block spacing before the upgrade, in seconds.
pub const PRE_ACTIVATION_POW_TARGET_SPACING: u64 = 150;

/// Target block spacing after the upgrade, in seconds.
pub const POST_ACTIVATION_POW_TARGET_SPACING: u64 = 75;

/// Halving interval (in blocks) before the upgrade, mainnet and testnet.
pub const PRE_ACTIVATION_HALVING_INTERVAL: u64 = 840_000;

/// Halving interval (in blocks) before the upgrade on regtest.
pub const PRE_ACTIVATION_REGTEST_HALVING_INTERVAL: u64 = 144;

/// Network type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network
    Mainnet,
    /// Public test network
    Testnet,
    /// Local regression-test network
    Regtest,
}

impl Network {
    /// Issuance parameters for this network.
    pub fn params(&self) -> NetworkParams {
        match self {
            Network::Mainnet => NetworkParams {
                activation_height: Some(653_600),
                slow_start_interval: 20_000,
                max_block_subsidy: MAX_BLOCK_SUBSIDY,
                pre_activation_halving_interval: PRE_ACTIVATION_HALVING_INTERVAL,
                pre_activation_spacing: PRE_ACTIVATION_POW_TARGET_SPACING,
                post_activation_spacing: POST_ACTIVATION_POW_TARGET_SPACING,
            },
            Network::Testnet => NetworkParams {
                activation_height: Some(584_000),
                slow_start_interval: 20_000,
                max_block_subsidy: MAX_BLOCK_SUBSIDY,
                pre_activation_halving_interval: PRE_ACTIVATION_HALVING_INTERVAL,
                pre_activation_spacing: PRE_ACTIVATION_POW_TARGET_SPACING,
                post_activation_spacing: POST_ACTIVATION_POW_TARGET_SPACING,
            },
            Network::Regtest => NetworkParams {
                activation_height: None,
                slow_start_interval: 0,
                max_block_subsidy: MAX_BLOCK_SUBSIDY,
                pre_activation_halving_interval: PRE_ACTIVATION_REGTEST_HALVING_INTERVAL,
                pre_activation_spacing: PRE_ACTIVATION_POW_TARGET_SPACING,
                post_activation_spacing: POST_ACTIVATION_POW_TARGET_SPACING,
            },
        }
    }

    /// Get the default RPC port for this network.
    pub fn default_rpc_port(&self) -> u16 {
        match self {
            Network::Mainnet => 8232,
            Network::Testnet | Network::Regtest => 18232,
        }
    }

    /// Parse network from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Some(Network::Mainnet),
            "testnet" | "test" => Some(Network::Testnet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }

    /// Get network name as string.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }

    /// Get display name for reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Network::Mainnet => "Zcash Mainnet",
            Network::Testnet => "Zcash Testnet",
            Network::Regtest => "Zcash Regtest",
        }
    }
}

impl core::fmt::Display for Network {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

/// Rejected parameter sets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("block spacing must be non-zero (pre {pre}s, post {post}s)")]
    ZeroSpacing { pre: u64, post: u64 },
    #[error("pre-activation spacing {pre}s is not a multiple of post-activation spacing {post}s")]
    SpacingNotMultiple { pre: u64, post: u64 },
    #[error("halving interval must be non-zero")]
    ZeroHalvingInterval,
    #[error("slow start interval {0} is not even")]
    OddSlowStart(u64),
    #[error("slow start interval {interval} does not divide max subsidy {max_subsidy}")]
    SlowStartNotDivisor { interval: u64, max_subsidy: u64 },
    #[error("activation height {activation} is below slow start shift {shift}")]
    ActivationBeforeShift { activation: u64, shift: u64 },
}

/// Immutable per-network issuance constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Height at which block spacing drops; `None` if it never activates.
    pub activation_height: Option<u64>,
    /// Length of the linear subsidy ramp at the start of the chain.
    pub slow_start_interval: u64,
    /// Full (un-halved, pre-activation) block subsidy in zatoshis.
    pub max_block_subsidy: u64,
    /// Blocks per halving before activation.
    pub pre_activation_halving_interval: u64,
    /// Target spacing before activation, in seconds.
    pub pre_activation_spacing: u64,
    /// Target spacing after activation, in seconds.
    pub post_activation_spacing: u64,
}

impl NetworkParams {
    /// Override the activation height (regtest nodes pick their own).
    pub fn with_activation_height(mut self, activation_height: Option<u64>) -> Self {
        self.activation_height = activation_height;
        self
    }

    /// Check every invariant the subsidy model relies on.
    pub fn validate(self) -> Result<Self, ParamsError> {
        let (pre, post) = (self.pre_activation_spacing, self.post_activation_spacing);
        if pre == 0 || post == 0 {
            return Err(ParamsError::ZeroSpacing { pre, post });
        }
        if pre % post != 0 {
            return Err(ParamsError::SpacingNotMultiple { pre, post });
        }
        if self.pre_activation_halving_interval == 0 {
            return Err(ParamsError::ZeroHalvingInterval);
        }
        if self.slow_start_interval % 2 != 0 {
            return Err(ParamsError::OddSlowStart(self.slow_start_interval));
        }
        if self.slow_start_interval != 0 && self.max_block_subsidy % self.slow_start_interval != 0 {
            return Err(ParamsError::SlowStartNotDivisor {
                interval: self.slow_start_interval,
                max_subsidy: self.max_block_subsidy,
            });
        }
        if let Some(activation) = self.activation_height {
            if activation < self.slow_start_shift() {
                return Err(ParamsError::ActivationBeforeShift {
                    activation,
                    shift: self.slow_start_shift(),
                });
            }
        }
        Ok(self)
    }

    /// Midpoint of the slow-start ramp; halving epochs count from here.
    pub fn slow_start_shift(&self) -> u64 {
        self.slow_start_interval / 2
    }

    /// Ratio between pre- and post-activation block spacing.
    pub fn spacing_ratio(&self) -> u64 {
        self.pre_activation_spacing / self.post_activation_spacing
    }

    /// Blocks per halving once the upgrade is active.
    pub fn post_activation_halving_interval(&self) -> u64 {
        self.pre_activation_halving_interval * self.spacing_ratio()
    }
}
