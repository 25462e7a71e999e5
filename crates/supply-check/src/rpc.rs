//! JSON-RPC chain data source for zcashd-compatible nodes.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use supply_core::{
    BlockData, BlockHash, ChainDataSource, Coinbase, CoinbaseOutput, DetailLevel, Observation, SourceError,
};

/// zcashd's `RPC_INVALID_PARAMETER`, returned for heights past the tip.
pub const RPC_INVALID_PARAMETER: i64 = -8;

/// Connection settings for the node.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    /// Extra attempts after a transport failure.
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        RpcConfig {
            url: url.into(),
            user: None,
            password: None,
            timeout: Duration::from_secs(30),
            retries: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_auth(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    hash: String,
    height: u64,
    #[serde(default)]
    tx: Vec<RawTx>,
    chain_supply: Option<RawChainSupply>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTx {
    Id(String),
    Full(RawFullTx),
}

#[derive(Deserialize)]
struct RawFullTx {
    #[serde(default)]
    vout: Vec<RawOutput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutput {
    value_zat: u64,
    #[serde(default)]
    script_pub_key: RawScript,
}

#[derive(Deserialize, Default)]
struct RawScript {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChainSupply {
    monitored: bool,
    chain_value_zat: Option<u64>,
}

/// Turn a `getblock` result into an [`Observation`].
///
/// At [`DetailLevel::FullTxData`] the first transaction must be expanded and
/// its outputs become the block's coinbase.
pub fn parse_block(value: Value, detail: DetailLevel) -> Result<Observation, SourceError> {
    let raw: RawBlock = serde_json::from_value(value).map_err(|e| SourceError::Malformed(e.to_string()))?;

    let supply = raw
        .chain_supply
        .ok_or_else(|| SourceError::Malformed(format!("block {} has no chainSupply", raw.height)))?;
    if !supply.monitored {
        return Err(SourceError::Unmonitored { height: raw.height });
    }
    let observed_value = supply
        .chain_value_zat
        .ok_or_else(|| SourceError::Malformed(format!("block {} has no chainValueZat", raw.height)))?;

    let hash = BlockHash::from_display_hex(&raw.hash).map_err(|e| SourceError::Malformed(e.to_string()))?;
    let mut block = BlockData::ids_only(raw.height, hash, raw.tx.len());

    if detail == DetailLevel::FullTxData {
        let coinbase = match raw.tx.into_iter().next() {
            Some(RawTx::Full(tx)) => parse_coinbase(tx),
            Some(RawTx::Id(_)) => {
                return Err(SourceError::Malformed(format!(
                    "block {} coinbase was not expanded",
                    raw.height
                )))
            }
            None => return Err(SourceError::Malformed(format!("block {} has no transactions", raw.height))),
        };
        block = block.with_coinbase(coinbase);
    }

    Ok(Observation { observed_value, block })
}

fn parse_coinbase(tx: RawFullTx) -> Coinbase {
    Coinbase::new(
        tx.vout
            .into_iter()
            .map(|out| CoinbaseOutput::new(out.value_zat, out.script_pub_key.addresses))
            .collect(),
    )
}

/// Blocking JSON-RPC client implementing [`ChainDataSource`].
pub struct RpcChainSource {
    config: RpcConfig,
    http: Client,
    next_id: u64,
}

impl RpcChainSource {
    pub fn new(config: RpcConfig) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(RpcChainSource { config, http, next_id: 0 })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Call `method`, retrying transport failures only.
    pub fn call(&mut self, method: &str, params: Value) -> Result<Value, SourceError> {
        let mut attempt = 0;
        loop {
            match self.call_once(method, &params) {
                Err(err) if err.is_retryable() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!(method, attempt, %err, "rpc call failed, retrying");
                    thread::sleep(self.config.retry_backoff);
                }
                result => return result,
            }
        }
    }

    fn call_once(&mut self, method: &str, params: &Value) -> Result<Value, SourceError> {
        self.next_id += 1;
        let body = json!({
            "jsonrpc": "1.0",
            "id": self.next_id,
            "method": method,
            "params": params,
        });
        debug!(method, %params, "rpc request");

        let mut request = self.http.post(&self.config.url).json(&body);
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_ref());
        }

        let response = request.send().map_err(|e| SourceError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response.text().map_err(|e| SourceError::Transport(e.to_string()))?;

        // zcashd answers RPC errors with a 500 and a JSON body, so the body
        // is parsed before the status is looked at.
        let parsed: RpcResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(SourceError::Rpc {
                    code: i64::from(status.as_u16()),
                    message: format!("http status {status}"),
                })
            }
            Err(e) => return Err(SourceError::Malformed(e.to_string())),
        };

        if let Some(error) = parsed.error {
            return Err(SourceError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| SourceError::Malformed(format!("{method} returned no result")))
    }
}

impl ChainDataSource for RpcChainSource {
    fn observed_value(&mut self, height: u64, detail: DetailLevel) -> Result<Observation, SourceError> {
        let params = json!([height.to_string(), detail.verbosity()]);
        let value = self.call("getblock", params).map_err(|err| match err {
            SourceError::Rpc { code: RPC_INVALID_PARAMETER, .. } => SourceError::NotFound { height, tip: None },
            other => other,
        })?;

        let observation = parse_block(value, detail)?;
        if observation.block.height != height {
            return Err(SourceError::Malformed(format!(
                "asked for block {height}, got {}",
                observation.block.height
            )));
        }
        Ok(observation)
    }

    fn tip_height(&mut self) -> Result<u64, SourceError> {
        let value = self.call("getblockcount", json!([]))?;
        value
            .as_u64()
            .ok_or_else(|| SourceError::Malformed(format!("getblockcount returned {value}")))
    }
}
