//! Rendering of run results for people and for machines.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use supply_core::{DeviationRecord, MinerLedger, MinerTotal, Network, RunReport, COIN};

/// Exit status for a consistent chain.
pub const EXIT_CONSISTENT: u8 = 0;
/// Exit status when at least one deviation could not be attributed.
pub const EXIT_UNRESOLVED: u8 = 1;
/// Exit status when the run was cancelled.
pub const EXIT_INTERRUPTED: u8 = 2;

/// Format a zatoshi amount as coins with eight decimals.
pub fn format_coins(zatoshis: impl Into<i128>) -> String {
    let amount = zatoshis.into();
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.abs();
    let whole = abs / COIN as i128;
    let frac = abs % COIN as i128;
    format!("{sign}{whole}.{frac:08}")
}

/// Ticker used by the node for `network`.
pub fn currency_unit(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "ZEC",
        Network::Testnet | Network::Regtest => "TAZ",
    }
}

/// Everything a finished (or interrupted) run has to say.
#[derive(Debug, Clone, Serialize)]
pub struct SupplyReport<'a> {
    pub network: Network,
    /// Scheduled issuance through the tip, in zatoshis.
    pub theoretical_supply: u64,
    #[serde(flatten)]
    pub run: &'a RunReport,
    pub records: Vec<&'a DeviationRecord>,
    pub miner_totals: BTreeMap<String, MinerTotal>,
}

impl<'a> SupplyReport<'a> {
    pub fn new(network: Network, theoretical_supply: u64, run: &'a RunReport, ledger: &'a MinerLedger) -> Self {
        SupplyReport {
            network,
            theoretical_supply,
            run,
            records: ledger.records().collect(),
            miner_totals: ledger.miner_totals(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.run.interrupted {
            EXIT_INTERRUPTED
        } else if self.run.consistent {
            EXIT_CONSISTENT
        } else {
            EXIT_UNRESOLVED
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Human-readable summary.
impl fmt::Display for SupplyReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = currency_unit(self.network);
        let ledger_total: i64 = self.records.iter().map(|r| r.deviation).sum();

        let status = if self.run.interrupted {
            "INTERRUPTED (result is not authoritative)"
        } else if self.run.consistent {
            "consistent"
        } else {
            "UNRESOLVED DISCREPANCY"
        };

        writeln!(f, "Network:            {}", self.network.display_name())?;
        writeln!(f, "Checked through:    {}", self.run.tip_height)?;
        writeln!(f, "Status:             {status}")?;
        writeln!(
            f,
            "Theoretical supply: {} {unit}",
            format_coins(self.theoretical_supply)
        )?;
        writeln!(
            f,
            "Attributed total:   {} {unit} ({} blocks in ledger)",
            format_coins(ledger_total),
            self.records.len()
        )?;
        writeln!(
            f,
            "This run:           {} {unit} across {} blocks, {} node queries",
            format_coins(self.run.attributed_delta_total),
            self.run.attributed_delta_count,
            self.run.source_queries
        )?;

        if !self.miner_totals.is_empty() {
            writeln!(f, "\nUnder-claimed by miner:")?;
            for (address, total) in &self.miner_totals {
                writeln!(
                    f,
                    "  {address}  {:>6} blocks  {:>20} {unit}",
                    total.blocks,
                    format_coins(total.deviation)
                )?;
            }
        }

        if !self.run.unresolved.is_empty() {
            writeln!(f, "\nUnresolved deviations:")?;
            for u in &self.run.unresolved {
                writeln!(
                    f,
                    "  height {:>8}  {}  {:>20} {unit}",
                    u.height,
                    u.block_hash,
                    format_coins(u.residual)
                )?;
            }
        }

        Ok(())
    }
}
