use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use supply_check::{Cli, RpcChainSource, SupplyReport};
use supply_core::{CancelFlag, Reconciler};

/// Exit status for failures that produced no report.
const EXIT_FAILURE: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_flag.is_cancelled() {
            std::process::exit(130);
        }
        handler_flag.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let mut ledger = cli.miner_ledger();
    if let Some(path) = cli.ledger.as_deref().filter(|p| p.exists()) {
        let loaded = ledger
            .load(path)
            .with_context(|| format!("failed to load ledger {}", path.display()))?;
        info!(records = loaded, path = %path.display(), "loaded deviation ledger");
    }

    let source = RpcChainSource::new(cli.rpc_config()).context("failed to create RPC client")?;
    info!(network = %cli.network, url = %source.config().url, "connecting to node");

    let mut reconciler = Reconciler::new(cli.network_params(), source, ledger)
        .context("invalid network parameters")?
        .with_policy(cli.policy())
        .with_cancel_flag(cancel);

    let outcome = match cli.tip {
        Some(tip) => reconciler.run(tip),
        None => reconciler.run_to_tip(),
    };

    // Attributions made before an error or interruption are kept.
    let (mut cache, _, ledger) = reconciler.into_parts();
    if let Some(path) = &cli.ledger {
        ledger
            .save(path)
            .with_context(|| format!("failed to save ledger {}", path.display()))?;
        info!(records = ledger.len(), path = %path.display(), "saved deviation ledger");
    }

    let run = outcome.context("supply check failed")?;
    if run.interrupted {
        warn!("interrupted, result is not authoritative");
    }

    let theoretical = cache.supply_after_height(run.tip_height);
    let report = SupplyReport::new(cli.network, theoretical, &run, &ledger);
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }

    Ok(report.exit_code())
}
