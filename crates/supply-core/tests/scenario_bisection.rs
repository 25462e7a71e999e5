use std::collections::BTreeMap;

use supply_core::*;

const MINER: &str = "t1Hxw6JqWMnhDK5jRCieg5bFHM2qt7UtQvu";

fn hash_for(height: u64) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_le_bytes());
    BlockHash(bytes)
}

/// A chain whose coinbases claim less (or more) than the schedule at chosen heights.
struct FabricatedChain {
    cache: SupplyCache,
    tip: u64,
    /// Positive = block under-claimed by this much; negative = over-issued.
    shortfalls: BTreeMap<u64, i64>,
    queries: Vec<(u64, DetailLevel)>,
    fail_at_query: Option<usize>,
}

impl FabricatedChain {
    fn new(tip: u64, shortfalls: &[(u64, i64)]) -> Self {
        FabricatedChain {
            cache: SupplyCache::new(SubsidyModel::new(Network::Mainnet.params()).unwrap()),
            tip,
            shortfalls: shortfalls.iter().copied().collect(),
            queries: Vec::new(),
            fail_at_query: None,
        }
    }

    fn full_queries(&self) -> Vec<u64> {
        self.queries
            .iter()
            .filter(|(_, d)| *d == DetailLevel::FullTxData)
            .map(|(h, _)| *h)
            .collect()
    }
}

impl ChainDataSource for FabricatedChain {
    fn observed_value(&mut self, height: u64, detail: DetailLevel) -> Result<Observation, SourceError> {
        if Some(self.queries.len()) == self.fail_at_query {
            return Err(SourceError::Transport("connection reset".into()));
        }
        if height > self.tip {
            return Err(SourceError::NotFound { height, tip: Some(self.tip) });
        }
        self.queries.push((height, detail));

        let missing: i64 = self.shortfalls.range(..=height).map(|(_, s)| *s).sum();
        let observed = (self.cache.supply_after_height(height) as i64 - missing) as u64;

        let mut block = BlockData::ids_only(height, hash_for(height), 1);
        if detail == DetailLevel::FullTxData {
            let subsidy = self.cache.model().block_subsidy(height) as i64;
            let claimed = subsidy - self.shortfalls.get(&height).copied().unwrap_or(0);
            block = block.with_coinbase(Coinbase::new(vec![CoinbaseOutput::new(
                claimed as u64,
                vec![MINER.to_string()],
            )]));
        }

        Ok(Observation {
            observed_value: observed,
            block,
        })
    }

    fn tip_height(&mut self) -> Result<u64, SourceError> {
        Ok(self.tip)
    }
}

/// Ledger that accepts or rejects by height and remembers every call.
struct RecordingLedger {
    deltas: BTreeMap<u64, i64>,
    calls: Vec<BlockData>,
    reject: Vec<u64>,
    cancel_after: Option<(usize, CancelFlag)>,
}

impl RecordingLedger {
    fn accepting() -> Self {
        RecordingLedger {
            deltas: BTreeMap::new(),
            calls: Vec::new(),
            reject: Vec::new(),
            cancel_after: None,
        }
    }

    fn rejecting(heights: &[u64]) -> Self {
        RecordingLedger {
            reject: heights.to_vec(),
            ..Self::accepting()
        }
    }
}

impl DeltaLedger for RecordingLedger {
    fn cumulative_deviation(&self, height: u64) -> i64 {
        self.deltas.range(..=height).map(|(_, d)| *d).sum()
    }

    fn record_and_attribute(&mut self, block: &BlockData, theoretical: u64, empirical: u64) -> bool {
        self.calls.push(block.clone());
        if self.reject.contains(&block.height) {
            return false;
        }
        self.deltas.insert(block.height, theoretical as i64 - empirical as i64);
        if let Some((after, flag)) = &self.cancel_after {
            if self.deltas.len() >= *after {
                flag.cancel();
            }
        }
        true
    }
}

fn log2_ceil(n: u64) -> u64 {
    (u64::BITS - (n - 1).leading_zeros()) as u64
}

#[test]
fn scenario_single_anomaly_is_isolated_in_log_queries() {
    let tip = 1_000_000;
    let k = 777_777;
    let chain = FabricatedChain::new(tip, &[(k, 40_000)]);
    let mut reconciler = Reconciler::new(Network::Mainnet.params(), chain, RecordingLedger::accepting()).unwrap();

    let report = reconciler.run(tip).unwrap();
    assert!(report.consistent);
    assert!(!report.interrupted);
    assert_eq!(report.attributed_delta_count, 1);
    assert_eq!(report.attributed_delta_total, 40_000);

    let (_, chain, ledger) = reconciler.into_parts();
    assert_eq!(ledger.calls.len(), 1);
    assert_eq!(ledger.calls[0].height, k);
    assert_eq!(ledger.calls[0].hash, hash_for(k));
    assert!(ledger.calls[0].coinbase.is_some());

    let bound = 2 * log2_ceil(tip + 1) + 1;
    assert!(
        (chain.queries.len() as u64) <= bound,
        "{} queries exceeds {}",
        chain.queries.len(),
        bound
    );
    assert!(chain.full_queries().contains(&k));
    assert_eq!(chain.queries[0], (tip, DetailLevel::IdsOnly));
}

#[test]
fn scenario_anomaly_at_range_edges() {
    for k in [1, 2_048, 4_095] {
        let chain = FabricatedChain::new(4_095, &[(k, 1)]);
        let mut reconciler =
            Reconciler::new(Network::Mainnet.params(), chain, RecordingLedger::accepting()).unwrap();

        let report = reconciler.run(4_095).unwrap();
        assert!(report.consistent, "anomaly at {k}");
        assert_eq!(reconciler.ledger().calls.len(), 1);
        assert_eq!(reconciler.ledger().calls[0].height, k);
    }
}

#[test]
fn scenario_attribution_failure_reports_inconsistent() {
    let chain = FabricatedChain::new(50_000, &[(31_337, 500)]);
    let ledger = RecordingLedger::rejecting(&[31_337]);
    let mut reconciler = Reconciler::new(Network::Mainnet.params(), chain, ledger).unwrap();

    let report = reconciler.run(50_000).unwrap();
    assert!(!report.consistent);
    assert!(!report.interrupted);
    assert_eq!(report.attributed_delta_count, 0);
    assert_eq!(report.attributed_delta_total, 0);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].height, 31_337);
    assert_eq!(report.unresolved[0].residual, 500);
}

#[test]
fn scenario_stop_on_first_failure_abandons_later_anomalies() {
    let chain = FabricatedChain::new(100_000, &[(30_000, 10), (90_000, 20)]);
    let ledger = RecordingLedger::rejecting(&[30_000]);
    let mut reconciler = Reconciler::new(Network::Mainnet.params(), chain, ledger)
        .unwrap()
        .with_policy(ReconcilePolicy { stop_on_first_failure: true });

    let report = reconciler.run(100_000).unwrap();
    assert!(!report.consistent);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].height, 30_000);

    // The second anomaly was never reached
    let calls: Vec<u64> = reconciler.ledger().calls.iter().map(|b| b.height).collect();
    assert_eq!(calls, vec![30_000]);
}

#[test]
fn scenario_find_all_continues_past_failure() {
    let chain = FabricatedChain::new(100_000, &[(30_000, 10), (60_000, 15), (90_000, 20)]);
    let ledger = RecordingLedger::rejecting(&[30_000, 90_000]);
    let mut reconciler = Reconciler::new(Network::Mainnet.params(), chain, ledger)
        .unwrap()
        .with_policy(ReconcilePolicy { stop_on_first_failure: false });

    let report = reconciler.run(100_000).unwrap();
    assert!(!report.consistent);
    assert_eq!(report.attributed_delta_count, 1);
    assert_eq!(report.attributed_delta_total, 15);

    let unresolved: Vec<u64> = report.unresolved.iter().map(|u| u.height).collect();
    assert_eq!(unresolved, vec![30_000, 90_000]);
    assert_eq!(report.unresolved[1].residual, 20);

    // Each anomaly reaches the ledger exactly once
    let calls: Vec<u64> = reconciler.ledger().calls.iter().map(|b| b.height).collect();
    assert_eq!(calls, vec![30_000, 60_000, 90_000]);

    // Reported failures are carried forward instead of re-bisected everywhere
    assert!(reconciler.source().queries.len() < 200);
}

#[test]
fn scenario_interruption_keeps_committed_attributions() {
    let cancel = CancelFlag::new();
    let chain = FabricatedChain::new(100_000, &[(10_000, 1), (40_000, 2), (70_000, 3)]);
    let ledger = RecordingLedger {
        cancel_after: Some((2, cancel.clone())),
        ..RecordingLedger::accepting()
    };
    let mut reconciler = Reconciler::new(Network::Mainnet.params(), chain, ledger)
        .unwrap()
        .with_cancel_flag(cancel);

    let report = reconciler.run(100_000).unwrap();
    assert!(report.interrupted);
    assert!(!report.consistent);
    assert_eq!(report.attributed_delta_count, 2);
    assert_eq!(report.attributed_delta_total, 3);
    assert_eq!(reconciler.ledger().deltas.len(), 2);
}

#[test]
fn scenario_transport_error_propagates_and_ledger_survives() {
    let mut chain = FabricatedChain::new(100_000, &[(10_000, 1), (70_000, 3)]);
    // Enough queries to attribute the first anomaly, then the link drops
    chain.fail_at_query = Some(30);
    let mut reconciler =
        Reconciler::new(Network::Mainnet.params(), chain, RecordingLedger::accepting()).unwrap();

    let err = reconciler.run(100_000).unwrap_err();
    assert!(matches!(err, ReconcileError::Source(SourceError::Transport(_))));
    assert_eq!(reconciler.ledger().deltas.get(&10_000), Some(&1));
}

#[test]
fn scenario_miner_ledger_end_to_end() {
    let chain = FabricatedChain::new(700_000, &[(653_601, 625_000_000), (12_345, 7)]);
    let mut reconciler =
        Reconciler::new(Network::Mainnet.params(), chain, MinerLedger::new(Network::Mainnet)).unwrap();

    let report = reconciler.run(700_000).unwrap();
    assert!(report.consistent);
    assert_eq!(report.attributed_delta_count, 2);
    assert_eq!(report.attributed_delta_total, 625_000_007);

    let ledger = reconciler.ledger();
    let record = ledger.get(653_601).unwrap();
    assert_eq!(record.miner_address, MINER);
    assert_eq!(record.deviation, 625_000_000);
    assert_eq!(ledger.miner_totals()[MINER].blocks, 2);

    // A second pass with the populated ledger matches at the tip immediately
    let report = reconciler.run(700_000).unwrap();
    assert!(report.consistent);
    assert_eq!(report.source_queries, 1);
    assert_eq!(report.attributed_delta_count, 0);
}

#[test]
fn scenario_over_issuance_is_never_attributed() {
    let chain = FabricatedChain::new(30_000, &[(25_000, -1)]);
    let mut reconciler =
        Reconciler::new(Network::Mainnet.params(), chain, MinerLedger::new(Network::Mainnet)).unwrap();

    let report = reconciler.run(30_000).unwrap();
    assert!(!report.consistent);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].height, 25_000);
    assert_eq!(report.unresolved[0].residual, -1);
    assert!(reconciler.ledger().is_empty());
}

#[test]
fn scenario_rerun_grows_existing_record_instead_of_blaming_neighbour() {
    let mut ledger = MinerLedger::new(Network::Mainnet);
    let earlier = BlockData::ids_only(30_000, hash_for(30_000), 1)
        .with_coinbase(Coinbase::new(vec![CoinbaseOutput::new(1, vec![MINER.to_string()])]));
    ledger.attribute(&earlier, 1_000, 900).unwrap();

    // The chain under-claimed 150 at that height, but the ledger only knew about 100
    let chain = FabricatedChain::new(100_000, &[(30_000, 150)]);
    let mut reconciler = Reconciler::new(Network::Mainnet.params(), chain, ledger).unwrap();

    let report = reconciler.run(100_000).unwrap();
    assert!(report.consistent);
    assert_eq!(report.attributed_delta_count, 1);
    assert_eq!(report.attributed_delta_total, 50);

    let records: Vec<(u64, i64)> = reconciler.ledger().records().map(|r| (r.height, r.deviation)).collect();
    assert_eq!(records, vec![(30_000, 150)]);
}
