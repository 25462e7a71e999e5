//! Bisecting reconciliation of theoretical against observed supply.
//!
//! Cumulative supply is monotonic and deviations are cumulative, so a match
//! at the right edge of a range certifies the whole range. A mismatch is
//! narrowed by halving the range until a single block is isolated, which is
//! then handed to the [`DeltaLedger`] for attribution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::block::{BlockData, BlockHash};
use crate::cache::SupplyCache;
use crate::network::{NetworkParams, ParamsError};
use crate::source::{ChainDataSource, DeltaLedger, DetailLevel, SourceError};
use crate::subsidy::SubsidyModel;

/// What to do after a block that cannot be attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Stop the search at the first irreconcilable block instead of
    /// continuing to look for more in the rest of the range.
    pub stop_on_first_failure: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        ReconcilePolicy {
            stop_on_first_failure: true,
        }
    }
}

/// Shared cancellation signal, checked before every search step.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag for every clone.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether any clone has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("observed supply {observed} with deviation {deviation} is out of range at height {height}")]
    SupplyOverflow { height: u64, observed: u64, deviation: i64 },
}

/// Theoretical and empirical supply at one height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    pub height: u64,
    pub theoretical: u64,
    /// Observed value corrected by every known deviation at or below `height`.
    pub empirical: u64,
    pub block: BlockData,
}

impl ComparisonResult {
    /// Theoretical and corrected empirical supply agree.
    pub fn is_match(&self) -> bool {
        self.theoretical == self.empirical
    }

    /// `theoretical - empirical`.
    pub fn residual(&self) -> i64 {
        self.theoretical as i64 - self.empirical as i64
    }
}

/// Result of searching one height range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BisectOutcome {
    /// Every deviation in the range is explained.
    Reconciled,
    /// At least one block in the range could not be attributed.
    Unreconciled,
    /// The search was cancelled before the range was fully checked.
    Interrupted,
}

impl BisectOutcome {
    fn and(self, other: BisectOutcome) -> BisectOutcome {
        use BisectOutcome::*;
        match (self, other) {
            (Interrupted, _) | (_, Interrupted) => Interrupted,
            (Unreconciled, _) | (_, Unreconciled) => Unreconciled,
            _ => Reconciled,
        }
    }
}

/// A single block whose deviation the ledger could not explain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedDeviation {
    pub height: u64,
    pub block_hash: BlockHash,
    pub theoretical: u64,
    pub empirical: u64,
    pub residual: i64,
}

/// Summary of one [`Reconciler::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub tip_height: u64,
    /// Every deviation up to the tip is explained. Never set when interrupted.
    pub consistent: bool,
    /// The run was cancelled; the result is not authoritative.
    pub interrupted: bool,
    pub attributed_delta_count: u64,
    pub attributed_delta_total: i64,
    pub unresolved: Vec<UnresolvedDeviation>,
    pub source_queries: u64,
}

#[derive(Debug, Default)]
struct RunState {
    attributed_count: u64,
    attributed_total: i64,
    unresolved: Vec<UnresolvedDeviation>,
    queries: u64,
}

impl RunState {
    /// Residual of unresolved blocks at or below `height`.
    ///
    /// Carried forward so that later comparisons isolate new deviations
    /// rather than re-finding one that was already reported.
    fn unresolved_residual(&self, height: u64) -> i64 {
        self.unresolved
            .iter()
            .filter(|u| u.height <= height)
            .map(|u| u.residual)
            .sum()
    }
}

/// Compares theoretical against observed supply and bisects toward divergence.
pub struct Reconciler<S, L> {
    cache: SupplyCache,
    source: S,
    ledger: L,
    policy: ReconcilePolicy,
    cancel: CancelFlag,
    state: RunState,
}

impl<S: ChainDataSource, L: DeltaLedger> Reconciler<S, L> {
    /// Create a reconciler with a fresh supply cache.
    pub fn new(params: NetworkParams, source: S, ledger: L) -> Result<Self, ParamsError> {
        let model = SubsidyModel::new(params)?;
        Ok(Self::with_cache(SupplyCache::new(model), source, ledger))
    }

    /// Create a reconciler reusing an existing cache.
    pub fn with_cache(cache: SupplyCache, source: S, ledger: L) -> Self {
        Reconciler {
            cache,
            source,
            ledger,
            policy: ReconcilePolicy::default(),
            cancel: CancelFlag::new(),
            state: RunState::default(),
        }
    }

    /// Replace the default [`ReconcilePolicy`].
    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a cancellation flag with the caller (a signal handler, usually).
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The delta ledger, including everything attributed so far.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The theoretical supply cache.
    pub fn cache(&self) -> &SupplyCache {
        &self.cache
    }

    /// The chain data source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Take back the cache, source and ledger.
    pub fn into_parts(self) -> (SupplyCache, S, L) {
        (self.cache, self.source, self.ledger)
    }

    /// Theoretical and corrected empirical supply at `height`.
    pub fn compare(&mut self, height: u64, detail: DetailLevel) -> Result<ComparisonResult, ReconcileError> {
        let theoretical = self.cache.supply_after_height(height);
        let observation = self.source.observed_value(height, detail)?;
        self.state.queries += 1;

        let deviation = self.ledger.cumulative_deviation(height) + self.state.unresolved_residual(height);
        let empirical = observation
            .observed_value
            .checked_add_signed(deviation)
            .ok_or(ReconcileError::SupplyOverflow {
                height,
                observed: observation.observed_value,
                deviation,
            })?;

        debug!(height, theoretical, empirical, ?detail, "compared supply");

        Ok(ComparisonResult {
            height,
            theoretical,
            empirical,
            block: observation.block,
        })
    }

    /// Search `[low, high]` for unexplained deviations.
    ///
    /// Sibling ranges are searched strictly left then right. An empty range
    /// (`low > high`) holds nothing to explain and is reconciled without a query.
    pub fn bisect(&mut self, low: u64, high: u64) -> Result<BisectOutcome, ReconcileError> {
        if low > high {
            return Ok(BisectOutcome::Reconciled);
        }
        if self.cancel.is_cancelled() {
            return Ok(BisectOutcome::Interrupted);
        }

        let detail = if low == high {
            DetailLevel::FullTxData
        } else {
            DetailLevel::IdsOnly
        };
        let comparison = self.compare(high, detail)?;
        if comparison.is_match() {
            return Ok(BisectOutcome::Reconciled);
        }

        if low == high {
            return Ok(self.settle_leaf(comparison));
        }

        let mid = low + (high - low) / 2;
        debug!(low, mid, high, residual = comparison.residual(), "splitting range");

        let left = self.bisect(low, mid)?;
        match left {
            BisectOutcome::Interrupted => return Ok(left),
            BisectOutcome::Unreconciled if self.policy.stop_on_first_failure => return Ok(left),
            _ => {}
        }

        let right = self.bisect(mid + 1, high)?;
        Ok(left.and(right))
    }

    fn settle_leaf(&mut self, comparison: ComparisonResult) -> BisectOutcome {
        let residual = comparison.residual();
        if self
            .ledger
            .record_and_attribute(&comparison.block, comparison.theoretical, comparison.empirical)
        {
            self.state.attributed_count += 1;
            self.state.attributed_total += residual;
            return BisectOutcome::Reconciled;
        }

        warn!(height = comparison.height, residual, "irreconcilable supply deviation");
        self.state.unresolved.push(UnresolvedDeviation {
            height: comparison.height,
            block_hash: comparison.block.hash,
            theoretical: comparison.theoretical,
            empirical: comparison.empirical,
            residual,
        });
        BisectOutcome::Unreconciled
    }

    /// Check every block from genesis through `tip_height`.
    pub fn run(&mut self, tip_height: u64) -> Result<RunReport, ReconcileError> {
        self.state = RunState::default();
        info!(tip_height, "checking supply");

        let outcome = self.bisect(0, tip_height)?;
        let state = std::mem::take(&mut self.state);

        let report = RunReport {
            tip_height,
            consistent: outcome == BisectOutcome::Reconciled,
            interrupted: outcome == BisectOutcome::Interrupted,
            attributed_delta_count: state.attributed_count,
            attributed_delta_total: state.attributed_total,
            unresolved: state.unresolved,
            source_queries: state.queries,
        };

        if report.interrupted {
            warn!(attributed = report.attributed_delta_count, "supply check interrupted");
        } else {
            info!(
                consistent = report.consistent,
                attributed = report.attributed_delta_count,
                unresolved = report.unresolved.len(),
                queries = report.source_queries,
                "supply check finished"
            );
        }

        Ok(report)
    }

    /// Ask the source for its tip, then [`run`](Self::run) up to it.
    pub fn run_to_tip(&mut self) -> Result<RunReport, ReconcileError> {
        let tip = self.source.tip_height()?;
        self.run(tip)
    }
}
