//! Memoized cumulative issuance.

use crate::subsidy::SubsidyModel;

/// Append-only table of total issuance through each height.
///
/// `supply[h]` is the sum of every block subsidy from 0 through `h`. The table
/// only grows; values at a fixed height never change for fixed parameters.
#[derive(Debug, Clone)]
pub struct SupplyCache {
    model: SubsidyModel,
    supply: Vec<u64>,
    blocks_computed: u64,
}

impl SupplyCache {
    /// Create an empty cache over `model`.
    pub fn new(model: SubsidyModel) -> Self {
        SupplyCache {
            model,
            supply: Vec::new(),
            blocks_computed: 0,
        }
    }

    /// The subsidy model backing this cache.
    pub fn model(&self) -> &SubsidyModel {
        &self.model
    }

    /// Total issuance through and including `height`.
    pub fn supply_after_height(&mut self, height: u64) -> u64 {
        let index = height as usize;
        if let Some(&cached) = self.supply.get(index) {
            return cached;
        }

        let mut total = self.supply.last().copied().unwrap_or(0);
        self.supply.reserve(index + 1 - self.supply.len());
        for h in self.supply.len() as u64..=height {
            total += self.model.block_subsidy(h);
            self.supply.push(total);
            self.blocks_computed += 1;
        }

        total
    }

    /// Number of heights cached so far.
    pub fn len(&self) -> usize {
        self.supply.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supply.is_empty()
    }

    /// Subsidy evaluations performed over the cache's lifetime.
    pub fn blocks_computed(&self) -> u64 {
        self.blocks_computed
    }
}
