//! Block subsidy schedule: slow-start ramp, halvings, and the spacing upgrade.
//!
//! All arithmetic is integer-only. A halving epoch that is off by one doubles
//! or halves a block's legitimate subsidy, so nothing here goes through `f64`.

use crate::network::{NetworkParams, ParamsError};

/// Computes per-block issuance for one set of network parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsidyModel {
    params: NetworkParams,
}

impl SubsidyModel {
    /// Create a model, rejecting parameters that fail [`NetworkParams::validate`].
    pub fn new(params: NetworkParams) -> Result<Self, ParamsError> {
        Ok(SubsidyModel {
            params: params.validate()?,
        })
    }

    /// The parameters this model was built with.
    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// Whether the spacing upgrade is active at `height`.
    pub fn is_activated(&self, height: u64) -> bool {
        match self.params.activation_height {
            Some(activation) => height >= activation,
            None => false,
        }
    }

    /// Subsidy increment per block during the slow-start ramp.
    pub fn slow_start_rate(&self) -> u64 {
        if self.params.slow_start_interval == 0 {
            return 0;
        }
        self.params.max_block_subsidy / self.params.slow_start_interval
    }

    /// Number of halvings that have occurred by `height`.
    ///
    /// After activation the pre- and post-activation stretches are weighted by
    /// their own halving intervals and summed as exact rationals.
    pub fn halving(&self, height: u64) -> u64 {
        let shift = self.params.slow_start_shift();
        if height < shift {
            return 0;
        }

        match self.params.activation_height {
            Some(activation) if height >= activation => floor_sum_of_fractions(
                activation - shift,
                self.params.pre_activation_halving_interval,
                height - activation,
                self.params.post_activation_halving_interval(),
            ),
            _ => (height - shift) / self.params.pre_activation_halving_interval,
        }
    }

    /// Newly issued amount (in zatoshis) for the block at `height`.
    pub fn block_subsidy(&self, height: u64) -> u64 {
        let shift = self.params.slow_start_shift();

        // First half of the ramp
        if height < shift {
            return self.slow_start_rate() * height;
        }

        // Second half is one step ahead so both halves mirror each other
        if height < self.params.slow_start_interval {
            return self.slow_start_rate() * (height + 1);
        }

        let halvings = self.halving(height);
        if halvings >= 64 {
            return 0;
        }

        if self.is_activated(height) {
            // Blocks come `ratio` times faster, so each one carries `ratio` times less
            let divisor = u128::from(self.params.spacing_ratio()) << halvings;
            (u128::from(self.params.max_block_subsidy) / divisor) as u64
        } else {
            self.params.max_block_subsidy >> halvings
        }
    }
}

/// Compute `floor(u/x + v/y)` exactly as `(u*y + v*x) / (x*y)`.
///
/// Operands are widened to `u128` before multiplying. A result too large for
/// `u64` saturates. Panics if `x` or `y` is zero.
pub fn floor_sum_of_fractions(u: u64, x: u64, v: u64, y: u64) -> u64 {
    let (u, x, v, y) = (u as u128, x as u128, v as u128, y as u128);
    u64::try_from((u * y + v * x) / (x * y)).unwrap_or(u64::MAX)
}
