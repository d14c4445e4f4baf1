//! Equilibrium partition of an inorganic nutrient pool.
//!
//! The abiotic part `x` of a total inorganic pool `P` (dissolved plus
//! sorbed) is the root of the biogenic residual
//!
//! ```text
//! f(x) = x − P + Σ_g C_g / r_g(x · f_d)
//! ```
//!
//! where `r_g` is the carbon-to-nutrient curve of group `g` evaluated at the
//! free dissolved concentration and `f_d = 1 / (1 + Kp · SS)`. The root is
//! bracketed by `[0, P]` and refined by linear interpolation between the
//! bracket ends (regula falsi), replacing the end that shares the sign of
//! the residual at the candidate.
//!
//! When the residual does not change sign over the bracket the matching
//! end is returned: a non-negative residual at zero means biomass demand
//! exhausts the pool, a non-positive residual at `P` means no biomass.
//!
//! The search stops when the residual is exactly zero, when the relative
//! change of the candidate drops below the threshold, or when the step
//! budget is exhausted. The last candidate is always returned.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Search settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Maximum number of interpolation steps
    pub steps: usize,
    /// Relative change below which the search has converged
    pub threshold: f64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            steps: 10,
            threshold: 0.01,
        }
    }
}

impl PartitionConfig {
    /// Set the step budget.
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// Set the convergence threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Check settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps == 0 {
            return Err(ConfigError::invalid("partition", "steps", 0.0));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(ConfigError::invalid("partition", "threshold", self.threshold));
        }
        Ok(())
    }
}

/// Result of one search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PartitionOutcome {
    /// Abiotic part of the pool
    pub split: f64,
    /// Interpolation steps taken
    pub iterations: usize,
    /// Check if the search met its stopping criterion
    pub converged: bool,
    /// Relative change at the last step
    pub change: f64,
}

impl PartitionOutcome {
    /// Nutrient claimed by phytoplankton, `P − split`.
    #[inline]
    pub fn biogenic(&self, inorganic: f64) -> f64 {
        inorganic - self.split
    }
}

/// Find the abiotic split of `inorganic` with the given residual function.
pub fn equilibrium_split(
    inorganic: f64,
    config: &PartitionConfig,
    residual: impl Fn(f64) -> f64,
) -> PartitionOutcome {
    if inorganic <= 0.0 || !inorganic.is_finite() {
        return PartitionOutcome {
            split: inorganic.max(0.0),
            iterations: 0,
            converged: true,
            change: 0.0,
        };
    }

    // Demand exceeds the pool even with no free nutrient
    if residual(0.0) >= 0.0 {
        return PartitionOutcome {
            split: 0.0,
            iterations: 0,
            converged: true,
            change: 0.0,
        };
    }
    if residual(inorganic) <= 0.0 {
        return PartitionOutcome {
            split: inorganic,
            iterations: 0,
            converged: true,
            change: 0.0,
        };
    }

    let mut labile = 0.0;
    let mut refractory = inorganic;
    let mut previous = inorganic;
    let mut split = inorganic;
    let mut change = f64::INFINITY;

    for iteration in 1..=config.steps {
        let a = residual(labile);
        let b = residual(refractory);
        if b == a {
            // Flat residual: no interpolation possible
            return PartitionOutcome {
                split,
                iterations: iteration,
                converged: a == 0.0,
                change,
            };
        }

        split = (labile * b - refractory * a) / (b - a);
        let c = residual(split);
        change = if previous != 0.0 {
            ((split - previous) / previous).abs()
        } else {
            split.abs()
        };

        if c == 0.0 || change < config.threshold {
            return PartitionOutcome {
                split,
                iterations: iteration,
                converged: true,
                change,
            };
        }

        previous = split;
        if c * a < 0.0 {
            refractory = split;
        } else {
            labile = split;
        }
    }

    PartitionOutcome {
        split,
        iterations: config.steps,
        converged: false,
        change,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn test_no_sorption_no_biomass_is_fully_dissolved() {
        let inorganic = 100.0;
        let outcome = equilibrium_split(inorganic, &PartitionConfig::default(), |x| x - inorganic);
        assert!(outcome.converged);
        assert!((outcome.split - inorganic).abs() < TOL);
        assert!(outcome.biogenic(inorganic).abs() < TOL);
    }

    #[test]
    fn test_nonlinear_root_is_bracketed() {
        // Biomass holding 2/(1 + x) of nutrient
        let inorganic = 3.0;
        let residual = |x: f64| x - inorganic + 2.0 / (1.0 + x);
        let config = PartitionConfig::default().with_steps(50).with_threshold(1e-8);
        let outcome = equilibrium_split(inorganic, &config, residual);
        assert!(outcome.converged);
        assert!(outcome.split > 0.0 && outcome.split < inorganic);
        assert!(residual(outcome.split).abs() < 1e-6);
    }

    #[test]
    fn test_budget_exhaustion_returns_last_candidate() {
        let inorganic = 10.0;
        let residual = |x: f64| (x - 1.0).powi(3) + 0.01 * x - inorganic * 0.1;
        let config = PartitionConfig::default().with_steps(2).with_threshold(1e-12);
        let outcome = equilibrium_split(inorganic, &config, residual);
        assert_eq!(outcome.iterations, 2);
        assert!(!outcome.converged);
        assert!(outcome.split.is_finite());
    }

    #[test]
    fn test_demand_exceeding_pool_claims_everything() {
        let outcome = equilibrium_split(1.0, &PartitionConfig::default(), |x| x - 1.0 + 2.0);
        assert_eq!(outcome.split, 0.0);
        assert_eq!(outcome.biogenic(1.0), 1.0);
    }

    #[test]
    fn test_empty_pool() {
        let outcome = equilibrium_split(0.0, &PartitionConfig::default(), |x| x);
        assert_eq!(outcome.split, 0.0);
        assert!(outcome.converged);
    }

    #[test]
    fn test_invalid_config() {
        assert!(PartitionConfig::default().with_steps(0).validate().is_err());
        assert!(PartitionConfig::default().with_threshold(-1.0).validate().is_err());
    }
}
