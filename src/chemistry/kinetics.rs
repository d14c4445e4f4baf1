//! Bioavailable inorganic nutrient after phytoplankton claim and sorption.

use crate::biology::PhytoplanktonArray;
use crate::error::{EngineError, Result};
use crate::state::{Field, FieldArena, Tracer};

use super::Species;

/// Smallest admissible sorption denominator `1 + Kp · SS`.
pub const DENOMINATOR_EPS: f64 = 1e-9;

/// Per-cell split of an inorganic pool.
#[derive(Clone, Debug)]
pub struct Kinetic {
    /// Raw pool minus phytoplankton-bound nutrient (may be negative)
    pub raw: Field,
    /// Dissolved, bioavailable concentration (never negative)
    pub available: Field,
    /// Sorbed to suspended solids
    pub adsorbed: Field,
}

impl Kinetic {
    /// All-zero split for systems without an inorganic pool.
    pub fn zeros(n_nodes: usize, n_layers: usize) -> Self {
        Self {
            raw: Field::zeros(n_nodes, n_layers),
            available: Field::zeros(n_nodes, n_layers),
            adsorbed: Field::zeros(n_nodes, n_layers),
        }
    }
}

/// Dissolved fraction `1 / (1 + Kp · SS)` at one cell.
///
/// A denominator at or below [`DENOMINATOR_EPS`] (or non-finite) is a
/// numeric instability.
#[inline]
pub fn dissolved_fraction(partition: f64, solids: f64, node: usize, layer: usize) -> Result<f64> {
    let denominator = 1.0 + partition * solids;
    if !denominator.is_finite() || denominator <= DENOMINATOR_EPS {
        return Err(EngineError::instability(
            "sorption",
            node,
            layer,
            format!("1 + Kp·SS = {denominator:e} (Kp = {partition}, SS = {solids})"),
        ));
    }
    Ok(1.0 / denominator)
}

/// Split the summed `pools` of `species` into available and adsorbed parts.
pub(crate) fn partition_pools(
    species: Species,
    pools: &[Tracer],
    partition: f64,
    fields: &FieldArena,
    phytoplankton: &PhytoplanktonArray,
    suspended: &Field,
) -> Result<Kinetic> {
    let (n_nodes, n_layers) = (fields.n_nodes(), fields.n_layers());
    suspended.check_shape("suspended solids", n_nodes, n_layers)?;

    let mut kinetic = Kinetic::zeros(n_nodes, n_layers);
    if pools.is_empty() {
        return Ok(kinetic);
    }

    for node in 0..n_nodes {
        for layer in 0..n_layers {
            let total: f64 = pools.iter().map(|&t| fields.value(t, node, layer)).sum();
            let raw = total - phytoplankton.collect(species, node, layer);
            let clipped = raw.max(0.0);
            let corrected = clipped * dissolved_fraction(partition, suspended.get(node, layer), node, layer)?;
            kinetic.raw.set(node, layer, raw);
            kinetic.available.set(node, layer, corrected);
            kinetic.adsorbed.set(node, layer, clipped - corrected);
        }
    }
    Ok(kinetic)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_dissolved_fraction() {
        assert!((dissolved_fraction(6.0, 0.5, 0, 0).unwrap() - 0.25).abs() < TOL);
        assert_eq!(dissolved_fraction(0.0, 100.0, 0, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_near_singular_denominator_is_fatal() {
        // Kp · SS = -1
        let err = dissolved_fraction(2.0, -0.5, 3, 1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::NumericInstability { node: 3, layer: 1, .. }
        ));
    }

    #[test]
    fn test_output_is_non_negative_for_negative_pools() {
        let fields = FieldArena::new(2, 2)
            .with(Tracer::Phosphate, Field::from_rows(&[-3.0, 2.0], 2))
            .unwrap();
        let phyto = PhytoplanktonArray::empty(2, 2);
        let suspended = Field::constant(2, 2, 1.0);
        let k = partition_pools(
            Species::Phosphorus,
            &[Tracer::Phosphate],
            1.0,
            &fields,
            &phyto,
            &suspended,
        )
        .unwrap();
        assert_eq!(k.raw.get(0, 0), -3.0);
        assert_eq!(k.available.get(0, 1), 0.0);
        assert!((k.available.get(1, 0) - 1.0).abs() < TOL);
        assert!((k.adsorbed.get(1, 0) - 1.0).abs() < TOL);
        assert!(k.available.min() >= 0.0 && k.adsorbed.min() >= 0.0);
    }
}
