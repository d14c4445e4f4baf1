//! Integration tests for the equilibrium partition of nutrient pools.
//!
//! These tests verify:
//! 1. The regula falsi search finds the root of a biogenic residual
//! 2. The bracket end points are returned when no root exists inside
//! 3. Quotas assigned by the array respect the pool and curve bounds

use wq_rs::biology::{GroupConfig, PartitionConfig, PhytoplanktonArray, equilibrium_split};
use wq_rs::chemistry::Species;
use wq_rs::state::Field;

const TOL: f64 = 1e-6;

/// Diatoms at 1 g C/m³ and flagellates at 0.5 g C/m³ in a 2 × 3 grid.
fn create_array() -> PhytoplanktonArray {
    PhytoplanktonArray::new(
        vec![
            GroupConfig::flagellate(1).with_initial_carbon(0.5),
            GroupConfig::diatom(0).with_initial_carbon(1.0),
        ],
        2,
        3,
    )
    .unwrap()
}

// ============================================================================
// Root search
// ============================================================================

#[test]
fn test_split_solves_saturating_demand() {
    // Two groups with Michaelis-Menten shaped demand
    let inorganic = 1.0;
    let demand = |x: f64| 0.3 * x / (0.1 + x) + 0.2 * x / (0.5 + x);
    let config = PartitionConfig::default().with_steps(100).with_threshold(1e-10);
    let outcome = equilibrium_split(inorganic, &config, |x| x - inorganic + demand(x));

    assert!(outcome.converged);
    assert!(outcome.split > 0.0 && outcome.split < inorganic);
    let residual = outcome.split - inorganic + demand(outcome.split);
    assert!(residual.abs() < TOL, "residual {residual}");
    assert!((outcome.biogenic(inorganic) - demand(outcome.split)).abs() < TOL);
}

#[test]
fn test_exhausted_pool_returns_zero_split() {
    let outcome = equilibrium_split(0.1, &PartitionConfig::default(), |x| x - 0.1 + 0.5);
    assert_eq!(outcome.split, 0.0);
    assert_eq!(outcome.iterations, 0);
    assert!(outcome.converged);
}

#[test]
fn test_step_budget_is_reported() {
    let inorganic = 50.0;
    let config = PartitionConfig::default().with_steps(1).with_threshold(1e-14);
    let outcome = equilibrium_split(inorganic, &config, |x| {
        x - inorganic + 40.0 * (1.0 - (-0.01 * x).exp())
    });
    assert!(!outcome.converged);
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.split > 0.0 && outcome.split <= inorganic);
}

// ============================================================================
// Quota assignment
// ============================================================================

#[test]
fn test_quotas_fit_pool_and_curves() {
    let mut array = create_array();
    let inorganic = Field::constant(2, 3, 0.05);
    let solids = Field::zeros(2, 3);
    let config = PartitionConfig::default().with_steps(50).with_threshold(1e-8);
    array
        .stoichiometry(Species::Phosphorus, &inorganic, 0.0, &solids, &config)
        .unwrap();

    for node in 0..2 {
        for layer in 0..3 {
            let bound = array.collect(Species::Phosphorus, node, layer);
            assert!(bound <= inorganic.get(node, layer) + TOL);
            for group in array.groups() {
                let curve = group.config().stoichiometry.phosphorus;
                let (low, high) = curve.bounds();
                let quota = group.ratio(Species::Phosphorus, node, layer);
                assert!(quota >= low - TOL && quota <= high + TOL, "group {}", group.id());
            }
        }
    }
}

#[test]
fn test_richer_pool_raises_quotas() {
    let solids = Field::zeros(2, 3);
    let config = PartitionConfig::default().with_steps(50).with_threshold(1e-8);
    let quotas = |total: f64| {
        let mut array = create_array();
        array
            .stoichiometry(Species::Phosphorus, &Field::constant(2, 3, total), 0.0, &solids, &config)
            .unwrap();
        array
            .groups()
            .iter()
            .map(|g| g.ratio(Species::Phosphorus, 0, 0))
            .collect::<Vec<_>>()
    };

    let lean = quotas(0.05);
    let rich = quotas(0.1);
    assert!(rich[0] >= lean[0]);
    assert!(rich[1] > lean[1]);
}

#[test]
fn test_silica_skips_groups_without_skeleton() {
    let mut array = create_array();
    let before = array.groups()[1].ratio(Species::Silica, 0, 0);
    let solids = Field::zeros(2, 3);
    array
        .stoichiometry(
            Species::Silica,
            &Field::constant(2, 3, 0.5),
            0.0,
            &solids,
            &PartitionConfig::default(),
        )
        .unwrap();
    assert_eq!(array.groups()[1].ratio(Species::Silica, 0, 0), before);
    assert!(array.groups()[0].ratio(Species::Silica, 0, 0) > 0.0);
}
