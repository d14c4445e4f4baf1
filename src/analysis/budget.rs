//! Mass inventory of the water column per species.

use std::collections::BTreeMap;

use crate::biology::PhytoplanktonArray;
use crate::chemistry::Species;
use crate::mesh::TriangularMesh;
use crate::state::{Field, FieldArena};
use crate::types::NodeIndex;
use crate::vertical::Layers;

/// Total mass (g) of each species in the water column.
///
/// Nutrient bound in phytoplankton is already counted in the inorganic
/// tracers; carbon adds the group biomass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MassBudget {
    totals: BTreeMap<Species, f64>,
}

impl MassBudget {
    /// Integrate every carried tracer and the phytoplankton carbon.
    pub fn compute(
        mesh: &TriangularMesh,
        layers: &Layers,
        fields: &FieldArena,
        phytoplankton: &PhytoplanktonArray,
    ) -> Self {
        let mut totals = BTreeMap::new();
        for (tracer, field) in fields.iter() {
            *totals.entry(tracer.species()).or_insert(0.0) += integrate(mesh, layers, field);
        }
        let algal: f64 = phytoplankton
            .groups()
            .iter()
            .map(|group| integrate(mesh, layers, group.carbon()))
            .sum();
        if !phytoplankton.is_empty() {
            *totals.entry(Species::Carbon).or_insert(0.0) += algal;
        }
        Self { totals }
    }

    /// Mass of a species (g), zero if nothing is carried.
    pub fn total(&self, species: Species) -> f64 {
        self.totals.get(&species).copied().unwrap_or(0.0)
    }

    /// Species present in the budget.
    pub fn species(&self) -> impl Iterator<Item = Species> + '_ {
        self.totals.keys().copied()
    }

    /// `self − earlier` per species.
    pub fn change_since(&self, earlier: &MassBudget) -> BTreeMap<Species, f64> {
        self.totals
            .keys()
            .chain(earlier.totals.keys())
            .map(|&s| (s, self.total(s) - earlier.total(s)))
            .collect()
    }

    /// Relative change of a species, `None` when the earlier mass is zero.
    pub fn relative_change(&self, earlier: &MassBudget, species: Species) -> Option<f64> {
        let before = earlier.total(species);
        if before.abs() > 0.0 {
            Some((self.total(species) - before) / before)
        } else {
            None
        }
    }
}

/// Σ c · A · D · dz over (node × layer).
pub fn integrate(mesh: &TriangularMesh, layers: &Layers, field: &Field) -> f64 {
    let dz = layers.dz();
    NodeIndex::iter(mesh.n_nodes())
        .map(|node| {
            let column = mesh.node_area(node) * mesh.depth(node);
            let i = node.get();
            (0..layers.n_layers()).map(|k| field.get(i, k) * dz[k]).sum::<f64>() * column
        })
        .sum()
}
