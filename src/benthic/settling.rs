//! Vertical settling of particulate matter and deposition to the bed.
//!
//! Each step a layer loses the fraction
//!
//! ```text
//! f_k = min(v_s · θ_col^(T − 20) · dt / (D · dz_k), 1)
//! ```
//!
//! of its settling mass to the layer below. The mass leaving the bed
//! layer is split: `min(net · θ_dep^(T − 20), 1)` of it is deposited in
//! the sediment and the rest stays in the bed layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::biology::PhytoplanktonGroup;
use crate::chemistry::{REFERENCE_TEMPERATURE, Species};
use crate::error::{ConfigError, EngineWarning, Result};
use crate::mesh::TriangularMesh;
use crate::state::{Field, FieldArena, Tracer};
use crate::time::SECONDS_PER_DAY;
use crate::types::NodeIndex;
use crate::vertical::Layers;

use super::sediment::Sediment;

/// Settling velocities and deposition corrections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlingConfig {
    /// Particulate organic matter velocity (m/day)
    pub organic_velocity: f64,
    /// Velocity of the sorbed inorganic phase (m/day)
    pub sorbed_velocity: f64,
    /// Temperature coefficient of settling in the water column
    pub column_theta: f64,
    /// Temperature coefficient of net deposition at the bed
    pub deposition_theta: f64,
    /// Net deposition fraction per species; absent species deposit fully
    pub net_deposition: BTreeMap<Species, f64>,
}

impl Default for SettlingConfig {
    fn default() -> Self {
        Self {
            organic_velocity: 1.0,
            sorbed_velocity: 0.0,
            column_theta: 1.027,
            deposition_theta: 1.027,
            net_deposition: BTreeMap::new(),
        }
    }
}

impl SettlingConfig {
    /// Set the organic settling velocity.
    pub fn with_organic_velocity(mut self, velocity: f64) -> Self {
        self.organic_velocity = velocity;
        self
    }

    /// Set the sorbed-phase settling velocity.
    pub fn with_sorbed_velocity(mut self, velocity: f64) -> Self {
        self.sorbed_velocity = velocity;
        self
    }

    /// Set the net deposition fraction of a species.
    pub fn with_net_deposition(mut self, species: Species, fraction: f64) -> Self {
        self.net_deposition.insert(species, fraction);
        self
    }

    /// Check velocities, coefficients and fractions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("organic_velocity", self.organic_velocity),
            ("sorbed_velocity", self.sorbed_velocity),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid("settling", name, value));
            }
        }
        for (name, value) in [
            ("column_theta", self.column_theta),
            ("deposition_theta", self.deposition_theta),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid("settling", name, value));
            }
        }
        for &fraction in self.net_deposition.values() {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(ConfigError::invalid("settling", "net_deposition", fraction));
            }
        }
        Ok(())
    }
}

/// Geometry and forcing of one settling pass.
#[derive(Clone, Copy, Debug)]
pub struct SettlingEnv<'a> {
    pub mesh: &'a TriangularMesh,
    pub layers: &'a Layers,
    /// Water temperature (°C), node × layer
    pub temperature: &'a Field,
    /// Suspended solids (g/m³), node × layer
    pub suspended: &'a Field,
    /// Step (s)
    pub dt: f64,
}

impl SettlingEnv<'_> {
    fn volume(&self, node: NodeIndex, layer: usize) -> f64 {
        self.mesh.node_area(node) * self.mesh.depth(node) * self.layers.dz()[layer]
    }

    fn anomaly(&self, node: usize, layer: usize) -> f64 {
        self.temperature.get(node, layer) - REFERENCE_TEMPERATURE
    }
}

/// Mass accounting of one settling pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SinkOutcome {
    /// Mass deposited in the sediment (g)
    pub exported: f64,
    /// Cells whose fraction was capped at one
    pub capped: usize,
}

/// Settling operator.
#[derive(Clone, Debug)]
pub struct Settling {
    config: SettlingConfig,
}

impl Settling {
    /// Validate and build.
    pub fn new(config: SettlingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Particulate organic velocity (m/day).
    pub fn organic_velocity(&self) -> f64 {
        self.config.organic_velocity
    }

    /// Sorbed inorganic velocity (m/day).
    pub fn sorbed_velocity(&self) -> f64 {
        self.config.sorbed_velocity
    }

    /// Net deposition fraction of a species.
    pub fn net_deposition(&self, species: Species) -> f64 {
        self.config.net_deposition.get(&species).copied().unwrap_or(1.0)
    }

    /// Settle one tracer field and deposit the bed outflow.
    ///
    /// `share` restricts settling to a per-cell fraction of the
    /// concentration (the sorbed phase); `None` settles all of it.
    #[allow(clippy::too_many_arguments)]
    pub fn sink(
        &self,
        env: &SettlingEnv<'_>,
        tracer: Tracer,
        field: &mut Field,
        velocity: f64,
        share: Option<&Field>,
        net: f64,
        sediment: &mut Sediment,
    ) -> Result<SinkOutcome> {
        let (outflow, capped) = self.column_transfer(env, field, velocity, share)?;
        let mut exported = 0.0;
        for (node, mass) in outflow.into_iter().enumerate() {
            let deposited = self.deposit(env, field, node, mass, net);
            let area = env.mesh.node_area(NodeIndex::new(node));
            sediment.conversion(tracer, node, deposited / area)?;
            exported += deposited;
        }
        trace!(%tracer, exported, "settled");
        Ok(SinkOutcome { exported, capped })
    }

    /// Settle a phytoplankton group with its bound nutrients.
    ///
    /// Nutrient bound in biomass is carried by the inorganic tracers of its
    /// species, so `ratio · C` of that pool sinks with the carbon. Bound
    /// nitrogen is drawn from ammonium and nitrate in proportion to their
    /// concentrations.
    pub fn settle_group(
        &self,
        env: &SettlingEnv<'_>,
        group: &mut PhytoplanktonGroup,
        fields: &mut FieldArena,
        sediment: &mut Sediment,
    ) -> Result<Vec<EngineWarning>> {
        let velocity = group.config().settling;
        let mut warnings = Vec::new();
        if velocity <= 0.0 {
            return Ok(warnings);
        }

        let bound: [(Species, &[Tracer]); 3] = [
            (Species::Phosphorus, &[Tracer::Phosphate]),
            (Species::Nitrogen, &[Tracer::Ammonium, Tracer::Nitrate]),
            (Species::Silica, &[Tracer::Silicate]),
        ];
        for (species, pool) in bound {
            let present: Vec<Tracer> = pool.iter().copied().filter(|&t| fields.contains(t)).collect();
            if group.config().stoichiometry.curve(species).is_none() || present.is_empty() {
                continue;
            }
            let mut share = Field::zeros(env.mesh.n_nodes(), env.layers.n_layers());
            for tracer in &present {
                let field = fields.get(*tracer)?;
                field.check_shape("settling field", share.n_rows(), share.n_layers())?;
                for node in 0..share.n_rows() {
                    for layer in 0..share.n_layers() {
                        share.add(node, layer, field.get(node, layer).max(0.0));
                    }
                }
            }
            for node in 0..share.n_rows() {
                for layer in 0..share.n_layers() {
                    let total = share.get(node, layer);
                    let fraction = if total > 0.0 {
                        (group.nutrient(species, node, layer) / total).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    share.set(node, layer, fraction);
                }
            }

            let net = self.net_deposition(species);
            for tracer in present {
                let field = fields.get_mut(tracer)?;
                let (outflow, capped) = self.column_transfer(env, field, velocity, Some(&share))?;
                for (node, mass) in outflow.into_iter().enumerate() {
                    let deposited = self.deposit(env, field, node, mass, net);
                    let area = env.mesh.node_area(NodeIndex::new(node));
                    sediment.conversion_algal(species, node, deposited / area)?;
                }
                if capped > 0 {
                    warnings.push(EngineWarning::SettlingCapped { tracer, cells: capped });
                }
            }
        }

        let net = self.net_deposition(Species::Carbon);
        let carbon = group.carbon_mut();
        let (outflow, _) = self.column_transfer(env, carbon, velocity, None)?;
        for (node, mass) in outflow.into_iter().enumerate() {
            let deposited = self.deposit(env, carbon, node, mass, net);
            let area = env.mesh.node_area(NodeIndex::new(node));
            sediment.conversion_algal(Species::Carbon, node, deposited / area)?;
        }
        trace!(group = group.id(), "group settled");
        Ok(warnings)
    }

    /// Move settling mass down each column.
    ///
    /// Returns the mass leaving the bed layer per node (g) and the number
    /// of capped cells. Fractions are evaluated on the start-of-pass
    /// concentrations, so mass descends at most one layer per pass.
    fn column_transfer(
        &self,
        env: &SettlingEnv<'_>,
        field: &mut Field,
        velocity: f64,
        share: Option<&Field>,
    ) -> Result<(Vec<f64>, usize)> {
        let (n_nodes, n_layers) = (env.mesh.n_nodes(), env.layers.n_layers());
        field.check_shape("settling field", n_nodes, n_layers)?;
        env.temperature.check_shape("temperature", n_nodes, n_layers)?;
        if let Some(share) = share {
            share.check_shape("settling share", n_nodes, n_layers)?;
        }

        let dz = env.layers.dz();
        let mut outflow = vec![0.0; n_nodes];
        let mut capped = 0;
        let mut moved = vec![0.0; n_layers];

        for node in NodeIndex::iter(n_nodes) {
            let i = node.get();
            let depth = env.mesh.depth(node);
            for (k, mass) in moved.iter_mut().enumerate() {
                let speed = velocity * self.config.column_theta.powf(env.anomaly(i, k));
                let raw = speed * env.dt / (SECONDS_PER_DAY as f64 * depth * dz[k]);
                if raw > 1.0 {
                    capped += 1;
                }
                let fraction = raw.min(1.0) * share.map_or(1.0, |s| s.get(i, k).clamp(0.0, 1.0));
                *mass = fraction * field.get(i, k).max(0.0) * env.volume(node, k);
            }
            for (k, &mass) in moved.iter().enumerate() {
                field.add(i, k, -mass / env.volume(node, k));
                if k + 1 < n_layers {
                    field.add(i, k + 1, mass / env.volume(node, k + 1));
                }
            }
            outflow[i] = moved[n_layers - 1];
        }
        Ok((outflow, capped))
    }

    /// Return the non-deposited part of the bed outflow to the bed layer.
    fn deposit(&self, env: &SettlingEnv<'_>, field: &mut Field, node: usize, mass: f64, net: f64) -> f64 {
        let bed = env.layers.n_layers() - 1;
        let correction = (net * self.config.deposition_theta.powf(env.anomaly(node, bed))).min(1.0);
        let deposited = correction * mass;
        field.add(node, bed, (mass - deposited) / env.volume(NodeIndex::new(node), bed));
        deposited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benthic::SedimentConfig;
    use crate::biology::GroupConfig;

    const TOL: f64 = 1e-10;

    fn setup() -> (TriangularMesh, Layers, Field, Field) {
        let mesh = TriangularMesh::rectangle(1, 1, 10.0, 10.0, 2.0).unwrap();
        let layers = Layers::uniform(3).unwrap();
        let temperature = Field::constant(4, 2, 20.0);
        let suspended = Field::zeros(4, 2);
        (mesh, layers, temperature, suspended)
    }

    fn column_mass(mesh: &TriangularMesh, layers: &Layers, field: &Field) -> f64 {
        (0..mesh.n_nodes())
            .map(|i| {
                let node = NodeIndex::new(i);
                (0..layers.n_layers())
                    .map(|k| field.get(i, k) * mesh.node_area(node) * mesh.depth(node) * layers.dz()[k])
                    .sum::<f64>()
            })
            .sum()
    }

    #[test]
    fn test_deposits_configured_fraction() {
        let (mesh, layers, temperature, suspended) = setup();
        let env = SettlingEnv {
            mesh: &mesh,
            layers: &layers,
            temperature: &temperature,
            suspended: &suspended,
            dt: 43_200.0,
        };
        // 1 m/day over half a day through 1 m layers: fraction 0.5
        let settling = Settling::new(SettlingConfig::default()).unwrap();
        let mut sediment = Sediment::new(SedimentConfig::default(), mesh.n_nodes()).unwrap();
        let mut field = Field::constant(4, 2, 2.0);
        let before = column_mass(&mesh, &layers, &field);

        let outcome = settling
            .sink(&env, Tracer::LabilePoc, &mut field, 1.0, None, 1.0, &mut sediment)
            .unwrap();

        assert_eq!(outcome.capped, 0);
        assert!((field.get(0, 0) - 1.0).abs() < TOL);
        assert!((field.get(0, 1) - 2.0).abs() < TOL);
        let after = column_mass(&mesh, &layers, &field);
        assert!((before - after - outcome.exported).abs() < TOL);
        let deposited: f64 = (0..4)
            .map(|i| sediment.deposited(Tracer::LabilePoc, i) * mesh.node_area(NodeIndex::new(i)))
            .sum();
        assert!((deposited - outcome.exported).abs() < TOL);
    }

    #[test]
    fn test_partial_net_deposition_keeps_remainder() {
        let (mesh, layers, temperature, suspended) = setup();
        let env = SettlingEnv {
            mesh: &mesh,
            layers: &layers,
            temperature: &temperature,
            suspended: &suspended,
            dt: 43_200.0,
        };
        let settling = Settling::new(SettlingConfig::default().with_net_deposition(Species::Carbon, 0.25))
            .unwrap();
        let mut sediment = Sediment::new(SedimentConfig::default(), mesh.n_nodes()).unwrap();
        let mut field = Field::constant(4, 2, 2.0);
        let before = column_mass(&mesh, &layers, &field);
        let net = settling.net_deposition(Species::Carbon);
        let outcome = settling
            .sink(&env, Tracer::LabilePoc, &mut field, 1.0, None, net, &mut sediment)
            .unwrap();
        // Bed loses 1.0 g/m³ of which a quarter is deposited
        assert!((field.get(0, 1) - 2.75).abs() < TOL);
        let after = column_mass(&mesh, &layers, &field);
        assert!((before - after - outcome.exported).abs() < TOL);
    }

    #[test]
    fn test_fraction_capped() {
        let (mesh, layers, temperature, suspended) = setup();
        let env = SettlingEnv {
            mesh: &mesh,
            layers: &layers,
            temperature: &temperature,
            suspended: &suspended,
            dt: 86_400.0,
        };
        let settling = Settling::new(SettlingConfig::default()).unwrap();
        let mut sediment = Sediment::new(SedimentConfig::default(), mesh.n_nodes()).unwrap();
        let mut field = Field::constant(4, 2, 1.0);
        let outcome = settling
            .sink(&env, Tracer::LabilePoc, &mut field, 5.0, None, 1.0, &mut sediment)
            .unwrap();
        assert_eq!(outcome.capped, 8);
        assert!(field.min() >= 0.0);
    }

    #[test]
    fn test_group_carries_bound_nutrient() {
        let (mesh, layers, temperature, suspended) = setup();
        let env = SettlingEnv {
            mesh: &mesh,
            layers: &layers,
            temperature: &temperature,
            suspended: &suspended,
            dt: 86_400.0,
        };
        let settling = Settling::new(SettlingConfig::default()).unwrap();
        let mut sediment = Sediment::new(SedimentConfig::default(), mesh.n_nodes()).unwrap();
        let config = GroupConfig::diatom(0).with_settling(0.5).with_initial_carbon(1.0);
        let mut group = PhytoplanktonGroup::new(config, 4, 2).unwrap();
        let mut fields = FieldArena::uniform(4, 2, &[Tracer::Phosphate], 1.0);

        settling.settle_group(&env, &mut group, &mut fields, &mut sediment).unwrap();

        // Half of the bed-layer biomass leaves the column
        let quota = 1.0 / 40.0;
        assert!((group.carbon().get(0, 0) - 0.5).abs() < TOL);
        assert!((group.carbon().get(0, 1) - 1.0).abs() < TOL);
        assert!((fields.value(Tracer::Phosphate, 0, 0) - (1.0 - 0.5 * quota)).abs() < TOL);
        assert!((fields.value(Tracer::Phosphate, 0, 1) - 1.0).abs() < TOL);
        assert!((sediment.deposited_algal(Species::Carbon, 0) - 0.5).abs() < TOL);
        assert!((sediment.deposited_algal(Species::Phosphorus, 0) - 0.5 * quota).abs() < TOL);
    }
}
