//! Ordered collection of phytoplankton groups sharing nutrient pools.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::chemistry::{OCRB, ReactionContext, Species, dissolved_fraction};
use crate::error::{ConfigError, EngineError, EngineWarning, Result};
use crate::mesh::TriangularMesh;
use crate::state::{Field, FieldArena, Tracer};
use crate::time::SECONDS_PER_DAY;
use crate::types::{LayerIndex, NodeIndex};
use crate::vertical::Layers;

use super::group::{GroupConfig, PhytoplanktonGroup};
use super::partition::{PartitionConfig, PartitionOutcome, equilibrium_split};

/// Smallest biomass (g C/m³) whose quota is updated.
const CARBON_EPS: f64 = 1e-12;

/// Oxygen released per gram of nitrate nitrogen assimilated.
const NITRATE_OXYGEN: f64 = 48.0 / 14.0;

/// Light attenuation in the water column.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// Background extinction (1/m)
    pub background_extinction: f64,
    /// Self-shading per unit chlorophyll (m²/mg)
    pub chlorophyll_extinction: f64,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            background_extinction: 0.3,
            chlorophyll_extinction: 0.017,
        }
    }
}

/// Group parameters and light settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhytoplanktonConfig {
    pub groups: Vec<GroupConfig>,
    pub light: LightConfig,
}

impl Default for PhytoplanktonConfig {
    fn default() -> Self {
        Self {
            groups: vec![GroupConfig::diatom(0), GroupConfig::flagellate(1)],
            light: LightConfig::default(),
        }
    }
}

/// Bioavailable dissolved nutrient per cell (g/m³).
#[derive(Clone, Copy, Debug)]
pub struct Availability<'a> {
    pub nitrogen: &'a Field,
    pub phosphorus: &'a Field,
    pub silica: &'a Field,
}

/// Quotas solved for one cell.
struct CellQuota {
    /// New quota per group, `None` where the group is left untouched
    ratios: Vec<Option<f64>>,
    outcome: PartitionOutcome,
}

/// Phytoplankton groups ordered by id.
#[derive(Clone, Debug)]
pub struct PhytoplanktonArray {
    groups: Vec<PhytoplanktonGroup>,
    light: LightConfig,
    n_nodes: usize,
    n_layers: usize,
}

impl PhytoplanktonArray {
    /// Build groups ordered by id.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateGroup`] when two groups share an id, or the
    /// first invalid group parameter.
    pub fn new(
        mut configs: Vec<GroupConfig>,
        n_nodes: usize,
        n_layers: usize,
    ) -> Result<Self, ConfigError> {
        configs.sort_by_key(|c| c.id);
        if let Some(pair) = configs.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(ConfigError::DuplicateGroup(pair[0].id));
        }
        let groups = configs
            .into_iter()
            .map(|c| PhytoplanktonGroup::new(c, n_nodes, n_layers))
            .collect::<Result<Vec<_>, _>>()?;
        info!(groups = groups.len(), "phytoplankton array");
        Ok(Self {
            groups,
            light: LightConfig::default(),
            n_nodes,
            n_layers,
        })
    }

    /// Build from a full configuration.
    pub fn from_config(
        config: &PhytoplanktonConfig,
        n_nodes: usize,
        n_layers: usize,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(config.groups.clone(), n_nodes, n_layers)?.with_light(config.light))
    }

    /// Array without groups.
    pub fn empty(n_nodes: usize, n_layers: usize) -> Self {
        Self {
            groups: Vec::new(),
            light: LightConfig::default(),
            n_nodes,
            n_layers,
        }
    }

    /// Set the light attenuation.
    pub fn with_light(mut self, light: LightConfig) -> Self {
        self.light = light;
        self
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn groups(&self) -> &[PhytoplanktonGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [PhytoplanktonGroup] {
        &mut self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group with the given id.
    pub fn get(&self, id: usize) -> Option<&PhytoplanktonGroup> {
        self.groups.iter().find(|g| g.id() == id)
    }

    /// Replace the carbon field of a group.
    pub fn set_carbon(&mut self, id: usize, carbon: Field) -> Result<()> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id() == id)
            .ok_or(ConfigError::MissingParameter {
                owner: format!("phytoplankton group {id}"),
                parameter: "id",
            })?;
        group.set_carbon(carbon)
    }

    // =========================================================================
    // Reductions
    // =========================================================================

    /// Sum of `f` over groups.
    pub fn sum(&self, f: impl Fn(&PhytoplanktonGroup) -> f64) -> f64 {
        self.groups.iter().map(f).sum()
    }

    /// Check if `f` holds for every group.
    pub fn all(&self, f: impl Fn(&PhytoplanktonGroup) -> bool) -> bool {
        self.groups.iter().all(f)
    }

    /// Nutrient (or carbon) held in biomass at one cell.
    #[inline]
    pub fn collect(&self, species: Species, node: usize, layer: usize) -> f64 {
        self.sum(|g| g.nutrient(species, node, layer))
    }

    /// Total carbon biomass at one cell.
    #[inline]
    pub fn carbon(&self, node: usize, layer: usize) -> f64 {
        self.collect(Species::Carbon, node, layer)
    }

    /// Total chlorophyll at one cell (mg/m³).
    #[inline]
    pub fn chlorophyll(&self, node: usize, layer: usize) -> f64 {
        self.sum(|g| g.chlorophyll(node, layer))
    }

    /// Inorganic concentration left after the biomass claim, never negative.
    #[inline]
    pub fn kinetic(&self, species: Species, concentration: f64, node: usize, layer: usize) -> f64 {
        (concentration - self.collect(species, node, layer)).max(0.0)
    }

    // =========================================================================
    // Equilibrium stoichiometry
    // =========================================================================

    /// Re-partition an inorganic pool between water and biomass.
    ///
    /// `inorganic` is the total inorganic pool per cell (dissolved, sorbed
    /// and biomass-bound), `partition` the sorption coefficient and
    /// `solids` the sorbing particle concentration. Quotas are assigned
    /// in id order; lower ids claim nutrient first.
    ///
    /// Returns one aggregated warning when any cell hit the step budget.
    pub fn stoichiometry(
        &mut self,
        species: Species,
        inorganic: &Field,
        partition: f64,
        solids: &Field,
        config: &PartitionConfig,
    ) -> Result<Option<EngineWarning>> {
        self.check_inputs(inorganic, solids)?;
        let mut cells = Vec::with_capacity(self.n_nodes * self.n_layers);
        for node in 0..self.n_nodes {
            for layer in 0..self.n_layers {
                cells.push(self.solve_cell(species, inorganic, partition, solids, config, node, layer)?);
            }
        }
        Ok(self.assign(species, cells))
    }

    /// Parallel variant of [`Self::stoichiometry`] over cells.
    #[cfg(feature = "parallel")]
    pub fn stoichiometry_parallel(
        &mut self,
        species: Species,
        inorganic: &Field,
        partition: f64,
        solids: &Field,
        config: &PartitionConfig,
    ) -> Result<Option<EngineWarning>> {
        use rayon::prelude::*;

        self.check_inputs(inorganic, solids)?;
        let n_layers = self.n_layers;
        let this: &Self = self;
        let cells = (0..self.n_nodes * n_layers)
            .into_par_iter()
            .map(|cell| {
                this.solve_cell(
                    species,
                    inorganic,
                    partition,
                    solids,
                    config,
                    cell / n_layers,
                    cell % n_layers,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.assign(species, cells))
    }

    fn check_inputs(&self, inorganic: &Field, solids: &Field) -> Result<()> {
        inorganic.check_shape("inorganic pool", self.n_nodes, self.n_layers)?;
        solids.check_shape("sorbing solids", self.n_nodes, self.n_layers)
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_cell(
        &self,
        species: Species,
        inorganic: &Field,
        partition: f64,
        solids: &Field,
        config: &PartitionConfig,
        node: usize,
        layer: usize,
    ) -> Result<CellQuota> {
        let fd = dissolved_fraction(partition, solids.get(node, layer), node, layer)?;
        let total = inorganic.get(node, layer);
        let outcome = equilibrium_split(total, config, |x| {
            x - total + self.sum(|g| g.invert_ratios(species, x * fd, node, layer))
        });
        if !outcome.split.is_finite() {
            return Err(EngineError::instability(
                "equilibrium partition",
                node,
                layer,
                format!("{species} split is {}", outcome.split),
            ));
        }

        let biogenic = outcome.biogenic(total);
        let mut claimed = 0.0;
        let mut ratios = Vec::with_capacity(self.groups.len());
        for (rank, group) in self.groups.iter().enumerate() {
            let carbon = group.carbon().get(node, layer);
            let Some(curve) = group.config().stoichiometry.curve(species) else {
                ratios.push(None);
                continue;
            };
            if carbon <= CARBON_EPS {
                ratios.push(None);
                continue;
            }
            let raw = (biogenic - claimed) / carbon;
            let ratio = if rank < 2 {
                let (low, high) = curve.bounds();
                raw.clamp(low, high)
            } else {
                raw.max(0.0)
            };
            claimed += ratio * carbon;
            ratios.push(Some(ratio));
        }
        Ok(CellQuota { ratios, outcome })
    }

    fn assign(&mut self, species: Species, cells: Vec<CellQuota>) -> Option<EngineWarning> {
        let mut failed = 0;
        let mut worst_change: f64 = 0.0;
        for (cell, quota) in cells.into_iter().enumerate() {
            let (node, layer) = (cell / self.n_layers, cell % self.n_layers);
            if !quota.outcome.converged {
                failed += 1;
                worst_change = worst_change.max(quota.outcome.change);
            }
            for (group, ratio) in self.groups.iter_mut().zip(quota.ratios) {
                if let (Some(ratio), Some(field)) = (ratio, group.ratio_field_mut(species)) {
                    field.set(node, layer, ratio);
                }
            }
        }
        trace!(%species, failed, "stoichiometry");
        (failed > 0).then_some(EngineWarning::PartitionNotConverged {
            species,
            cells: failed,
            worst_change,
        })
    }

    // =========================================================================
    // Growth and losses
    // =========================================================================

    /// Irradiance at the top of each layer and the layer extinction.
    ///
    /// `irradiance` is the surface value per node (W/m²).
    pub fn light_field(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        irradiance: &[f64],
    ) -> Result<(Field, Field)> {
        if irradiance.len() != mesh.n_nodes() {
            return Err(EngineError::dimension_mismatch(
                "surface irradiance",
                mesh.n_nodes().to_string(),
                irradiance.len().to_string(),
            ));
        }
        let n_layers = layers.n_layers();
        let mut top = Field::zeros(mesh.n_nodes(), n_layers);
        let mut extinction = Field::zeros(mesh.n_nodes(), n_layers);
        for node in NodeIndex::iter(mesh.n_nodes()) {
            let i = node.get();
            let mut light = irradiance[i].max(0.0);
            for k in 0..n_layers {
                let ke = self.light.background_extinction
                    + self.light.chlorophyll_extinction * self.chlorophyll(i, k);
                top.set(i, k, light);
                extinction.set(i, k, ke);
                light *= (-ke * layers.thickness(LayerIndex::new(k), mesh.depth(node))).exp();
            }
        }
        Ok((top, extinction))
    }

    /// Add growth and loss tendencies (g/m³/s) to the chemical pools.
    ///
    /// Returns the carbon tendency of each group, in group order.
    pub fn react(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        ctx: &ReactionContext<'_>,
        available: &Availability<'_>,
        irradiance: &[f64],
        tendency: &mut FieldArena,
    ) -> Result<Vec<Field>> {
        let (top, extinction) = self.light_field(mesh, layers, irradiance)?;
        let mut carbon_tendency = Vec::with_capacity(self.groups.len());

        for group in &self.groups {
            let config = group.config();
            let [lp, rp, ld, rd] = config.losses.as_array();
            let mut dc = Field::zeros(self.n_nodes, self.n_layers);

            for node in NodeIndex::iter(self.n_nodes) {
                let i = node.get();
                let depth = mesh.depth(node);
                for k in 0..self.n_layers {
                    let carbon = group.carbon().get(i, k);
                    if carbon <= 0.0 {
                        continue;
                    }
                    let anomaly = ctx.anomaly(i, k);
                    let thickness = layers.thickness(LayerIndex::new(k), depth);

                    let nitrogen = available.nitrogen.get(i, k);
                    let light = group.light_limitation(top.get(i, k), extinction.get(i, k), thickness);
                    let nutrient = group.nutrient_limitation(
                        nitrogen,
                        available.phosphorus.get(i, k),
                        available.silica.get(i, k),
                    );

                    let growth = config.growth.per_second(anomaly) * light * nutrient * carbon;
                    let exuded = config.exudation * growth;
                    let respired = config.respiration.per_second(anomaly) * carbon;
                    let grazed = config.grazing.per_second(anomaly) * carbon;
                    let dead = config.death / SECONDS_PER_DAY as f64 * carbon;
                    let lost = grazed + dead;
                    dc.set(i, k, growth - exuded - respired - lost);

                    // Ammonium preference on the free inorganic nitrogen
                    let nh4 = ctx.value(Tracer::Ammonium, i, k).max(0.0);
                    let no3 = ctx.value(Tracer::Nitrate, i, k).max(0.0);
                    let pool = nh4 + no3;
                    let scale = if pool > 0.0 { nitrogen / pool } else { 0.0 };
                    let preference = group.ammonia_preference(nh4 * scale, no3 * scale);
                    let nitrate_uptake =
                        (1.0 - preference) * group.ratio(Species::Nitrogen, i, k) * (growth - exuded);
                    tendency.transfer(Tracer::Nitrate, Tracer::Ammonium, i, k, nitrate_uptake);

                    tendency.add(Tracer::ExudedDoc, i, k, exuded);
                    tendency.add(
                        Tracer::Oxygen,
                        i,
                        k,
                        OCRB * (growth - respired) + NITRATE_OXYGEN * nitrate_uptake,
                    );

                    // Dead and grazed biomass
                    for (tracer, fraction) in [
                        (Tracer::LabilePoc, lp),
                        (Tracer::RefractoryPoc, rp),
                        (Tracer::LabileDoc, ld),
                        (Tracer::RefractoryDoc, rd),
                    ] {
                        tendency.add(tracer, i, k, fraction * lost);
                    }

                    let released = group.ratio(Species::Phosphorus, i, k) * lost;
                    tendency.add(Tracer::Phosphate, i, k, -released);
                    for (tracer, fraction) in [
                        (Tracer::LabilePop, lp),
                        (Tracer::RefractoryPop, rp),
                        (Tracer::LabileDop, ld),
                        (Tracer::RefractoryDop, rd),
                    ] {
                        tendency.add(tracer, i, k, fraction * released);
                    }

                    let released = group.ratio(Species::Nitrogen, i, k) * lost;
                    let from_ammonium = if pool > 0.0 { nh4 / pool } else { 1.0 };
                    tendency.add(Tracer::Ammonium, i, k, -from_ammonium * released);
                    tendency.add(Tracer::Nitrate, i, k, -(1.0 - from_ammonium) * released);
                    for (tracer, fraction) in [
                        (Tracer::LabilePon, lp),
                        (Tracer::RefractoryPon, rp),
                        (Tracer::LabileDon, ld),
                        (Tracer::RefractoryDon, rd),
                    ] {
                        tendency.add(tracer, i, k, fraction * released);
                    }

                    let released = group.ratio(Species::Silica, i, k) * lost;
                    tendency.transfer(Tracer::Silicate, Tracer::BiogenicSilica, i, k, released);
                }
            }
            carbon_tendency.push(dc);
        }
        debug!(groups = self.groups.len(), "phytoplankton kinetics");
        Ok(carbon_tendency)
    }

    /// Merge carbon tendencies over `dt` seconds and clip negatives.
    pub fn apply(&mut self, tendency: &[Field], dt: f64) -> Result<()> {
        if tendency.len() != self.groups.len() {
            return Err(EngineError::dimension_mismatch(
                "phytoplankton tendencies",
                self.groups.len().to_string(),
                tendency.len().to_string(),
            ));
        }
        for (group, dc) in self.groups.iter_mut().zip(tendency) {
            dc.check_shape("phytoplankton tendency", self.n_nodes, self.n_layers)?;
            let carbon = group.carbon_mut();
            carbon.axpy(dt, dc);
            carbon.clip_negative();
        }
        Ok(())
    }
}
