//! Phosphorus: phosphate plus labile/refractory organic pools.
//!
//! ```text
//! RPOP ──hydrolysis──▶ RDOP ──mineralization──▶ PO4
//! LPOP ──hydrolysis──▶ LDOP ──mineralization──▶ PO4
//! ```
//!
//! Mineralization is scaled by the algal limitation `C / (KMPHYT + C)`.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::state::{FieldArena, Tracer};

use super::system::{NutrientSystem, ReactionContext};
use super::{Rate, Species, check_non_negative};

const POOLS: [Tracer; 5] = [
    Tracer::Phosphate,
    Tracer::LabileDop,
    Tracer::RefractoryDop,
    Tracer::LabilePop,
    Tracer::RefractoryPop,
];

/// Phosphorus rate constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhosphorusConfig {
    /// RPOP → RDOP
    pub hydrolysis_refractory: Rate,
    /// LPOP → LDOP
    pub hydrolysis_labile: Rate,
    /// RDOP → PO4
    pub mineralization_refractory: Rate,
    /// LDOP → PO4
    pub mineralization_labile: Rate,
    /// Half-saturation of algal carbon for mineralization (g C/m³)
    pub algal_half_saturation: f64,
    /// Phosphate sorption partition coefficient (m³/g)
    pub partition: f64,
    #[serde(default)]
    pub permit_negative: bool,
}

impl Default for PhosphorusConfig {
    fn default() -> Self {
        Self {
            hydrolysis_refractory: Rate::new(0.01, 1.08),
            hydrolysis_labile: Rate::new(0.05, 1.08),
            mineralization_refractory: Rate::new(0.01, 1.08),
            mineralization_labile: Rate::new(0.01, 1.08),
            algal_half_saturation: 1.0,
            partition: 6.0,
            permit_negative: false,
        }
    }
}

impl PhosphorusConfig {
    /// Set the partition coefficient.
    pub fn with_partition(mut self, partition: f64) -> Self {
        self.partition = partition;
        self
    }

    /// Check every constant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let owner = Species::Phosphorus.to_string();
        self.hydrolysis_refractory.validate(&owner, "hydrolysis_refractory")?;
        self.hydrolysis_labile.validate(&owner, "hydrolysis_labile")?;
        self.mineralization_refractory.validate(&owner, "mineralization_refractory")?;
        self.mineralization_labile.validate(&owner, "mineralization_labile")?;
        check_non_negative(&owner, "algal_half_saturation", self.algal_half_saturation)?;
        check_non_negative(&owner, "partition", self.partition)
    }
}

/// Phosphorus system.
#[derive(Clone, Debug)]
pub struct Phosphorus {
    config: PhosphorusConfig,
}

impl Phosphorus {
    /// Validate and build.
    pub fn new(config: PhosphorusConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration.
    pub fn config(&self) -> &PhosphorusConfig {
        &self.config
    }
}

impl NutrientSystem for Phosphorus {
    fn species(&self) -> Species {
        Species::Phosphorus
    }

    fn pools(&self) -> &'static [Tracer] {
        &POOLS
    }

    fn inorganic(&self) -> &'static [Tracer] {
        &POOLS[..1]
    }

    fn partition_coefficient(&self) -> f64 {
        self.config.partition
    }

    fn permit_negative(&self) -> bool {
        self.config.permit_negative
    }

    fn react(&self, ctx: &ReactionContext<'_>, tendency: &mut FieldArena) -> Result<()> {
        let c = &self.config;
        for node in 0..ctx.fields.n_nodes() {
            for layer in 0..ctx.fields.n_layers() {
                let anomaly = ctx.anomaly(node, layer);
                let algae = ctx.algal_carbon(node, layer);
                let limit = algae / (c.algal_half_saturation + algae).max(f64::MIN_POSITIVE);
                let value = |t| ctx.value(t, node, layer);

                let refractory = c.hydrolysis_refractory.per_second(anomaly) * value(Tracer::RefractoryPop);
                tendency.transfer(Tracer::RefractoryPop, Tracer::RefractoryDop, node, layer, refractory);

                let labile = c.hydrolysis_labile.per_second(anomaly) * value(Tracer::LabilePop);
                tendency.transfer(Tracer::LabilePop, Tracer::LabileDop, node, layer, labile);

                let rdop = c.mineralization_refractory.per_second(anomaly) * limit * value(Tracer::RefractoryDop);
                tendency.transfer(Tracer::RefractoryDop, Tracer::Phosphate, node, layer, rdop);

                let ldop = c.mineralization_labile.per_second(anomaly) * limit * value(Tracer::LabileDop);
                tendency.transfer(Tracer::LabileDop, Tracer::Phosphate, node, layer, ldop);
            }
        }
        Ok(())
    }
}
