//! Organic carbon: particulate and dissolved pools.
//!
//! Hydrolysis moves particulate carbon to its dissolved counterpart, with a
//! fraction `FLOCEX` routed to the exuded pool:
//!
//! ```text
//! RPOC  ──▶ RDOC
//! LPOC  ──▶ LDOC
//! RePOC ──▶ ReDOC
//! ```
//!
//! Oxidation removes dissolved carbon and consumes `OCRB` grams of oxygen
//! per gram of carbon.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::state::{FieldArena, Tracer};

use super::system::{NutrientSystem, ReactionContext};
use super::{Rate, Species, check_fraction, check_non_negative, saturation};

const POOLS: [Tracer; 7] = [
    Tracer::LabilePoc,
    Tracer::RefractoryPoc,
    Tracer::ReactivePoc,
    Tracer::LabileDoc,
    Tracer::ExudedDoc,
    Tracer::ReactiveDoc,
    Tracer::RefractoryDoc,
];

/// Oxygen to carbon mass ratio.
pub const OCRB: f64 = 32.0 / 12.0;

/// Organic carbon rate constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarbonConfig {
    /// RPOC → RDOC
    pub hydrolysis_refractory: Rate,
    /// LPOC → LDOC
    pub hydrolysis_labile: Rate,
    /// RePOC → ReDOC
    pub hydrolysis_reactive: Rate,
    /// Fraction of hydrolysis products routed to exuded DOC
    pub exudate_fraction: f64,
    pub oxidation_labile: Rate,
    pub oxidation_refractory: Rate,
    pub oxidation_reactive: Rate,
    pub oxidation_exuded: Rate,
    /// Oxygen half-saturation of oxidation (g/m³)
    pub oxygen_half_saturation: f64,
    /// Algal carbon half-saturation of labile oxidation (g C/m³)
    pub algal_half_saturation: f64,
    #[serde(default)]
    pub permit_negative: bool,
}

impl Default for CarbonConfig {
    fn default() -> Self {
        Self {
            hydrolysis_refractory: Rate::new(0.01, 1.08),
            hydrolysis_labile: Rate::new(0.07, 1.08),
            hydrolysis_reactive: Rate::new(0.01, 1.0),
            exudate_fraction: 0.1,
            oxidation_labile: Rate::new(0.1, 1.08),
            oxidation_refractory: Rate::new(0.008, 1.08),
            oxidation_reactive: Rate::new(0.3, 1.047),
            oxidation_exuded: Rate::new(0.15, 1.047),
            oxygen_half_saturation: 0.2,
            algal_half_saturation: 0.1,
            permit_negative: false,
        }
    }
}

impl CarbonConfig {
    /// Check every constant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let owner = Species::Carbon.to_string();
        self.hydrolysis_refractory.validate(&owner, "hydrolysis_refractory")?;
        self.hydrolysis_labile.validate(&owner, "hydrolysis_labile")?;
        self.hydrolysis_reactive.validate(&owner, "hydrolysis_reactive")?;
        self.oxidation_labile.validate(&owner, "oxidation_labile")?;
        self.oxidation_refractory.validate(&owner, "oxidation_refractory")?;
        self.oxidation_reactive.validate(&owner, "oxidation_reactive")?;
        self.oxidation_exuded.validate(&owner, "oxidation_exuded")?;
        check_fraction(&owner, "exudate_fraction", self.exudate_fraction)?;
        check_non_negative(&owner, "oxygen_half_saturation", self.oxygen_half_saturation)?;
        check_non_negative(&owner, "algal_half_saturation", self.algal_half_saturation)
    }
}

/// Organic carbon system.
#[derive(Clone, Debug)]
pub struct Carbon {
    config: CarbonConfig,
}

impl Carbon {
    /// Validate and build.
    pub fn new(config: CarbonConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration.
    pub fn config(&self) -> &CarbonConfig {
        &self.config
    }
}

impl NutrientSystem for Carbon {
    fn species(&self) -> Species {
        Species::Carbon
    }

    fn pools(&self) -> &'static [Tracer] {
        &POOLS
    }

    fn permit_negative(&self) -> bool {
        self.config.permit_negative
    }

    fn react(&self, ctx: &ReactionContext<'_>, tendency: &mut FieldArena) -> Result<()> {
        let c = &self.config;
        let hydrolysis = [
            (Tracer::RefractoryPoc, Tracer::RefractoryDoc, c.hydrolysis_refractory),
            (Tracer::LabilePoc, Tracer::LabileDoc, c.hydrolysis_labile),
            (Tracer::ReactivePoc, Tracer::ReactiveDoc, c.hydrolysis_reactive),
        ];
        let oxidation = [
            (Tracer::LabileDoc, c.oxidation_labile, true),
            (Tracer::RefractoryDoc, c.oxidation_refractory, false),
            (Tracer::ReactiveDoc, c.oxidation_reactive, false),
            (Tracer::ExudedDoc, c.oxidation_exuded, true),
        ];

        for node in 0..ctx.fields.n_nodes() {
            for layer in 0..ctx.fields.n_layers() {
                let anomaly = ctx.anomaly(node, layer);

                for (source, sink, rate) in hydrolysis {
                    let delta = rate.per_second(anomaly) * ctx.value(source, node, layer);
                    tendency.add(source, node, layer, -delta);
                    tendency.add(sink, node, layer, (1.0 - c.exudate_fraction) * delta);
                    tendency.add(Tracer::ExudedDoc, node, layer, c.exudate_fraction * delta);
                }

                let oxygen = ctx.value(Tracer::Oxygen, node, layer).max(0.0);
                let aerobic = saturation(oxygen, c.oxygen_half_saturation);
                let algal = saturation(ctx.algal_carbon(node, layer), c.algal_half_saturation);

                for (pool, rate, labile) in oxidation {
                    let limit = if labile { aerobic * algal } else { aerobic };
                    let delta = rate.per_second(anomaly) * limit * ctx.value(pool, node, layer);
                    tendency.add(pool, node, layer, -delta);
                    tendency.add(Tracer::Oxygen, node, layer, -OCRB * delta);
                }
            }
        }
        Ok(())
    }
}
