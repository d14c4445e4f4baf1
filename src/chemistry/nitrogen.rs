//! Nitrogen: ammonium, nitrate and organic nitrogen.
//!
//! ```text
//! RPON ──▶ RDON ──▶ NH4 ──nitrification──▶ NO23 ──denitrification──▶ N2
//! LPON ──▶ LDON ──▶ NH4
//! ```
//!
//! Nitrification consumes oxygen; denitrification consumes labile
//! dissolved organic carbon. Both act on the free share of the
//! inorganic pool, excluding nitrogen bound in phytoplankton.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::state::{FieldArena, Tracer};

use super::system::{NutrientSystem, ReactionContext};
use super::{Rate, Species, check_non_negative, saturation};

const POOLS: [Tracer; 6] = [
    Tracer::Ammonium,
    Tracer::Nitrate,
    Tracer::LabileDon,
    Tracer::RefractoryDon,
    Tracer::LabilePon,
    Tracer::RefractoryPon,
];

/// Oxygen consumed per unit nitrogen nitrified (g O2 / g N).
pub const NITRIFICATION_OXYGEN: f64 = 64.0 / 14.0;

/// Labile carbon consumed per unit nitrogen denitrified (g C / g N).
pub const DENITRIFICATION_CARBON: f64 = 5.0 / 4.0 * 12.0 / 14.0;

/// Nitrogen rate constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NitrogenConfig {
    /// RPON → RDON
    pub hydrolysis_refractory: Rate,
    /// LPON → LDON
    pub hydrolysis_labile: Rate,
    /// RDON → NH4
    pub mineralization_refractory: Rate,
    /// LDON → NH4
    pub mineralization_labile: Rate,
    /// NH4 → NO23
    pub nitrification: Rate,
    /// Oxygen half-saturation of nitrification (g/m³)
    pub nitrification_half_saturation: f64,
    /// NO23 → N2
    pub denitrification: Rate,
    /// Oxygen inhibition constant of denitrification (g/m³)
    pub denitrification_half_saturation: f64,
    #[serde(default)]
    pub permit_negative: bool,
}

impl Default for NitrogenConfig {
    fn default() -> Self {
        Self {
            hydrolysis_refractory: Rate::new(0.008, 1.08),
            hydrolysis_labile: Rate::new(0.05, 1.08),
            mineralization_refractory: Rate::new(0.008, 1.08),
            mineralization_labile: Rate::new(0.05, 1.08),
            nitrification: Rate::new(0.1, 1.08),
            nitrification_half_saturation: 1.0,
            denitrification: Rate::new(0.05, 1.045),
            denitrification_half_saturation: 0.1,
            permit_negative: false,
        }
    }
}

impl NitrogenConfig {
    /// Check every constant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let owner = Species::Nitrogen.to_string();
        self.hydrolysis_refractory.validate(&owner, "hydrolysis_refractory")?;
        self.hydrolysis_labile.validate(&owner, "hydrolysis_labile")?;
        self.mineralization_refractory.validate(&owner, "mineralization_refractory")?;
        self.mineralization_labile.validate(&owner, "mineralization_labile")?;
        self.nitrification.validate(&owner, "nitrification")?;
        self.denitrification.validate(&owner, "denitrification")?;
        check_non_negative(&owner, "nitrification_half_saturation", self.nitrification_half_saturation)?;
        check_non_negative(&owner, "denitrification_half_saturation", self.denitrification_half_saturation)
    }
}

/// Nitrogen system.
#[derive(Clone, Debug)]
pub struct Nitrogen {
    config: NitrogenConfig,
}

impl Nitrogen {
    /// Validate and build.
    pub fn new(config: NitrogenConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration.
    pub fn config(&self) -> &NitrogenConfig {
        &self.config
    }

    /// Nitrification temperature adjustment.
    ///
    /// Zero below an anomaly of -13, linear up to full rate at +20.
    pub fn temperature_adjustment(anomaly: f64) -> f64 {
        if anomaly < -13.0 {
            0.0
        } else {
            ((anomaly + 20.0) / 40.0).min(1.0)
        }
    }

    /// Nitrification rate at a cell (g N/m³/s).
    pub fn nitrification(&self, anomaly: f64, ammonium: f64, oxygen: f64) -> f64 {
        let c = &self.config;
        let oxygen = oxygen.max(0.0);
        c.nitrification.per_second(anomaly)
            * Self::temperature_adjustment(anomaly)
            * saturation(oxygen, c.nitrification_half_saturation)
            * ammonium.max(0.0)
    }

    /// Denitrification rate at a cell (g N/m³/s).
    pub fn denitrification(&self, anomaly: f64, nitrate: f64, oxygen: f64) -> f64 {
        let c = &self.config;
        let k = c.denitrification_half_saturation;
        let inhibition = k / (oxygen.max(0.0) + k).max(f64::MIN_POSITIVE);
        c.denitrification.per_second(anomaly) * inhibition * nitrate.max(0.0)
    }
}

impl NutrientSystem for Nitrogen {
    fn species(&self) -> Species {
        Species::Nitrogen
    }

    fn pools(&self) -> &'static [Tracer] {
        &POOLS
    }

    fn inorganic(&self) -> &'static [Tracer] {
        &POOLS[..2]
    }

    fn permit_negative(&self) -> bool {
        self.config.permit_negative
    }

    fn react(&self, ctx: &ReactionContext<'_>, tendency: &mut FieldArena) -> Result<()> {
        let c = &self.config;
        for node in 0..ctx.fields.n_nodes() {
            for layer in 0..ctx.fields.n_layers() {
                let anomaly = ctx.anomaly(node, layer);
                let value = |t| ctx.value(t, node, layer);

                let rpon = c.hydrolysis_refractory.per_second(anomaly) * value(Tracer::RefractoryPon);
                tendency.transfer(Tracer::RefractoryPon, Tracer::RefractoryDon, node, layer, rpon);

                let lpon = c.hydrolysis_labile.per_second(anomaly) * value(Tracer::LabilePon);
                tendency.transfer(Tracer::LabilePon, Tracer::LabileDon, node, layer, lpon);

                let rdon = c.mineralization_refractory.per_second(anomaly) * value(Tracer::RefractoryDon);
                tendency.transfer(Tracer::RefractoryDon, Tracer::Ammonium, node, layer, rdon);

                let ldon = c.mineralization_labile.per_second(anomaly) * value(Tracer::LabileDon);
                tendency.transfer(Tracer::LabileDon, Tracer::Ammonium, node, layer, ldon);

                let (ammonium, nitrate) = (value(Tracer::Ammonium), value(Tracer::Nitrate));
                let free = free_fraction(ctx, ammonium, nitrate, node, layer);
                let oxygen = value(Tracer::Oxygen);
                let nitrified = self.nitrification(anomaly, free * ammonium, oxygen);
                tendency.transfer(Tracer::Ammonium, Tracer::Nitrate, node, layer, nitrified);
                tendency.add(Tracer::Oxygen, node, layer, -NITRIFICATION_OXYGEN * nitrified);

                let denitrified = self.denitrification(anomaly, free * nitrate, oxygen);
                tendency.add(Tracer::Nitrate, node, layer, -denitrified);
                tendency.add(Tracer::LabileDoc, node, layer, -DENITRIFICATION_CARBON * denitrified);
            }
        }
        Ok(())
    }
}

/// Share of the inorganic nitrogen pool not bound in biomass.
///
/// The bound share is drawn from ammonium and nitrate in proportion to
/// their concentrations, so one fraction applies to both.
fn free_fraction(ctx: &ReactionContext<'_>, ammonium: f64, nitrate: f64, node: usize, layer: usize) -> f64 {
    let pool = ammonium.max(0.0) + nitrate.max(0.0);
    if pool <= 0.0 {
        return 0.0;
    }
    (ctx.phytoplankton.kinetic(Species::Nitrogen, pool, node, layer) / pool).clamp(0.0, 1.0)
}
