//! Chemical systems: nutrient, organic carbon and oxygen pools.
//!
//! Each system owns a set of [`Tracer`] sub-pools and their reaction
//! kinetics. The shared contract is the [`NutrientSystem`] trait; the
//! [`System`] enum dispatches on the species tag so the reactor can hold
//! every system in one collection.
//!
//! # Units
//!
//! Concentrations are g/m³. Rate constants are configured per day and
//! evaluated through [`Rate`]; tendencies written by [`NutrientSystem::react`]
//! are per second.
//!
//! # Sorption
//!
//! Phosphate and silicate partition between dissolved and sorbed phases:
//!
//! ```text
//! available = max(total − phytoplankton, 0) / (1 + Kp · SS)
//! adsorbed  = max(total − phytoplankton, 0) − available
//! ```
//!
//! The adsorbed fraction is the particulate phase of the inorganic pool;
//! it settles with the sorbed-solids velocity (see [`crate::benthic`]).

mod carbon;
mod kinetics;
mod nitrogen;
mod oxygen;
mod phosphorus;
mod rate;
mod silica;
mod system;

pub use carbon::{Carbon, CarbonConfig, OCRB};
pub use kinetics::{DENOMINATOR_EPS, Kinetic, dissolved_fraction};
pub use nitrogen::{Nitrogen, NitrogenConfig};
pub use oxygen::{Oxygen, OxygenConfig};
pub use phosphorus::{Phosphorus, PhosphorusConfig};
pub use rate::{REFERENCE_TEMPERATURE, Rate};
pub use silica::{Silica, SilicaConfig};
pub use system::{NutrientSystem, ReactionContext, System};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Chemical species tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Species {
    Phosphorus,
    Nitrogen,
    Silica,
    Carbon,
    Oxygen,
}

impl Species {
    /// All species in reaction order.
    pub const ALL: [Species; 5] = [
        Species::Phosphorus,
        Species::Nitrogen,
        Species::Silica,
        Species::Carbon,
        Species::Oxygen,
    ];

    /// Nutrients tracked in phytoplankton biomass.
    pub const NUTRIENTS: [Species; 3] = [Species::Nitrogen, Species::Phosphorus, Species::Silica];
}

impl std::fmt::Display for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Species::Phosphorus => "phosphorus",
            Species::Nitrogen => "nitrogen",
            Species::Silica => "silica",
            Species::Carbon => "carbon",
            Species::Oxygen => "oxygen",
        };
        f.write_str(name)
    }
}

/// Configuration of every chemical system.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChemistryConfig {
    pub phosphorus: PhosphorusConfig,
    pub nitrogen: NitrogenConfig,
    pub silica: SilicaConfig,
    pub carbon: CarbonConfig,
    pub oxygen: OxygenConfig,
}

impl ChemistryConfig {
    /// Validate every species.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.phosphorus.validate()?;
        self.nitrogen.validate()?;
        self.silica.validate()?;
        self.carbon.validate()?;
        self.oxygen.validate()
    }

    /// Build the systems in reaction order.
    pub fn build(&self) -> Result<Vec<System>, ConfigError> {
        Ok(vec![
            System::Phosphorus(Phosphorus::new(self.phosphorus.clone())?),
            System::Nitrogen(Nitrogen::new(self.nitrogen.clone())?),
            System::Silica(Silica::new(self.silica.clone())?),
            System::Carbon(Carbon::new(self.carbon.clone())?),
            System::Oxygen(Oxygen::new(self.oxygen.clone())?),
        ])
    }
}

/// Monod term `x / (k + x)`, zero when both vanish.
#[inline]
pub(crate) fn saturation(x: f64, k: f64) -> f64 {
    let denominator = k + x;
    if denominator > 0.0 { x / denominator } else { 0.0 }
}

/// Check a non-negative finite constant.
pub(crate) fn check_non_negative(
    owner: &str,
    parameter: &'static str,
    value: f64,
) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(owner, parameter, value))
    }
}

/// Check a fraction in [0, 1].
pub(crate) fn check_fraction(
    owner: &str,
    parameter: &'static str,
    value: f64,
) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(owner, parameter, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_systems_build_in_order() {
        let systems = ChemistryConfig::default().build().unwrap();
        let species: Vec<_> = systems.iter().map(|s| s.species()).collect();
        assert_eq!(species, Species::ALL.to_vec());
    }

    #[test]
    fn test_invalid_constant_fails_fast() {
        let mut config = ChemistryConfig::default();
        config.silica.dissolution.kappa = -1.0;
        let err = config.build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { .. }));
    }

    #[test]
    fn test_species_display() {
        assert_eq!(Species::Phosphorus.to_string(), "phosphorus");
        assert_eq!(format!("{}", Species::Oxygen), "oxygen");
    }
}
