//! A single phytoplankton functional group.
//!
//! Biomass is carried as carbon (g C/m³) per (node, layer). Internal
//! nutrient quotas are nutrient-to-carbon mass ratios, so the nutrient
//! held in biomass is `ratio · C`. Quotas follow an equilibrium curve of
//! the free dissolved nutrient:
//!
//! ```text
//! C : nutrient = base + amplitude · exp(−min(steepness · free, 10))
//! ```
//!
//! bounded by `1 / (base + amplitude)` (starved) and `1 / base` (replete).

use serde::{Deserialize, Serialize};

use crate::chemistry::{Rate, Species};
use crate::error::{ConfigError, EngineError, Result};
use crate::state::Field;

/// Exponent cap of the stoichiometry curve.
const MAX_EXPONENT: f64 = 10.0;

/// Carbon-to-nutrient mass ratio as a function of free nutrient.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoichiometryCurve {
    /// Ratio under nutrient-replete conditions
    pub base: f64,
    /// Additional ratio under starvation
    pub amplitude: f64,
    /// Decay of the starvation term with free nutrient (m³/g)
    pub steepness: f64,
}

impl StoichiometryCurve {
    /// Create a curve.
    pub const fn new(base: f64, amplitude: f64, steepness: f64) -> Self {
        Self {
            base,
            amplitude,
            steepness,
        }
    }

    /// Carbon-to-nutrient ratio at a free concentration.
    #[inline]
    pub fn carbon_ratio(&self, free: f64) -> f64 {
        let exponent = (self.steepness * free.max(0.0)).min(MAX_EXPONENT);
        self.base + self.amplitude * (-exponent).exp()
    }

    /// Admissible nutrient-to-carbon quota range.
    #[inline]
    pub fn bounds(&self) -> (f64, f64) {
        (1.0 / (self.base + self.amplitude), 1.0 / self.base)
    }

    fn validate(&self, owner: &str, parameter: &'static str) -> Result<(), ConfigError> {
        if !(self.base.is_finite() && self.base > 0.0) {
            return Err(ConfigError::invalid(owner, parameter, self.base));
        }
        if !(self.amplitude.is_finite() && self.amplitude >= 0.0) {
            return Err(ConfigError::invalid(owner, parameter, self.amplitude));
        }
        if !(self.steepness.is_finite() && self.steepness >= 0.0) {
            return Err(ConfigError::invalid(owner, parameter, self.steepness));
        }
        Ok(())
    }
}

/// Per-nutrient stoichiometry; groups without silica skeletons have none.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stoichiometry {
    pub nitrogen: StoichiometryCurve,
    pub phosphorus: StoichiometryCurve,
    #[serde(default)]
    pub silica: Option<StoichiometryCurve>,
}

impl Stoichiometry {
    /// Curve of a nutrient, `None` for carbon/oxygen or absent silica.
    pub fn curve(&self, species: Species) -> Option<&StoichiometryCurve> {
        match species {
            Species::Nitrogen => Some(&self.nitrogen),
            Species::Phosphorus => Some(&self.phosphorus),
            Species::Silica => self.silica.as_ref(),
            Species::Carbon | Species::Oxygen => None,
        }
    }
}

/// Monod half-saturation constants (g/m³).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HalfSaturation {
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub silica: f64,
}

/// Routing of grazed and dead biomass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossFractions {
    pub labile_particulate: f64,
    pub refractory_particulate: f64,
    pub labile_dissolved: f64,
    pub refractory_dissolved: f64,
}

impl LossFractions {
    /// Fractions as an array (LP, RP, LD, RD).
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.labile_particulate,
            self.refractory_particulate,
            self.labile_dissolved,
            self.refractory_dissolved,
        ]
    }
}

impl Default for LossFractions {
    fn default() -> Self {
        Self {
            labile_particulate: 0.35,
            refractory_particulate: 0.15,
            labile_dissolved: 0.35,
            refractory_dissolved: 0.15,
        }
    }
}

/// Parameters of one group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Identity; lower ids claim nutrient first
    pub id: usize,
    /// Maximum gross growth (1/day)
    pub growth: Rate,
    pub respiration: Rate,
    pub grazing: Rate,
    /// Non-predatory mortality (1/day)
    pub death: f64,
    /// Sinking velocity (m/day)
    pub settling: f64,
    pub half_saturation: HalfSaturation,
    /// Ammonium preference constant (g N/m³)
    pub ammonia_half_saturation: f64,
    /// Saturating irradiance (W/m²)
    pub optimal_light: f64,
    /// Fraction of gross production exuded as DOC
    pub exudation: f64,
    /// Carbon to chlorophyll mass ratio
    pub carbon_to_chlorophyll: f64,
    pub stoichiometry: Stoichiometry,
    #[serde(default)]
    pub losses: LossFractions,
    /// Uniform starting biomass (g C/m³)
    #[serde(default)]
    pub initial_carbon: f64,
}

impl GroupConfig {
    /// Diatom preset: silica-limited, fast-growing, heavy.
    pub fn diatom(id: usize) -> Self {
        Self {
            id,
            growth: Rate::new(2.5, 1.068),
            respiration: Rate::new(0.125, 1.045),
            grazing: Rate::new(0.1, 1.1),
            death: 0.02,
            settling: 0.3,
            half_saturation: HalfSaturation {
                nitrogen: 0.025,
                phosphorus: 0.001,
                silica: 0.02,
            },
            ammonia_half_saturation: 0.05,
            optimal_light: 120.0,
            exudation: 0.1,
            carbon_to_chlorophyll: 40.0,
            stoichiometry: Stoichiometry {
                nitrogen: StoichiometryCurve::new(5.0, 5.0, 10.0),
                phosphorus: StoichiometryCurve::new(40.0, 60.0, 100.0),
                silica: Some(StoichiometryCurve::new(2.5, 2.5, 5.0)),
            },
            losses: LossFractions::default(),
            initial_carbon: 0.0,
        }
    }

    /// Flagellate preset: no silica demand, slower sinking.
    pub fn flagellate(id: usize) -> Self {
        Self {
            id,
            growth: Rate::new(1.8, 1.068),
            respiration: Rate::new(0.1, 1.045),
            grazing: Rate::new(0.1, 1.1),
            death: 0.02,
            settling: 0.1,
            half_saturation: HalfSaturation {
                nitrogen: 0.015,
                phosphorus: 0.002,
                silica: 0.0,
            },
            ammonia_half_saturation: 0.05,
            optimal_light: 80.0,
            exudation: 0.1,
            carbon_to_chlorophyll: 60.0,
            stoichiometry: Stoichiometry {
                nitrogen: StoichiometryCurve::new(5.7, 4.0, 10.0),
                phosphorus: StoichiometryCurve::new(45.0, 50.0, 100.0),
                silica: None,
            },
            losses: LossFractions::default(),
            initial_carbon: 0.0,
        }
    }

    /// Set the settling velocity.
    pub fn with_settling(mut self, settling: f64) -> Self {
        self.settling = settling;
        self
    }

    /// Set the starting biomass.
    pub fn with_initial_carbon(mut self, carbon: f64) -> Self {
        self.initial_carbon = carbon;
        self
    }

    /// Set the growth rate.
    pub fn with_growth(mut self, growth: Rate) -> Self {
        self.growth = growth;
        self
    }

    /// Check every parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let owner = format!("phytoplankton group {}", self.id);
        self.growth.validate(&owner, "growth")?;
        self.respiration.validate(&owner, "respiration")?;
        self.grazing.validate(&owner, "grazing")?;
        for (name, value) in [
            ("death", self.death),
            ("settling", self.settling),
            ("half_saturation", self.half_saturation.nitrogen),
            ("half_saturation", self.half_saturation.phosphorus),
            ("half_saturation", self.half_saturation.silica),
            ("ammonia_half_saturation", self.ammonia_half_saturation),
            ("initial_carbon", self.initial_carbon),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(owner, name, value));
            }
        }
        if !(self.optimal_light.is_finite() && self.optimal_light > 0.0) {
            return Err(ConfigError::invalid(owner, "optimal_light", self.optimal_light));
        }
        if !(self.carbon_to_chlorophyll.is_finite() && self.carbon_to_chlorophyll > 0.0) {
            return Err(ConfigError::invalid(owner, "carbon_to_chlorophyll", self.carbon_to_chlorophyll));
        }
        if !(0.0..=1.0).contains(&self.exudation) {
            return Err(ConfigError::invalid(owner, "exudation", self.exudation));
        }
        let fractions = self.losses.as_array();
        let total: f64 = fractions.iter().sum();
        if fractions.iter().any(|&f| f < 0.0) || (total - 1.0).abs() > 1e-9 {
            return Err(ConfigError::invalid(owner, "losses", total));
        }
        self.stoichiometry.nitrogen.validate(&owner, "stoichiometry.nitrogen")?;
        self.stoichiometry.phosphorus.validate(&owner, "stoichiometry.phosphorus")?;
        if let Some(silica) = &self.stoichiometry.silica {
            silica.validate(&owner, "stoichiometry.silica")?;
        }
        Ok(())
    }
}

/// Biomass and quotas of one group.
#[derive(Clone, Debug)]
pub struct PhytoplanktonGroup {
    config: GroupConfig,
    carbon: Field,
    /// Quotas in (N, P, Si) order
    ratios: [Field; 3],
}

fn quota_slot(species: Species) -> Option<usize> {
    match species {
        Species::Nitrogen => Some(0),
        Species::Phosphorus => Some(1),
        Species::Silica => Some(2),
        Species::Carbon | Species::Oxygen => None,
    }
}

impl PhytoplanktonGroup {
    /// Group with its starting biomass and replete quotas.
    pub fn new(config: GroupConfig, n_nodes: usize, n_layers: usize) -> Result<Self, ConfigError> {
        config.validate()?;
        let quota = |species| {
            let value = config
                .stoichiometry
                .curve(species)
                .map_or(0.0, |c: &StoichiometryCurve| c.bounds().1);
            Field::constant(n_nodes, n_layers, value)
        };
        let ratios = [
            quota(Species::Nitrogen),
            quota(Species::Phosphorus),
            quota(Species::Silica),
        ];
        let carbon = Field::constant(n_nodes, n_layers, config.initial_carbon);
        Ok(Self {
            config,
            carbon,
            ratios,
        })
    }

    /// Identity index.
    #[inline]
    pub fn id(&self) -> usize {
        self.config.id
    }

    /// Parameters.
    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Carbon biomass (g C/m³).
    pub fn carbon(&self) -> &Field {
        &self.carbon
    }

    /// Mutable carbon biomass.
    pub fn carbon_mut(&mut self) -> &mut Field {
        &mut self.carbon
    }

    /// Replace the carbon field.
    pub fn set_carbon(&mut self, carbon: Field) -> Result<()> {
        carbon.check_shape(
            "phytoplankton carbon",
            self.carbon.n_rows(),
            self.carbon.n_layers(),
        )?;
        self.carbon = carbon;
        Ok(())
    }

    /// Nutrient-to-carbon quota; zero for carbon, oxygen and absent silica.
    #[inline]
    pub fn ratio(&self, species: Species, node: usize, layer: usize) -> f64 {
        quota_slot(species).map_or(0.0, |i| self.ratios[i].get(node, layer))
    }

    /// Quota field of a nutrient.
    pub fn ratio_field(&self, species: Species) -> Option<&Field> {
        quota_slot(species).map(|i| &self.ratios[i])
    }

    pub(crate) fn ratio_field_mut(&mut self, species: Species) -> Option<&mut Field> {
        quota_slot(species).map(|i| &mut self.ratios[i])
    }

    /// Set a quota at one cell.
    pub fn set_ratio(&mut self, species: Species, node: usize, layer: usize, value: f64) -> Result<()> {
        let field = self.ratio_field_mut(species).ok_or_else(|| {
            EngineError::dimension_mismatch(
                "stoichiometric quota",
                "nitrogen, phosphorus or silica",
                species.to_string(),
            )
        })?;
        field.set(node, layer, value);
        Ok(())
    }

    /// Nutrient held in biomass, `ratio · C`.
    #[inline]
    pub fn nutrient(&self, species: Species, node: usize, layer: usize) -> f64 {
        if species == Species::Carbon {
            return self.carbon.get(node, layer);
        }
        self.ratio(species, node, layer) * self.carbon.get(node, layer)
    }

    /// Chlorophyll (mg/m³).
    #[inline]
    pub fn chlorophyll(&self, node: usize, layer: usize) -> f64 {
        1000.0 * self.carbon.get(node, layer) / self.config.carbon_to_chlorophyll
    }

    /// Nutrient demand `C / r(free)` at a free dissolved concentration.
    #[inline]
    pub fn invert_ratios(&self, species: Species, free: f64, node: usize, layer: usize) -> f64 {
        match self.config.stoichiometry.curve(species) {
            Some(curve) => self.carbon.get(node, layer) / curve.carbon_ratio(free),
            None => 0.0,
        }
    }

    /// Worst Monod limitation of the available nutrients.
    pub fn nutrient_limitation(&self, nitrogen: f64, phosphorus: f64, silica: f64) -> f64 {
        let k = &self.config.half_saturation;
        let monod = |x: f64, k: f64| {
            let x = x.max(0.0);
            if k + x > 0.0 { x / (k + x) } else { 0.0 }
        };
        let mut limit = monod(nitrogen, k.nitrogen).min(monod(phosphorus, k.phosphorus));
        if self.config.stoichiometry.silica.is_some() {
            limit = limit.min(monod(silica, k.silica));
        }
        limit
    }

    /// Ammonium preference in [0, 1].
    pub fn ammonia_preference(&self, ammonium: f64, nitrate: f64) -> f64 {
        let k = self.config.ammonia_half_saturation;
        let (nh4, no3) = (ammonium.max(0.0), nitrate.max(0.0));
        if nh4 + no3 <= 0.0 {
            return 1.0;
        }
        let first = nh4 * no3 / ((k + nh4) * (k + no3));
        let second = nh4 * k / ((nh4 + no3) * (k + no3));
        (first + second).clamp(0.0, 1.0)
    }

    /// Steele light limitation averaged over a layer.
    ///
    /// `top` is the irradiance at the top of the layer, `extinction` the
    /// attenuation coefficient (1/m) and `thickness` the layer depth (m).
    pub fn light_limitation(&self, top: f64, extinction: f64, thickness: f64) -> f64 {
        let saturating = self.config.optimal_light;
        let top = top.max(0.0);
        let optical = extinction * thickness;
        if optical <= 1e-12 {
            let ratio = top / saturating;
            return ratio * (1.0 - ratio).exp();
        }
        let alpha_top = top / saturating;
        let alpha_bottom = alpha_top * (-optical).exp();
        std::f64::consts::E / optical * ((-alpha_bottom).exp() - (-alpha_top).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_curve_bounds() {
        let curve = StoichiometryCurve::new(40.0, 60.0, 100.0);
        assert!((curve.carbon_ratio(0.0) - 100.0).abs() < TOL);
        // Capped exponent
        let replete = curve.carbon_ratio(1.0);
        assert!((replete - (40.0 + 60.0 * (-10.0_f64).exp())).abs() < TOL);
        assert_eq!(curve.bounds(), (0.01, 0.025));
    }

    #[test]
    fn test_presets_validate() {
        assert!(GroupConfig::diatom(0).validate().is_ok());
        assert!(GroupConfig::flagellate(1).validate().is_ok());
        let mut bad = GroupConfig::diatom(0);
        bad.losses.labile_dissolved = 0.9;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_invert_ratios() {
        let mut group = PhytoplanktonGroup::new(GroupConfig::diatom(0), 1, 1).unwrap();
        group.set_carbon(Field::constant(1, 1, 2.0)).unwrap();
        let demand = group.invert_ratios(Species::Phosphorus, 0.0, 0, 0);
        assert!((demand - 2.0 / 100.0).abs() < TOL);
        let flagellate = PhytoplanktonGroup::new(GroupConfig::flagellate(1), 1, 1).unwrap();
        assert_eq!(flagellate.invert_ratios(Species::Silica, 1.0, 0, 0), 0.0);
    }

    #[test]
    fn test_limitations_in_unit_range() {
        let group = PhytoplanktonGroup::new(GroupConfig::diatom(0), 1, 1).unwrap();
        assert_eq!(group.nutrient_limitation(1.0, 1.0, 0.0), 0.0);
        let limit = group.nutrient_limitation(0.025, 1.0, 10.0);
        assert!((limit - 0.5).abs() < TOL);
        assert_eq!(group.ammonia_preference(0.0, 0.0), 1.0);
        assert_eq!(group.ammonia_preference(0.0, 1.0), 0.0);
        let p = group.ammonia_preference(1.0, 1.0);
        assert!(p > 0.0 && p <= 1.0);
    }

    #[test]
    fn test_light_peaks_at_saturation() {
        let group = PhytoplanktonGroup::new(GroupConfig::diatom(0), 1, 1).unwrap();
        let optimal = group.config().optimal_light;
        assert!((group.light_limitation(optimal, 0.0, 1.0) - 1.0).abs() < TOL);
        assert!(group.light_limitation(optimal, 0.5, 2.0) < 1.0);
        assert_eq!(group.light_limitation(0.0, 0.5, 2.0), 0.0);
    }
}
