//! Dissolved oxygen and oxygen equivalents.
//!
//! Oxygen equivalents (EqDO) stand for reduced species released from the
//! sediment; they are oxidized in the water column at the expense of
//! dissolved oxygen. Surface reaeration drives oxygen toward saturation.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ConfigError, Result};
use crate::mesh::TriangularMesh;
use crate::source::MixingRate;
use crate::state::{Field, FieldArena, Tracer};
use crate::time::SECONDS_PER_DAY;
use crate::types::{LayerIndex, NodeIndex};
use crate::vertical::Layers;

use super::rate::REFERENCE_TEMPERATURE;
use super::system::{NutrientSystem, ReactionContext};
use super::{Rate, Species, check_non_negative, saturation};

const POOLS: [Tracer; 2] = [Tracer::Oxygen, Tracer::OxygenEquivalents];

/// Oxygen rate constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OxygenConfig {
    /// EqDO oxidation
    pub equivalents_oxidation: Rate,
    /// Oxygen half-saturation of EqDO oxidation (g/m³)
    pub equivalents_half_saturation: f64,
    /// Temperature coefficient of reaeration
    pub reaeration_theta: f64,
    #[serde(default)]
    pub permit_negative: bool,
}

impl Default for OxygenConfig {
    fn default() -> Self {
        Self {
            equivalents_oxidation: Rate::new(0.15, 1.08),
            equivalents_half_saturation: 0.1,
            reaeration_theta: 1.024,
            permit_negative: false,
        }
    }
}

impl OxygenConfig {
    /// Check every constant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let owner = Species::Oxygen.to_string();
        self.equivalents_oxidation.validate(&owner, "equivalents_oxidation")?;
        check_non_negative(&owner, "equivalents_half_saturation", self.equivalents_half_saturation)?;
        if !(self.reaeration_theta.is_finite() && self.reaeration_theta > 0.0) {
            return Err(ConfigError::invalid(owner, "reaeration_theta", self.reaeration_theta));
        }
        Ok(())
    }
}

/// Oxygen system.
#[derive(Clone, Debug)]
pub struct Oxygen {
    config: OxygenConfig,
}

impl Oxygen {
    /// Validate and build.
    pub fn new(config: OxygenConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Saturation concentration (g/m³) at temperature (°C) and salinity (PSU).
    pub fn saturation(temperature: f64, salinity: f64) -> f64 {
        let (t, s) = (temperature, salinity);
        14.6244 - 0.36713 * t + 0.0044972 * t * t - 0.0966 * s + 0.00205 * s * t
            + 0.0002739 * s * s
    }

    /// Critical-oxygen exponent `min(O2 / threshold − 1, 0)`.
    ///
    /// Zero at or above the threshold, approaching -1 as oxygen vanishes.
    pub fn critical(oxygen: f64, threshold: f64) -> f64 {
        if threshold <= 0.0 {
            return 0.0;
        }
        (oxygen.max(0.0) / threshold - 1.0).min(0.0)
    }

    /// Add surface reaeration `k · θ^(T−20) · (sat − O2) / h` (g/m³/s).
    ///
    /// `mixing` is the transfer velocity in m/day.
    #[allow(clippy::too_many_arguments)]
    pub fn reaeration(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        mixing: &MixingRate,
        fields: &FieldArena,
        temperature: &Field,
        salinity: &Field,
        tendency: &mut FieldArena,
    ) -> Result<()> {
        temperature.check_shape("temperature", mesh.n_nodes(), layers.n_layers())?;
        salinity.check_shape("salinity", mesh.n_nodes(), layers.n_layers())?;
        let surface = LayerIndex::new(0);

        for node in NodeIndex::iter(mesh.n_nodes()) {
            let i = node.get();
            let t = temperature.get(i, 0);
            let deficit = Self::saturation(t, salinity.get(i, 0)) - fields.value(Tracer::Oxygen, i, 0);
            let velocity = mixing.at(i) / SECONDS_PER_DAY as f64
                * self.config.reaeration_theta.powf(t - REFERENCE_TEMPERATURE);
            let h = layers.thickness(surface, mesh.depth(node));
            tendency.add(Tracer::Oxygen, i, 0, velocity * deficit / h);
        }
        trace!("surface reaeration applied");
        Ok(())
    }
}

impl NutrientSystem for Oxygen {
    fn species(&self) -> Species {
        Species::Oxygen
    }

    fn pools(&self) -> &'static [Tracer] {
        &POOLS
    }

    fn permit_negative(&self) -> bool {
        self.config.permit_negative
    }

    fn react(&self, ctx: &ReactionContext<'_>, tendency: &mut FieldArena) -> Result<()> {
        let c = &self.config;
        for node in 0..ctx.fields.n_nodes() {
            for layer in 0..ctx.fields.n_layers() {
                let oxygen = ctx.value(Tracer::Oxygen, node, layer).max(0.0);
                let limit = saturation(oxygen, c.equivalents_half_saturation);
                let delta = c.equivalents_oxidation.per_second(ctx.anomaly(node, layer))
                    * limit
                    * ctx.value(Tracer::OxygenEquivalents, node, layer);
                tendency.add(Tracer::OxygenEquivalents, node, layer, -delta);
                tendency.add(Tracer::Oxygen, node, layer, -delta);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biology::PhytoplanktonArray;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_saturation_polynomial() {
        assert!((Oxygen::saturation(0.0, 0.0) - 14.6244).abs() < TOL);
        let warm = Oxygen::saturation(25.0, 35.0);
        assert!(warm > 5.0 && warm < 9.0);
        assert!(Oxygen::saturation(10.0, 0.0) > Oxygen::saturation(20.0, 0.0));
    }

    #[test]
    fn test_critical_exponent() {
        assert_eq!(Oxygen::critical(5.0, 2.0), 0.0);
        assert!((Oxygen::critical(1.0, 2.0) + 0.5).abs() < TOL);
        assert!((Oxygen::critical(0.0, 2.0) + 1.0).abs() < TOL);
    }

    #[test]
    fn test_reaeration_drives_toward_saturation() {
        let mesh = TriangularMesh::rectangle(1, 1, 10.0, 10.0, 2.0).unwrap();
        let layers = Layers::uniform(3).unwrap();
        let system = Oxygen::new(OxygenConfig::default()).unwrap();
        let temperature = Field::constant(4, 2, 20.0);
        let salinity = Field::zeros(4, 2);
        let sat = Oxygen::saturation(20.0, 0.0);
        let fields = FieldArena::new(4, 2)
            .with(Tracer::Oxygen, Field::from_rows(&[0.0, sat, sat + 2.0, 4.0], 2))
            .unwrap();
        let mut tendency = FieldArena::new(4, 2);
        system
            .reaeration(
                &mesh,
                &layers,
                &MixingRate::Uniform(1.0),
                &fields,
                &temperature,
                &salinity,
                &mut tendency,
            )
            .unwrap();

        assert!(tendency.value(Tracer::Oxygen, 0, 0) > 0.0);
        assert!(tendency.value(Tracer::Oxygen, 1, 0).abs() < TOL);
        assert!(tendency.value(Tracer::Oxygen, 2, 0) < 0.0);
        assert_eq!(tendency.value(Tracer::Oxygen, 0, 1), 0.0);
        // 1 m/day over a 1 m surface layer
        let expected = sat / 86_400.0;
        assert!((tendency.value(Tracer::Oxygen, 0, 0) - expected).abs() < TOL);
    }

    #[test]
    fn test_equivalents_consume_oxygen() {
        let fields = FieldArena::uniform(1, 1, &POOLS, 3.0);
        let phyto = PhytoplanktonArray::empty(1, 1);
        let temperature = Field::constant(1, 1, 20.0);
        let zeros = Field::zeros(1, 1);
        let ctx = ReactionContext {
            fields: &fields,
            phytoplankton: &phyto,
            temperature: &temperature,
            salinity: &zeros,
            suspended: &zeros,
        };
        let system = Oxygen::new(OxygenConfig::default()).unwrap();
        let mut tendency = FieldArena::new(1, 1);
        system.react(&ctx, &mut tendency).unwrap();
        let eq = tendency.value(Tracer::OxygenEquivalents, 0, 0);
        assert!(eq < 0.0);
        assert_eq!(eq, tendency.value(Tracer::Oxygen, 0, 0));
    }
}
