//! Silica: dissolved silicate and biogenic (particulate) silica.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::state::{FieldArena, Tracer};

use super::system::{NutrientSystem, ReactionContext};
use super::{Rate, Species, check_non_negative};

const POOLS: [Tracer; 2] = [Tracer::Silicate, Tracer::BiogenicSilica];

/// Silica rate constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SilicaConfig {
    /// BSi → SiO3
    pub dissolution: Rate,
    /// Silicate sorption partition coefficient (m³/g)
    pub partition: f64,
    #[serde(default)]
    pub permit_negative: bool,
}

impl Default for SilicaConfig {
    fn default() -> Self {
        Self {
            dissolution: Rate::new(0.08, 1.08),
            partition: 6.0,
            permit_negative: false,
        }
    }
}

impl SilicaConfig {
    /// Check every constant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let owner = Species::Silica.to_string();
        self.dissolution.validate(&owner, "dissolution")?;
        check_non_negative(&owner, "partition", self.partition)
    }
}

/// Silica system.
#[derive(Clone, Debug)]
pub struct Silica {
    config: SilicaConfig,
}

impl Silica {
    /// Validate and build.
    pub fn new(config: SilicaConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl NutrientSystem for Silica {
    fn species(&self) -> Species {
        Species::Silica
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
        for node in 0..ctx.fields.n_nodes() {
            for layer in 0..ctx.fields.n_layers() {
                let rate = self.config.dissolution.per_second(ctx.anomaly(node, layer));
                let dissolved = rate * ctx.value(Tracer::BiogenicSilica, node, layer);
                tendency.transfer(Tracer::BiogenicSilica, Tracer::Silicate, node, layer, dissolved);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biology::PhytoplanktonArray;
    use crate::state::Field;

    #[test]
    fn test_dissolution_rate() {
        let fields = FieldArena::uniform(1, 2, &POOLS, 2.0);
        let phyto = PhytoplanktonArray::empty(1, 2);
        let temperature = Field::constant(1, 2, 21.0);
        let zeros = Field::zeros(1, 2);
        let ctx = ReactionContext {
            fields: &fields,
            phytoplankton: &phyto,
            temperature: &temperature,
            salinity: &zeros,
            suspended: &zeros,
        };
        let system = Silica::new(SilicaConfig::default()).unwrap();
        let mut tendency = FieldArena::new(1, 2);
        system.react(&ctx, &mut tendency).unwrap();

        let expected = 0.08 * 1.08 * 2.0 / 86_400.0;
        assert!((tendency.value(Tracer::Silicate, 0, 1) - expected).abs() < 1e-15);
        assert_eq!(
            tendency.value(Tracer::Silicate, 0, 0),
            -tendency.value(Tracer::BiogenicSilica, 0, 0)
        );
    }
}
