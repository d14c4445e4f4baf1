//! Shared contract of the chemical systems and the species dispatcher.

use tracing::trace;

use crate::benthic::{Sediment, Settling, SettlingEnv};
use crate::biology::PhytoplanktonArray;
use crate::error::{EngineWarning, Result};
use crate::state::{Field, FieldArena, Tracer};

use super::kinetics::{Kinetic, dissolved_fraction, partition_pools};
use super::{Carbon, Nitrogen, Oxygen, Phosphorus, Silica, Species};

/// Read-only inputs to one reaction evaluation.
#[derive(Clone, Copy, Debug)]
pub struct ReactionContext<'a> {
    /// Concentrations at the start of the reaction phase
    pub fields: &'a FieldArena,
    pub phytoplankton: &'a PhytoplanktonArray,
    /// Water temperature (°C), node × layer
    pub temperature: &'a Field,
    /// Salinity (PSU), node × layer
    pub salinity: &'a Field,
    /// Suspended solids (g/m³), node × layer
    pub suspended: &'a Field,
}

impl ReactionContext<'_> {
    /// Concentration of a tracer, zero if not carried.
    #[inline]
    pub fn value(&self, tracer: Tracer, node: usize, layer: usize) -> f64 {
        self.fields.value(tracer, node, layer)
    }

    /// Temperature anomaly from 20 °C.
    #[inline]
    pub fn anomaly(&self, node: usize, layer: usize) -> f64 {
        self.temperature.get(node, layer) - super::rate::REFERENCE_TEMPERATURE
    }

    /// Phytoplankton carbon summed over groups.
    #[inline]
    pub fn algal_carbon(&self, node: usize, layer: usize) -> f64 {
        self.phytoplankton.carbon(node, layer)
    }
}

/// Behavior shared by every chemical system.
pub trait NutrientSystem {
    /// Species tag.
    fn species(&self) -> Species;

    /// Every sub-pool owned by the system.
    fn pools(&self) -> &'static [Tracer];

    /// Sub-pools that settle.
    fn particulate(&self) -> Vec<Tracer> {
        self.pools()
            .iter()
            .copied()
            .filter(|t| t.is_particulate())
            .collect()
    }

    /// Inorganic sub-pools shared with phytoplankton; empty when none.
    fn inorganic(&self) -> &'static [Tracer] {
        &[]
    }

    /// Sorption partition coefficient of the inorganic pool.
    fn partition_coefficient(&self) -> f64 {
        0.0
    }

    /// Check if negative concentrations are left in place.
    fn permit_negative(&self) -> bool;

    /// Available and adsorbed inorganic nutrient per cell.
    ///
    /// Systems without an inorganic pool return zeros.
    fn kinetic(
        &self,
        fields: &FieldArena,
        phytoplankton: &PhytoplanktonArray,
        suspended: &Field,
    ) -> Result<Kinetic> {
        partition_pools(
            self.species(),
            self.inorganic(),
            self.partition_coefficient(),
            fields,
            phytoplankton,
            suspended,
        )
    }

    /// Settle particulate sub-pools and the sorbed inorganic fraction.
    fn sinking(
        &self,
        fields: &mut FieldArena,
        settling: &Settling,
        env: &SettlingEnv<'_>,
        sediment: &mut Sediment,
    ) -> Result<Vec<EngineWarning>> {
        let mut warnings = Vec::new();
        let net = settling.net_deposition(self.species());

        for tracer in self.particulate() {
            if !fields.contains(tracer) {
                continue;
            }
            let field = fields.get_mut(tracer)?;
            let outcome =
                settling.sink(env, tracer, field, settling.organic_velocity(), None, net, sediment)?;
            if outcome.capped > 0 {
                warnings.push(EngineWarning::SettlingCapped {
                    tracer,
                    cells: outcome.capped,
                });
            }
        }

        let partition = self.partition_coefficient();
        if partition > 0.0 && settling.sorbed_velocity() > 0.0 {
            for &tracer in self.inorganic() {
                if !fields.contains(tracer) {
                    continue;
                }
                let share = sorbed_share(partition, fields.get(tracer)?, env.suspended)?;
                let field = fields.get_mut(tracer)?;
                let outcome = settling.sink(
                    env,
                    tracer,
                    field,
                    settling.sorbed_velocity(),
                    Some(&share),
                    net,
                    sediment,
                )?;
                if outcome.capped > 0 {
                    warnings.push(EngineWarning::SettlingCapped {
                        tracer,
                        cells: outcome.capped,
                    });
                }
            }
        }
        trace!(species = %self.species(), "sinking");
        Ok(warnings)
    }

    /// Add reaction tendencies (g/m³/s) for every sub-pool.
    fn react(&self, ctx: &ReactionContext<'_>, tendency: &mut FieldArena) -> Result<()>;

    /// Clip negative concentrations unless permitted.
    fn clip(&self, fields: &mut FieldArena) -> Vec<EngineWarning> {
        if self.permit_negative() {
            return Vec::new();
        }
        let mut warnings = Vec::new();
        for &tracer in self.pools() {
            if let Ok(field) = fields.get_mut(tracer) {
                let (cells, min) = field.clip_negative();
                if cells > 0 {
                    warnings.push(EngineWarning::NegativeClipped { tracer, cells, min });
                }
            }
        }
        warnings
    }
}

/// Sorbed fraction `1 − 1/(1 + Kp·SS)` of a field, per cell.
fn sorbed_share(partition: f64, field: &Field, suspended: &Field) -> Result<Field> {
    suspended.check_shape("suspended solids", field.n_rows(), field.n_layers())?;
    let mut share = Field::zeros(field.n_rows(), field.n_layers());
    for node in 0..field.n_rows() {
        for layer in 0..field.n_layers() {
            let fd = dissolved_fraction(partition, suspended.get(node, layer), node, layer)?;
            share.set(node, layer, 1.0 - fd);
        }
    }
    Ok(share)
}

/// Chemical system selected by species.
#[derive(Clone, Debug)]
pub enum System {
    Phosphorus(Phosphorus),
    Nitrogen(Nitrogen),
    Silica(Silica),
    Carbon(Carbon),
    Oxygen(Oxygen),
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            System::Phosphorus($inner) => $body,
            System::Nitrogen($inner) => $body,
            System::Silica($inner) => $body,
            System::Carbon($inner) => $body,
            System::Oxygen($inner) => $body,
        }
    };
}

impl NutrientSystem for System {
    fn species(&self) -> Species {
        dispatch!(self, s => s.species())
    }

    fn pools(&self) -> &'static [Tracer] {
        dispatch!(self, s => s.pools())
    }

    fn inorganic(&self) -> &'static [Tracer] {
        dispatch!(self, s => s.inorganic())
    }

    fn partition_coefficient(&self) -> f64 {
        dispatch!(self, s => s.partition_coefficient())
    }

    fn permit_negative(&self) -> bool {
        dispatch!(self, s => s.permit_negative())
    }

    fn react(&self, ctx: &ReactionContext<'_>, tendency: &mut FieldArena) -> Result<()> {
        dispatch!(self, s => s.react(ctx, tendency))
    }
}

impl System {
    /// Oxygen system, if this is one.
    pub fn as_oxygen(&self) -> Option<&Oxygen> {
        match self {
            System::Oxygen(oxygen) => Some(oxygen),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::ChemistryConfig;

    #[test]
    fn test_dispatch_reports_pools() {
        let systems = ChemistryConfig::default().build().unwrap();
        let total: usize = systems.iter().map(|s| s.pools().len()).sum();
        assert_eq!(total, Tracer::ALL.len());
        for system in &systems {
            for tracer in system.pools() {
                assert_eq!(tracer.species(), system.species());
            }
        }
    }

    #[test]
    fn test_particulate_pools() {
        let systems = ChemistryConfig::default().build().unwrap();
        let silica = systems
            .iter()
            .find(|s| s.species() == Species::Silica)
            .unwrap();
        assert_eq!(silica.particulate(), vec![Tracer::BiogenicSilica]);
        let oxygen = systems.last().unwrap();
        assert!(oxygen.particulate().is_empty());
    }

    #[test]
    fn test_clip_reports_negatives() {
        let systems = ChemistryConfig::default().build().unwrap();
        let mut fields = FieldArena::new(2, 1)
            .with(Tracer::Phosphate, Field::from_rows(&[-0.5, 1.0], 1))
            .unwrap();
        let warnings = systems[0].clip(&mut fields);
        assert_eq!(
            warnings,
            vec![EngineWarning::NegativeClipped {
                tracer: Tracer::Phosphate,
                cells: 1,
                min: -0.5
            }]
        );
        assert_eq!(fields.value(Tracer::Phosphate, 0, 0), 0.0);
    }
}
