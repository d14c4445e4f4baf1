//! The reactor: one transport-reaction step over every component.
//!
//! A step runs as a strict sequence:
//!
//! 1. clock tick and daily flag
//! 2. horizontal and vertical advection in explicit substeps within the
//!    stable step, then implicit vertical diffusion over the full step
//!    (tracers and phytoplankton carbon)
//! 3. wind mixing, surface reaeration and external loads
//! 4. equilibrium stoichiometry of every shared nutrient
//! 5. species kinetics, then phytoplankton growth and losses; merge
//! 6. settling, groups first, into the sediment
//! 7. diagenesis and return flux into the bed layer
//! 8. non-finite check and clipping
//!
//! The reactor owns every field. Components borrow them for the duration
//! of one call.

use tracing::{debug, info, warn};

use crate::analysis::MassBudget;
use crate::benthic::{BottomWater, ReturnFlux, Sediment, Settling, SettlingEnv};
use crate::biology::{Availability, PhytoplanktonArray};
use crate::chemistry::{NutrientSystem, ReactionContext, Species, System};
use crate::config::{EngineConfig, MixingMode};
use crate::error::{EngineError, EngineWarning, Result};
use crate::mesh::TriangularMesh;
use crate::source::{MixingPolicy, MixingRate, Wind};
use crate::state::{Field, FieldArena, Tracer};
use crate::time::{Clock, euler_update};
use crate::transport::{
    ElementVelocity, HorizontalAdvection, TransportConfig, VerticalAdvection, stable_dt,
};
use crate::types::{LayerIndex, NodeIndex};
use crate::vertical::Layers;

/// Transport substeps above which a step is rejected.
pub const MAX_SUBSTEPS: usize = 10_000;

// =============================================================================
// Forcing
// =============================================================================

/// External fields supplied for one step.
#[derive(Clone, Debug)]
pub struct Forcing {
    /// Horizontal velocity, (element × layer)
    pub velocity: ElementVelocity,
    /// Vertical velocity at sigma levels, (node × level), positive up (m/s)
    pub omega: Field,
    /// Temperature (°C), (node × layer)
    pub temperature: Field,
    /// Salinity (PSU), (node × layer)
    pub salinity: Field,
    /// Surface irradiance per node (W/m²)
    pub irradiance: Vec<f64>,
    /// Suspended solids (g/m³), (node × layer)
    pub suspended: Field,
    /// Turbulent vertical diffusivity at sigma levels, (node × level) (m²/s)
    pub turbulence: Field,
}

impl Forcing {
    /// Quiescent water: no flow, no light, no solids, no turbulence.
    pub fn still(mesh: &TriangularMesh, layers: &Layers, temperature: f64, salinity: f64) -> Self {
        let (n, l) = (mesh.n_nodes(), layers.n_layers());
        Self {
            velocity: ElementVelocity::uniform(mesh, layers, 0.0, 0.0),
            omega: Field::zeros(n, layers.n_levels()),
            temperature: Field::constant(n, l, temperature),
            salinity: Field::constant(n, l, salinity),
            irradiance: vec![0.0; n],
            suspended: Field::zeros(n, l),
            turbulence: Field::zeros(n, layers.n_levels()),
        }
    }

    /// Set the horizontal velocity.
    pub fn with_velocity(mut self, velocity: ElementVelocity) -> Self {
        self.velocity = velocity;
        self
    }

    /// Same surface irradiance at every node.
    pub fn with_irradiance(mut self, irradiance: f64) -> Self {
        self.irradiance.fill(irradiance);
        self
    }

    /// Same suspended solids everywhere.
    pub fn with_suspended(mut self, suspended: f64) -> Self {
        self.suspended.fill(suspended);
        self
    }

    /// Same turbulent diffusivity at every level.
    pub fn with_turbulence(mut self, turbulence: f64) -> Self {
        self.turbulence.fill(turbulence);
        self
    }

    /// Check every shape against the mesh and layers.
    pub fn check(&self, mesh: &TriangularMesh, layers: &Layers) -> Result<()> {
        let (n, l, levels) = (mesh.n_nodes(), layers.n_layers(), layers.n_levels());
        self.velocity.check(mesh, layers)?;
        self.omega.check_shape("vertical velocity", n, levels)?;
        self.turbulence.check_shape("turbulent diffusivity", n, levels)?;
        self.temperature.check_shape("temperature", n, l)?;
        self.salinity.check_shape("salinity", n, l)?;
        self.suspended.check_shape("suspended solids", n, l)?;
        if self.irradiance.len() != n {
            return Err(EngineError::dimension_mismatch(
                "surface irradiance",
                n.to_string(),
                self.irradiance.len().to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Step report
// =============================================================================

/// Outcome of one step.
#[derive(Clone, Debug)]
pub struct StepReport {
    /// Clock time after the step (s)
    pub elapsed: i64,
    /// A calendar day boundary was crossed
    pub new_day: bool,
    /// Explicit transport substeps taken
    pub substeps: usize,
    pub warnings: Vec<EngineWarning>,
    /// Sediment return flux per node (g/m²/s)
    pub return_flux: Vec<ReturnFlux>,
    pub budget_before: MassBudget,
    pub budget_after: MassBudget,
}

// =============================================================================
// Reactor
// =============================================================================

/// Owner of the mesh, the fields and every process.
#[derive(Clone, Debug)]
pub struct Reactor {
    mesh: TriangularMesh,
    layers: Layers,
    config: EngineConfig,
    clock: Clock,
    wind: Wind,
    advection: HorizontalAdvection,
    systems: Vec<System>,
    fields: FieldArena,
    phytoplankton: PhytoplanktonArray,
    settling: Settling,
    sediment: Sediment,
}

impl Reactor {
    /// Validate the configuration and the initial fields.
    ///
    /// Sub-pools of the configured systems absent from `initial` start at
    /// zero.
    pub fn new(
        mesh: TriangularMesh,
        layers: Layers,
        config: EngineConfig,
        initial: FieldArena,
    ) -> Result<Self> {
        config.validate()?;
        let (n, l) = (mesh.n_nodes(), layers.n_layers());
        if initial.n_nodes() != n || initial.n_layers() != l {
            return Err(EngineError::dimension_mismatch(
                "initial fields",
                format!("{n} nodes × {l} layers"),
                format!("{} nodes × {} layers", initial.n_nodes(), initial.n_layers()),
            ));
        }
        for (tracer, field) in initial.iter() {
            if let Some((node, layer)) = field.first_non_finite() {
                return Err(EngineError::instability(
                    "initial fields",
                    node,
                    layer,
                    format!("{tracer} is not finite"),
                ));
            }
        }
        config.loads.validate(&mesh, &layers)?;

        let systems = config.chemistry.build()?;
        let mut fields = initial;
        for system in &systems {
            for &tracer in system.pools() {
                if !fields.contains(tracer) {
                    debug!(%tracer, "starting absent pool at zero");
                    fields.insert(tracer, Field::zeros(n, l))?;
                }
            }
        }

        let phytoplankton = PhytoplanktonArray::from_config(&config.phytoplankton, n, l)?;
        let settling = Settling::new(config.settling.clone())?;
        let sediment = Sediment::new(config.sediment.clone(), n)?;
        let clock = config.clock.build()?;

        info!(
            nodes = n,
            layers = l,
            tracers = fields.tracers().count(),
            groups = phytoplankton.len(),
            "reactor ready"
        );
        Ok(Self {
            wind: Wind::new(config.wind),
            advection: HorizontalAdvection::new(config.transport.limiter),
            mesh,
            layers,
            config,
            clock,
            systems,
            fields,
            phytoplankton,
            settling,
            sediment,
        })
    }

    pub fn mesh(&self) -> &TriangularMesh {
        &self.mesh
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn fields(&self) -> &FieldArena {
        &self.fields
    }

    /// Concentrations of one tracer.
    pub fn field(&self, tracer: Tracer) -> Result<&Field> {
        self.fields.get(tracer)
    }

    pub fn sediment(&self) -> &Sediment {
        &self.sediment
    }

    pub fn phytoplankton(&self) -> &PhytoplanktonArray {
        &self.phytoplankton
    }

    /// Mutable groups, e.g. to seed biomass before the first step.
    pub fn phytoplankton_mut(&mut self) -> &mut PhytoplanktonArray {
        &mut self.phytoplankton
    }

    /// Current water-column mass per species.
    pub fn budget(&self) -> MassBudget {
        MassBudget::compute(&self.mesh, &self.layers, &self.fields, &self.phytoplankton)
    }

    /// Advance every process by one clock step.
    pub fn step(&mut self, forcing: &Forcing) -> Result<StepReport> {
        forcing.check(&self.mesh, &self.layers)?;
        self.clock.tick(None);
        let new_day = self.clock.flag();
        if new_day {
            info!(day = self.clock.days(), "day boundary");
        }
        let dt = self.clock.dt() as f64;
        let budget_before = self.budget();
        let mut warnings = Vec::new();

        let substeps = self.transport(forcing, dt)?;
        debug!(substeps, "transport merged");

        let mixing = self.mixing(forcing, dt)?;
        let mut tendency = self.fields.zeros_like();
        if let Some(oxygen) = self.systems.iter().find_map(System::as_oxygen) {
            oxygen.reaeration(
                &self.mesh,
                &self.layers,
                &mixing,
                &self.fields,
                &forcing.temperature,
                &forcing.salinity,
                &mut tendency,
            )?;
        }
        self.config.loads.tendency(&self.mesh, &self.layers, &mut tendency);

        warnings.extend(self.stoichiometry(forcing)?);

        let carbon = {
            let ctx = ReactionContext {
                fields: &self.fields,
                phytoplankton: &self.phytoplankton,
                temperature: &forcing.temperature,
                salinity: &forcing.salinity,
                suspended: &forcing.suspended,
            };
            for system in &self.systems {
                system.react(&ctx, &mut tendency)?;
            }
            self.growth(&ctx, forcing, &mut tendency)?
        };
        euler_update(&mut self.fields, dt, &tendency);
        self.phytoplankton.apply(&carbon, dt)?;
        debug!("kinetics merged");

        warnings.extend(self.settle(forcing, dt)?);
        let (return_flux, sediment_warning) = self.diagenesis(forcing, dt)?;
        warnings.extend(sediment_warning);

        self.check_finite()?;
        for system in &self.systems {
            warnings.extend(system.clip(&mut self.fields));
        }
        for warning in &warnings {
            warn!("{warning}");
        }

        Ok(StepReport {
            elapsed: self.clock.elapsed(),
            new_day,
            substeps,
            warnings,
            return_flux,
            budget_before,
            budget_after: self.budget(),
        })
    }

    /// Advect and diffuse every tracer and group carbon.
    ///
    /// Advection runs in equal substeps no longer than the stable step;
    /// returns their count.
    fn transport(&mut self, forcing: &Forcing, dt: f64) -> Result<usize> {
        let config = self.config.transport;
        let (mesh, layers) = (&self.mesh, &self.layers);
        let diffusivity = if config.horizontal_enabled {
            Some(config.horizontal.diffusivity(mesh, layers, &forcing.velocity)?)
        } else {
            None
        };
        let velocity = config.horizontal_enabled.then_some(&forcing.velocity);
        let limit = stable_dt(mesh, layers, velocity, &forcing.omega, diffusivity.as_ref(), config.cfl)?;
        let ratio = (dt / limit.dt).ceil();
        if ratio > MAX_SUBSTEPS as f64 {
            return Err(EngineError::instability(
                "transport",
                limit.node,
                limit.layer,
                format!("stable step {:.3e} s needs over {MAX_SUBSTEPS} substeps of {dt} s", limit.dt),
            ));
        }
        let substeps = (ratio as usize).max(1);
        let h = dt / substeps as f64;
        if substeps > 1 {
            debug!(substeps, limit = limit.dt, node = limit.node, layer = limit.layer, "transport substeps");
        }
        let advection = &self.advection;

        let step = |field: &mut Field| -> Result<()> {
            for _ in 0..substeps {
                let mut rate = VerticalAdvection.tendency(mesh, layers, field, &forcing.omega)?;
                if let Some(k) = &diffusivity {
                    let horizontal = advection.tendency(mesh, layers, field, &forcing.velocity, Some(k))?;
                    rate.axpy(1.0, &horizontal);
                }
                euler_update(field, h, &rate);
            }
            mix(&config, mesh, layers, field, &forcing.turbulence, dt)
        };

        for (_, field) in self.fields.iter_mut() {
            step(field)?;
        }
        for group in self.phytoplankton.groups_mut() {
            step(group.carbon_mut())?;
        }
        Ok(substeps)
    }

    fn mixing(&mut self, forcing: &Forcing, dt: f64) -> Result<MixingRate> {
        let policy = match self.config.mixing {
            MixingMode::Simple => MixingPolicy::Simple,
            MixingMode::Dynamic => MixingPolicy::Dynamic {
                mesh: &self.mesh,
                layers: &self.layers,
                velocity: &forcing.velocity,
            },
        };
        self.wind.mixing(Some(dt), &policy)
    }

    /// Re-partition every shared nutrient between water and biomass.
    fn stoichiometry(&mut self, forcing: &Forcing) -> Result<Vec<EngineWarning>> {
        let mut warnings = Vec::new();
        if self.phytoplankton.is_empty() {
            return Ok(warnings);
        }
        let (n, l) = (self.mesh.n_nodes(), self.layers.n_layers());
        for system in &self.systems {
            let species = system.species();
            if !Species::NUTRIENTS.contains(&species) {
                continue;
            }
            let mut total = Field::zeros(n, l);
            for &tracer in system.inorganic() {
                total.axpy(1.0, self.fields.get(tracer)?);
            }
            let partition = system.partition_coefficient();

            #[cfg(feature = "parallel")]
            let outcome = self.phytoplankton.stoichiometry_parallel(
                species,
                &total,
                partition,
                &forcing.suspended,
                &self.config.partition,
            )?;
            #[cfg(not(feature = "parallel"))]
            let outcome = self.phytoplankton.stoichiometry(
                species,
                &total,
                partition,
                &forcing.suspended,
                &self.config.partition,
            )?;

            warnings.extend(outcome);
        }
        Ok(warnings)
    }

    /// Available nutrient of a species after biomass claim and sorption.
    fn available(&self, species: Species, suspended: &Field) -> Result<Field> {
        match self.systems.iter().find(|s| s.species() == species) {
            Some(system) => Ok(system.kinetic(&self.fields, &self.phytoplankton, suspended)?.available),
            None => Ok(Field::zeros(self.mesh.n_nodes(), self.layers.n_layers())),
        }
    }

    fn growth(
        &self,
        ctx: &ReactionContext<'_>,
        forcing: &Forcing,
        tendency: &mut FieldArena,
    ) -> Result<Vec<Field>> {
        if self.phytoplankton.is_empty() {
            return Ok(Vec::new());
        }
        let nitrogen = self.available(Species::Nitrogen, &forcing.suspended)?;
        let phosphorus = self.available(Species::Phosphorus, &forcing.suspended)?;
        let silica = self.available(Species::Silica, &forcing.suspended)?;
        let available = Availability {
            nitrogen: &nitrogen,
            phosphorus: &phosphorus,
            silica: &silica,
        };
        self.phytoplankton
            .react(&self.mesh, &self.layers, ctx, &available, &forcing.irradiance, tendency)
    }

    fn settle(&mut self, forcing: &Forcing, dt: f64) -> Result<Vec<EngineWarning>> {
        let env = SettlingEnv {
            mesh: &self.mesh,
            layers: &self.layers,
            temperature: &forcing.temperature,
            suspended: &forcing.suspended,
            dt,
        };
        let mut warnings = Vec::new();
        for group in self.phytoplankton.groups_mut() {
            warnings.extend(self.settling.settle_group(&env, group, &mut self.fields, &mut self.sediment)?);
        }
        for system in &self.systems {
            warnings.extend(system.sinking(&mut self.fields, &self.settling, &env, &mut self.sediment)?);
        }
        debug!(warnings = warnings.len(), "settling");
        Ok(warnings)
    }

    /// Run diagenesis and add the return flux to the bed layer.
    fn diagenesis(&mut self, forcing: &Forcing, dt: f64) -> Result<(Vec<ReturnFlux>, Option<EngineWarning>)> {
        let bed = self.layers.n_layers() - 1;
        let nitrogen = self.available(Species::Nitrogen, &forcing.suspended)?;
        let phosphorus = self.available(Species::Phosphorus, &forcing.suspended)?;
        let silica = self.available(Species::Silica, &forcing.suspended)?;

        let bottom: Vec<BottomWater> = NodeIndex::iter(self.mesh.n_nodes())
            .map(|node| {
                let i = node.get();
                let nh4 = self.fields.value(Tracer::Ammonium, i, bed).max(0.0);
                let no3 = self.fields.value(Tracer::Nitrate, i, bed).max(0.0);
                let pool = nh4 + no3;
                let scale = if pool > 0.0 { nitrogen.get(i, bed) / pool } else { 0.0 };
                BottomWater {
                    temperature: forcing.temperature.get(i, bed),
                    depth: self.mesh.depth(node),
                    oxygen: self.fields.value(Tracer::Oxygen, i, bed),
                    ammonium: nh4 * scale,
                    nitrate: no3 * scale,
                    phosphate: phosphorus.get(i, bed),
                    silicate: silica.get(i, bed),
                }
            })
            .collect();

        let warning = self.sediment.diagenesis(dt, &bottom)?;
        let flux = self.sediment.return_flux().to_vec();
        for (node, returned) in NodeIndex::iter(self.mesh.n_nodes()).zip(&flux) {
            let h = self.layers.thickness(LayerIndex::new(bed), self.mesh.depth(node));
            for tracer in ReturnFlux::TRACERS {
                if self.fields.contains(tracer) {
                    self.fields.add(tracer, node.get(), bed, returned.get(tracer) * dt / h);
                }
            }
        }
        debug!("diagenesis merged");
        Ok((flux, warning))
    }

    fn check_finite(&self) -> Result<()> {
        for (tracer, field) in self.fields.iter() {
            if let Some((node, layer)) = field.first_non_finite() {
                return Err(EngineError::instability(
                    "step merge",
                    node,
                    layer,
                    format!("{tracer} is not finite"),
                ));
            }
        }
        for group in self.phytoplankton.groups() {
            if let Some((node, layer)) = group.carbon().first_non_finite() {
                return Err(EngineError::instability(
                    "step merge",
                    node,
                    layer,
                    format!("carbon of group {} is not finite", group.id()),
                ));
            }
        }
        Ok(())
    }
}

/// Implicit vertical mixing of one field.
fn mix(
    config: &TransportConfig,
    mesh: &TriangularMesh,
    layers: &Layers,
    field: &mut Field,
    turbulence: &Field,
    dt: f64,
) -> Result<()> {
    #[cfg(feature = "parallel")]
    {
        config.vertical.solve_parallel(mesh, layers, field, turbulence, dt)
    }
    #[cfg(not(feature = "parallel"))]
    {
        config.vertical.solve(mesh, layers, field, turbulence, dt)
    }
}
