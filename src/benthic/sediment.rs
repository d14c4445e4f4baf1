//! Benthic diagenesis and return flux to the bottom water.
//!
//! The sediment is a single active layer of thickness `H` below each node.
//! Deposited organic matter is split into three reactivity classes
//! (G1 labile, G2 refractory, G3 inert) that decay and are buried:
//!
//! ```text
//! G_i = (J_i · dt / H + G_i') / (1 + (k_i · θ_i^(T − 20) + w / H) · dt)
//! ```
//!
//! Diagenesis releases ammonium and carbon demand. The surface mass
//! transfer coefficient `s = SOD / O2` couples the fluxes: nitrification
//! and methane oxidation scale with `κ² / s`, and SOD in turn depends on
//! them. `s` is found by damped fixed-point iteration.
//!
//! Phosphate and silicate are carried as sediment totals whose dissolved
//! fraction `1 / (1 + m · π)` exchanges with the overlying water. Under
//! oxic conditions sorption is enhanced by `Δπ`; below the critical
//! oxygen concentration the enhancement decays as `Δπ^(O2 / O2crit)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chemistry::{OCRB, Oxygen, REFERENCE_TEMPERATURE, Rate, Species};
use crate::error::{ConfigError, EngineError, EngineWarning, Result};
use crate::state::Tracer;
use crate::time::SECONDS_PER_DAY;

/// Centimetres per year to metres per day.
pub const CM_PER_YEAR: f64 = 2.73791e-5;

/// Oxygen consumed per gram of ammonium nitrogen nitrified.
const NITRIFICATION_OXYGEN: f64 = 64.0 / 14.0;

/// Oxygen equivalents of carbon used per gram of nitrate denitrified.
const DENITRIFICATION_OXYGEN: f64 = 10.0 / 8.0 * 32.0 / 14.0;

/// Smallest overlying oxygen used in `s = SOD / O2` (g/m³).
const MIN_OXYGEN: f64 = 1e-3;

/// Demand below which the SOD tolerance is absolute (g/m²/day).
const MIN_DEMAND: f64 = 1e-6;

/// Smallest mass transfer coefficient (m/day).
const MIN_TRANSFER: f64 = 1e-6;

/// Benthic temperature bounds (°C).
const TEMPERATURE_RANGE: (f64, f64) = (0.0, 34.9);

/// Diagenesis parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SedimentConfig {
    /// Active layer thickness (m)
    pub thickness: f64,
    /// Burial velocity (cm/year)
    pub burial: f64,
    /// Heat diffusivity between water and sediment (cm²/s)
    pub temperature_diffusivity: f64,
    /// Starting benthic temperature (°C)
    pub initial_temperature: f64,
    /// G1/G2/G3 split of deposited algal carbon, nitrogen and phosphorus
    pub carbon_fractions: [f64; 3],
    pub nitrogen_fractions: [f64; 3],
    pub phosphorus_fractions: [f64; 3],
    /// Decay of G1, G2 and G3 (1/day)
    pub classes: [Rate; 3],
    /// Ammonium reaction velocity (m/day)
    pub nitrification: Rate,
    /// Oxygen half-saturation of nitrification (g/m³)
    pub nitrification_half_saturation: f64,
    /// Nitrate reaction velocity (m/day)
    pub denitrification: Rate,
    /// Methane reaction velocity (m/day)
    pub methane: Rate,
    /// Dissolved mixing velocity between sediment and water (m²/day)
    pub mixing: f64,
    /// Solids concentration (kg/L)
    pub solids: f64,
    /// Anoxic phosphate partition coefficient (L/kg)
    pub phosphate_partition: f64,
    /// Oxic enhancement of phosphate sorption
    pub phosphate_enhancement: f64,
    /// Anoxic silicate partition coefficient (L/kg)
    pub silica_partition: f64,
    /// Oxic enhancement of silicate sorption
    pub silica_enhancement: f64,
    /// Oxygen below which sorption enhancement decays (g/m³)
    pub critical_oxygen: f64,
    pub critical_oxygen_silica: f64,
    /// Biogenic silica dissolution (1/day)
    pub silica_dissolution: Rate,
    /// Silica saturation (g/m³)
    pub silica_saturation: f64,
    /// Biogenic silica half-saturation (g/m³)
    pub silica_half_saturation: f64,
    /// SOD iteration budget
    pub iterations: usize,
    /// Relative SOD tolerance
    pub tolerance: f64,
}

impl Default for SedimentConfig {
    fn default() -> Self {
        Self {
            thickness: 0.1,
            burial: 0.125,
            temperature_diffusivity: 0.0018,
            initial_temperature: 10.0,
            carbon_fractions: [0.65, 0.2, 0.15],
            nitrogen_fractions: [0.65, 0.25, 0.1],
            phosphorus_fractions: [0.65, 0.2, 0.15],
            classes: [
                Rate::new(0.035, 1.1),
                Rate::new(0.0018, 1.15),
                Rate::new(1e-6, 1.17),
            ],
            nitrification: Rate::new(0.131, 1.123),
            nitrification_half_saturation: 0.37,
            denitrification: Rate::new(0.1, 1.08),
            methane: Rate::new(0.2, 1.08),
            mixing: 0.00025,
            solids: 0.5,
            phosphate_partition: 100.0,
            phosphate_enhancement: 300.0,
            silica_partition: 100.0,
            silica_enhancement: 10.0,
            critical_oxygen: 2.0,
            critical_oxygen_silica: 2.0,
            silica_dissolution: Rate::new(0.5, 1.1),
            silica_saturation: 40.0,
            silica_half_saturation: 5e4,
            iterations: 50,
            tolerance: 5e-5,
        }
    }
}

impl SedimentConfig {
    /// Set the active layer thickness.
    pub fn with_thickness(mut self, thickness: f64) -> Self {
        self.thickness = thickness;
        self
    }

    /// Set the burial velocity (cm/year).
    pub fn with_burial(mut self, burial: f64) -> Self {
        self.burial = burial;
        self
    }

    /// Check every parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let owner = "sediment";
        for (name, value) in [
            ("thickness", self.thickness),
            ("solids", self.solids),
            ("critical_oxygen", self.critical_oxygen),
            ("critical_oxygen_silica", self.critical_oxygen_silica),
            ("silica_saturation", self.silica_saturation),
            ("tolerance", self.tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(owner, name, value));
            }
        }
        for (name, value) in [
            ("burial", self.burial),
            ("temperature_diffusivity", self.temperature_diffusivity),
            ("nitrification_half_saturation", self.nitrification_half_saturation),
            ("mixing", self.mixing),
            ("phosphate_partition", self.phosphate_partition),
            ("silica_partition", self.silica_partition),
            ("silica_half_saturation", self.silica_half_saturation),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(owner, name, value));
            }
        }
        for (name, value) in [
            ("phosphate_enhancement", self.phosphate_enhancement),
            ("silica_enhancement", self.silica_enhancement),
        ] {
            if !(value.is_finite() && value >= 1.0) {
                return Err(ConfigError::invalid(owner, name, value));
            }
        }
        for (name, fractions) in [
            ("carbon_fractions", self.carbon_fractions),
            ("nitrogen_fractions", self.nitrogen_fractions),
            ("phosphorus_fractions", self.phosphorus_fractions),
        ] {
            let total: f64 = fractions.iter().sum();
            if fractions.iter().any(|&f| f < 0.0) || (total - 1.0).abs() > 1e-9 {
                return Err(ConfigError::invalid(owner, name, total));
            }
        }
        for rate in &self.classes {
            rate.validate(owner, "classes")?;
        }
        self.nitrification.validate(owner, "nitrification")?;
        self.denitrification.validate(owner, "denitrification")?;
        self.methane.validate(owner, "methane")?;
        self.silica_dissolution.validate(owner, "silica_dissolution")?;
        if self.iterations == 0 {
            return Err(ConfigError::invalid(owner, "iterations", 0.0));
        }
        Ok(())
    }

    /// Burial velocity (m/day).
    pub fn burial_velocity(&self) -> f64 {
        self.burial * CM_PER_YEAR
    }

    fn fractions(&self, species: Species) -> [f64; 3] {
        match species {
            Species::Nitrogen => self.nitrogen_fractions,
            Species::Phosphorus => self.phosphorus_fractions,
            _ => self.carbon_fractions,
        }
    }
}

/// Bottom-water conditions above one node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BottomWater {
    /// Temperature (°C)
    pub temperature: f64,
    /// Total water depth (m)
    pub depth: f64,
    pub oxygen: f64,
    pub ammonium: f64,
    pub nitrate: f64,
    pub phosphate: f64,
    pub silicate: f64,
}

/// Flux from the sediment into the bottom layer (g/m²/s).
///
/// Positive values enter the water; `oxygen` is negative where the
/// sediment consumes oxygen.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReturnFlux {
    pub ammonium: f64,
    pub nitrate: f64,
    pub phosphate: f64,
    pub silicate: f64,
    pub oxygen: f64,
    /// Dissolved methane released as oxygen equivalents
    pub equivalents: f64,
}

impl ReturnFlux {
    /// Flux of a water-column tracer, zero if the sediment does not return it.
    pub fn get(&self, tracer: Tracer) -> f64 {
        match tracer {
            Tracer::Ammonium => self.ammonium,
            Tracer::Nitrate => self.nitrate,
            Tracer::Phosphate => self.phosphate,
            Tracer::Silicate => self.silicate,
            Tracer::Oxygen => self.oxygen,
            Tracer::OxygenEquivalents => self.equivalents,
            _ => 0.0,
        }
    }

    /// Tracers carried by the return flux.
    pub const TRACERS: [Tracer; 6] = [
        Tracer::Ammonium,
        Tracer::Nitrate,
        Tracer::Phosphate,
        Tracer::Silicate,
        Tracer::Oxygen,
        Tracer::OxygenEquivalents,
    ];

    fn accumulate(&mut self, other: &ReturnFlux, dt: f64) {
        self.ammonium += other.ammonium * dt;
        self.nitrate += other.nitrate * dt;
        self.phosphate += other.phosphate * dt;
        self.silicate += other.silicate * dt;
        self.oxygen += other.oxygen * dt;
        self.equivalents += other.equivalents * dt;
    }
}

/// Benthic state below one node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SedimentColumn {
    /// Particulate organic carbon per class (g/m³)
    pub carbon: [f64; 3],
    pub nitrogen: [f64; 3],
    pub phosphorus: [f64; 3],
    /// Biogenic silica (g/m³)
    pub biogenic_silica: f64,
    /// Total (dissolved + sorbed) phosphate (g/m³)
    pub phosphate: f64,
    /// Total silicate (g/m³)
    pub silicate: f64,
    /// Benthic temperature (°C)
    pub temperature: f64,
    /// Last sediment oxygen demand (g/m²/day)
    pub demand: f64,
}

/// Per-node fluxes in g/m²/day, before conversion.
struct DailyFlux {
    ammonium: f64,
    nitrate: f64,
    demand: f64,
    equivalents: f64,
}

/// Sediment below every node.
#[derive(Clone, Debug)]
pub struct Sediment {
    config: SedimentConfig,
    columns: Vec<SedimentColumn>,
    /// Areal deposition since the last diagenesis (g/m²)
    pending: BTreeMap<Tracer, Vec<f64>>,
    pending_algal: BTreeMap<Species, Vec<f64>>,
    /// Areal deposition since construction (g/m²)
    cumulative: BTreeMap<Tracer, Vec<f64>>,
    cumulative_algal: BTreeMap<Species, Vec<f64>>,
    /// Flux of the last diagenesis call
    flux: Vec<ReturnFlux>,
    /// Integrated return mass since the last drain (g/m²)
    returned: Vec<ReturnFlux>,
}

impl Sediment {
    /// Validate and build with empty sediment.
    pub fn new(config: SedimentConfig, n_nodes: usize) -> Result<Self, ConfigError> {
        config.validate()?;
        let column = SedimentColumn {
            temperature: config.initial_temperature,
            ..SedimentColumn::default()
        };
        Ok(Self {
            columns: vec![column; n_nodes],
            pending: BTreeMap::new(),
            pending_algal: BTreeMap::new(),
            cumulative: BTreeMap::new(),
            cumulative_algal: BTreeMap::new(),
            flux: vec![ReturnFlux::default(); n_nodes],
            returned: vec![ReturnFlux::default(); n_nodes],
            config,
        })
    }

    pub fn config(&self) -> &SedimentConfig {
        &self.config
    }

    pub fn n_nodes(&self) -> usize {
        self.columns.len()
    }

    /// Benthic state below a node, or `None` when the node is off the mesh.
    pub fn column(&self, node: usize) -> Option<&SedimentColumn> {
        self.columns.get(node)
    }

    fn check_node(&self, node: usize) -> Result<()> {
        if node >= self.columns.len() {
            return Err(EngineError::dimension_mismatch(
                "sediment node",
                format!("< {}", self.columns.len()),
                node.to_string(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Deposition
    // =========================================================================

    /// Accumulate deposited areal mass (g/m²) of a water-column tracer.
    pub fn conversion(&mut self, tracer: Tracer, node: usize, mass: f64) -> Result<()> {
        self.check_node(node)?;
        let n = self.columns.len();
        self.pending.entry(tracer).or_insert_with(|| vec![0.0; n])[node] += mass;
        self.cumulative.entry(tracer).or_insert_with(|| vec![0.0; n])[node] += mass;
        Ok(())
    }

    /// Accumulate deposited algal areal mass (g/m²) of a species.
    pub fn conversion_algal(&mut self, species: Species, node: usize, mass: f64) -> Result<()> {
        self.check_node(node)?;
        let n = self.columns.len();
        self.pending_algal.entry(species).or_insert_with(|| vec![0.0; n])[node] += mass;
        self.cumulative_algal.entry(species).or_insert_with(|| vec![0.0; n])[node] += mass;
        Ok(())
    }

    /// Deposition since the last diagenesis (g/m²).
    pub fn deposited(&self, tracer: Tracer, node: usize) -> f64 {
        lookup(&self.pending, &tracer, node)
    }

    /// Algal deposition since the last diagenesis (g/m²).
    pub fn deposited_algal(&self, species: Species, node: usize) -> f64 {
        lookup(&self.pending_algal, &species, node)
    }

    /// Deposition since construction (g/m²).
    pub fn cumulative(&self, tracer: Tracer, node: usize) -> f64 {
        lookup(&self.cumulative, &tracer, node)
    }

    /// Algal deposition since construction (g/m²).
    pub fn cumulative_algal(&self, species: Species, node: usize) -> f64 {
        lookup(&self.cumulative_algal, &species, node)
    }

    // =========================================================================
    // Return flux
    // =========================================================================

    /// Flux of the last diagenesis call, per node (g/m²/s).
    pub fn return_flux(&self) -> &[ReturnFlux] {
        &self.flux
    }

    /// Drain the integrated return mass (g/m²) since the last drain.
    pub fn take_return_flux(&mut self) -> Vec<ReturnFlux> {
        let n = self.returned.len();
        std::mem::replace(&mut self.returned, vec![ReturnFlux::default(); n])
    }

    // =========================================================================
    // Diagenesis
    // =========================================================================

    /// Consume pending deposition and compute the return flux over `dt` s.
    ///
    /// Returns a warning when the SOD iteration missed its tolerance at
    /// any node; the last iterate is kept. A non-positive `dt` leaves the
    /// state and the pending deposition untouched.
    pub fn diagenesis(&mut self, dt: f64, bottom: &[BottomWater]) -> Result<Option<EngineWarning>> {
        if bottom.len() != self.columns.len() {
            return Err(EngineError::dimension_mismatch(
                "bottom water",
                self.columns.len().to_string(),
                bottom.len().to_string(),
            ));
        }
        if dt <= 0.0 {
            return Ok(None);
        }
        let days = dt / SECONDS_PER_DAY as f64;
        let mut unconverged = 0;

        for node in 0..self.columns.len() {
            let water = bottom[node];
            let deposition = self.take_pending(node, days);
            let column = &mut self.columns[node];
            let config = &self.config;

            relax_temperature(config, column, water.temperature, days);
            let anomaly = column.temperature - REFERENCE_TEMPERATURE;

            let carbon = decay(config, &mut column.carbon, deposition.carbon, anomaly, days);
            let nitrogen = decay(config, &mut column.nitrogen, deposition.nitrogen, anomaly, days);
            let phosphorus = decay(config, &mut column.phosphorus, deposition.phosphorus, anomaly, days);

            let (daily, converged) = demand(config, column, &water, carbon, nitrogen, anomaly);
            if !converged {
                unconverged += 1;
            }
            column.demand = daily.demand;
            let transfer = daily.demand / water.oxygen.max(MIN_OXYGEN);

            let phosphate = exchange(
                config,
                &mut column.phosphate,
                phosphorus + deposition.phosphate,
                water.phosphate,
                water.oxygen,
                transfer,
                Species::Phosphorus,
                days,
            );
            let dissolution = dissolve_silica(config, column, deposition.silica, anomaly, water.oxygen, days);
            let silicate = exchange(
                config,
                &mut column.silicate,
                dissolution + deposition.silicate,
                water.silicate,
                water.oxygen,
                transfer,
                Species::Silica,
                days,
            );

            let flux = ReturnFlux {
                ammonium: daily.ammonium,
                nitrate: daily.nitrate,
                phosphate,
                silicate,
                oxygen: -daily.demand,
                equivalents: daily.equivalents,
            };
            let per_second = ReturnFlux {
                ammonium: flux.ammonium / SECONDS_PER_DAY as f64,
                nitrate: flux.nitrate / SECONDS_PER_DAY as f64,
                phosphate: flux.phosphate / SECONDS_PER_DAY as f64,
                silicate: flux.silicate / SECONDS_PER_DAY as f64,
                oxygen: flux.oxygen / SECONDS_PER_DAY as f64,
                equivalents: flux.equivalents / SECONDS_PER_DAY as f64,
            };
            if ![
                per_second.ammonium,
                per_second.nitrate,
                per_second.phosphate,
                per_second.silicate,
                per_second.oxygen,
                per_second.equivalents,
            ]
            .iter()
            .all(|v| v.is_finite())
            {
                return Err(EngineError::instability(
                    "sediment diagenesis",
                    node,
                    0,
                    format!("non-finite return flux {per_second:?}"),
                ));
            }
            self.flux[node] = per_second;
            self.returned[node].accumulate(&per_second, dt);
        }

        debug!(nodes = self.columns.len(), unconverged, "diagenesis");
        Ok((unconverged > 0).then_some(EngineWarning::SedimentNotConverged { nodes: unconverged }))
    }

    /// Daily deposition fluxes (g/m²/day) split into classes.
    fn take_pending(&mut self, node: usize, days: f64) -> Deposition {
        let mut take = |tracer: Tracer| {
            self.pending
                .get_mut(&tracer)
                .map_or(0.0, |v| std::mem::take(&mut v[node]))
        };
        let labile_c = take(Tracer::LabilePoc) + take(Tracer::ReactivePoc);
        let refractory_c = take(Tracer::RefractoryPoc);
        let labile_n = take(Tracer::LabilePon);
        let refractory_n = take(Tracer::RefractoryPon);
        let labile_p = take(Tracer::LabilePop);
        let refractory_p = take(Tracer::RefractoryPop);
        let silica = take(Tracer::BiogenicSilica);
        let phosphate = take(Tracer::Phosphate);
        let silicate = take(Tracer::Silicate);

        let mut algal = |species: Species| {
            self.pending_algal
                .get_mut(&species)
                .map_or(0.0, |v| std::mem::take(&mut v[node]))
        };
        let algal_c = algal(Species::Carbon);
        let algal_n = algal(Species::Nitrogen);
        let algal_p = algal(Species::Phosphorus);
        let algal_si = algal(Species::Silica);

        debug_assert!(days > 0.0);
        let rate = 1.0 / days;
        let split = |species: Species, labile: f64, refractory: f64, algal: f64| {
            let f = self.config.fractions(species);
            let inert = f[1] + f[2];
            let (r2, r3) = if inert > 0.0 { (f[1] / inert, f[2] / inert) } else { (0.0, 0.0) };
            [
                rate * (labile + f[0] * algal),
                rate * (r2 * refractory + f[1] * algal),
                rate * (r3 * refractory + f[2] * algal),
            ]
        };
        Deposition {
            carbon: split(Species::Carbon, labile_c, refractory_c, algal_c),
            nitrogen: split(Species::Nitrogen, labile_n, refractory_n, algal_n),
            phosphorus: split(Species::Phosphorus, labile_p, refractory_p, algal_p),
            silica: rate * (silica + algal_si),
            phosphate: rate * phosphate,
            silicate: rate * silicate,
        }
    }
}

/// Deposition fluxes of one node (g/m²/day).
struct Deposition {
    carbon: [f64; 3],
    nitrogen: [f64; 3],
    phosphorus: [f64; 3],
    silica: f64,
    phosphate: f64,
    silicate: f64,
}

fn lookup<K: Ord>(map: &BTreeMap<K, Vec<f64>>, key: &K, node: usize) -> f64 {
    map.get(key).and_then(|v| v.get(node)).copied().unwrap_or(0.0)
}

fn relax_temperature(config: &SedimentConfig, column: &mut SedimentColumn, water: f64, days: f64) {
    let h = config.thickness;
    let rate = config.temperature_diffusivity * 1e-4 * SECONDS_PER_DAY as f64 / (h * h);
    let step = (rate * days).min(1.0);
    column.temperature = (column.temperature + step * (water - column.temperature))
        .clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
}

/// Implicit class update; returns the diagenesis flux (g/m²/day).
fn decay(config: &SedimentConfig, classes: &mut [f64; 3], deposition: [f64; 3], anomaly: f64, days: f64) -> f64 {
    let h = config.thickness;
    let burial = config.burial_velocity() / h;
    let mut released = 0.0;
    for (i, g) in classes.iter_mut().enumerate() {
        let k = config.classes[i].at(anomaly);
        *g = (deposition[i] / h * days + *g) / (1.0 + (k + burial) * days);
        released += h * k * *g;
    }
    released
}

/// Nitrogen and oxygen fluxes with the SOD fixed point.
fn demand(
    config: &SedimentConfig,
    column: &SedimentColumn,
    water: &BottomWater,
    carbon: f64,
    nitrogen: f64,
    anomaly: f64,
) -> (DailyFlux, bool) {
    let oxygen = water.oxygen.max(MIN_OXYGEN);
    let nitrify = config.nitrification.kappa.powi(2)
        * config.nitrification.theta.powf(anomaly)
        * oxygen
        / (2.0 * config.nitrification_half_saturation + oxygen);
    let denitrify = config.denitrification.kappa.powi(2) * config.denitrification.theta.powf(anomaly);
    let methane = config.methane.at(anomaly);

    // Dissolved methane saturation (g O2/m³)
    let saturation = 99.0 * (1.0 + 0.1 * (water.depth + config.thickness)) * 0.9759f64.powf(anomaly);
    let mixing = config.mixing / config.thickness;

    let evaluate = |sod: f64| -> DailyFlux {
        let s = (sod / oxygen).max(MIN_TRANSFER);
        let ammonium_sediment = (nitrogen + s * water.ammonium.max(0.0)) / (s + nitrify / s);
        let nitrified = nitrify / s * ammonium_sediment;
        let nitrate_sediment = (nitrified + s * water.nitrate.max(0.0)) / (s + denitrify / s);
        let denitrified = denitrify / s * nitrate_sediment;

        let equivalents = (OCRB * carbon - DENITRIFICATION_OXYGEN * denitrified).max(0.0);
        let maximum = (2.0 * mixing * saturation * equivalents).sqrt().min(equivalents);
        let quotient = methane / s;
        let sech = if quotient < 80.0 { 1.0 / quotient.cosh() } else { 0.0 };

        DailyFlux {
            ammonium: s * (ammonium_sediment - water.ammonium.max(0.0)),
            nitrate: s * (nitrate_sediment - water.nitrate.max(0.0)),
            demand: maximum * (1.0 - sech) + NITRIFICATION_OXYGEN * nitrified,
            equivalents: maximum * sech,
        }
    };

    let mut sod = if column.demand > 0.0 {
        column.demand
    } else {
        (OCRB * carbon + NITRIFICATION_OXYGEN * nitrogen).max(MIN_TRANSFER * oxygen)
    };
    for _ in 0..config.iterations {
        let next = evaluate(sod).demand;
        let damped = 0.5 * (sod + next);
        let change = (damped - sod).abs();
        sod = damped;
        if change <= config.tolerance * sod.max(MIN_DEMAND) {
            return (evaluate(sod), true);
        }
    }
    (evaluate(sod), false)
}

/// Implicit update of a sorbing sediment total; returns its flux to the water.
#[allow(clippy::too_many_arguments)]
fn exchange(
    config: &SedimentConfig,
    total: &mut f64,
    source: f64,
    water: f64,
    oxygen: f64,
    transfer: f64,
    species: Species,
    days: f64,
) -> f64 {
    let (partition, enhancement, critical) = match species {
        Species::Silica => (config.silica_partition, config.silica_enhancement, config.critical_oxygen_silica),
        _ => (config.phosphate_partition, config.phosphate_enhancement, config.critical_oxygen),
    };
    // Δπ^(O2/O2crit) below the critical oxygen
    let oxic = partition * enhancement.powf(1.0 + Oxygen::critical(oxygen, critical));
    let dissolved = 1.0 / (1.0 + config.solids * oxic);
    let h = config.thickness;
    let water = water.max(0.0);
    *total = (*total + days * (source + transfer * water) / h)
        / (1.0 + days * (config.burial_velocity() + transfer * dissolved) / h);
    transfer * (dissolved * *total - water)
}

/// Biogenic silica dissolution; returns the source of dissolved silica (g/m²/day).
fn dissolve_silica(
    config: &SedimentConfig,
    column: &mut SedimentColumn,
    deposition: f64,
    anomaly: f64,
    oxygen: f64,
    days: f64,
) -> f64 {
    let h = config.thickness;
    let oxic = config.silica_partition
        * config
            .silica_enhancement
            .powf(1.0 + Oxygen::critical(oxygen, config.critical_oxygen_silica));
    let dissolved = column.silicate / (1.0 + config.solids * oxic);
    let undersaturation = (1.0 - dissolved / config.silica_saturation).max(0.0);
    let previous = column.biogenic_silica;
    let rate = config.silica_dissolution.at(anomaly) * previous / (previous + config.silica_half_saturation)
        * undersaturation;
    let rate = if rate.is_finite() { rate } else { 0.0 };
    column.biogenic_silica = (previous + days * deposition / h)
        / (1.0 + days * (config.burial_velocity() / h + rate));
    h * rate * column.biogenic_silica
}
