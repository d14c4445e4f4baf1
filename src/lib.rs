//! # wq-rs
//!
//! A transport-reaction water quality engine for coastal seas on
//! unstructured triangular meshes with terrain-following sigma layers.
//!
//! This crate provides the building blocks of a biogeochemical run:
//! - Triangular mesh with median-dual control volumes and sigma layers
//! - Integer-second clock with a daily boundary flag
//! - Flux-limited horizontal advection, shear-based horizontal diffusion,
//!   vertical advection and implicit vertical diffusion
//! - Wind-driven surface mixing and reaeration, external loads
//! - Phosphorus, nitrogen, silica, organic carbon and oxygen pools
//! - Phytoplankton groups with variable stoichiometry found by an
//!   equilibrium partition search
//! - Particle settling into a diagenetic sediment with return fluxes
//! - Mass budgets and step monitoring
//!
//! The [`Reactor`] ties everything together and advances the state one
//! step at a time from externally supplied [`Forcing`].

pub mod analysis;
pub mod benthic;
pub mod biology;
pub mod chemistry;
pub mod config;
pub mod error;
pub mod mesh;
pub mod reactor;
pub mod source;
pub mod state;
pub mod time;
pub mod transport;
pub mod types;
pub mod vertical;

// Re-export main types for convenience
pub use analysis::{MassBudget, MonitorThresholds, StepMonitor};
pub use benthic::{BottomWater, ReturnFlux, Sediment, SedimentConfig, Settling, SettlingConfig};
pub use biology::{
    GroupConfig, PartitionConfig, PartitionOutcome, PhytoplanktonArray, PhytoplanktonConfig,
    PhytoplanktonGroup, equilibrium_split,
};
pub use chemistry::{ChemistryConfig, NutrientSystem, Rate, Species, System};
pub use config::{ClockConfig, EngineConfig, MixingMode};
pub use error::{ConfigError, EngineError, EngineWarning, MeshError, Result};
pub use mesh::{BoundaryTag, TriangularMesh};
pub use reactor::{Forcing, Reactor, StepReport};
pub use source::{Loads, MixingPolicy, Wind, WindConfig};
pub use state::{Field, FieldArena, Tracer};
pub use time::{Clock, SECONDS_PER_DAY};
pub use transport::{
    ElementVelocity, FluxLimiter, HorizontalAdvection, HorizontalDiffusion, TransportConfig,
    VerticalAdvection, VerticalDiffusion,
};
pub use types::{ElementIndex, LayerIndex, NodeIndex};
pub use vertical::Layers;
