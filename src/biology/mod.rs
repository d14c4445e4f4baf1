//! Phytoplankton: competing primary producers sharing nutrient pools.
//!
//! - [`PhytoplanktonGroup`]: carbon biomass and nutrient quotas of one
//!   functional group
//! - [`PhytoplanktonArray`]: groups ordered by id with aggregate reducers
//!   (`sum`, `all`, `collect`)
//! - [`equilibrium_split`]: regula falsi search for the abiotic part of an
//!   inorganic pool
//!
//! Nutrient bound in biomass is counted inside the inorganic tracer of its
//! species. Growth therefore changes the quota bookkeeping but not the
//! tracer mass; death and grazing move `ratio · C` out of the inorganic
//! tracer into the organic pools.

mod array;
mod group;
mod partition;

pub use array::{Availability, LightConfig, PhytoplanktonArray, PhytoplanktonConfig};
pub use group::{
    GroupConfig, HalfSaturation, LossFractions, PhytoplanktonGroup, Stoichiometry,
    StoichiometryCurve,
};
pub use partition::{PartitionConfig, PartitionOutcome, equilibrium_split};
