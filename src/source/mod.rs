//! External forcing sources.
//!
//! - [`wind`]: surface gas-transfer rate from wind speed or current shear
//! - [`loads`]: point and areal mass inputs

pub mod loads;
pub mod wind;

pub use loads::{Loads, PointLoad, SurfaceLoad};
pub use wind::{MixingPolicy, MixingRate, Wind, WindConfig};
