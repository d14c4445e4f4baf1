//! Particle settling and the benthic sediment layer.
//!
//! [`Settling`] moves particulate tracers and phytoplankton carbon down the
//! water column one layer per pass and hands whatever leaves the bed layer
//! to the [`Sediment`]. The sediment accumulates deposition between calls
//! and converts it into a return flux of dissolved nutrients and oxygen
//! demand in [`Sediment::diagenesis`].

mod sediment;
mod settling;

pub use sediment::{BottomWater, CM_PER_YEAR, ReturnFlux, Sediment, SedimentColumn, SedimentConfig};
pub use settling::{Settling, SettlingConfig, SettlingEnv, SinkOutcome};
