//! Vertical coordinate system.
//!
//! Terrain-following sigma layers map every water column onto the same
//! computational range [-1, 0]:
//!
//! - σ = 0 at the surface
//! - σ = -1 at the bed
//!
//! Physical layer thickness at a node is `dz[k] × H`, with `H` the node
//! depth from the mesh.

mod layers;

pub use layers::{Layers, VerticalStencil};
