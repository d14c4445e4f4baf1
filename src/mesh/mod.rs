//! Mesh representation.
//!
//! Provides the immutable horizontal discretization:
//! - Triangular elements with counter-clockwise connectivity
//! - Node-centred (median-dual) control volumes for finite-volume transport
//! - Boundary edge tags (solid coastline or open water)

mod boundary_tags;
mod triangular;

pub use boundary_tags::BoundaryTag;
pub use triangular::{DualFace, Edge, TriangularMesh};
