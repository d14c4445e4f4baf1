//! Boundary tags for triangular mesh edges.
//!
//! Boundary edges border a single element. Each one carries a tag that
//! decides whether tracer mass may cross it.

use serde::{Deserialize, Serialize};

/// Tag identifying the type of a boundary edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BoundaryTag {
    /// Solid coastline (no-flux boundary).
    #[default]
    Solid,

    /// Open water boundary. Nodes on it hold prescribed concentrations.
    Open,
}

impl BoundaryTag {
    /// Check if this is a solid boundary.
    pub fn is_solid(&self) -> bool {
        matches!(self, BoundaryTag::Solid)
    }

    /// Check if this is an open boundary.
    pub fn is_open(&self) -> bool {
        matches!(self, BoundaryTag::Open)
    }
}
