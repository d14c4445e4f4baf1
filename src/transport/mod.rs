//! Tracer transport on the triangular mesh and sigma layers.
//!
//! - [`HorizontalAdvection`]: flux-limited upwind finite volumes with an
//!   optional eddy-diffusive face flux
//! - [`VerticalAdvection`]: interface exchange from the vertical velocity
//! - [`HorizontalDiffusion`]: shear-based eddy diffusivity
//! - [`VerticalDiffusion`]: implicit tridiagonal mixing per column
//!
//! Velocities are supplied as forcing; this module never computes flow.

mod advection;
mod diffusion;
mod gradient;
mod limiter;

pub use advection::{
    FaceFlux, HorizontalAdvection, StepLimit, VerticalAdvection, accumulate, mass_exchange,
    stable_dt,
};
pub use diffusion::{
    HorizontalDiffusion, PIVOT_EPS, VelocityGradient, VerticalDiffusion, shear_rate,
    velocity_gradient,
};
#[cfg(feature = "parallel")]
pub use gradient::element_gradients_parallel;
pub use gradient::{ElementGradients, element_gradients};
pub use limiter::{FluxLimiter, NeighborBounds};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mesh::TriangularMesh;
use crate::state::Field;
use crate::types::ElementIndex;
use crate::vertical::Layers;

/// Horizontal velocity at element centroids, per layer (m/s).
#[derive(Clone, Debug)]
pub struct ElementVelocity {
    /// Eastward component, (element × layer)
    pub u: Field,
    /// Northward component, (element × layer)
    pub v: Field,
}

impl ElementVelocity {
    /// Wrap two (element × layer) fields.
    pub fn new(u: Field, v: Field) -> Self {
        Self { u, v }
    }

    /// Same velocity everywhere.
    pub fn uniform(mesh: &TriangularMesh, layers: &Layers, u: f64, v: f64) -> Self {
        let (n, l) = (mesh.n_elements(), layers.n_layers());
        Self {
            u: Field::constant(n, l, u),
            v: Field::constant(n, l, v),
        }
    }

    /// Velocity from `f(x, y, layer) -> (u, v)` evaluated at centroids.
    pub fn from_fn(
        mesh: &TriangularMesh,
        n_layers: usize,
        f: impl Fn(f64, f64, usize) -> (f64, f64),
    ) -> Self {
        let n = mesh.n_elements();
        let at = |e: usize, k: usize| {
            let (x, y) = mesh.centroid(ElementIndex::new(e));
            f(x, y, k)
        };
        Self {
            u: Field::from_fn(n, n_layers, |e, k| at(e, k).0),
            v: Field::from_fn(n, n_layers, |e, k| at(e, k).1),
        }
    }

    /// Check shapes against the mesh and layers.
    pub fn check(&self, mesh: &TriangularMesh, layers: &Layers) -> Result<()> {
        self.u.check_shape("u velocity", mesh.n_elements(), layers.n_layers())?;
        self.v.check_shape("v velocity", mesh.n_elements(), layers.n_layers())
    }

    /// Speed at (element, layer).
    #[inline]
    pub fn speed(&self, element: usize, layer: usize) -> f64 {
        self.u.get(element, layer).hypot(self.v.get(element, layer))
    }
}

/// Transport settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Face reconstruction policy
    pub limiter: FluxLimiter,
    /// Horizontal eddy diffusivity
    pub horizontal: HorizontalDiffusion,
    /// Vertical mixing
    pub vertical: VerticalDiffusion,
    /// Disable horizontal transport (column runs)
    pub horizontal_enabled: bool,
    /// Courant number of the explicit substeps, in (0, 1]
    pub cfl: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            limiter: FluxLimiter::default(),
            horizontal: HorizontalDiffusion::default(),
            vertical: VerticalDiffusion::default(),
            horizontal_enabled: true,
            cfl: 0.9,
        }
    }
}

impl TransportConfig {
    /// Set the reconstruction policy.
    pub fn with_limiter(mut self, limiter: FluxLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Set the molecular vertical diffusivity floor.
    pub fn with_molecular(mut self, molecular: f64) -> Self {
        self.vertical.molecular = molecular;
        self
    }

    /// Set the Courant number of the explicit substeps.
    pub fn with_cfl(mut self, cfl: f64) -> Self {
        self.cfl = cfl;
        self
    }

    /// Column-only runs skip horizontal transport.
    pub fn column_only(mut self) -> Self {
        self.horizontal_enabled = false;
        self
    }
}
