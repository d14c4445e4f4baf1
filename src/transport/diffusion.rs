//! Turbulent mixing.
//!
//! # Horizontal
//!
//! Velocity derivatives are integrated around each node's control volume
//! (Green–Gauss on the median dual), with element velocities held constant
//! on the dual faces inside each element. Boundary nodes close their
//! control volume along the boundary edges. The resulting shear rate
//!
//! ```text
//! S = A · sqrt(ux² + vy² + ½(uy + vx)²)
//! ```
//!
//! has units of m²/s and serves as a Smagorinsky-type eddy diffusivity
//! proxy.
//!
//! # Vertical
//!
//! Implicit in time. For layer k of a column of depth H:
//!
//! ```text
//! -a_k c_{k-1} + (1 + a_k + b_k) c_k - b_k c_{k+1} = c_k^old
//! a_k = dt K_k  above_k / H²
//! b_k = dt K_{k+1} below_k / H²
//! ```
//!
//! solved by forward elimination from the surface and back substitution
//! from the bed. Surface and bed are no-flux; open-boundary nodes keep
//! their prescribed values.

use serde::{Deserialize, Serialize};

use super::ElementVelocity;
use crate::error::{EngineError, Result};
use crate::mesh::TriangularMesh;
use crate::state::Field;
use crate::types::{ElementIndex, NodeIndex};
use crate::vertical::Layers;

/// Smallest admissible pivot in the tridiagonal elimination.
pub const PIVOT_EPS: f64 = 1e-12;

/// Velocity derivatives at a node, averaged over its control volume.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VelocityGradient {
    pub ux: f64,
    pub uy: f64,
    pub vx: f64,
    pub vy: f64,
}

impl VelocityGradient {
    /// Deformation rate `sqrt(ux² + vy² + ½(uy + vx)²)` (1/s).
    #[inline]
    pub fn deformation(&self) -> f64 {
        let shear = self.uy + self.vx;
        (self.ux * self.ux + self.vy * self.vy + 0.5 * shear * shear).sqrt()
    }
}

/// Control-volume velocity gradient of one node and layer.
pub fn velocity_gradient(
    mesh: &TriangularMesh,
    velocity: &ElementVelocity,
    node: usize,
    layer: usize,
) -> VelocityGradient {
    let index = NodeIndex::new(node);
    let centre = mesh.coordinates(index);
    let mut grad = VelocityGradient::default();

    let mut segment = |p: (f64, f64), q: (f64, f64), u: f64, v: f64| {
        let (dx, dy) = (q.0 - p.0, q.1 - p.1);
        grad.ux += u * dy;
        grad.uy -= u * dx;
        grad.vx += v * dy;
        grad.vy -= v * dx;
    };

    for &e in mesh.parents(index) {
        let element = ElementIndex::new(e);
        let tri = mesh.element(element);
        let Some(local) = tri.iter().position(|&v| v == node) else {
            continue;
        };
        let a = tri[(local + 1) % 3];
        let b = tri[(local + 2) % 3];
        let pa = mesh.coordinates(NodeIndex::new(a));
        let pb = mesh.coordinates(NodeIndex::new(b));
        let mid_a = (0.5 * (centre.0 + pa.0), 0.5 * (centre.1 + pa.1));
        let mid_b = (0.5 * (centre.0 + pb.0), 0.5 * (centre.1 + pb.1));
        let centroid = mesh.centroid(element);
        let (u, v) = (velocity.u.get(e, layer), velocity.v.get(e, layer));

        segment(mid_a, centroid, u, v);
        segment(centroid, mid_b, u, v);

        // Close the control volume along boundary edges
        if mesh.edge_between(node, a).is_some_and(|edge| edge.is_boundary()) {
            segment(centre, mid_a, u, v);
        }
        if mesh.edge_between(node, b).is_some_and(|edge| edge.is_boundary()) {
            segment(mid_b, centre, u, v);
        }
    }

    let inv_area = 1.0 / mesh.node_area(index);
    grad.ux *= inv_area;
    grad.uy *= inv_area;
    grad.vx *= inv_area;
    grad.vy *= inv_area;
    grad
}

/// Area-scaled shear rate per (node, layer), in m²/s.
pub fn shear_rate(
    mesh: &TriangularMesh,
    layers: &Layers,
    velocity: &ElementVelocity,
) -> Result<Field> {
    velocity.check(mesh, layers)?;
    Ok(Field::from_fn(mesh.n_nodes(), layers.n_layers(), |node, k| {
        let area = mesh.node_area(NodeIndex::new(node));
        area * velocity_gradient(mesh, velocity, node, k).deformation()
    }))
}

/// Horizontal eddy diffusivity from the local shear rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HorizontalDiffusion {
    /// Smagorinsky-type coefficient (dimensionless)
    pub coefficient: f64,
    /// Background diffusivity (m²/s)
    pub floor: f64,
}

impl Default for HorizontalDiffusion {
    fn default() -> Self {
        Self {
            coefficient: 0.2,
            floor: 1e-4,
        }
    }
}

impl HorizontalDiffusion {
    /// Eddy diffusivity `max(coefficient · S, floor)` per (node, layer).
    pub fn diffusivity(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        velocity: &ElementVelocity,
    ) -> Result<Field> {
        let mut k = shear_rate(mesh, layers, velocity)?;
        let (c, floor) = (self.coefficient, self.floor);
        k.map_inplace(|s| (c * s).max(floor));
        Ok(k)
    }
}

/// Implicit vertical diffusion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerticalDiffusion {
    /// Molecular diffusivity floor added to turbulence (m²/s)
    pub molecular: f64,
}

impl Default for VerticalDiffusion {
    fn default() -> Self {
        Self { molecular: 1e-4 }
    }
}

impl VerticalDiffusion {
    /// Diffuse every column of `field` over `dt` seconds.
    ///
    /// `turbulence` is (node × level) eddy diffusivity (m²/s) at the sigma
    /// levels; values at the surface and bed are unused.
    ///
    /// # Errors
    ///
    /// [`EngineError::NumericInstability`] when a pivot vanishes or the
    /// solution becomes non-finite.
    pub fn solve(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &mut Field,
        turbulence: &Field,
        dt: f64,
    ) -> Result<()> {
        self.check(mesh, layers, field, turbulence)?;
        for node in 0..mesh.n_nodes() {
            if mesh.open_mask()[node] {
                continue;
            }
            let column = self.solve_column(mesh, layers, field, turbulence, node, dt)?;
            field.set_column(node, &column);
        }
        Ok(())
    }

    /// Diffuse every column in parallel.
    #[cfg(feature = "parallel")]
    pub fn solve_parallel(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &mut Field,
        turbulence: &Field,
        dt: f64,
    ) -> Result<()> {
        use rayon::prelude::*;

        self.check(mesh, layers, field, turbulence)?;
        let snapshot: &Field = field;
        let columns: Vec<Option<Vec<f64>>> = (0..mesh.n_nodes())
            .into_par_iter()
            .map(|node| {
                if mesh.open_mask()[node] {
                    Ok(None)
                } else {
                    self.solve_column(mesh, layers, snapshot, turbulence, node, dt)
                        .map(Some)
                }
            })
            .collect::<Result<_>>()?;
        for (node, column) in columns.into_iter().enumerate() {
            if let Some(column) = column {
                field.set_column(node, &column);
            }
        }
        Ok(())
    }

    fn check(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &Field,
        turbulence: &Field,
    ) -> Result<()> {
        field.check_shape("tracer", mesh.n_nodes(), layers.n_layers())?;
        turbulence.check_shape("vertical diffusivity", mesh.n_nodes(), layers.n_levels())
    }

    /// Tridiagonal solve for one node column.
    fn solve_column(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &Field,
        turbulence: &Field,
        node: usize,
        dt: f64,
    ) -> Result<Vec<f64>> {
        let n = layers.n_layers();
        let depth = mesh.depth(NodeIndex::new(node));
        let scale = dt / (depth * depth);
        let stencil = layers.stencil();

        let mut upper = vec![0.0; n];
        let mut lower = vec![0.0; n];
        let mut diag = vec![1.0; n];
        for k in 0..n {
            if k > 0 {
                let kz = turbulence.get(node, k) + self.molecular;
                lower[k] = -scale * kz * stencil[k].above;
            }
            if k + 1 < n {
                let kz = turbulence.get(node, k + 1) + self.molecular;
                upper[k] = -scale * kz * stencil[k].below;
            }
            diag[k] = 1.0 - lower[k] - upper[k];
        }

        // Forward elimination, surface to bed
        let mut cp = vec![0.0; n];
        let mut dp = vec![0.0; n];
        let mut pivot = diag[0];
        for k in 0..n {
            if k > 0 {
                pivot = diag[k] - lower[k] * cp[k - 1];
            }
            if !pivot.is_finite() || pivot.abs() < PIVOT_EPS {
                return Err(EngineError::instability(
                    "vertical diffusion",
                    node,
                    k,
                    format!("pivot {pivot:e}"),
                ));
            }
            cp[k] = upper[k] / pivot;
            let previous = if k > 0 { lower[k] * dp[k - 1] } else { 0.0 };
            dp[k] = (field.get(node, k) - previous) / pivot;
        }

        // Back substitution, bed to surface
        let mut column = dp;
        for k in (0..n.saturating_sub(1)).rev() {
            column[k] -= cp[k] * column[k + 1];
        }
        if let Some(k) = column.iter().position(|c| !c.is_finite()) {
            return Err(EngineError::instability(
                "vertical diffusion",
                node,
                k,
                "non-finite solution",
            ));
        }
        Ok(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    fn setup() -> (TriangularMesh, Layers) {
        let mesh = TriangularMesh::rectangle(3, 3, 300.0, 300.0, 12.0).unwrap();
        let layers = Layers::uniform(6).unwrap();
        (mesh, layers)
    }

    #[test]
    fn test_uniform_velocity_has_no_shear() {
        let (mesh, layers) = setup();
        let velocity = ElementVelocity::uniform(&mesh, &layers, 0.4, -0.7);
        let shear = shear_rate(&mesh, &layers, &velocity).unwrap();
        assert!(shear.max() < 1e-9);
    }

    #[test]
    fn test_sheared_flow_gives_positive_diffusivity() {
        let (mesh, layers) = setup();
        let velocity = ElementVelocity::from_fn(&mesh, layers.n_layers(), |_, y, _| (1e-3 * y, 0.0));
        let interior = 5;
        let grad = velocity_gradient(&mesh, &velocity, interior, 0);
        assert!(grad.uy > 0.0);
        assert!(grad.deformation() > 0.0);

        let k = HorizontalDiffusion::default()
            .diffusivity(&mesh, &layers, &velocity)
            .unwrap();
        assert!(k.get(interior, 0) > HorizontalDiffusion::default().floor);
        assert!(k.min() >= HorizontalDiffusion::default().floor);
    }

    #[test]
    fn test_vertical_diffusion_conserves_and_bounds() {
        let (mesh, layers) = setup();
        let mut field = Field::from_fn(mesh.n_nodes(), layers.n_layers(), |i, k| {
            if k == 0 { 10.0 + i as f64 } else { 1.0 }
        });
        let before = field.clone();
        let turbulence = Field::constant(mesh.n_nodes(), layers.n_levels(), 1e-2);
        VerticalDiffusion::default()
            .solve(&mesh, &layers, &mut field, &turbulence, 3600.0)
            .unwrap();

        for node in 0..mesh.n_nodes() {
            let old: f64 = before.column(node).iter().zip(layers.dz()).map(|(c, d)| c * d).sum();
            let new: f64 = field.column(node).iter().zip(layers.dz()).map(|(c, d)| c * d).sum();
            assert!((old - new).abs() < TOL * old.abs().max(1.0));

            let (lo, hi) = (1.0, 10.0 + node as f64);
            for c in field.column(node) {
                assert!(c >= lo - TOL && c <= hi + TOL);
            }
            // Mixing moves mass downward
            assert!(field.get(node, 0) < before.get(node, 0));
        }
    }

    #[test]
    fn test_uniform_column_is_unchanged() {
        let (mesh, layers) = setup();
        let mut field = Field::constant(mesh.n_nodes(), layers.n_layers(), 4.2);
        let turbulence = Field::constant(mesh.n_nodes(), layers.n_levels(), 0.5);
        VerticalDiffusion::default()
            .solve(&mesh, &layers, &mut field, &turbulence, 86_400.0)
            .unwrap();
        assert!((field.max() - 4.2).abs() < TOL);
        assert!((field.min() - 4.2).abs() < TOL);
    }

    #[test]
    fn test_open_nodes_hold_values() {
        let mesh = TriangularMesh::rectangle(2, 2, 2.0, 2.0, 5.0)
            .unwrap()
            .with_open_nodes(&[0, 1, 2])
            .unwrap();
        let layers = Layers::uniform(4).unwrap();
        let mut field = Field::from_fn(mesh.n_nodes(), 3, |_, k| k as f64);
        let turbulence = Field::constant(mesh.n_nodes(), 4, 1.0);
        VerticalDiffusion::default()
            .solve(&mesh, &layers, &mut field, &turbulence, 600.0)
            .unwrap();
        assert_eq!(field.column(0), vec![0.0, 1.0, 2.0]);
        assert!(field.get(4, 0) > 0.0);
    }

    #[test]
    fn test_singular_system_is_fatal() {
        let (mesh, layers) = setup();
        let mut field = Field::constant(mesh.n_nodes(), layers.n_layers(), 1.0);
        let turbulence = Field::constant(mesh.n_nodes(), layers.n_levels(), f64::NAN);
        let err = VerticalDiffusion::default()
            .solve(&mesh, &layers, &mut field, &turbulence, 60.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::NumericInstability { .. }));
    }
}
