//! Finite-volume advection on node-centred control volumes.
//!
//! # Horizontal
//!
//! Two phases separated by a barrier:
//!
//! 1. Scatter over elements: Green–Gauss gradients of every layer
//!    ([`super::gradient`]).
//! 2. Gather over dual faces: each face takes the upwind node from the sign
//!    of its normal volume flux, extrapolates the upwind value to the face
//!    point with the element gradient and clips it to the upwind node's
//!    neighbor bounds ([`super::limiter`]).
//!
//! The mass flux of a face is credited to one node and debited from the
//! other, so the exchange between two nodes is equal and opposite. The
//! concentration tendency of a node subtracts the volume divergence of
//! the supplied velocity,
//!
//! ```text
//! dc_i/dt = (1 / V_i) Σ_f ±(F_f - q_f c_i)
//! ```
//!
//! so that a uniform tracer stays uniform under any forcing.
//!
//! # Vertical
//!
//! Interior interfaces exchange `ω c*` between the layers they separate,
//! with `c*` the thickness-weighted interface concentration. The surface
//! and bed carry no flux.
//!
//! # Time step
//!
//! Both operators are explicit. [`stable_dt`] bounds the step so that no
//! control volume exchanges more than its own volume per step:
//!
//! ```text
//! dt ≤ cfl · min_i V_i / (Σ_f |q_f| + A_i (|ω_top| + |ω_bot|) + Σ_f K_f h_f |n_f| G_f)
//! ```
//!
//! with `G_f` the summed basis-gradient magnitude of the face's element.
//! Under this bound a limited face value keeps every node inside the range
//! of its neighbors.

use super::ElementVelocity;
use super::gradient::{ElementGradients, element_gradients};
use super::limiter::{FluxLimiter, NeighborBounds};
use crate::error::Result;
use crate::mesh::{DualFace, TriangularMesh};
use crate::state::Field;
use crate::types::{ElementIndex, NodeIndex};
use crate::vertical::Layers;

/// Mass exchanged across one dual face in one layer.
///
/// Positive fluxes move mass from `from` to `to`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceFlux {
    /// Tail node of the face normal
    pub from: usize,
    /// Head node of the face normal
    pub to: usize,
    /// Layer index
    pub layer: usize,
    /// Upwind node used for reconstruction
    pub upwind: usize,
    /// Volume flux (m³/s)
    pub volume: f64,
    /// Limited face concentration
    pub face_value: f64,
    /// Advective mass flux (g/s)
    pub advective: f64,
    /// Diffusive mass flux (g/s)
    pub diffusive: f64,
}

impl FaceFlux {
    /// Total mass flux (g/s).
    #[inline]
    pub fn total(&self) -> f64 {
        self.advective + self.diffusive
    }
}

/// Horizontal advection-diffusion operator.
#[derive(Clone, Copy, Debug, Default)]
pub struct HorizontalAdvection {
    limiter: FluxLimiter,
}

impl HorizontalAdvection {
    /// Create with a reconstruction policy.
    pub fn new(limiter: FluxLimiter) -> Self {
        Self { limiter }
    }

    /// Reconstruction policy in use.
    pub fn limiter(&self) -> FluxLimiter {
        self.limiter
    }

    /// Face fluxes for every dual face and layer.
    ///
    /// `diffusivity` is an optional (node × layer) eddy diffusivity (m²/s)
    /// adding a down-gradient flux across each face.
    pub fn face_fluxes(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &Field,
        velocity: &ElementVelocity,
        diffusivity: Option<&Field>,
    ) -> Result<Vec<FaceFlux>> {
        self.check(mesh, layers, field, velocity, diffusivity)?;
        let gradients = element_gradients(mesh, field);
        Ok(self.gather(mesh, layers, field, velocity, diffusivity, &gradients))
    }

    /// Face fluxes with the scatter phase run in parallel.
    #[cfg(feature = "parallel")]
    pub fn face_fluxes_parallel(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &Field,
        velocity: &ElementVelocity,
        diffusivity: Option<&Field>,
    ) -> Result<Vec<FaceFlux>> {
        self.check(mesh, layers, field, velocity, diffusivity)?;
        let gradients = super::gradient::element_gradients_parallel(mesh, field);
        Ok(self.gather(mesh, layers, field, velocity, diffusivity, &gradients))
    }

    /// Concentration tendency (g/m³/s) per (node, layer).
    pub fn tendency(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &Field,
        velocity: &ElementVelocity,
        diffusivity: Option<&Field>,
    ) -> Result<Field> {
        let fluxes = self.face_fluxes(mesh, layers, field, velocity, diffusivity)?;
        Ok(accumulate(mesh, layers, field, &fluxes))
    }

    fn check(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &Field,
        velocity: &ElementVelocity,
        diffusivity: Option<&Field>,
    ) -> Result<()> {
        let n_layers = layers.n_layers();
        field.check_shape("tracer", mesh.n_nodes(), n_layers)?;
        velocity.check(mesh, layers)?;
        if let Some(k) = diffusivity {
            k.check_shape("horizontal diffusivity", mesh.n_nodes(), n_layers)?;
        }
        Ok(())
    }

    fn gather(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &Field,
        velocity: &ElementVelocity,
        diffusivity: Option<&Field>,
        gradients: &ElementGradients,
    ) -> Vec<FaceFlux> {
        let bounds = NeighborBounds::compute(mesh, field);
        let n_layers = layers.n_layers();
        let mut fluxes = Vec::with_capacity(mesh.dual_faces().len() * n_layers);

        for face in mesh.dual_faces() {
            let e = face.element;
            let depth = mesh.element_depth(ElementIndex::new(e));
            for k in 0..n_layers {
                let h = depth * layers.dz()[k];
                let (u, v) = (velocity.u.get(e, k), velocity.v.get(e, k));
                let volume = (u * face.normal.0 + v * face.normal.1) * h;
                let upwind = if volume >= 0.0 { face.from } else { face.to };
                let downwind = if upwind == face.from { face.to } else { face.from };
                let face_value = self.face_value(mesh, field, &bounds, gradients, face, (upwind, downwind), k);

                let diffusive = diffusivity.map_or(0.0, |kh| {
                    let coefficient = 0.5 * (kh.get(face.from, k) + kh.get(face.to, k));
                    let (gx, gy) = gradients.at(e, k);
                    -coefficient * (gx * face.normal.0 + gy * face.normal.1) * h
                });

                fluxes.push(FaceFlux {
                    from: face.from,
                    to: face.to,
                    layer: k,
                    upwind,
                    volume,
                    face_value,
                    advective: volume * face_value,
                    diffusive,
                });
            }
        }
        fluxes
    }

    #[allow(clippy::too_many_arguments)]
    fn face_value(
        &self,
        mesh: &TriangularMesh,
        field: &Field,
        bounds: &NeighborBounds,
        gradients: &ElementGradients,
        face: &DualFace,
        (upwind, downwind): (usize, usize),
        layer: usize,
    ) -> f64 {
        let (x, y) = mesh.coordinates(NodeIndex::new(upwind));
        let offset = (face.point.0 - x, face.point.1 - y);
        self.limiter.reconstruct(
            bounds,
            upwind,
            downwind,
            layer,
            field.get(upwind, layer),
            gradients.at(face.element, layer),
            offset,
        )
    }
}

/// Convert face fluxes into a concentration tendency (g/m³/s).
pub fn accumulate(
    mesh: &TriangularMesh,
    layers: &Layers,
    field: &Field,
    fluxes: &[FaceFlux],
) -> Field {
    let mut tendency = Field::zeros(mesh.n_nodes(), layers.n_layers());
    for flux in fluxes {
        let k = flux.layer;
        let mass = flux.total();
        let from_net = mass - flux.volume * field.get(flux.from, k);
        let to_net = mass - flux.volume * field.get(flux.to, k);
        tendency.add(flux.from, k, -from_net);
        tendency.add(flux.to, k, to_net);
    }
    for node in 0..mesh.n_nodes() {
        let index = NodeIndex::new(node);
        let column = mesh.node_area(index) * mesh.depth(index);
        for k in 0..layers.n_layers() {
            let volume = column * layers.dz()[k];
            tendency[(node, k)] /= volume;
        }
    }
    tendency
}

/// Net mass change per (node, layer) in g/s, without the divergence term.
pub fn mass_exchange(n_nodes: usize, n_layers: usize, fluxes: &[FaceFlux]) -> Field {
    let mut exchange = Field::zeros(n_nodes, n_layers);
    for flux in fluxes {
        exchange.add(flux.from, flux.layer, -flux.total());
        exchange.add(flux.to, flux.layer, flux.total());
    }
    exchange
}

/// Stable explicit step and the cell that sets it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepLimit {
    /// Largest stable step (s), infinite when nothing moves
    pub dt: f64,
    pub node: usize,
    pub layer: usize,
}

/// Largest stable explicit step for horizontal and vertical transport.
///
/// `omega` is (node × level) as in [`VerticalAdvection::tendency`];
/// `velocity` and `diffusivity` are left out when horizontal transport is
/// off.
pub fn stable_dt(
    mesh: &TriangularMesh,
    layers: &Layers,
    velocity: Option<&ElementVelocity>,
    omega: &Field,
    diffusivity: Option<&Field>,
    cfl: f64,
) -> Result<StepLimit> {
    let (n_nodes, n_layers) = (mesh.n_nodes(), layers.n_layers());
    omega.check_shape("vertical velocity", n_nodes, layers.n_levels())?;
    if let Some(velocity) = velocity {
        velocity.check(mesh, layers)?;
    }
    if let Some(k) = diffusivity {
        k.check_shape("horizontal diffusivity", n_nodes, n_layers)?;
    }

    let dz = layers.dz();
    // Volume exchanged per second by each (node, layer)
    let mut outgoing = Field::zeros(n_nodes, n_layers);
    if velocity.is_some() || diffusivity.is_some() {
        for face in mesh.dual_faces() {
            let e = ElementIndex::new(face.element);
            let depth = mesh.element_depth(e);
            let spread = diffusivity.map(|_| gradient_spread(mesh, e));
            for k in 0..n_layers {
                let h = depth * dz[k];
                let mut rate = velocity.map_or(0.0, |vel| {
                    let (u, v) = (vel.u.get(face.element, k), vel.v.get(face.element, k));
                    ((u * face.normal.0 + v * face.normal.1) * h).abs()
                });
                if let (Some(kh), Some(spread)) = (diffusivity, spread) {
                    let coefficient = 0.5 * (kh.get(face.from, k) + kh.get(face.to, k));
                    rate += coefficient.abs() * h * face.length() * spread;
                }
                outgoing.add(face.from, k, rate);
                outgoing.add(face.to, k, rate);
            }
        }
    }

    let mut limit = StepLimit {
        dt: f64::INFINITY,
        node: 0,
        layer: 0,
    };
    for node in NodeIndex::iter(n_nodes) {
        let i = node.get();
        let (area, depth) = (mesh.node_area(node), mesh.depth(node));
        for k in 0..n_layers {
            let mut vertical = 0.0;
            if k > 0 {
                vertical += omega.get(i, k).abs();
            }
            if k + 1 < n_layers {
                vertical += omega.get(i, k + 1).abs();
            }
            let rate = outgoing.get(i, k) + area * vertical;
            if rate > 0.0 {
                let dt = cfl * area * depth * dz[k] / rate;
                if dt < limit.dt {
                    limit = StepLimit { dt, node: i, layer: k };
                }
            }
        }
    }
    Ok(limit)
}

/// Summed magnitude of the linear basis gradients of an element (1/m).
fn gradient_spread(mesh: &TriangularMesh, element: ElementIndex) -> f64 {
    let nodes = mesh.element(element);
    let perimeter: f64 = (0..3)
        .map(|j| {
            let (ax, ay) = mesh.coordinates(NodeIndex::new(nodes[j]));
            let (bx, by) = mesh.coordinates(NodeIndex::new(nodes[(j + 1) % 3]));
            (bx - ax).hypot(by - ay)
        })
        .sum();
    perimeter / (2.0 * mesh.element_area(element))
}

/// Vertical advection across interior sigma interfaces.
#[derive(Clone, Copy, Debug, Default)]
pub struct VerticalAdvection;

impl VerticalAdvection {
    /// Concentration tendency (g/m³/s) from interface velocities.
    ///
    /// `omega` is (node × level), positive upward (m/s). Values at the
    /// surface and bed levels are ignored.
    pub fn tendency(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        field: &Field,
        omega: &Field,
    ) -> Result<Field> {
        let n_layers = layers.n_layers();
        field.check_shape("tracer", mesh.n_nodes(), n_layers)?;
        omega.check_shape("vertical velocity", mesh.n_nodes(), layers.n_levels())?;

        let dz = layers.dz();
        let mut tendency = Field::zeros(mesh.n_nodes(), n_layers);
        for node in 0..mesh.n_nodes() {
            let depth = mesh.depth(NodeIndex::new(node));
            for k in 1..n_layers {
                let (upper, lower) = (field.get(node, k - 1), field.get(node, k));
                let interface = (dz[k] * upper + dz[k - 1] * lower) / (dz[k - 1] + dz[k]);
                let flux = omega.get(node, k) * interface;
                tendency.add(node, k - 1, flux / (depth * dz[k - 1]));
                tendency.add(node, k, -flux / (depth * dz[k]));
            }
        }
        Ok(tendency)
    }
}
