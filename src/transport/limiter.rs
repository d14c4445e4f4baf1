//! Flux limiting for node-centred reconstruction.
//!
//! A face value extrapolated from the upwind node `u` is clipped so that
//! both nodes sharing the face see it as a value inside their own
//! neighborhood range:
//!
//! ```text
//! lo = max(min_u, min_d, 2 c_u - max_u)
//! hi = min(max_u, max_d, 2 c_u - min_u)
//! ```
//!
//! The downwind node `d` gains `q (c_f - c_d)` and the upwind node loses
//! `q (c_f - c_u)`, the same as gaining `q (2 c_u - c_f - c_u)`. With both
//! `c_f` and its reflection `2 c_u - c_f` inside the local ranges, each
//! explicit update is a convex combination of neighbor values once the
//! step satisfies [`super::stable_dt`], so no new local extremum appears.
//! The interval always contains `c_u`, since `d` neighbors `u`.

use serde::{Deserialize, Serialize};

use crate::mesh::TriangularMesh;
use crate::state::Field;
use crate::types::NodeIndex;

/// Reconstruction policy for face values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluxLimiter {
    /// Linear extrapolation clipped to neighbor bounds (second order, TVD).
    #[default]
    MinMax,
    /// No reconstruction: the face takes the upwind node value (first order).
    FirstOrder,
}

/// Local min/max of a node and its neighbors, per layer.
#[derive(Clone, Debug)]
pub struct NeighborBounds {
    /// Lower bound per (node, layer)
    pub min: Field,
    /// Upper bound per (node, layer)
    pub max: Field,
}

impl NeighborBounds {
    /// Compute bounds over each node's neighbor ring (the node included).
    pub fn compute(mesh: &TriangularMesh, field: &Field) -> Self {
        let n_layers = field.n_layers();
        let mut min = field.clone();
        let mut max = field.clone();
        for node in 0..mesh.n_nodes() {
            for &other in mesh.neighbors(NodeIndex::new(node)) {
                for k in 0..n_layers {
                    let c = field.get(other, k);
                    if c < min.get(node, k) {
                        min.set(node, k, c);
                    }
                    if c > max.get(node, k) {
                        max.set(node, k, c);
                    }
                }
            }
        }
        Self { min, max }
    }

    /// Admissible face-value interval between an upwind node holding
    /// `value` and its downwind neighbor.
    #[inline]
    pub fn face_range(&self, upwind: usize, downwind: usize, layer: usize, value: f64) -> (f64, f64) {
        let (min_u, max_u) = (self.min.get(upwind, layer), self.max.get(upwind, layer));
        let lo = min_u.max(self.min.get(downwind, layer)).max(2.0 * value - max_u);
        let hi = max_u.min(self.max.get(downwind, layer)).min(2.0 * value - min_u);
        (lo, hi)
    }

    /// Check if a value lies inside the bounds of (node, layer).
    #[inline]
    pub fn contains(&self, node: usize, layer: usize, value: f64) -> bool {
        value >= self.min.get(node, layer) && value <= self.max.get(node, layer)
    }
}

impl FluxLimiter {
    /// Reconstruct a face value from the upwind node.
    ///
    /// `value` is the upwind concentration, `gradient` the element
    /// gradient and `offset` the displacement from the upwind node to the
    /// face point.
    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub fn reconstruct(
        &self,
        bounds: &NeighborBounds,
        upwind: usize,
        downwind: usize,
        layer: usize,
        value: f64,
        gradient: (f64, f64),
        offset: (f64, f64),
    ) -> f64 {
        match self {
            FluxLimiter::FirstOrder => value,
            FluxLimiter::MinMax => {
                let extrapolated = value + gradient.0 * offset.0 + gradient.1 * offset.1;
                let (lo, hi) = bounds.face_range(upwind, downwind, layer, value);
                // Rounding can cross lo and hi by an ulp; max/min never panics
                extrapolated.max(lo).min(hi)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_include_node_and_ring() {
        let mesh = TriangularMesh::rectangle(2, 2, 2.0, 2.0, 1.0).unwrap();
        // Spike at the interior node 4
        let field = Field::from_fn(mesh.n_nodes(), 1, |i, _| if i == 4 { 10.0 } else { i as f64 });
        let bounds = NeighborBounds::compute(&mesh, &field);
        assert_eq!(bounds.max.get(4, 0), 10.0);
        assert_eq!(bounds.max.get(0, 0), 10.0);
        assert_eq!(bounds.min.get(8, 0), 5.0);
        assert!(!bounds.contains(8, 0, 100.0));
        assert!(bounds.contains(8, 0, 6.0));
    }

    #[test]
    fn test_reconstruct_clips_overshoot() {
        let mesh = TriangularMesh::rectangle(1, 1, 1.0, 1.0, 1.0).unwrap();
        let field = Field::from_fn(4, 1, |i, _| i as f64);
        let bounds = NeighborBounds::compute(&mesh, &field);
        let face = FluxLimiter::MinMax.reconstruct(&bounds, 0, 1, 0, 0.0, (-50.0, 0.0), (0.5, 0.0));
        assert_eq!(face, bounds.min.get(0, 0));
        let face = FluxLimiter::FirstOrder.reconstruct(&bounds, 0, 1, 0, 0.0, (50.0, 0.0), (0.5, 0.0));
        assert_eq!(face, 0.0);
    }

    #[test]
    fn test_upwind_minimum_is_not_drained_below_itself() {
        let mesh = TriangularMesh::rectangle(1, 1, 1.0, 1.0, 1.0).unwrap();
        let field = Field::from_fn(4, 1, |i, _| i as f64);
        let bounds = NeighborBounds::compute(&mesh, &field);
        // Node 0 is its neighborhood minimum; a face above it would let
        // outflow pull it lower
        let face = FluxLimiter::MinMax.reconstruct(&bounds, 0, 1, 0, 0.0, (50.0, 0.0), (0.5, 0.0));
        assert_eq!(face, 0.0);
    }

    #[test]
    fn test_face_and_reflection_stay_in_both_ranges() {
        let mesh = TriangularMesh::rectangle(3, 3, 3.0, 3.0, 1.0).unwrap();
        let field = Field::from_fn(mesh.n_nodes(), 1, |i, _| ((i * 7) % 5) as f64 + 0.25 * (i % 3) as f64);
        let bounds = NeighborBounds::compute(&mesh, &field);
        for upwind in 0..mesh.n_nodes() {
            let value = field.get(upwind, 0);
            for &downwind in mesh.neighbors(NodeIndex::new(upwind)) {
                let (lo, hi) = bounds.face_range(upwind, downwind, 0, value);
                assert!(lo <= value && value <= hi);
                for gradient in [(-9.0, 4.0), (0.3, -0.1), (12.0, 12.0)] {
                    let face =
                        FluxLimiter::MinMax.reconstruct(&bounds, upwind, downwind, 0, value, gradient, (0.4, 0.3));
                    assert!(bounds.contains(upwind, 0, face));
                    assert!(bounds.contains(downwind, 0, face));
                    assert!(bounds.contains(upwind, 0, 2.0 * value - face));
                }
            }
        }
    }
}
