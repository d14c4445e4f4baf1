//! Per-element tracer gradients (scatter phase).
//!
//! Green–Gauss on each triangle: for every edge `(p, q)` of the element,
//! taken counter-clockwise, the edge-averaged concentration is weighted by
//! the edge displacement and the sum is divided by the element area:
//!
//! ```text
//! ∂c/∂x = (1/A) Σ ½(c_p + c_q) (y_q - y_p)
//! ∂c/∂y = (1/A) Σ ½(c_p + c_q) (x_p - x_q)
//! ```
//!
//! The result is exact for linear fields. All element gradients are
//! computed before any node reads them; the face reconstruction in
//! [`super::advection`] is the matching gather phase.

use crate::mesh::TriangularMesh;
use crate::state::Field;
use crate::types::{ElementIndex, NodeIndex};

/// Tracer gradients stored per (element, layer).
#[derive(Clone, Debug)]
pub struct ElementGradients {
    /// ∂c/∂x
    pub dx: Field,
    /// ∂c/∂y
    pub dy: Field,
}

impl ElementGradients {
    /// Gradient vector of one element layer.
    #[inline]
    pub fn at(&self, element: usize, layer: usize) -> (f64, f64) {
        (self.dx.get(element, layer), self.dy.get(element, layer))
    }
}

/// Green–Gauss gradient of one element for every layer.
fn element_gradient(mesh: &TriangularMesh, field: &Field, element: usize) -> Vec<(f64, f64)> {
    let tri = mesh.element(ElementIndex::new(element));
    let inv_area = 1.0 / mesh.element_area(ElementIndex::new(element));
    let points = tri.map(|v| mesh.coordinates(NodeIndex::new(v)));

    (0..field.n_layers())
        .map(|k| {
            let (mut gx, mut gy) = (0.0, 0.0);
            for local in 0..3 {
                let next = (local + 1) % 3;
                let avg = 0.5 * (field.get(tri[local], k) + field.get(tri[next], k));
                gx += avg * (points[next].1 - points[local].1);
                gy += avg * (points[local].0 - points[next].0);
            }
            (gx * inv_area, gy * inv_area)
        })
        .collect()
}

/// Compute gradients of a node field for every element.
pub fn element_gradients(mesh: &TriangularMesh, field: &Field) -> ElementGradients {
    let per_element: Vec<_> = (0..mesh.n_elements())
        .map(|e| element_gradient(mesh, field, e))
        .collect();
    collect_gradients(per_element, field.n_layers())
}

/// Compute element gradients in parallel.
#[cfg(feature = "parallel")]
pub fn element_gradients_parallel(mesh: &TriangularMesh, field: &Field) -> ElementGradients {
    use rayon::prelude::*;

    let per_element: Vec<_> = (0..mesh.n_elements())
        .into_par_iter()
        .map(|e| element_gradient(mesh, field, e))
        .collect();
    collect_gradients(per_element, field.n_layers())
}

fn collect_gradients(per_element: Vec<Vec<(f64, f64)>>, n_layers: usize) -> ElementGradients {
    let n_elements = per_element.len();
    let mut dx = Field::zeros(n_elements, n_layers);
    let mut dy = Field::zeros(n_elements, n_layers);
    for (e, layers) in per_element.into_iter().enumerate() {
        for (k, (gx, gy)) in layers.into_iter().enumerate() {
            dx.set(e, k, gx);
            dy.set(e, k, gy);
        }
    }
    ElementGradients { dx, dy }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    #[test]
    fn test_linear_field_gradient_is_exact() {
        let mesh = TriangularMesh::rectangle(4, 3, 400.0, 300.0, 10.0).unwrap();
        let field = Field::from_fn(mesh.n_nodes(), 2, |i, k| {
            let (x, y) = mesh.coordinates(NodeIndex::new(i));
            0.01 * x - 0.02 * y + k as f64
        });
        let grads = element_gradients(&mesh, &field);
        for e in 0..mesh.n_elements() {
            for k in 0..2 {
                let (gx, gy) = grads.at(e, k);
                assert!((gx - 0.01).abs() < TOL);
                assert!((gy + 0.02).abs() < TOL);
            }
        }
    }

    #[test]
    fn test_uniform_field_has_zero_gradient() {
        let mesh = TriangularMesh::rectangle(3, 3, 3.0, 3.0, 1.0).unwrap();
        let field = Field::constant(mesh.n_nodes(), 3, 7.5);
        let grads = element_gradients(&mesh, &field);
        assert!(grads.dx.max().abs() < TOL && grads.dx.min().abs() < TOL);
        assert!(grads.dy.max().abs() < TOL && grads.dy.min().abs() < TOL);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_serial() {
        let mesh = TriangularMesh::rectangle(5, 4, 5.0, 4.0, 1.0).unwrap();
        let field = Field::from_fn(mesh.n_nodes(), 2, |i, k| ((i * 7 + k) % 5) as f64);
        let a = element_gradients(&mesh, &field);
        let b = element_gradients_parallel(&mesh, &field);
        for e in 0..mesh.n_elements() {
            assert_eq!(a.at(e, 1), b.at(e, 1));
        }
    }
}
