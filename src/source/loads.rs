//! External mass loads.
//!
//! Point loads (rivers, outfalls) inject a constant mass rate into one
//! (node, layer) cell. Surface loads (atmospheric deposition) spread an
//! areal flux over the surface layer of every node. Both are converted to
//! concentration tendencies (g/m³/s) using the cell volume.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::mesh::TriangularMesh;
use crate::state::{FieldArena, Tracer};
use crate::types::{LayerIndex, NodeIndex};
use crate::vertical::Layers;

/// Constant mass input at one cell (g/s).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointLoad {
    pub node: usize,
    pub layer: usize,
    pub tracer: Tracer,
    pub rate: f64,
}

/// Areal flux into the surface layer (g/m²/s).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceLoad {
    pub tracer: Tracer,
    pub flux: f64,
}

/// Collection of external loads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Loads {
    pub point: Vec<PointLoad>,
    pub surface: Vec<SurfaceLoad>,
}

impl Loads {
    /// No loads.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point load.
    pub fn with_point(mut self, load: PointLoad) -> Self {
        self.point.push(load);
        self
    }

    /// Add a surface load.
    pub fn with_surface(mut self, load: SurfaceLoad) -> Self {
        self.surface.push(load);
        self
    }

    /// Check if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.point.is_empty() && self.surface.is_empty()
    }

    /// Check every point load addresses an existing cell.
    pub fn validate(&self, mesh: &TriangularMesh, layers: &Layers) -> Result<()> {
        for load in &self.point {
            if load.node >= mesh.n_nodes() || load.layer >= layers.n_layers() {
                return Err(EngineError::dimension_mismatch(
                    format!("point load of {}", load.tracer),
                    format!("node < {}, layer < {}", mesh.n_nodes(), layers.n_layers()),
                    format!("node {}, layer {}", load.node, load.layer),
                ));
            }
        }
        Ok(())
    }

    /// Add load tendencies (g/m³/s) into `tendency`.
    pub fn tendency(&self, mesh: &TriangularMesh, layers: &Layers, tendency: &mut FieldArena) {
        for load in &self.point {
            let node = NodeIndex::new(load.node);
            let volume = mesh.node_area(node)
                * layers.thickness(LayerIndex::new(load.layer), mesh.depth(node));
            tendency.add(load.tracer, load.node, load.layer, load.rate / volume);
        }

        let surface = LayerIndex::new(0);
        for load in &self.surface {
            for node in NodeIndex::iter(mesh.n_nodes()) {
                let h = layers.thickness(surface, mesh.depth(node));
                tendency.add(load.tracer, node.get(), 0, load.flux / h);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_point_load_mass_rate() {
        let mesh = TriangularMesh::rectangle(2, 2, 20.0, 20.0, 4.0).unwrap();
        let layers = Layers::uniform(3).unwrap();
        let loads = Loads::new().with_point(PointLoad {
            node: 4,
            layer: 1,
            tracer: Tracer::Nitrate,
            rate: 2.0,
        });
        let mut tendency = FieldArena::new(mesh.n_nodes(), layers.n_layers());
        loads.tendency(&mesh, &layers, &mut tendency);

        // Interior node control volume is 100 m², layer is 2 m thick
        let volume = mesh.node_area(NodeIndex::new(4)) * 2.0;
        let mass_rate = tendency.value(Tracer::Nitrate, 4, 1) * volume;
        assert!((mass_rate - 2.0).abs() < TOL);
        assert_eq!(tendency.value(Tracer::Nitrate, 4, 0), 0.0);
    }

    #[test]
    fn test_surface_load_total() {
        let mesh = TriangularMesh::rectangle(3, 2, 30.0, 20.0, 5.0).unwrap();
        let layers = Layers::uniform(6).unwrap();
        let loads = Loads::new().with_surface(SurfaceLoad {
            tracer: Tracer::Phosphate,
            flux: 0.5,
        });
        let mut tendency = FieldArena::new(mesh.n_nodes(), layers.n_layers());
        loads.tendency(&mesh, &layers, &mut tendency);

        let h = layers.thickness(LayerIndex::new(0), 5.0);
        let total: f64 = (0..mesh.n_nodes())
            .map(|i| tendency.value(Tracer::Phosphate, i, 0) * h * mesh.node_area(NodeIndex::new(i)))
            .sum();
        assert!((total - 0.5 * mesh.total_area()).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_load_rejected() {
        let mesh = TriangularMesh::rectangle(1, 1, 1.0, 1.0, 1.0).unwrap();
        let layers = Layers::uniform(3).unwrap();
        let loads = Loads::new().with_point(PointLoad {
            node: 9,
            layer: 0,
            tracer: Tracer::Oxygen,
            rate: 1.0,
        });
        assert!(loads.validate(&mesh, &layers).is_err());
    }
}
