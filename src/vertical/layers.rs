//! Sigma layers for terrain-following vertical discretization.
//!
//! The coordinate σ runs from 0 at the surface to -1 at the bed. A grid of
//! `n` levels bounds `n - 1` tracer layers; layer 0 touches the surface.
//!
//! Derived arrays:
//!
//! ```text
//! dz[k]  = z[k] - z[k+1]                    (layer thickness, k < n-1)
//! zz[k]  = (z[k] + z[k+1]) / 2              (layer midpoint, k < n-1)
//! zz[n-1] = 2 zz[n-2] - zz[n-3]             (extrapolated below the bed)
//! dzz[k] = zz[k] - zz[k+1]                  (midpoint spacing, k < n-1)
//! ```
//!
//! # Example
//!
//! ```
//! use wq_rs::vertical::Layers;
//!
//! let layers = Layers::uniform(11).unwrap();
//! assert_eq!(layers.n_layers(), 10);
//! assert_eq!(layers.z_index(-0.5).map(|k| k.get()), Some(5));
//! ```

use crate::error::MeshError;
use crate::types::LayerIndex;

/// Tolerance on the surface and bed sigma values.
const SIGMA_TOL: f64 = 1e-12;

/// Finite-difference weights coupling a layer to its vertical neighbors.
///
/// `above` is `1 / (dz[k] · dzz[k-1])` and `below` is `1 / (dz[k] · dzz[k])`.
/// Both are zero where the layer meets the surface or the bed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VerticalStencil {
    /// Weight of the interface with the layer above
    pub above: f64,
    /// Weight of the interface with the layer below
    pub below: f64,
}

/// Sigma-coordinate layering shared by every node.
#[derive(Clone, Debug)]
pub struct Layers {
    /// Sigma values at levels (interfaces), 0 down to -1.
    z: Vec<f64>,
    /// Layer thicknesses in sigma space.
    dz: Vec<f64>,
    /// Layer midpoints, with one extrapolated entry.
    zz: Vec<f64>,
    /// Midpoint spacing.
    dzz: Vec<f64>,
    /// Per-layer diffusion stencil.
    stencil: Vec<VerticalStencil>,
    /// Levels are evenly spaced.
    uniform: bool,
}

impl Layers {
    /// Create evenly spaced levels `z[k] = -k / (n - 1)`.
    pub fn uniform(n_levels: usize) -> Result<Self, MeshError> {
        if n_levels < 3 {
            return Err(MeshError::InvalidLayers(format!(
                "need at least 3 levels, got {n_levels}"
            )));
        }
        let span = (n_levels - 1) as f64;
        let z = (0..n_levels).map(|k| -(k as f64) / span).collect();
        Ok(Self::build(z, true))
    }

    /// Create layers from explicit sigma levels.
    ///
    /// Levels must start at 0, end at -1 and strictly decrease.
    pub fn from_sigma(levels: Vec<f64>) -> Result<Self, MeshError> {
        if levels.len() < 3 {
            return Err(MeshError::InvalidLayers(format!(
                "need at least 3 levels, got {}",
                levels.len()
            )));
        }
        if levels[0].abs() > SIGMA_TOL {
            return Err(MeshError::InvalidLayers(format!(
                "surface level must be 0, got {}",
                levels[0]
            )));
        }
        if let Some(&last) = levels.last() {
            if (last + 1.0).abs() > SIGMA_TOL {
                return Err(MeshError::InvalidLayers(format!(
                    "bed level must be -1, got {last}"
                )));
            }
        }
        if let Some(k) = levels.windows(2).position(|w| !(w[1] < w[0])) {
            return Err(MeshError::InvalidLayers(format!(
                "levels must strictly decrease (levels {k} and {})",
                k + 1
            )));
        }
        Ok(Self::build(levels, false))
    }

    fn build(z: Vec<f64>, uniform: bool) -> Self {
        let n = z.len();
        let dz: Vec<f64> = z.windows(2).map(|w| w[0] - w[1]).collect();

        let mut zz: Vec<f64> = z.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        zz.push(2.0 * zz[n - 2] - zz[n - 3]);

        let dzz: Vec<f64> = zz.windows(2).map(|w| w[0] - w[1]).collect();

        let n_layers = n - 1;
        let stencil = (0..n_layers)
            .map(|k| VerticalStencil {
                above: if k > 0 { 1.0 / (dz[k] * dzz[k - 1]) } else { 0.0 },
                below: if k + 1 < n_layers {
                    1.0 / (dz[k] * dzz[k])
                } else {
                    0.0
                },
            })
            .collect();

        Self {
            z,
            dz,
            zz,
            dzz,
            stencil,
            uniform,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of sigma levels (interfaces).
    #[inline]
    pub fn n_levels(&self) -> usize {
        self.z.len()
    }

    /// Number of tracer layers.
    #[inline]
    pub fn n_layers(&self) -> usize {
        self.dz.len()
    }

    /// Sigma values at levels.
    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Layer thicknesses in sigma units.
    pub fn dz(&self) -> &[f64] {
        &self.dz
    }

    /// Layer midpoints; the last entry is extrapolated below the bed.
    pub fn zz(&self) -> &[f64] {
        &self.zz
    }

    /// Spacing between consecutive midpoints.
    pub fn dzz(&self) -> &[f64] {
        &self.dzz
    }

    /// Depth-stencil gradient operator used by vertical diffusion.
    pub fn stencil(&self) -> &[VerticalStencil] {
        &self.stencil
    }

    /// Physical thickness of a layer for a water column of depth `depth`.
    #[inline]
    pub fn thickness(&self, layer: LayerIndex, depth: f64) -> f64 {
        self.dz[layer] * depth
    }

    /// Physical depth (positive down) of a layer midpoint.
    #[inline]
    pub fn midpoint_depth(&self, layer: LayerIndex, depth: f64) -> f64 {
        -self.zz[layer] * depth
    }

    /// Layer containing a sigma value.
    ///
    /// Uses `floor((1 - n_levels) · σ)` on evenly spaced levels and a level
    /// search otherwise. The bed itself maps onto the last layer. Returns
    /// `None` outside [-1, 0].
    pub fn z_index(&self, sigma: f64) -> Option<LayerIndex> {
        if !(-1.0 - SIGMA_TOL..=SIGMA_TOL).contains(&sigma) {
            return None;
        }
        let last = self.n_layers() - 1;
        let index = if self.uniform {
            let raw = ((1.0 - self.n_levels() as f64) * sigma).floor();
            raw.max(0.0) as usize
        } else {
            self.z[1..].iter().take_while(|&&level| level >= sigma).count()
        };
        Some(LayerIndex::new(index.min(last)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_uniform_derived_arrays() {
        let layers = Layers::uniform(11).unwrap();
        assert_eq!(layers.n_levels(), 11);
        assert_eq!(layers.dz().len(), 10);
        assert!(layers.dz().iter().all(|&d| d > 0.0));
        assert!((layers.dz().iter().sum::<f64>() - 1.0).abs() < TOL);

        let zz = layers.zz();
        let n = zz.len();
        assert_eq!(n, 11);
        assert!((zz[n - 1] - (2.0 * zz[n - 2] - zz[n - 3])).abs() < TOL);
        assert!((zz[0] + 0.05).abs() < TOL);
        assert_eq!(layers.dzz().len(), 10);
    }

    #[test]
    fn test_z_index() {
        let layers = Layers::uniform(11).unwrap();
        assert_eq!(layers.z_index(0.0), Some(LayerIndex::new(0)));
        assert_eq!(layers.z_index(-0.05), Some(LayerIndex::new(0)));
        assert_eq!(layers.z_index(-0.55), Some(LayerIndex::new(5)));
        assert_eq!(layers.z_index(-1.0), Some(LayerIndex::new(9)));
        assert_eq!(layers.z_index(0.5), None);
        assert_eq!(layers.z_index(-1.5), None);
    }

    #[test]
    fn test_z_index_stretched_matches_levels() {
        let layers = Layers::from_sigma(vec![0.0, -0.1, -0.3, -0.6, -1.0]).unwrap();
        assert_eq!(layers.z_index(-0.05).map(LayerIndex::get), Some(0));
        assert_eq!(layers.z_index(-0.2).map(LayerIndex::get), Some(1));
        assert_eq!(layers.z_index(-0.7).map(LayerIndex::get), Some(3));
        assert_eq!(layers.z_index(-1.0).map(LayerIndex::get), Some(3));
    }

    #[test]
    fn test_stencil_boundaries() {
        let layers = Layers::uniform(5).unwrap();
        let stencil = layers.stencil();
        assert_eq!(stencil.len(), 4);
        assert_eq!(stencil[0].above, 0.0);
        assert_eq!(stencil[3].below, 0.0);
        // dz = dzz = 0.25
        assert!((stencil[1].above - 16.0).abs() < 1e-9);
        assert!((stencil[1].below - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_levels() {
        assert!(Layers::uniform(2).is_err());
        assert!(Layers::from_sigma(vec![0.0, -0.5, -0.5, -1.0]).is_err());
        assert!(Layers::from_sigma(vec![0.1, -0.5, -1.0]).is_err());
        assert!(Layers::from_sigma(vec![0.0, -0.5, -0.9]).is_err());
    }

    #[test]
    fn test_physical_thickness() {
        let layers = Layers::uniform(5).unwrap();
        let k = LayerIndex::new(1);
        assert!((layers.thickness(k, 20.0) - 5.0).abs() < TOL);
        assert!((layers.midpoint_depth(k, 20.0) - 7.5).abs() < TOL);
    }
}
