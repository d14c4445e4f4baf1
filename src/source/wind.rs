//! Wind-driven surface mixing and aeration.
//!
//! The mixing rate is a surface gas-transfer velocity (m/day) used for
//! reaeration of the surface layer.
//!
//! # Mixing policies
//!
//! - **Simple**: empirical polynomial of the wind speed `s` (m/s)
//!
//!   ```text
//!   k = 0.728 √s − 0.317 s + 0.0372 s²
//!   ```
//!
//! - **Dynamic**: current shear between the two upper layers, averaged over
//!   each node's parent elements and divided by the depth of the top
//!   layer midpoint, scaled by a diffusivity constant.
//!
//! Either result is clipped to the configured floor.
//!
//! # Example
//!
//! ```
//! use wq_rs::source::{MixingPolicy, Wind, WindConfig};
//!
//! let mut wind = Wind::new(WindConfig::default().with_speed(5.0));
//! let rate = wind.mixing(None, &MixingPolicy::Simple).unwrap();
//! assert!(rate.at(0) > 0.0);
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Result;
use crate::mesh::TriangularMesh;
use crate::transport::ElementVelocity;
use crate::types::NodeIndex;
use crate::vertical::Layers;

/// Wind state and mixing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindConfig {
    /// Initial wind speed (m/s)
    pub speed: f64,
    /// Change of wind speed per second of simulated time (m/s²)
    pub acceleration: f64,
    /// Floor applied to the mixing rate (m/day)
    pub minimum: f64,
    /// Scale of the dynamic policy
    pub diffusivity: f64,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            speed: 0.0,
            acceleration: 0.0,
            minimum: 0.0,
            diffusivity: 0.0,
        }
    }
}

impl WindConfig {
    /// Set the initial wind speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Set the acceleration.
    pub fn with_acceleration(mut self, acceleration: f64) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Set the mixing floor.
    pub fn with_minimum(mut self, minimum: f64) -> Self {
        self.minimum = minimum;
        self
    }

    /// Set the dynamic-policy diffusivity.
    pub fn with_diffusivity(mut self, diffusivity: f64) -> Self {
        self.diffusivity = diffusivity;
        self
    }
}

/// How the mixing rate is derived on a given call.
#[derive(Clone, Copy, Debug)]
pub enum MixingPolicy<'a> {
    /// Empirical polynomial of the tracked wind speed
    Simple,
    /// Surface current shear over local depth
    Dynamic {
        mesh: &'a TriangularMesh,
        layers: &'a Layers,
        velocity: &'a ElementVelocity,
    },
}

/// Mixing rate, uniform or per node (m/day).
#[derive(Clone, Debug, PartialEq)]
pub enum MixingRate {
    Uniform(f64),
    PerNode(Vec<f64>),
}

impl MixingRate {
    /// Rate at a node.
    #[inline]
    pub fn at(&self, node: usize) -> f64 {
        match self {
            MixingRate::Uniform(rate) => *rate,
            MixingRate::PerNode(rates) => rates[node],
        }
    }
}

/// Wind forcing with a tracked speed.
#[derive(Clone, Debug)]
pub struct Wind {
    speed: f64,
    acceleration: f64,
    minimum: f64,
    diffusivity: f64,
}

impl Wind {
    /// Create from configuration.
    pub fn new(config: WindConfig) -> Self {
        Self {
            speed: config.speed,
            acceleration: config.acceleration,
            minimum: config.minimum,
            diffusivity: config.diffusivity,
        }
    }

    /// Current wind speed (m/s).
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Current mixing floor.
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// Advance the wind speed by `dt` seconds, optionally replacing the floor.
    pub fn update(&mut self, dt: f64, minimum: Option<f64>) {
        self.speed += self.acceleration * dt;
        if let Some(floor) = minimum {
            self.minimum = floor;
        }
    }

    /// Empirical transfer velocity for a wind speed (m/s).
    pub fn simple(speed: f64) -> f64 {
        let s = speed.max(0.0);
        0.728 * s.sqrt() - 0.317 * s + 0.0372 * s * s
    }

    /// Mixing rate for this call.
    ///
    /// The wind state only changes when `dt` is supplied.
    pub fn mixing(&mut self, dt: Option<f64>, policy: &MixingPolicy<'_>) -> Result<MixingRate> {
        if let Some(dt) = dt {
            self.update(dt, None);
        }
        let floor = self.minimum;
        let rate = match policy {
            MixingPolicy::Simple => MixingRate::Uniform(Self::simple(self.speed).max(floor)),
            MixingPolicy::Dynamic {
                mesh,
                layers,
                velocity,
            } => {
                let rates = self.dynamic(mesh, layers, velocity)?;
                MixingRate::PerNode(rates.into_iter().map(|r| r.max(floor)).collect())
            }
        };
        trace!(speed = self.speed, ?rate, "wind mixing");
        Ok(rate)
    }

    fn dynamic(
        &self,
        mesh: &TriangularMesh,
        layers: &Layers,
        velocity: &ElementVelocity,
    ) -> Result<Vec<f64>> {
        velocity.check(mesh, layers)?;
        let top = 0.5 * (layers.z()[0] + layers.z()[1]).abs();

        Ok((0..mesh.n_nodes())
            .map(|node| {
                let index = NodeIndex::new(node);
                let depth = mesh.depth(index) * top;
                self.diffusivity * surface_shear(mesh, velocity, index) / depth
            })
            .collect())
    }
}

/// Speed difference between the two upper layers, from parent-averaged velocity.
fn surface_shear(mesh: &TriangularMesh, velocity: &ElementVelocity, node: NodeIndex) -> f64 {
    let parents = mesh.parents(node);
    let n = parents.len() as f64;
    let speed = |layer: usize| {
        let u = parents.iter().map(|&e| velocity.u.get(e, layer)).sum::<f64>() / n;
        let v = parents.iter().map(|&e| velocity.v.get(e, layer)).sum::<f64>() / n;
        u.hypot(v)
    };
    (speed(0) - speed(1)).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Field;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_simple_polynomial() {
        let expected = 0.728 * 2.0 - 0.317 * 4.0 + 0.0372 * 16.0;
        assert!((Wind::simple(4.0) - expected).abs() < TOL);
        assert_eq!(Wind::simple(-3.0), 0.0);
    }

    #[test]
    fn test_state_changes_only_with_dt() {
        let mut wind = Wind::new(WindConfig::default().with_speed(2.0).with_acceleration(0.5));
        wind.mixing(None, &MixingPolicy::Simple).unwrap();
        assert_eq!(wind.speed(), 2.0);
        wind.mixing(Some(4.0), &MixingPolicy::Simple).unwrap();
        assert_eq!(wind.speed(), 4.0);
    }

    #[test]
    fn test_rate_is_clipped_to_floor() {
        // Polynomial is small near 8 m/s
        let mut wind = Wind::new(WindConfig::default().with_speed(8.0).with_minimum(5.0));
        let rate = wind.mixing(None, &MixingPolicy::Simple).unwrap();
        assert_eq!(rate, MixingRate::Uniform(5.0));
        wind.update(0.0, Some(0.0));
        assert_eq!(wind.minimum(), 0.0);
    }

    #[test]
    fn test_dynamic_follows_surface_shear() {
        let mesh = TriangularMesh::rectangle(2, 2, 20.0, 20.0, 10.0).unwrap();
        let layers = Layers::uniform(3).unwrap();
        let n = mesh.n_elements();
        let u = Field::from_fn(n, 2, |_, k| if k == 0 { 1.0 } else { 0.4 });
        let velocity = ElementVelocity::new(u, Field::zeros(n, 2));
        let mut wind = Wind::new(WindConfig::default().with_diffusivity(2.0));
        let policy = MixingPolicy::Dynamic {
            mesh: &mesh,
            layers: &layers,
            velocity: &velocity,
        };
        let rate = wind.mixing(None, &policy).unwrap();
        // depth of top midpoint = 10 × 0.25
        let expected = 2.0 * 0.6 / 2.5;
        for node in 0..mesh.n_nodes() {
            assert!((rate.at(node) - expected).abs() < 1e-9);
        }
    }
}
