//! Temperature-corrected rate constants.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::SECONDS_PER_DAY;

/// Reference temperature of every rate constant (°C).
pub const REFERENCE_TEMPERATURE: f64 = 20.0;

/// Arrhenius-style rate `kappa · theta^(T − 20)`, per day.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    /// Rate at 20 °C (1/day)
    pub kappa: f64,
    /// Temperature coefficient
    pub theta: f64,
}

impl Rate {
    /// Create a rate.
    pub const fn new(kappa: f64, theta: f64) -> Self {
        Self { kappa, theta }
    }

    /// Rate at a temperature anomaly (1/day).
    #[inline]
    pub fn at(&self, anomaly: f64) -> f64 {
        self.kappa * self.theta.powf(anomaly)
    }

    /// Rate at a temperature anomaly (1/s).
    #[inline]
    pub fn per_second(&self, anomaly: f64) -> f64 {
        self.at(anomaly) / SECONDS_PER_DAY as f64
    }

    /// Rate at an absolute temperature (1/s).
    #[inline]
    pub fn at_temperature(&self, temperature: f64) -> f64 {
        self.per_second(temperature - REFERENCE_TEMPERATURE)
    }

    /// Check `kappa ≥ 0` and `theta > 0`.
    pub fn validate(&self, owner: &str, parameter: &'static str) -> Result<(), ConfigError> {
        if !(self.kappa.is_finite() && self.kappa >= 0.0) {
            return Err(ConfigError::invalid(owner, parameter, self.kappa));
        }
        if !(self.theta.is_finite() && self.theta > 0.0) {
            return Err(ConfigError::invalid(owner, parameter, self.theta));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-14;

    #[test]
    fn test_reference_temperature_returns_kappa() {
        let rate = Rate::new(0.05, 1.08);
        assert!((rate.at(0.0) - 0.05).abs() < TOL);
        assert!((rate.at_temperature(20.0) * 86_400.0 - 0.05).abs() < TOL);
    }

    #[test]
    fn test_theta_scaling() {
        let rate = Rate::new(1.0, 1.08);
        assert!((rate.at(2.0) - 1.08 * 1.08).abs() < TOL);
        assert!(rate.at(-5.0) < 1.0);
    }

    #[test]
    fn test_validate() {
        assert!(Rate::new(0.1, 1.0).validate("test", "k").is_ok());
        assert!(Rate::new(-0.1, 1.0).validate("test", "k").is_err());
        assert!(Rate::new(0.1, 0.0).validate("test", "k").is_err());
        assert!(Rate::new(f64::NAN, 1.0).validate("test", "k").is_err());
    }
}
