//! Engine configuration aggregate.
//!
//! Every component config has defaults except the chemistry block: a run
//! must state its rate constants, so a configuration without `chemistry`
//! (or with a species missing a required constant) fails to parse.
//!
//! ```
//! use wq_rs::config::EngineConfig;
//!
//! let config = EngineConfig::default();
//! let json = config.to_json().unwrap();
//! let back = EngineConfig::from_json(&json).unwrap();
//! assert_eq!(config, back);
//! ```

use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::benthic::{SedimentConfig, SettlingConfig};
use crate::biology::{PartitionConfig, PhytoplanktonConfig};
use crate::chemistry::ChemistryConfig;
use crate::error::{ConfigError, Result};
use crate::source::{Loads, WindConfig};
use crate::time::Clock;
use crate::transport::TransportConfig;

/// Calendar format accepted by [`ClockConfig::calendar`].
pub const CALENDAR_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Surface mixing policy used by the reactor on every step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixingMode {
    /// Wind-speed polynomial
    #[default]
    Simple,
    /// Surface current shear over depth
    Dynamic,
}

/// Start and step of the simulation clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Start offset (s since 1 January 00:00)
    pub start: i64,
    /// Step (s)
    pub dt: i64,
    /// Calendar start; overrides `start` when set
    pub calendar: Option<String>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            start: 0,
            dt: 600,
            calendar: None,
        }
    }
}

impl ClockConfig {
    /// Set the step.
    pub fn with_dt(mut self, dt: i64) -> Self {
        self.dt = dt;
        self
    }

    /// Set a calendar start, e.g. `2024-06-01T00:00:00`.
    pub fn with_calendar(mut self, calendar: impl Into<String>) -> Self {
        self.calendar = Some(calendar.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dt <= 0 {
            return Err(ConfigError::invalid("clock", "dt", self.dt as f64));
        }
        Ok(())
    }

    /// Build the clock.
    pub fn build(&self) -> Result<Clock, ConfigError> {
        self.validate()?;
        match &self.calendar {
            Some(text) => {
                let start = NaiveDateTime::parse_from_str(text, CALENDAR_FORMAT)
                    .map_err(|e| ConfigError::Parse(format!("clock calendar `{text}`: {e}")))?;
                Clock::from_calendar(start, self.dt)
            }
            None => Clock::new(self.start, self.dt),
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub wind: WindConfig,
    #[serde(default)]
    pub mixing: MixingMode,
    #[serde(default)]
    pub loads: Loads,
    pub chemistry: ChemistryConfig,
    #[serde(default)]
    pub phytoplankton: PhytoplanktonConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub settling: SettlingConfig,
    #[serde(default)]
    pub sediment: SedimentConfig,
    #[serde(default)]
    pub clock: ClockConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!(path = %path.display(), groups = config.phytoplankton.groups.len(), "loaded configuration");
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the transport settings.
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Set the phytoplankton groups and light.
    pub fn with_phytoplankton(mut self, phytoplankton: PhytoplanktonConfig) -> Self {
        self.phytoplankton = phytoplankton;
        self
    }

    /// Set the settling parameters.
    pub fn with_settling(mut self, settling: SettlingConfig) -> Self {
        self.settling = settling;
        self
    }

    /// Set the sediment parameters.
    pub fn with_sediment(mut self, sediment: SedimentConfig) -> Self {
        self.sediment = sediment;
        self
    }

    /// Set the surface loads.
    pub fn with_loads(mut self, loads: Loads) -> Self {
        self.loads = loads;
        self
    }

    /// Set the mixing policy.
    pub fn with_mixing(mut self, mixing: MixingMode) -> Self {
        self.mixing = mixing;
        self
    }

    /// Set the clock.
    pub fn with_clock(mut self, clock: ClockConfig) -> Self {
        self.clock = clock;
        self
    }

    /// Check every block without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let transport = &self.transport;
        for (name, value) in [
            ("horizontal.coefficient", transport.horizontal.coefficient),
            ("horizontal.floor", transport.horizontal.floor),
            ("vertical.molecular", transport.vertical.molecular),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid("transport", name, value));
            }
        }
        if !(transport.cfl > 0.0 && transport.cfl <= 1.0) {
            return Err(ConfigError::invalid("transport", "cfl", transport.cfl));
        }
        for (name, value) in [
            ("minimum", self.wind.minimum),
            ("diffusivity", self.wind.diffusivity),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid("wind", name, value));
            }
        }
        self.chemistry.validate()?;
        for group in &self.phytoplankton.groups {
            group.validate()?;
        }
        self.partition.validate()?;
        self.settling.validate()?;
        self.sediment.validate()?;
        self.clock.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip() {
        let config = EngineConfig::default().with_mixing(MixingMode::Dynamic);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"dynamic\""));
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_missing_chemistry_fails_to_parse() {
        let err = EngineConfig::from_json("{}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let mut config = EngineConfig::default();
        config.sediment.thickness = 0.0;
        let json = serde_json::to_string(&config).unwrap();
        assert!(matches!(
            EngineConfig::from_json(&json),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_courant_number_range() {
        for cfl in [0.0, -0.5, 1.5, f64::NAN] {
            let config = EngineConfig::default().with_transport(TransportConfig::default().with_cfl(cfl));
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidParameter { parameter: "cfl", .. })
            ));
        }
        let config = EngineConfig::default().with_transport(TransportConfig::default().with_cfl(1.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_calendar_clock() {
        let clock = ClockConfig::default()
            .with_dt(3600)
            .with_calendar("2024-01-02T06:00:00")
            .build()
            .unwrap();
        assert_eq!(clock.elapsed(), 86_400 + 6 * 3600);

        let bad = ClockConfig::default().with_calendar("second of January");
        assert!(matches!(bad.build(), Err(ConfigError::Parse(_))));
    }
}
