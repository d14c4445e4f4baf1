//! Step monitoring for long water-quality runs.
//!
//! Scans the tracer fields after each step for non-finite or implausible
//! concentrations and tracks mass drift between steps.
//!
//! # Example
//!
//! ```ignore
//! use wq_rs::analysis::{StepMonitor, MonitorThresholds};
//!
//! let mut monitor = StepMonitor::new(MonitorThresholds::default());
//!
//! // In the stepping loop:
//! let report = reactor.step(&forcing)?;
//! let status = monitor.check(reactor.fields(), Some((&report.budget_before, &report.budget_after)));
//! if monitor.should_stop() {
//!     break;
//! }
//! ```

use crate::chemistry::Species;
use crate::state::{FieldArena, Tracer};

use super::MassBudget;

/// Thresholds for step monitoring.
#[derive(Debug, Clone, Copy)]
pub struct MonitorThresholds {
    /// Largest plausible concentration (g/m³).
    pub max_concentration: f64,
    /// Largest relative mass change of one species over one step.
    pub max_drift: f64,
    /// Maximum consecutive warnings before recommending stop.
    pub max_consecutive_warnings: usize,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self::coastal_default()
    }
}

impl MonitorThresholds {
    /// Default thresholds for coastal runs.
    ///
    /// - max_concentration: 1e4 g/m³
    /// - max_drift: 0.5
    /// - max_consecutive_warnings: 10
    pub fn coastal_default() -> Self {
        Self {
            max_concentration: 1e4,
            max_drift: 0.5,
            max_consecutive_warnings: 10,
        }
    }

    /// Strict thresholds for detecting issues early.
    pub fn strict() -> Self {
        Self {
            max_concentration: 1e3,
            max_drift: 0.05,
            max_consecutive_warnings: 3,
        }
    }

    /// Set the concentration ceiling.
    pub fn with_max_concentration(mut self, max_concentration: f64) -> Self {
        self.max_concentration = max_concentration;
        self
    }

    /// Set the per-step drift ceiling.
    pub fn with_max_drift(mut self, max_drift: f64) -> Self {
        self.max_drift = max_drift;
        self
    }
}

/// Types of monitor warnings.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorWarning {
    /// NaN or Inf in a tracer field.
    NonFinite {
        tracer: Tracer,
        node: usize,
        layer: usize,
    },
    /// Concentration above the ceiling.
    ConcentrationExceedsMax {
        tracer: Tracer,
        node: usize,
        layer: usize,
        value: f64,
        threshold: f64,
    },
    /// Mass of a species changed by more than the drift ceiling.
    MassDrift {
        species: Species,
        relative: f64,
        threshold: f64,
    },
}

impl std::fmt::Display for MonitorWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite { tracer, node, layer } => {
                write!(f, "Non-finite {tracer} at node {node}, layer {layer}")
            }
            Self::ConcentrationExceedsMax {
                tracer,
                node,
                layer,
                value,
                threshold,
            } => write!(
                f,
                "{tracer} exceeds max: {value:.3e} > {threshold:.3e} at node {node}, layer {layer}"
            ),
            Self::MassDrift {
                species,
                relative,
                threshold,
            } => write!(
                f,
                "{species} mass changed by {:.2}% (> {:.2}%)",
                100.0 * relative,
                100.0 * threshold
            ),
        }
    }
}

/// Result of one check.
#[derive(Debug, Clone)]
pub struct MonitorStatus {
    /// Largest concentration over all tracers.
    pub max_concentration: f64,
    /// Whether the step passed every check.
    pub is_healthy: bool,
    pub warnings: Vec<MonitorWarning>,
}

impl MonitorStatus {
    /// Check if any warnings were generated.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check if a non-finite value was found.
    pub fn has_critical_warnings(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, MonitorWarning::NonFinite { .. }))
    }
}

/// Tracks field health across steps.
#[derive(Debug, Clone)]
pub struct StepMonitor {
    thresholds: MonitorThresholds,
    consecutive_warnings: usize,
    total_checks: usize,
    total_warnings: usize,
    last_status: Option<MonitorStatus>,
}

impl StepMonitor {
    pub fn new(thresholds: MonitorThresholds) -> Self {
        Self {
            thresholds,
            consecutive_warnings: 0,
            total_checks: 0,
            total_warnings: 0,
            last_status: None,
        }
    }

    pub fn thresholds(&self) -> &MonitorThresholds {
        &self.thresholds
    }

    pub fn consecutive_warnings(&self) -> usize {
        self.consecutive_warnings
    }

    pub fn total_checks(&self) -> usize {
        self.total_checks
    }

    pub fn total_warnings(&self) -> usize {
        self.total_warnings
    }

    pub fn last_status(&self) -> Option<&MonitorStatus> {
        self.last_status.as_ref()
    }

    /// Scan the fields and, when given, the budget change `(before, after)`.
    pub fn check(&mut self, fields: &FieldArena, budget: Option<(&MassBudget, &MassBudget)>) -> MonitorStatus {
        self.total_checks += 1;

        let mut warnings = Vec::new();
        let mut max_concentration = f64::NEG_INFINITY;

        for (tracer, field) in fields.iter() {
            for (node, layer, value) in field.iter() {
                if !value.is_finite() {
                    warnings.push(MonitorWarning::NonFinite { tracer, node, layer });
                    continue;
                }
                max_concentration = max_concentration.max(value);
                if value > self.thresholds.max_concentration {
                    warnings.push(MonitorWarning::ConcentrationExceedsMax {
                        tracer,
                        node,
                        layer,
                        value,
                        threshold: self.thresholds.max_concentration,
                    });
                }
            }
        }

        if let Some((before, after)) = budget {
            for species in before.species() {
                if let Some(relative) = after.relative_change(before, species) {
                    if relative.abs() > self.thresholds.max_drift {
                        warnings.push(MonitorWarning::MassDrift {
                            species,
                            relative,
                            threshold: self.thresholds.max_drift,
                        });
                    }
                }
            }
        }

        let is_healthy = warnings.is_empty();
        if is_healthy {
            self.consecutive_warnings = 0;
        } else {
            self.consecutive_warnings += 1;
            self.total_warnings += warnings.len();
        }

        let status = MonitorStatus {
            max_concentration,
            is_healthy,
            warnings,
        };
        self.last_status = Some(status.clone());
        status
    }

    /// Check if the run should stop based on warning history.
    pub fn should_stop(&self) -> bool {
        if self.consecutive_warnings >= self.thresholds.max_consecutive_warnings {
            return true;
        }
        self.last_status
            .as_ref()
            .is_some_and(MonitorStatus::has_critical_warnings)
    }

    /// Reset the warning history.
    pub fn reset(&mut self) {
        self.consecutive_warnings = 0;
        self.total_checks = 0;
        self.total_warnings = 0;
        self.last_status = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Field;

    fn fields(value: f64) -> FieldArena {
        FieldArena::uniform(4, 2, &[Tracer::Phosphate, Tracer::Oxygen], value)
    }

    #[test]
    fn test_healthy_fields() {
        let mut monitor = StepMonitor::new(MonitorThresholds::default());
        let status = monitor.check(&fields(1.0), None);
        assert!(status.is_healthy);
        assert_eq!(status.max_concentration, 1.0);
        assert!(!monitor.should_stop());
    }

    #[test]
    fn test_non_finite_is_critical() {
        let mut monitor = StepMonitor::new(MonitorThresholds::default());
        let mut arena = fields(1.0);
        arena.get_mut(Tracer::Oxygen).unwrap().set(2, 1, f64::NAN);
        let status = monitor.check(&arena, None);
        assert!(status.has_critical_warnings());
        assert!(monitor.should_stop());
    }

    #[test]
    fn test_consecutive_warnings_stop() {
        let thresholds = MonitorThresholds::strict().with_max_concentration(0.5);
        let mut monitor = StepMonitor::new(thresholds);
        for _ in 0..2 {
            monitor.check(&fields(1.0), None);
        }
        assert!(!monitor.should_stop());
        monitor.check(&fields(1.0), None);
        assert!(monitor.should_stop());
        assert_eq!(monitor.consecutive_warnings(), 3);

        monitor.check(&fields(0.1), None);
        assert_eq!(monitor.consecutive_warnings(), 0);
    }

    #[test]
    fn test_mass_drift() {
        let mesh = crate::mesh::TriangularMesh::rectangle(2, 2, 10.0, 10.0, 1.0).unwrap();
        let layers = crate::vertical::Layers::uniform(3).unwrap();
        let phyto = crate::biology::PhytoplanktonArray::empty(mesh.n_nodes(), 2);
        let mut arena = FieldArena::new(mesh.n_nodes(), 2);
        arena.insert(Tracer::Phosphate, Field::constant(mesh.n_nodes(), 2, 1.0)).unwrap();
        let before = MassBudget::compute(&mesh, &layers, &arena, &phyto);
        arena.get_mut(Tracer::Phosphate).unwrap().scale(2.0);
        let after = MassBudget::compute(&mesh, &layers, &arena, &phyto);

        let mut monitor = StepMonitor::new(MonitorThresholds::default());
        let status = monitor.check(&arena, Some((&before, &after)));
        assert!(matches!(
            status.warnings[0],
            MonitorWarning::MassDrift { species: Species::Phosphorus, .. }
        ));
    }
}
