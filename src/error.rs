//! Error and warning types for the engine.
//!
//! Fatal conditions are returned as [`EngineError`]; a step either completes
//! fully or the run is aborted. Recoverable conditions are collected as
//! [`EngineWarning`] values in the step report and logged with `tracing`.

use thiserror::Error;

use crate::chemistry::Species;
use crate::state::Tracer;

/// Result alias used throughout the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Malformed mesh or layer geometry, detected at construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// The mesh has no elements.
    #[error("Mesh has no elements")]
    Empty,

    /// Node coordinate and depth arrays differ in length.
    #[error("Node arrays differ in length: {coordinates} coordinates, {depths} depths")]
    NodeCountMismatch { coordinates: usize, depths: usize },

    /// An element references a node that does not exist.
    #[error("Element {element} references missing node {node} (mesh has {n_nodes} nodes)")]
    MissingNode {
        element: usize,
        node: usize,
        n_nodes: usize,
    },

    /// An element lists the same node twice.
    #[error("Element {element} repeats node {node}")]
    RepeatedNode { element: usize, node: usize },

    /// An element has (near) zero area.
    #[error("Element {element} is degenerate (area {area:e})")]
    DegenerateElement { element: usize, area: f64 },

    /// An edge is shared by more than two elements.
    #[error("Edge ({a}, {b}) borders {count} elements")]
    NonManifoldEdge { a: usize, b: usize, count: usize },

    /// A node belongs to no element.
    #[error("Node {node} is dangling (no parent element)")]
    DanglingNode { node: usize },

    /// A node has a non-positive or non-finite depth.
    #[error("Node {node} has invalid depth {depth}")]
    InvalidDepth { node: usize, depth: f64 },

    /// Sigma levels are malformed.
    #[error("Invalid sigma levels: {0}")]
    InvalidLayers(String),
}

/// Invalid or incomplete configuration, detected before any step runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A numeric parameter is out of its admissible range.
    #[error("{owner}: parameter `{parameter}` has invalid value {value}")]
    InvalidParameter {
        owner: String,
        parameter: &'static str,
        value: f64,
    },

    /// A required entry is absent.
    #[error("{owner}: missing required parameter `{parameter}`")]
    MissingParameter {
        owner: String,
        parameter: &'static str,
    },

    /// Two phytoplankton groups share an identity index.
    #[error("Duplicate phytoplankton group id {0}")]
    DuplicateGroup(usize),

    /// JSON could not be parsed into a configuration.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Create an invalid parameter error.
    pub fn invalid(owner: impl Into<String>, parameter: &'static str, value: f64) -> Self {
        Self::InvalidParameter {
            owner: owner.into(),
            parameter,
            value,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Fatal engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Mesh or layer construction failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A near-zero denominator or a non-finite value was produced.
    #[error("Numeric instability in {context} at node {node}, layer {layer}: {detail}")]
    NumericInstability {
        context: &'static str,
        node: usize,
        layer: usize,
        detail: String,
    },

    /// Array dimensions do not match the mesh and layers.
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    /// A tracer required by a component is absent from the field arena.
    #[error("Tracer {0} is not present in the field arena")]
    MissingTracer(Tracer),

    /// I/O failure while reading a configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a numeric instability error.
    pub fn instability(
        context: &'static str,
        node: usize,
        layer: usize,
        detail: impl Into<String>,
    ) -> Self {
        Self::NumericInstability {
            context,
            node,
            layer,
            detail: detail.into(),
        }
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(
        what: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Non-fatal conditions surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineWarning {
    /// The equilibrium partition search hit its iteration budget.
    ///
    /// The last computed split was accepted.
    PartitionNotConverged {
        species: Species,
        cells: usize,
        worst_change: f64,
    },

    /// The sediment mass-transfer iteration hit its iteration budget.
    SedimentNotConverged { nodes: usize },

    /// Negative concentrations were clipped to zero.
    NegativeClipped { tracer: Tracer, cells: usize, min: f64 },

    /// Settling fraction exceeded one layer per step and was capped.
    SettlingCapped { tracer: Tracer, cells: usize },
}

impl std::fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineWarning::PartitionNotConverged {
                species,
                cells,
                worst_change,
            } => write!(
                f,
                "{species} partition did not converge in {cells} cells (relative change {worst_change:.3e})"
            ),
            EngineWarning::SedimentNotConverged { nodes } => {
                write!(f, "sediment mass transfer did not converge at {nodes} nodes")
            }
            EngineWarning::NegativeClipped { tracer, cells, min } => {
                write!(f, "{tracer}: clipped {cells} negative cells (min {min:.3e})")
            }
            EngineWarning::SettlingCapped { tracer, cells } => {
                write!(f, "{tracer}: settling capped in {cells} cells")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EngineError::instability("vertical diffusion", 3, 1, "pivot 1e-300");
        let msg = err.to_string();
        assert!(msg.contains("vertical diffusion"));
        assert!(msg.contains("node 3"));

        let err: EngineError = MeshError::DanglingNode { node: 7 }.into();
        assert!(err.to_string().contains("Node 7"));
    }

    #[test]
    fn test_config_error_from_json() {
        let parse: std::result::Result<f64, _> = serde_json::from_str("not json");
        let err: ConfigError = parse.unwrap_err().into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_warning_display() {
        let w = EngineWarning::PartitionNotConverged {
            species: Species::Phosphorus,
            cells: 4,
            worst_change: 0.2,
        };
        assert!(w.to_string().contains("4 cells"));
    }
}
