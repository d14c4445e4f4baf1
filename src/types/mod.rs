//! Strongly-typed index types for mesh and layer lookups.
//!
//! Node, element and layer indices are all `usize` underneath; the
//! newtypes keep them from being swapped in public APIs.
//!
//! # Example
//!
//! ```
//! use wq_rs::types::{LayerIndex, NodeIndex};
//!
//! let node = NodeIndex::new(4);
//! let layer = LayerIndex::new(0);
//! assert_eq!(format!("{node}/{layer}"), "N4/K0");
//! ```

mod indices;

pub use indices::{ElementIndex, LayerIndex, NodeIndex};
