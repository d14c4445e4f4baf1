//! Explicit time integration of accumulated tendencies.
//!
//! Transport and kinetics write rates of change into tendency containers
//! of the same shape as the state. A step then merges them with a forward
//! Euler update:
//!
//! ```text
//! c_new = c + dt * dc/dt
//! ```
//!
//! Stiff vertical mixing is handled separately by the implicit solver in
//! [`crate::transport`].

use crate::state::{Field, FieldArena};

/// Vector space operations needed by explicit integration.
pub trait Integrable: Clone {
    /// Scale the state by a constant: self <- c * self
    fn scale(&mut self, c: f64);

    /// Add a scaled vector: self <- self + c * other
    fn axpy(&mut self, c: f64, other: &Self);

    /// Zero-initialized state with the same shape.
    fn zeros_like(&self) -> Self {
        let mut result = self.clone();
        result.scale(0.0);
        result
    }
}

impl Integrable for Field {
    fn scale(&mut self, c: f64) {
        Field::scale(self, c);
    }

    fn axpy(&mut self, c: f64, other: &Self) {
        Field::axpy(self, c, other);
    }
}

impl Integrable for FieldArena {
    fn scale(&mut self, c: f64) {
        for (_, field) in self.iter_mut() {
            field.scale(c);
        }
    }

    fn axpy(&mut self, c: f64, other: &Self) {
        FieldArena::axpy(self, c, other);
    }

    fn zeros_like(&self) -> Self {
        FieldArena::zeros_like(self)
    }
}

/// Forward Euler merge: state <- state + dt * rate
pub fn euler_update<S: Integrable>(state: &mut S, dt: f64, rate: &S) {
    state.axpy(dt, rate);
}
