//! Simulation state.
//!
//! - [`Field`]: one tracer's (node × layer) concentrations, or an
//!   (element × layer) forcing such as velocity
//! - [`Tracer`]: the named chemical sub-pools
//! - [`FieldArena`]: every tracer field, owned by the reactor

mod arena;
mod field;
mod tracer;

pub use arena::FieldArena;
pub use field::Field;
pub use tracer::{Phase, Tracer};
