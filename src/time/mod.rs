//! Time keeping and explicit integration.
//!
//! - [`Clock`]: integer-second clock with a daily boundary flag
//! - [`Integrable`], [`euler_update`]: explicit merge of tendencies

mod clock;
mod integrator;

pub use clock::{Clock, DAYS_PER_YEAR, SECONDS_PER_DAY};
pub use integrator::{Integrable, euler_update};
