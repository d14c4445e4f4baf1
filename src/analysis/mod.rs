//! Run diagnostics: mass inventories and step health checks.
//!
//! - [`MassBudget`]: total mass per species, integrated over control volumes
//! - [`StepMonitor`]: non-finite values, concentration ceilings and mass drift

mod budget;
mod monitor;

pub use budget::{MassBudget, integrate};
pub use monitor::{MonitorStatus, MonitorThresholds, MonitorWarning, StepMonitor};
