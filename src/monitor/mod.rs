//! Monitor registration and scheduling

pub mod model;
pub mod registry;
pub mod scheduler;

pub use model::{Monitor, MonitorError, MonitorRequest, MAX_CHECK_INTERVAL, MAX_DURATION_DAYS};
pub use registry::MonitorRegistry;
pub use scheduler::{CycleError, CycleSummary, FaultGate, MonitorService, ServiceError, SYSTEM_SOURCE};
