//! Casewatch: Person Monitoring and Alert Dispatch
//!
//! Registers standing monitors for people, polls public-record sources on a
//! per-monitor interval and fans the resulting alerts out to notification
//! channels.
//!
//! # Features
//!
//! - **Record Sources**: federal case search, custody status, federal dockets, state courts
//! - **Trigger Matching**: whole-word keyword matching with plural folding
//! - **Severity Classification**: criminal wording escalates, resolved wording softens
//! - **Channel Dispatch**: email over SMTP, webhook POST with retries, SMS and chat stubs
//! - **Fault Isolation**: one failing source or channel never blocks the rest
//! - **Expiry**: monitors stop themselves once their tracking period ends
//!
//! # Example
//!
//! ```no_run
//! use casewatch::config::Config;
//! use casewatch::monitor::{MonitorRequest, MonitorService};
//! use casewatch::alerts::Channel;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = MonitorService::from_config(&Config::from_env()?)?;
//!
//! let id = service.start(
//!     MonitorRequest::new("Jane Doe")
//!         .with_triggers(["arrest"])
//!         .with_channels([Channel::Webhook]),
//! )?;
//!
//! for alert in service.get_recent_alerts(24) {
//!     println!("{}: {}", alert.severity, alert.title);
//! }
//! service.stop(&id);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod clock;
pub mod config;
pub mod monitor;
pub mod sources;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use alerts::{Alert, AlertLog, Channel, Severity};
pub use config::{Config, ConfigError};
pub use monitor::{Monitor, MonitorError, MonitorRequest, MonitorService};
