//! Monitor registry

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::model::Monitor;

/// All monitors behind one lock. Monitors are never removed.
#[derive(Debug, Default)]
pub struct MonitorRegistry {
    monitors: RwLock<HashMap<String, Monitor>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, monitor: Monitor) {
        let mut monitors = self.monitors.write();
        monitors.insert(monitor.id.clone(), monitor);
    }

    pub fn get(&self, id: &str) -> Option<Monitor> {
        self.monitors.read().get(id).cloned()
    }

    /// All monitors, oldest first
    pub fn list(&self) -> Vec<Monitor> {
        let mut monitors: Vec<Monitor> = self.monitors.read().values().cloned().collect();
        monitors.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        monitors
    }

    pub fn active_count(&self) -> usize {
        self.monitors.read().values().filter(|m| m.active).count()
    }

    /// Mark a monitor inactive; false if the id is unknown
    pub(crate) fn deactivate(&self, id: &str) -> bool {
        let mut monitors = self.monitors.write();
        if let Some(monitor) = monitors.get_mut(id) {
            monitor.active = false;
            true
        } else {
            false
        }
    }

    /// Record a finished check cycle
    pub(crate) fn record_cycle(&self, id: &str, at: DateTime<Utc>, alerts: usize) -> bool {
        let mut monitors = self.monitors.write();
        if let Some(monitor) = monitors.get_mut(id) {
            monitor.last_check_time = Some(at);
            monitor.checks_completed += 1;
            monitor.alerts_generated += alerts as u64;
            true
        } else {
            false
        }
    }

    /// Count alerts raised outside a check cycle
    pub(crate) fn record_alerts(&self, id: &str, alerts: usize) {
        if let Some(monitor) = self.monitors.write().get_mut(id) {
            monitor.alerts_generated += alerts as u64;
        }
    }
}
