//! Process-wide, append-only alert log

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::model::{Alert, Severity};

/// In-memory alert log. Entries are never modified or removed.
#[derive(Debug, Default)]
pub struct AlertLog {
    entries: RwLock<Vec<Alert>>,
}

/// Count of logged alerts per severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub total: usize,
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
    pub urgent: usize,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, alert: Alert) {
        self.entries.write().push(alert);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Alerts created within the last `hours` hours of `now`, oldest first.
    ///
    /// The lower bound is inclusive: an alert created exactly `hours` ago is
    /// returned. A window reaching past the representable range has no lower
    /// bound.
    pub fn recent(&self, hours: u32, now: DateTime<Utc>) -> Vec<Alert> {
        let cutoff = Duration::try_hours(i64::from(hours)).and_then(|d| now.checked_sub_signed(d));
        self.entries
            .read()
            .iter()
            .filter(|a| cutoff.map_or(true, |c| a.created_at >= c))
            .cloned()
            .collect()
    }

    /// Newest-first listing with optional severity filter
    pub fn query(&self, severity: Option<Severity>, limit: usize) -> Vec<Alert> {
        self.entries
            .read()
            .iter()
            .rev()
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// All alerts for one target, oldest first
    pub fn for_target(&self, target_name: &str) -> Vec<Alert> {
        self.entries
            .read()
            .iter()
            .filter(|a| a.target_name == target_name)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> SeverityCounts {
        let entries = self.entries.read();
        let mut counts = SeverityCounts {
            total: entries.len(),
            ..Default::default()
        };

        for alert in entries.iter() {
            match alert.severity {
                Severity::Info => counts.info += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Critical => counts.critical += 1,
                Severity::Urgent => counts.urgent += 1,
            }
        }

        counts
    }
}
