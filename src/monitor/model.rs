//! Monitor definitions

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::Channel;

/// Longest tracking period accepted at registration
pub const MAX_DURATION_DAYS: u32 = 365;

/// Longest check interval accepted at registration
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(MAX_DURATION_DAYS as u64 * 86_400);

/// A standing request to watch one person
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub target_name: String,
    pub target_identifier: Option<String>,
    pub trigger_keywords: BTreeSet<String>,
    pub notification_channels: BTreeSet<Channel>,
    pub active: bool,
    #[serde(with = "duration_secs", rename = "check_interval_secs")]
    pub check_interval: Duration,
    pub last_check_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// The loop deactivates the monitor once this passes
    pub expires_at: DateTime<Utc>,
    pub checks_completed: u64,
    pub alerts_generated: u64,
}

impl Monitor {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Registration parameters for a new monitor
#[derive(Debug, Clone)]
pub struct MonitorRequest {
    pub target_name: String,
    pub target_identifier: Option<String>,
    pub trigger_keywords: BTreeSet<String>,
    pub channels: BTreeSet<Channel>,
    /// Falls back to the scheduler default when unset
    pub check_interval: Option<Duration>,
    pub duration_days: u32,
}

impl MonitorRequest {
    /// Request with the dashboard defaults: court cases, arrests and
    /// bankruptcies over email and webhook for 30 days
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            target_identifier: None,
            trigger_keywords: ["court_cases", "arrests", "bankruptcies"]
                .into_iter()
                .map(String::from)
                .collect(),
            channels: [Channel::Email, Channel::Webhook].into_iter().collect(),
            check_interval: None,
            duration_days: 30,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.target_identifier = Some(identifier.into());
        self
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_keywords = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_channels(mut self, channels: impl IntoIterator<Item = Channel>) -> Self {
        self.channels = channels.into_iter().collect();
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = Some(interval);
        self
    }

    pub fn with_duration_days(mut self, days: u32) -> Self {
        self.duration_days = days;
        self
    }

    /// Reject malformed registrations
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.target_name.trim().is_empty() {
            return Err(MonitorError::EmptyTargetName);
        }
        if let Some(interval) = self.check_interval {
            check_interval_in_range(interval)?;
        }
        if self.channels.is_empty() {
            return Err(MonitorError::NoChannels);
        }
        if self.duration_days == 0 || self.duration_days > MAX_DURATION_DAYS {
            return Err(MonitorError::InvalidDuration(self.duration_days));
        }
        Ok(())
    }
}

/// Reject zero intervals and intervals past [`MAX_CHECK_INTERVAL`]
pub(crate) fn check_interval_in_range(interval: Duration) -> Result<(), MonitorError> {
    if interval.is_zero()
        || interval > MAX_CHECK_INTERVAL
        || chrono::Duration::from_std(interval).is_err()
    {
        return Err(MonitorError::InvalidInterval);
    }
    Ok(())
}

/// Registration errors, the only failures callers see
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    #[error("Target name must not be empty")]
    EmptyTargetName,

    #[error("Check interval must be greater than zero and at most 365 days")]
    InvalidInterval,

    #[error("At least one notification channel is required")]
    NoChannels,

    #[error("Tracking duration must be between 1 and 365 days, got {0}")]
    InvalidDuration(u32),

    #[error("Unknown notification channel: {0}")]
    UnknownChannel(String),
}

/// Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = MonitorRequest::new("Jane Doe");
        assert_eq!(request.duration_days, 30);
        assert!(request.trigger_keywords.contains("arrests"));
        assert_eq!(request.channels.len(), 2);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            MonitorRequest::new("  ").validate(),
            Err(MonitorError::EmptyTargetName)
        );
        assert_eq!(
            MonitorRequest::new("Jane Doe")
                .with_check_interval(Duration::ZERO)
                .validate(),
            Err(MonitorError::InvalidInterval)
        );
        assert_eq!(
            MonitorRequest::new("Jane Doe")
                .with_check_interval(Duration::from_secs(u64::MAX))
                .validate(),
            Err(MonitorError::InvalidInterval)
        );
        assert_eq!(
            MonitorRequest::new("Jane Doe")
                .with_check_interval(MAX_CHECK_INTERVAL + Duration::from_secs(1))
                .validate(),
            Err(MonitorError::InvalidInterval)
        );
        assert!(MonitorRequest::new("Jane Doe")
            .with_check_interval(MAX_CHECK_INTERVAL)
            .validate()
            .is_ok());
        assert_eq!(
            MonitorRequest::new("Jane Doe").with_channels([]).validate(),
            Err(MonitorError::NoChannels)
        );
        assert_eq!(
            MonitorRequest::new("Jane Doe").with_duration_days(400).validate(),
            Err(MonitorError::InvalidDuration(400))
        );
        assert_eq!(
            MonitorRequest::new("Jane Doe").with_duration_days(0).validate(),
            Err(MonitorError::InvalidDuration(0))
        );
    }

    #[test]
    fn test_monitor_serializes_interval_secs() {
        let now = Utc::now();
        let monitor = Monitor {
            id: "mon_1".to_string(),
            target_name: "Jane Doe".to_string(),
            target_identifier: None,
            trigger_keywords: BTreeSet::new(),
            notification_channels: [Channel::Webhook].into_iter().collect(),
            active: true,
            check_interval: Duration::from_secs(90),
            last_check_time: None,
            created_at: now,
            expires_at: now,
            checks_completed: 0,
            alerts_generated: 0,
        };

        let json = serde_json::to_value(&monitor).unwrap();
        assert_eq!(json["check_interval_secs"], 90);
        assert_eq!(json["notification_channels"], serde_json::json!(["webhook"]));

        let back: Monitor = serde_json::from_value(json).unwrap();
        assert_eq!(back.check_interval, Duration::from_secs(90));
        assert!(back.is_expired(now));
    }
}
