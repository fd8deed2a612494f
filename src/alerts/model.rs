//! Alert types shared by checkers, the pipeline and dispatchers

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-process sequence appended to alert ids
static ALERT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Urgent,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            "urgent" => Ok(Severity::Urgent),
            other => Err(ParseError::Severity(other.to_string())),
        }
    }
}

/// Notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Webhook,
    Sms,
    #[serde(alias = "slack")]
    Chat,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Email, Channel::Webhook, Channel::Sms, Channel::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Webhook => "webhook",
            Channel::Sms => "sms",
            Channel::Chat => "chat",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "webhook" => Ok(Channel::Webhook),
            "sms" => Ok(Channel::Sms),
            "chat" | "slack" => Ok(Channel::Chat),
            other => Err(ParseError::Channel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown notification channel: {0}")]
    Channel(String),

    #[error("Unknown severity: {0}")]
    Severity(String),
}

/// A normalized finding, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    /// Name of the checker that produced the alert
    pub source: String,
    pub target_name: String,
    pub target_identifier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub channels: BTreeSet<Channel>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Alert {
    /// Start building an alert for `target_name` produced by `source`
    pub fn builder(source: impl Into<String>, target_name: impl Into<String>) -> AlertBuilder {
        AlertBuilder {
            source: source.into(),
            target_name: target_name.into(),
            target_identifier: None,
            title: String::new(),
            message: String::new(),
            severity: Severity::Info,
            channels: BTreeSet::new(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// Builder for [`Alert`]; the id is derived when [`AlertBuilder::build`] is called
#[derive(Debug, Clone)]
pub struct AlertBuilder {
    source: String,
    target_name: String,
    target_identifier: Option<String>,
    title: String,
    message: String,
    severity: Severity,
    channels: BTreeSet<Channel>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl AlertBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn target_identifier(mut self, identifier: Option<String>) -> Self {
        self.target_identifier = identifier;
        self
    }

    pub fn channels(mut self, channels: BTreeSet<Channel>) -> Self {
        self.channels = channels;
        self
    }

    /// Attach a metadata entry; null values are kept as JSON null
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self, created_at: DateTime<Utc>) -> Alert {
        let seq = ALERT_SEQ.fetch_add(1, Ordering::Relaxed);
        let id = format!(
            "{}_{}_{}_{}",
            self.source,
            slug(&self.target_name),
            created_at.timestamp_micros(),
            seq
        );

        Alert {
            id,
            title: self.title,
            message: self.message,
            severity: self.severity,
            source: self.source,
            target_name: self.target_name,
            target_identifier: self.target_identifier,
            created_at,
            channels: self.channels,
            metadata: self.metadata,
        }
    }
}

/// Lowercase, underscore-separated form of a name for use in ids
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = false;

    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}
