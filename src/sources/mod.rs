//! Legal record sources polled for each monitor
//!
//! Every source is a variant of [`SourceChecker`]. A check never fails from
//! the caller's point of view: errors are logged, counted in
//! [`CheckerStats`] and turned into an empty result.

pub mod client;
pub mod court_listener;
pub mod custody;
pub mod docket;
pub mod matching;
pub mod ratelimit;
pub mod state_courts;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::alerts::{Alert, Channel};
use crate::config::SourcesConfig;

pub use client::SourceClient;
pub use court_listener::CourtListenerChecker;
pub use custody::CustodyChecker;
pub use docket::DocketChecker;
pub use matching::{classify_severity, record_severity, TriggerSet};
pub use ratelimit::RateLimiter;
pub use state_courts::StateCourtsChecker;

/// Inputs for one check of one target
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub target_name: String,
    pub target_identifier: Option<String>,
    pub triggers: TriggerSet,
    /// Channels stamped on every produced alert
    pub channels: BTreeSet<Channel>,
    /// Timestamp given to every alert of this cycle
    pub now: DateTime<Utc>,
}

impl CheckRequest {
    /// Alert builder pre-filled with this request's target and channels
    pub(crate) fn alert(&self, source: impl Into<String>) -> crate::alerts::AlertBuilder {
        Alert::builder(source, self.target_name.clone())
            .target_identifier(self.target_identifier.clone())
            .channels(self.channels.clone())
    }
}

/// A record source
#[derive(Debug, Clone)]
pub enum SourceChecker {
    /// Federal case search
    CourtListener(CourtListenerChecker),
    /// Custody-status lookup
    Custody(CustodyChecker),
    /// Federal docket search
    FederalDocket(DocketChecker),
    /// State court search
    StateCourts(StateCourtsChecker),
    /// Panics on every check
    #[cfg(test)]
    Panicking(Arc<CheckerStats>),
}

impl SourceChecker {
    pub fn name(&self) -> &'static str {
        match self {
            SourceChecker::CourtListener(_) => court_listener::SOURCE,
            SourceChecker::Custody(_) => custody::SOURCE,
            SourceChecker::FederalDocket(_) => docket::SOURCE,
            SourceChecker::StateCourts(_) => state_courts::SOURCE,
            #[cfg(test)]
            SourceChecker::Panicking(_) => "panicking",
        }
    }

    pub fn stats(&self) -> &Arc<CheckerStats> {
        match self {
            SourceChecker::CourtListener(c) => &c.stats,
            SourceChecker::Custody(c) => &c.stats,
            SourceChecker::FederalDocket(c) => &c.stats,
            SourceChecker::StateCourts(c) => &c.stats,
            #[cfg(test)]
            SourceChecker::Panicking(stats) => stats,
        }
    }

    /// Query the source, surfacing failures
    pub async fn try_check(&self, request: &CheckRequest) -> Result<Vec<Alert>, CheckerError> {
        match self {
            SourceChecker::CourtListener(c) => c.check(request).await,
            SourceChecker::Custody(c) => c.check(request).await,
            SourceChecker::FederalDocket(c) => c.check(request).await,
            SourceChecker::StateCourts(c) => c.check(request).await,
            #[cfg(test)]
            SourceChecker::Panicking(_) => panic!("checker blew up on {}", request.target_name),
        }
    }

    /// Query the source; failures are logged and yield no alerts
    pub async fn check(&self, request: &CheckRequest) -> Vec<Alert> {
        let source = self.name();

        match self.try_check(request).await {
            Ok(alerts) => {
                self.stats().record_success(alerts.len());
                tracing::debug!(
                    source,
                    target = %request.target_name,
                    alerts = alerts.len(),
                    "Source check complete"
                );
                alerts
            }
            Err(e) => {
                if e.is_configuration() {
                    tracing::debug!(source, error = %e, "Source skipped");
                } else {
                    tracing::warn!(
                        source,
                        target = %request.target_name,
                        error = %e,
                        "Source check failed"
                    );
                }
                self.stats().record_failure(&e);
                Vec::new()
            }
        }
    }
}

/// Build the four configured sources, sharing one HTTP client
pub fn build_checkers(config: &SourcesConfig) -> Result<Vec<SourceChecker>, CheckerError> {
    let client = SourceClient::with_timeout(config.timeout)?;

    Ok(vec![
        SourceChecker::CourtListener(CourtListenerChecker::new(
            client.clone(),
            config.court_listener.clone(),
        )),
        SourceChecker::Custody(CustodyChecker::new(client.clone(), config.custody.clone())),
        SourceChecker::FederalDocket(DocketChecker::new(client.clone(), config.docket.clone())),
        SourceChecker::StateCourts(StateCourtsChecker::new(client, config.state_courts.clone())),
    ])
}

/// Run every checker concurrently and wait for all of them.
///
/// Results keep checker order. A checker task that panics contributes no
/// alerts and does not affect the others.
pub async fn check_all(checkers: &[SourceChecker], request: Arc<CheckRequest>) -> Vec<Alert> {
    let handles: Vec<_> = checkers
        .iter()
        .cloned()
        .map(|checker| {
            let request = Arc::clone(&request);
            let name = checker.name();
            let handle = tokio::spawn(async move { checker.check(&request).await });
            (name, handle)
        })
        .collect();

    let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = futures::future::join_all(handles).await;

    let mut alerts = Vec::new();
    for (name, result) in names.into_iter().zip(results) {
        match result {
            Ok(found) => alerts.extend(found),
            Err(e) => {
                tracing::error!(source = name, error = %e, "Source check task aborted");
            }
        }
    }
    alerts
}

/// Source check errors
#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("Source not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Hourly request quota exhausted")]
    RateLimited,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl CheckerError {
    /// Whether the failure comes from missing setup rather than the source
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CheckerError::NotConfigured(_) | CheckerError::MissingCredential(_)
        )
    }
}

/// Counters for one source
#[derive(Debug, Default)]
pub struct CheckerStats {
    checks: AtomicU64,
    failures: AtomicU64,
    alerts: AtomicU64,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckerStatsSnapshot {
    pub checks: u64,
    pub failures: u64,
    pub alerts: u64,
    pub last_error: Option<String>,
}

impl CheckerStats {
    pub fn record_success(&self, alerts: usize) {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.alerts.fetch_add(alerts as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &CheckerError) {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    pub fn snapshot(&self) -> CheckerStatsSnapshot {
        CheckerStatsSnapshot {
            checks: self.checks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}
