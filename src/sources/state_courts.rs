//! State court search across configured states

use std::sync::Arc;

use serde::Deserialize;

use super::matching::record_severity;
use super::{CheckRequest, CheckerError, CheckerStats, RateLimiter, SourceClient};
use crate::alerts::Alert;
use crate::config::StateCourtsConfig;

pub const SOURCE: &str = "state_courts";

#[derive(Debug, Clone)]
pub struct StateCourtsChecker {
    client: SourceClient,
    config: StateCourtsConfig,
    limiter: Arc<RateLimiter>,
    pub(crate) stats: Arc<CheckerStats>,
}

#[derive(Debug, Deserialize)]
struct StateCourtResponse {
    #[serde(default)]
    records: Vec<StateCourtRecord>,
}

#[derive(Debug, Deserialize)]
struct StateCourtRecord {
    state: String,
    #[serde(default)]
    court_type: Option<String>,
    #[serde(default)]
    case_category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    record_date: Option<String>,
}

impl StateCourtsChecker {
    pub fn new(client: SourceClient, config: StateCourtsConfig) -> Self {
        Self {
            client,
            limiter: Arc::new(RateLimiter::per_hour(config.hourly_quota)),
            config,
            stats: Arc::new(CheckerStats::default()),
        }
    }

    /// One search covering every configured state
    pub async fn check(&self, request: &CheckRequest) -> Result<Vec<Alert>, CheckerError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or(CheckerError::NotConfigured("STATE_COURTS_BASE_URL"))?;

        if !self.limiter.try_acquire() {
            return Err(CheckerError::RateLimited);
        }

        let states = self.config.states.join(",");
        let mut http_request = self
            .client
            .get(base_url, "search")
            .query(&[("name", request.target_name.as_str()), ("states", states.as_str())]);
        if let Some(key) = self.config.api_key.as_deref() {
            http_request = http_request.bearer_auth(key);
        }

        let response: StateCourtResponse = self.client.fetch_json(http_request).await?;

        Ok(response
            .records
            .into_iter()
            .filter_map(|record| Self::to_alert(request, record))
            .collect())
    }

    fn to_alert(request: &CheckRequest, record: StateCourtRecord) -> Option<Alert> {
        let category = record
            .case_category
            .unwrap_or_else(|| "Unclassified".to_string());
        let court_type = record.court_type.unwrap_or_else(|| "State Court".to_string());
        let text = format!(
            "{} {}",
            category,
            record.description.as_deref().unwrap_or_default()
        );

        if !request.triggers.accepts(&text) {
            return None;
        }
        let matched = request.triggers.matched(&text);
        let source = format!("state_court_{}", record.state.to_lowercase());

        Some(
            request
                .alert(source)
                .title(format!("State court record - {}", record.state))
                .message(format!(
                    "New record in {} of {} for {}",
                    court_type, record.state, request.target_name
                ))
                .severity(record_severity(&text, &matched))
                .meta("state", record.state)
                .meta("court_type", court_type)
                .meta("case_category", category)
                .meta("description", record.description)
                .meta("record_date", record.record_date)
                .meta("matched_triggers", matched)
                .build(request.now),
        )
    }
}
