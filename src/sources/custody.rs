//! Custody-status lookup (victim notification network)

use std::sync::Arc;

use serde::Deserialize;

use super::{CheckRequest, CheckerError, CheckerStats, RateLimiter, SourceClient};
use crate::alerts::{Alert, Severity};
use crate::config::CustodyConfig;

pub const SOURCE: &str = "custody";

#[derive(Debug, Clone)]
pub struct CustodyChecker {
    client: SourceClient,
    config: CustodyConfig,
    limiter: Arc<RateLimiter>,
    pub(crate) stats: Arc<CheckerStats>,
}

#[derive(Debug, Deserialize)]
struct CustodyResponse {
    #[serde(default)]
    records: Vec<CustodyRecord>,
}

#[derive(Debug, Deserialize)]
struct CustodyRecord {
    #[serde(default)]
    offender_id: Option<String>,
    status: String,
    #[serde(default)]
    facility: Option<String>,
    #[serde(default)]
    status_changed_at: Option<String>,
    #[serde(default)]
    notification_type: Option<String>,
}

/// Severity of a custody status change
pub fn custody_severity(status: &str) -> Severity {
    let status = status.to_lowercase();
    let has = |needle: &str| status.contains(needle);

    if has("releas") || has("escape") || has("parole") || has("abscond") {
        Severity::Urgent
    } else if has("transfer") || has("moved") || has("hearing") {
        Severity::Warning
    } else {
        Severity::Info
    }
}

impl CustodyChecker {
    pub fn new(client: SourceClient, config: CustodyConfig) -> Self {
        Self {
            client,
            limiter: Arc::new(RateLimiter::per_hour(config.hourly_quota)),
            config,
            stats: Arc::new(CheckerStats::default()),
        }
    }

    /// Every reported status change for the target becomes an alert
    pub async fn check(&self, request: &CheckRequest) -> Result<Vec<Alert>, CheckerError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or(CheckerError::NotConfigured("CUSTODY_BASE_URL"))?;
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(CheckerError::MissingCredential("VINELINK_API_KEY"))?;

        if !self.limiter.try_acquire() {
            return Err(CheckerError::RateLimited);
        }

        let mut query = vec![("name", request.target_name.as_str())];
        if let Some(id) = request.target_identifier.as_deref() {
            query.push(("id", id));
        }

        let http_request = self
            .client
            .get(base_url, "offenders")
            .header("X-Api-Key", api_key)
            .query(&query);

        let response: CustodyResponse = self.client.fetch_json(http_request).await?;

        Ok(response
            .records
            .into_iter()
            .map(|record| Self::to_alert(request, record))
            .collect())
    }

    fn to_alert(request: &CheckRequest, record: CustodyRecord) -> Alert {
        let severity = custody_severity(&record.status);

        request
            .alert(SOURCE)
            .title(format!("Custody status change: {}", record.status))
            .message(format!(
                "Custody source reports a status change for {}: {}",
                request.target_name, record.status
            ))
            .severity(severity)
            .meta("offender_id", record.offender_id)
            .meta("status_change", record.status)
            .meta("facility", record.facility)
            .meta("status_changed_at", record.status_changed_at)
            .meta(
                "notification_type",
                record
                    .notification_type
                    .unwrap_or_else(|| "Custody Status Change".to_string()),
            )
            .build(request.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Channel;
    use crate::sources::tests::{client, request};
    use crate::testing::StubServer;
    use axum::http::StatusCode;

    #[test]
    fn test_custody_severity() {
        assert_eq!(custody_severity("Release Pending"), Severity::Urgent);
        assert_eq!(custody_severity("ESCAPED"), Severity::Urgent);
        assert_eq!(custody_severity("Transferred"), Severity::Warning);
        assert_eq!(custody_severity("In Custody"), Severity::Info);
    }

    #[tokio::test]
    async fn test_lookup_by_name_and_identifier() {
        let stub = StubServer::start(
            StatusCode::OK,
            serde_json::json!({
                "records": [
                    {"offender_id": "X9", "status": "Release Pending", "facility": "County Jail"},
                    {"offender_id": "X9", "status": "In Custody"}
                ]
            }),
        )
        .await;
        let checker = CustodyChecker::new(
            client(),
            CustodyConfig {
                base_url: Some(stub.base_url.clone()),
                api_key: Some("k-1".to_string()),
                hourly_quota: 10,
            },
        );

        let mut req = request("Jane Doe", &["arrest"], &[Channel::Sms]);
        req.target_identifier = Some("ID-42".to_string());

        let alerts = checker.check(&req).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, Severity::Urgent);
        assert_eq!(alerts[0].target_identifier.as_deref(), Some("ID-42"));
        assert_eq!(alerts[0].metadata["facility"], "County Jail");
        assert_eq!(alerts[1].severity, Severity::Info);
        assert_eq!(alerts[1].metadata["facility"], serde_json::Value::Null);

        let captured = stub.requests();
        assert_eq!(captured[0].path, "/offenders");
        assert_eq!(captured[0].headers["x-api-key"], "k-1");
        assert!(captured[0].query.as_deref().unwrap().contains("id=ID-42"));
    }

    #[tokio::test]
    async fn test_unconfigured_source() {
        let checker = CustodyChecker::new(client(), CustodyConfig::default());
        let result = checker
            .check(&request("Jane Doe", &[], &[Channel::Email]))
            .await;
        assert!(matches!(result, Err(CheckerError::NotConfigured(_))));
    }
}
