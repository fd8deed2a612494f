//! Federal docket search

use std::sync::Arc;

use serde::Deserialize;

use super::matching::record_severity;
use super::{CheckRequest, CheckerError, CheckerStats, RateLimiter, SourceClient};
use crate::alerts::{Alert, Severity};
use crate::config::DocketConfig;

pub const SOURCE: &str = "federal_docket";

#[derive(Debug, Clone)]
pub struct DocketChecker {
    client: SourceClient,
    config: DocketConfig,
    limiter: Arc<RateLimiter>,
    pub(crate) stats: Arc<CheckerStats>,
}

#[derive(Debug, Deserialize)]
struct DocketResponse {
    #[serde(default)]
    cases: Vec<DocketCase>,
}

#[derive(Debug, Deserialize)]
struct DocketCase {
    case_number: String,
    #[serde(default)]
    case_type: Option<String>,
    #[serde(default)]
    case_title: Option<String>,
    #[serde(default)]
    court: Option<String>,
    #[serde(default)]
    date_filed: Option<String>,
}

impl DocketChecker {
    pub fn new(client: SourceClient, config: DocketConfig) -> Self {
        Self {
            client,
            limiter: Arc::new(RateLimiter::per_hour(config.hourly_quota)),
            config,
            stats: Arc::new(CheckerStats::default()),
        }
    }

    /// Cases naming the target as a party
    pub async fn check(&self, request: &CheckRequest) -> Result<Vec<Alert>, CheckerError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or(CheckerError::NotConfigured("DOCKET_BASE_URL"))?;
        let (username, password) = match (&self.config.username, &self.config.password) {
            (Some(u), Some(p)) => (u, p),
            _ => return Err(CheckerError::MissingCredential("PACER_USERNAME/PACER_PASSWORD")),
        };

        if !self.limiter.try_acquire() {
            return Err(CheckerError::RateLimited);
        }

        let http_request = self
            .client
            .get(base_url, "cases")
            .basic_auth(username, Some(password))
            .query(&[("party_name", request.target_name.as_str())]);

        let response: DocketResponse = self.client.fetch_json(http_request).await?;

        Ok(response
            .cases
            .into_iter()
            .filter_map(|case| Self::to_alert(request, case))
            .collect())
    }

    fn to_alert(request: &CheckRequest, case: DocketCase) -> Option<Alert> {
        let case_type = case.case_type.unwrap_or_else(|| "Unknown".to_string());
        let text = format!(
            "{} {}",
            case_type,
            case.case_title.as_deref().unwrap_or_default()
        );

        if !request.triggers.accepts(&text) {
            return None;
        }
        let matched = request.triggers.matched(&text);

        let severity = if case_type.eq_ignore_ascii_case("criminal") {
            Severity::Critical
        } else {
            // Docket entries are new filings, never resolutions
            record_severity(&text, &matched).max(Severity::Warning)
        };

        Some(
            request
                .alert(SOURCE)
                .title(format!("New federal case - {}", case_type))
                .message(format!(
                    "New {} case in the federal docket involves {}",
                    case_type.to_lowercase(),
                    request.target_name
                ))
                .severity(severity)
                .meta("case_type", case_type)
                .meta("case_number", case.case_number)
                .meta("case_title", case.case_title)
                .meta(
                    "court",
                    case.court.unwrap_or_else(|| "U.S. District Court".to_string()),
                )
                .meta("filing_date", case.date_filed)
                .meta("matched_triggers", matched)
                .build(request.now),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Channel;
    use crate::sources::tests::{client, request};
    use crate::testing::StubServer;
    use axum::http::StatusCode;

    fn checker(base_url: &str) -> DocketChecker {
        DocketChecker::new(
            client(),
            DocketConfig {
                base_url: Some(base_url.to_string()),
                username: Some("user".to_string()),
                password: Some("pass".to_string()),
                hourly_quota: 10,
            },
        )
    }

    #[tokio::test]
    async fn test_case_type_sets_severity() {
        let stub = StubServer::start(
            StatusCode::OK,
            serde_json::json!({
                "cases": [
                    {"case_number": "2:26-cr-0012", "case_type": "Criminal", "case_title": "USA v. Doe"},
                    {"case_number": "2:26-cv-0451", "case_type": "Civil", "case_title": "Acme v. Doe", "court": "S.D.N.Y."},
                    {"case_number": "2:26-bk-0009", "case_type": "Bankruptcy", "case_title": "In re Doe (dismissed)"}
                ]
            }),
        )
        .await;

        let alerts = checker(&stub.base_url)
            .check(&request("Jane Doe", &[], &[Channel::Email]))
            .await
            .unwrap();

        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[1].severity, Severity::Warning);
        assert_eq!(alerts[1].metadata["court"], "S.D.N.Y.");
        assert_eq!(alerts[2].severity, Severity::Warning);
        assert_eq!(alerts[0].metadata["court"], "U.S. District Court");

        let captured = stub.requests();
        // "user:pass" in base64
        assert_eq!(captured[0].headers["authorization"], "Basic dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn test_triggers_filter_cases() {
        let stub = StubServer::start(
            StatusCode::OK,
            serde_json::json!({
                "cases": [
                    {"case_number": "1", "case_type": "Civil", "case_title": "Contract dispute"},
                    {"case_number": "2", "case_type": "Bankruptcy", "case_title": "In re Doe"}
                ]
            }),
        )
        .await;

        let alerts = checker(&stub.base_url)
            .check(&request("Jane Doe", &["bankruptcies"], &[Channel::Email]))
            .await
            .unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metadata["case_number"], "2");
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let mut checker = checker("http://127.0.0.1:9");
        checker.config.password = None;
        let result = checker
            .check(&request("Jane Doe", &[], &[Channel::Email]))
            .await;
        assert!(matches!(result, Err(CheckerError::MissingCredential(_))));
    }
}
