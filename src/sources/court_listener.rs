//! Federal case search against the CourtListener REST API

use std::sync::Arc;

use chrono::Duration;
use serde::Deserialize;

use super::matching::record_severity;
use super::{CheckRequest, CheckerError, CheckerStats, RateLimiter, SourceClient};
use crate::alerts::Alert;
use crate::config::CourtListenerConfig;

pub const SOURCE: &str = "courtlistener";

/// Web origin used for opinion links
const SITE_URL: &str = "https://www.courtlistener.com";

#[derive(Debug, Clone)]
pub struct CourtListenerChecker {
    client: SourceClient,
    config: CourtListenerConfig,
    limiter: Arc<RateLimiter>,
    pub(crate) stats: Arc<CheckerStats>,
}

#[derive(Debug, Deserialize)]
struct OpinionPage {
    #[serde(default)]
    results: Vec<Opinion>,
}

#[derive(Debug, Deserialize)]
struct Opinion {
    id: serde_json::Value,
    #[serde(default)]
    case_name: Option<String>,
    #[serde(default)]
    plain_text: Option<String>,
    #[serde(default)]
    absolute_url: Option<String>,
    #[serde(default)]
    date_created: Option<String>,
    #[serde(default)]
    cluster: Option<serde_json::Value>,
}

impl CourtListenerChecker {
    pub fn new(client: SourceClient, config: CourtListenerConfig) -> Self {
        Self {
            client,
            limiter: Arc::new(RateLimiter::per_hour(config.hourly_quota)),
            config,
            stats: Arc::new(CheckerStats::default()),
        }
    }

    /// Opinions mentioning the target created since yesterday
    pub async fn check(&self, request: &CheckRequest) -> Result<Vec<Alert>, CheckerError> {
        let token = self
            .config
            .token
            .as_deref()
            .ok_or(CheckerError::MissingCredential("COURTLISTENER_TOKEN"))?;

        if !self.limiter.try_acquire() {
            return Err(CheckerError::RateLimited);
        }

        let since = (request.now - Duration::days(1)).format("%Y-%m-%d").to_string();
        let http_request = self
            .client
            .get(&self.config.base_url, "opinions/")
            .header("Authorization", format!("Token {}", token))
            .query(&[
                ("q", request.target_name.as_str()),
                ("order_by", "-date_created"),
                ("date_created__gte", since.as_str()),
            ]);

        let page: OpinionPage = self.client.fetch_json(http_request).await?;

        Ok(page
            .results
            .into_iter()
            .filter_map(|opinion| Self::to_alert(request, opinion))
            .collect())
    }

    fn to_alert(request: &CheckRequest, opinion: Opinion) -> Option<Alert> {
        let case_name = opinion.case_name.unwrap_or_else(|| "N/A".to_string());
        let text = format!("{} {}", case_name, opinion.plain_text.unwrap_or_default());

        if !request.triggers.accepts(&text) {
            return None;
        }
        let matched = request.triggers.matched(&text);

        let court = opinion
            .cluster
            .as_ref()
            .and_then(|c| c.pointer("/docket/court"))
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let url = opinion
            .absolute_url
            .map(|path| format!("{}{}", SITE_URL, path));

        Some(
            request
                .alert(SOURCE)
                .title("New court case detected")
                .message(format!(
                    "New mention of {} in court case: {}",
                    request.target_name, case_name
                ))
                .severity(record_severity(&text, &matched))
                .meta("opinion_id", opinion.id)
                .meta("case_name", case_name)
                .meta("court", court)
                .meta("date_filed", opinion.date_created)
                .meta("url", url)
                .meta("matched_triggers", matched)
                .build(request.now),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Channel, Severity};
    use crate::sources::tests::{client, opinion_page, request};
    use crate::testing::StubServer;
    use axum::http::StatusCode;

    fn checker(base_url: &str, token: Option<&str>) -> CourtListenerChecker {
        CourtListenerChecker::new(
            client(),
            CourtListenerConfig {
                base_url: base_url.to_string(),
                token: token.map(String::from),
                hourly_quota: 10,
            },
        )
    }

    #[tokio::test]
    async fn test_sends_token_and_query() {
        let stub = StubServer::start(StatusCode::OK, opinion_page("arrest warrant issued")).await;
        let checker = checker(&stub.base_url, Some("abc123"));

        let alerts = checker
            .check(&request("Jane Doe", &["arrest"], &[Channel::Email]))
            .await
            .unwrap();

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.source, SOURCE);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.target_name, "Jane Doe");
        assert_eq!(
            alert.metadata["url"],
            "https://www.courtlistener.com/opinion/101/us-v-doe/"
        );
        assert_eq!(alert.metadata["matched_triggers"], serde_json::json!(["arrest"]));

        let captured = stub.requests();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].path, "/opinions/");
        assert_eq!(captured[0].headers["authorization"], "Token abc123");
        let query = captured[0].query.clone().unwrap();
        assert!(query.contains("q=Jane+Doe"), "{}", query);
        assert!(query.contains("order_by=-date_created"));
    }

    #[tokio::test]
    async fn test_inflected_mention_raises_alert() {
        let stub = StubServer::start(
            StatusCode::OK,
            opinion_page("Jane Doe was arrested and later convicted"),
        )
        .await;
        let checker = checker(&stub.base_url, Some("abc123"));

        let alerts = checker
            .check(&request("Jane Doe", &["arrests", "conviction"], &[Channel::Email]))
            .await
            .unwrap();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(
            alerts[0].metadata["matched_triggers"],
            serde_json::json!(["arrests", "conviction"])
        );
    }

    #[tokio::test]
    async fn test_non_matching_opinion_is_ignored() {
        let stub = StubServer::start(StatusCode::OK, opinion_page("zoning variance")).await;
        let checker = checker(&stub.base_url, Some("abc123"));

        let alerts = checker
            .check(&request("Jane Doe", &["arrest"], &[Channel::Email]))
            .await
            .unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_skips_request() {
        let stub = StubServer::start(StatusCode::OK, opinion_page("arrest")).await;
        let checker = checker(&stub.base_url, None);

        let result = checker
            .check(&request("Jane Doe", &["arrest"], &[Channel::Email]))
            .await;
        assert!(matches!(result, Err(CheckerError::MissingCredential(_))));
        assert_eq!(stub.request_count(), 0);
    }

    #[tokio::test]
    async fn test_quota_is_enforced() {
        let stub = StubServer::start(StatusCode::OK, serde_json::json!({"results": []})).await;
        let mut checker = checker(&stub.base_url, Some("abc123"));
        checker.limiter = Arc::new(RateLimiter::per_hour(1));

        let req = request("Jane Doe", &[], &[Channel::Email]);
        assert!(checker.check(&req).await.is_ok());
        assert!(matches!(
            checker.check(&req).await,
            Err(CheckerError::RateLimited)
        ));
        assert_eq!(stub.request_count(), 1);
    }
}
