//! Log-then-dispatch pipeline for one check cycle's alerts

use std::sync::Arc;

use serde::Serialize;

use super::log::AlertLog;
use super::model::{Alert, Channel};
use super::notifier::{Delivery, DeliveryStats, Dispatchers};

/// Outcome of one channel for one alert
#[derive(Debug, Clone, Serialize)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub delivery: Option<Delivery>,
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Dispatch results for one alert
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub alert_id: String,
    pub outcomes: Vec<ChannelOutcome>,
}

pub struct AlertPipeline {
    log: Arc<AlertLog>,
    dispatchers: Dispatchers,
    stats: Arc<DeliveryStats>,
}

impl AlertPipeline {
    pub fn new(log: Arc<AlertLog>, dispatchers: Dispatchers) -> Self {
        Self {
            log,
            dispatchers,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn log(&self) -> &Arc<AlertLog> {
        &self.log
    }

    pub fn stats(&self) -> &Arc<DeliveryStats> {
        &self.stats
    }

    /// Log and dispatch alerts in the order given.
    ///
    /// Each alert is appended to the log before any delivery. Channels of one
    /// alert are attempted concurrently and independently; a failing channel
    /// never prevents delivery on another.
    pub async fn process(&self, alerts: Vec<Alert>) -> Vec<DispatchReport> {
        let mut reports = Vec::with_capacity(alerts.len());

        for alert in alerts {
            self.log.append(alert.clone());
            reports.push(self.dispatch(&alert).await);
        }

        reports
    }

    /// Deliver one alert on each of its channels
    pub async fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let sends = alert.channels.iter().map(|&channel| async move {
            let result = self.dispatchers.get(channel).send(alert).await;
            self.stats.record(channel, &result);

            match result {
                Ok(delivery) => ChannelOutcome {
                    channel,
                    delivery: Some(delivery),
                    error: None,
                },
                Err(e) => {
                    tracing::error!(
                        alert_id = %alert.id,
                        channel = %channel,
                        error = %e,
                        "Failed to deliver alert"
                    );
                    ChannelOutcome {
                        channel,
                        delivery: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        });

        DispatchReport {
            alert_id: alert.id.clone(),
            outcomes: futures::future::join_all(sends).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alerts::Severity;
    use crate::config::{NotifyConfig, WebhookConfig};
    use crate::testing::StubServer;
    use axum::http::StatusCode;
    use chrono::Utc;
    use std::time::Duration;

    pub(crate) fn pipeline_with_webhook(url: Option<String>) -> AlertPipeline {
        let config = NotifyConfig {
            webhook: WebhookConfig {
                url,
                timeout: Duration::from_secs(5),
                max_attempts: 2,
                retry_base_delay: Duration::from_millis(5),
            },
            ..Default::default()
        };
        AlertPipeline::new(
            Arc::new(AlertLog::new()),
            Dispatchers::from_config(&config).unwrap(),
        )
    }

    fn alert(channels: &[Channel]) -> Alert {
        Alert::builder("federal_docket", "Jane Doe")
            .title("New federal case - Civil")
            .severity(Severity::Warning)
            .channels(channels.iter().copied().collect())
            .build(Utc::now())
    }

    #[tokio::test]
    async fn test_webhook_failure_does_not_block_email() {
        let stub = StubServer::start(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({})).await;
        let pipeline = pipeline_with_webhook(Some(stub.base_url.clone()));

        let reports = pipeline
            .process(vec![alert(&[Channel::Email, Channel::Webhook])])
            .await;

        assert_eq!(reports.len(), 1);
        let outcomes = &reports[0].outcomes;
        assert_eq!(outcomes.len(), 2);

        let email = outcomes.iter().find(|o| o.channel == Channel::Email).unwrap();
        assert!(!email.is_failure());
        let webhook = outcomes.iter().find(|o| o.channel == Channel::Webhook).unwrap();
        assert!(webhook.is_failure());

        assert_eq!(pipeline.stats().snapshot(Channel::Email).attempted, 1);
        assert_eq!(pipeline.stats().snapshot(Channel::Webhook).failed, 1);
        assert_eq!(stub.request_count(), 2);
        assert_eq!(pipeline.log().len(), 1);
    }

    #[tokio::test]
    async fn test_only_alert_channels_are_used() {
        let stub = StubServer::start(StatusCode::OK, serde_json::json!({})).await;
        let pipeline = pipeline_with_webhook(Some(stub.base_url.clone()));

        pipeline.process(vec![alert(&[Channel::Sms])]).await;

        assert_eq!(stub.request_count(), 0);
        assert_eq!(pipeline.stats().snapshot(Channel::Sms).skipped, 1);
        assert_eq!(pipeline.stats().snapshot(Channel::Webhook).attempted, 0);
    }

    #[tokio::test]
    async fn test_alerts_logged_in_order_without_dedup() {
        let pipeline = pipeline_with_webhook(None);
        let first = alert(&[Channel::Chat]);
        let mut second = first.clone();
        second.id.push_str("_again");

        let reports = pipeline.process(vec![first.clone(), second.clone()]).await;

        assert_eq!(reports[0].alert_id, first.id);
        assert_eq!(reports[1].alert_id, second.id);
        let logged = pipeline.log().for_target("Jane Doe");
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0].id, first.id);
    }
}
