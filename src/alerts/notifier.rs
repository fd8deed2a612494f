//! Channel dispatchers delivering alerts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rand::Rng;
use serde::Serialize;

use super::model::{Alert, Channel};
use crate::config::{NotifyConfig, SmtpConfig, WebhookConfig};

/// Result of one successful dispatch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Delivery {
    /// Delivered after this many attempts
    Sent { attempts: u32 },
    /// Nothing sent; the channel is unconfigured or has no provider
    Skipped { reason: String },
}

/// A delivery mechanism for alerts
#[derive(Debug, Clone)]
pub enum ChannelDispatcher {
    Email(EmailNotifier),
    Webhook(WebhookNotifier),
    /// No SMS provider is integrated; deliveries are logged only
    Sms,
    /// No chat provider is integrated; deliveries are logged only
    Chat,
}

impl ChannelDispatcher {
    pub fn channel(&self) -> Channel {
        match self {
            ChannelDispatcher::Email(_) => Channel::Email,
            ChannelDispatcher::Webhook(_) => Channel::Webhook,
            ChannelDispatcher::Sms => Channel::Sms,
            ChannelDispatcher::Chat => Channel::Chat,
        }
    }

    pub async fn send(&self, alert: &Alert) -> Result<Delivery, DispatchError> {
        match self {
            ChannelDispatcher::Email(email) => email.send(alert).await,
            ChannelDispatcher::Webhook(webhook) => webhook.send(alert).await,
            ChannelDispatcher::Sms | ChannelDispatcher::Chat => {
                tracing::info!(
                    alert_id = %alert.id,
                    channel = %self.channel(),
                    title = %alert.title,
                    "Alert notification (no provider): {}",
                    alert.message
                );
                Ok(Delivery::Skipped {
                    reason: format!("no {} provider integrated", self.channel()),
                })
            }
        }
    }
}

/// One dispatcher per channel
#[derive(Debug, Clone)]
pub struct Dispatchers {
    email: ChannelDispatcher,
    webhook: ChannelDispatcher,
    sms: ChannelDispatcher,
    chat: ChannelDispatcher,
}

impl Dispatchers {
    pub fn from_config(config: &NotifyConfig) -> Result<Self, DispatchError> {
        Ok(Self {
            email: ChannelDispatcher::Email(EmailNotifier::new(config.smtp.clone())?),
            webhook: ChannelDispatcher::Webhook(WebhookNotifier::new(config.webhook.clone())?),
            sms: ChannelDispatcher::Sms,
            chat: ChannelDispatcher::Chat,
        })
    }

    pub fn get(&self, channel: Channel) -> &ChannelDispatcher {
        match channel {
            Channel::Email => &self.email,
            Channel::Webhook => &self.webhook,
            Channel::Sms => &self.sms,
            Channel::Chat => &self.chat,
        }
    }
}

/// SMTP email delivery
#[derive(Clone)]
pub struct EmailNotifier {
    config: SmtpConfig,
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("configured", &self.transport.is_some())
            .finish()
    }
}

impl EmailNotifier {
    /// Build the notifier; the SMTP transport exists only when credentials are set
    pub fn new(config: SmtpConfig) -> Result<Self, DispatchError> {
        let transport = if config.is_configured() {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| DispatchError::Email(e.to_string()))?
                .port(config.port);

            if let (Some(user), Some(pass)) = (&config.username, &config.password) {
                builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
            }
            Some(Arc::new(builder.build()))
        } else {
            None
        };

        Ok(Self { config, transport })
    }

    pub fn subject(alert: &Alert) -> String {
        format!(
            "[casewatch][{}] {}",
            alert.severity.as_str().to_uppercase(),
            alert.title
        )
    }

    pub fn body(alert: &Alert) -> String {
        let metadata = serde_json::to_string_pretty(&alert.metadata).unwrap_or_default();
        format!(
            "Severity: {severity}\nTarget: {target}\nSource: {source}\nDate: {date}\n\n{message}\n\nMetadata:\n{metadata}\n",
            severity = alert.severity.as_str().to_uppercase(),
            target = alert.target_name,
            source = alert.source,
            date = alert.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            message = alert.message,
            metadata = metadata,
        )
    }

    pub async fn send(&self, alert: &Alert) -> Result<Delivery, DispatchError> {
        let Some(transport) = &self.transport else {
            tracing::info!(
                alert_id = %alert.id,
                "Email not configured, would send: {}",
                Self::subject(alert)
            );
            return Ok(Delivery::Skipped {
                reason: "email not configured".to_string(),
            });
        };

        let mut builder = Message::builder()
            .from(
                self.config
                    .from
                    .parse()
                    .map_err(|e| DispatchError::Email(format!("invalid sender: {}", e)))?,
            )
            .subject(Self::subject(alert))
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.config.to {
            builder = builder.to(recipient
                .parse()
                .map_err(|e| DispatchError::Email(format!("invalid recipient {}: {}", recipient, e)))?);
        }

        let message = builder
            .body(Self::body(alert))
            .map_err(|e| DispatchError::Email(e.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|e| DispatchError::Email(e.to_string()))?;

        tracing::debug!(alert_id = %alert.id, recipients = ?self.config.to, "Email notification sent");
        Ok(Delivery::Sent { attempts: 1 })
    }
}

/// Fixed JSON body POSTed to the webhook
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub alert_id: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub severity: &'a str,
    pub source: &'a str,
    pub target_name: &'a str,
    pub target_id: Option<&'a str>,
    pub created_at: String,
    pub metadata: &'a serde_json::Map<String, serde_json::Value>,
}

impl<'a> From<&'a Alert> for WebhookPayload<'a> {
    fn from(alert: &'a Alert) -> Self {
        Self {
            alert_id: &alert.id,
            title: &alert.title,
            message: &alert.message,
            severity: alert.severity.as_str(),
            source: &alert.source,
            target_name: &alert.target_name,
            target_id: alert.target_identifier.as_deref(),
            created_at: alert.created_at.to_rfc3339(),
            metadata: &alert.metadata,
        }
    }
}

/// Webhook delivery with bounded retry
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DispatchError::Webhook(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub async fn send(&self, alert: &Alert) -> Result<Delivery, DispatchError> {
        let Some(url) = self.config.url.as_deref() else {
            tracing::info!(alert_id = %alert.id, "Webhook not configured, would send: {}", alert.title);
            return Ok(Delivery::Skipped {
                reason: "webhook not configured".to_string(),
            });
        };

        let payload = WebhookPayload::from(alert);
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.client.post(url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(alert_id = %alert.id, url = %url, attempt, "Webhook notification sent");
                    return Ok(Delivery::Sent { attempts: attempt });
                }
                Ok(response) => {
                    let status = response.status();
                    last_error = format!("status {}", status);
                    if !is_retryable(status) {
                        tracing::warn!(alert_id = %alert.id, url = %url, %status, "Webhook rejected");
                        return Err(DispatchError::Rejected {
                            status: status.as_u16(),
                            attempts: attempt,
                        });
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < max_attempts {
                let delay = backoff_delay(self.config.retry_base_delay, attempt);
                tracing::debug!(
                    alert_id = %alert.id,
                    attempt,
                    error = %last_error,
                    "Webhook attempt failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(DispatchError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Exponential backoff with up to 25% jitter
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << (attempt - 1).min(16));
    let jitter_ms = (exp.as_millis() as u64 / 4).max(1);
    exp + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
}

/// Per-channel delivery counters
#[derive(Debug, Default)]
pub struct DeliveryStats {
    counters: [ChannelCounters; 4],
}

#[derive(Debug, Default)]
struct ChannelCounters {
    attempted: AtomicU64,
    sent: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStatsSnapshot {
    pub attempted: u64,
    pub sent: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl DeliveryStats {
    fn slot(&self, channel: Channel) -> &ChannelCounters {
        let idx = Channel::ALL
            .iter()
            .position(|c| *c == channel)
            .unwrap_or_default();
        &self.counters[idx]
    }

    pub fn record(&self, channel: Channel, result: &Result<Delivery, DispatchError>) {
        let slot = self.slot(channel);
        slot.attempted.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(Delivery::Sent { .. }) => &slot.sent,
            Ok(Delivery::Skipped { .. }) => &slot.skipped,
            Err(_) => &slot.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, channel: Channel) -> ChannelStatsSnapshot {
        let slot = self.slot(channel);
        ChannelStatsSnapshot {
            attempted: slot.attempted.load(Ordering::Relaxed),
            sent: slot.sent.load(Ordering::Relaxed),
            skipped: slot.skipped.load(Ordering::Relaxed),
            failed: slot.failed.load(Ordering::Relaxed),
        }
    }
}

/// Dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Email error: {0}")]
    Email(String),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Webhook rejected with status {status} after {attempts} attempt(s)")]
    Rejected { status: u16, attempts: u32 },

    #[error("Webhook failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Severity;
    use crate::testing::StubServer;
    use axum::http::StatusCode;
    use chrono::Utc;

    fn alert() -> Alert {
        Alert::builder("courtlistener", "Jane Doe")
            .title("New court case detected")
            .message("Jane Doe arrest record")
            .severity(Severity::Critical)
            .target_identifier(Some("ID-7".to_string()))
            .meta("case_name", "US v. Doe")
            .build(Utc::now())
    }

    fn webhook(url: Option<String>, max_attempts: u32) -> WebhookNotifier {
        WebhookNotifier::new(WebhookConfig {
            url,
            timeout: Duration::from_secs(5),
            max_attempts,
            retry_base_delay: Duration::from_millis(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_webhook_payload_shape() {
        let stub = StubServer::start(StatusCode::OK, serde_json::json!({"ok": true})).await;
        let notifier = webhook(Some(stub.base_url.clone()), 3);
        let alert = alert();

        let delivery = notifier.send(&alert).await.unwrap();
        assert_eq!(delivery, Delivery::Sent { attempts: 1 });

        let captured = stub.requests();
        assert_eq!(captured.len(), 1);
        let body = &captured[0].body;
        assert_eq!(body["alert_id"], alert.id.as_str());
        assert_eq!(body["title"], "New court case detected");
        assert_eq!(body["severity"], "critical");
        assert_eq!(body["source"], "courtlistener");
        assert_eq!(body["target_name"], "Jane Doe");
        assert_eq!(body["target_id"], "ID-7");
        assert_eq!(body["created_at"], alert.created_at.to_rfc3339());
        assert_eq!(body["metadata"]["case_name"], "US v. Doe");
    }

    #[tokio::test]
    async fn test_webhook_retries_server_errors() {
        let stub = StubServer::start(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({})).await;
        let notifier = webhook(Some(stub.base_url.clone()), 3);

        let result = notifier.send(&alert()).await;
        assert!(matches!(result, Err(DispatchError::Exhausted { attempts: 3, .. })));
        assert_eq!(stub.request_count(), 3);
    }

    #[tokio::test]
    async fn test_webhook_client_error_is_terminal() {
        let stub = StubServer::start(StatusCode::BAD_REQUEST, serde_json::json!({})).await;
        let notifier = webhook(Some(stub.base_url.clone()), 3);

        let result = notifier.send(&alert()).await;
        assert!(matches!(
            result,
            Err(DispatchError::Rejected { status: 400, attempts: 1 })
        ));
        assert_eq!(stub.request_count(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_channels_skip() {
        let alert = alert();

        let result = webhook(None, 3).send(&alert).await.unwrap();
        assert!(matches!(result, Delivery::Skipped { .. }));

        let email = EmailNotifier::new(SmtpConfig::default()).unwrap();
        assert!(matches!(email.send(&alert).await, Ok(Delivery::Skipped { .. })));

        assert!(matches!(
            ChannelDispatcher::Sms.send(&alert).await,
            Ok(Delivery::Skipped { .. })
        ));
    }

    #[test]
    fn test_email_format() {
        let alert = alert();
        assert_eq!(
            EmailNotifier::subject(&alert),
            "[casewatch][CRITICAL] New court case detected"
        );
        let body = EmailNotifier::body(&alert);
        assert!(body.contains("Target: Jane Doe"));
        assert!(body.contains("\"case_name\": \"US v. Doe\""));
    }

    #[test]
    fn test_backoff_grows() {
        let base = Duration::from_millis(100);
        let first = backoff_delay(base, 1);
        let third = backoff_delay(base, 3);
        assert!(first >= base && first < Duration::from_millis(125));
        assert!(third >= Duration::from_millis(400) && third < Duration::from_millis(500));
    }

    #[test]
    fn test_delivery_stats() {
        let stats = DeliveryStats::default();
        stats.record(Channel::Webhook, &Ok(Delivery::Sent { attempts: 2 }));
        stats.record(
            Channel::Webhook,
            &Err(DispatchError::Webhook("down".to_string())),
        );
        stats.record(
            Channel::Email,
            &Ok(Delivery::Skipped {
                reason: "x".to_string(),
            }),
        );

        let webhook = stats.snapshot(Channel::Webhook);
        assert_eq!(webhook.attempted, 2);
        assert_eq!(webhook.sent, 1);
        assert_eq!(webhook.failed, 1);
        assert_eq!(stats.snapshot(Channel::Email).skipped, 1);
        assert_eq!(stats.snapshot(Channel::Sms), ChannelStatsSnapshot::default());
    }
}
