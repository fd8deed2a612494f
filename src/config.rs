//! Runtime configuration loaded from environment variables

use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerSettings,
    pub scheduler: SchedulerSettings,
    pub sources: SourcesConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Load every section from the environment, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerSettings::from_env()?,
            scheduler: SchedulerSettings::from_env()?,
            sources: SourcesConfig::from_env()?,
            notify: NotifyConfig::from_env()?,
        })
    }
}

/// HTTP listener settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerSettings {
    /// CASEWATCH_HOST=0.0.0.0
    /// CASEWATCH_PORT=8080
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: env_string("CASEWATCH_HOST").unwrap_or(defaults.host),
            port: env_parse("CASEWATCH_PORT")?.unwrap_or(defaults.port),
        })
    }
}

/// Monitor loop settings
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Interval used when a registration does not name one
    pub default_check_interval: Duration,
    /// Pause after an internal fault before the loop resumes
    pub fault_backoff: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_check_interval: Duration::from_secs(3600),
            fault_backoff: Duration::from_secs(300),
        }
    }
}

impl SchedulerSettings {
    /// CASEWATCH_CHECK_INTERVAL_SECS=3600
    /// CASEWATCH_FAULT_BACKOFF_SECS=300
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let default_check_interval = env_parse::<u64>("CASEWATCH_CHECK_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.default_check_interval);
        if default_check_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "CASEWATCH_CHECK_INTERVAL_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            default_check_interval,
            fault_backoff: env_parse::<u64>("CASEWATCH_FAULT_BACKOFF_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.fault_backoff),
        })
    }
}

/// Settings for the four record sources
#[derive(Debug, Clone)]
pub struct SourcesConfig {
    /// Per-request timeout applied to every source client
    pub timeout: Duration,
    pub court_listener: CourtListenerConfig,
    pub custody: CustodyConfig,
    pub docket: DocketConfig,
    pub state_courts: StateCourtsConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            court_listener: CourtListenerConfig::default(),
            custody: CustodyConfig::default(),
            docket: DocketConfig::default(),
            state_courts: StateCourtsConfig::default(),
        }
    }
}

impl SourcesConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            timeout: env_parse::<u64>("CASEWATCH_SOURCE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            court_listener: CourtListenerConfig {
                base_url: env_string("COURTLISTENER_BASE_URL")
                    .unwrap_or(defaults.court_listener.base_url),
                token: env_string("COURTLISTENER_TOKEN"),
                hourly_quota: env_parse("COURTLISTENER_HOURLY_QUOTA")?
                    .unwrap_or(defaults.court_listener.hourly_quota),
            },
            custody: CustodyConfig {
                base_url: env_string("CUSTODY_BASE_URL"),
                api_key: env_string("VINELINK_API_KEY"),
                hourly_quota: env_parse("CUSTODY_HOURLY_QUOTA")?
                    .unwrap_or(defaults.custody.hourly_quota),
            },
            docket: DocketConfig {
                base_url: env_string("DOCKET_BASE_URL"),
                username: env_string("PACER_USERNAME"),
                password: env_string("PACER_PASSWORD"),
                hourly_quota: env_parse("DOCKET_HOURLY_QUOTA")?
                    .unwrap_or(defaults.docket.hourly_quota),
            },
            state_courts: StateCourtsConfig {
                base_url: env_string("STATE_COURTS_BASE_URL"),
                api_key: env_string("STATE_COURTS_API_KEY"),
                states: env_list("STATE_COURTS_STATES").unwrap_or(defaults.state_courts.states),
                hourly_quota: env_parse("STATE_COURTS_HOURLY_QUOTA")?
                    .unwrap_or(defaults.state_courts.hourly_quota),
            },
        })
    }
}

/// Federal case search (CourtListener REST API)
#[derive(Debug, Clone)]
pub struct CourtListenerConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub hourly_quota: u32,
}

impl Default for CourtListenerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.courtlistener.com/api/rest/v3".to_string(),
            token: None,
            hourly_quota: 5000,
        }
    }
}

/// Custody-status lookup
#[derive(Debug, Clone)]
pub struct CustodyConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub hourly_quota: u32,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            hourly_quota: 1000,
        }
    }
}

/// Federal docket search
#[derive(Debug, Clone)]
pub struct DocketConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub hourly_quota: u32,
}

impl Default for DocketConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            password: None,
            hourly_quota: 100,
        }
    }
}

/// State court search across a list of states
#[derive(Debug, Clone)]
pub struct StateCourtsConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub states: Vec<String>,
    pub hourly_quota: u32,
}

impl Default for StateCourtsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            states: ["CA", "TX", "FL", "NY", "IL"]
                .into_iter()
                .map(String::from)
                .collect(),
            hourly_quota: 1000,
        }
    }
}

/// Delivery settings for the notification channels
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub smtp: SmtpConfig,
    pub webhook: WebhookConfig,
}

impl NotifyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let smtp_defaults = SmtpConfig::default();
        let webhook_defaults = WebhookConfig::default();

        Ok(Self {
            smtp: SmtpConfig {
                host: env_string("SMTP_HOST").unwrap_or(smtp_defaults.host),
                port: env_parse("SMTP_PORT")?.unwrap_or(smtp_defaults.port),
                username: env_string("NOTIFICATION_EMAIL"),
                password: env_string("NOTIFICATION_PASSWORD"),
                from: env_string("NOTIFICATION_FROM").unwrap_or(smtp_defaults.from),
                to: env_list("NOTIFICATION_TO").unwrap_or(smtp_defaults.to),
            },
            webhook: WebhookConfig {
                url: env_string("WEBHOOK_URL"),
                timeout: env_parse::<u64>("WEBHOOK_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(webhook_defaults.timeout),
                max_attempts: env_parse("WEBHOOK_RETRIES")?
                    .unwrap_or(webhook_defaults.max_attempts),
                retry_base_delay: env_parse::<u64>("WEBHOOK_RETRY_BASE_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(webhook_defaults.retry_base_delay),
            },
        })
    }
}

/// SMTP relay settings. Email delivery is skipped while no password is set.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from: "alerts@casewatch.local".to_string(),
            to: vec!["admin@casewatch.local".to_string()],
        }
    }
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty()) && !self.to.is_empty()
    }
}

/// Webhook delivery settings
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout: Duration,
    /// Total attempts per delivery, including the first
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|s| parse_list(&s))
}

fn env_parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("'{}': {}", raw, e),
            })
        })
        .transpose()
}

/// Split a comma-separated list, dropping blanks
pub(crate) fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scheduler.default_check_interval, Duration::from_secs(3600));
        assert_eq!(config.scheduler.fault_backoff, Duration::from_secs(300));
        assert_eq!(config.sources.court_listener.hourly_quota, 5000);
        assert_eq!(config.sources.docket.hourly_quota, 100);
        assert_eq!(config.notify.webhook.max_attempts, 3);
        assert!(!config.notify.smtp.is_configured());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("CA, TX,,NY "), vec!["CA", "TX", "NY"]);
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn test_smtp_configured_requires_password() {
        let mut smtp = SmtpConfig::default();
        smtp.password = Some(String::new());
        assert!(!smtp.is_configured());

        smtp.password = Some("secret".to_string());
        assert!(smtp.is_configured());
    }
}
