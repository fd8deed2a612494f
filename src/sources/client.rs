use std::time::Duration;

use serde::de::DeserializeOwned;

use super::CheckerError;

/// HTTP client shared by the record sources
#[derive(Debug, Clone)]
pub struct SourceClient {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl SourceClient {
    pub fn with_timeout(timeout: Duration) -> Result<Self, CheckerError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("casewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CheckerError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a GET request against `base_url` joined with `path`
    pub fn get(&self, base_url: &str, path: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.http_client.get(url)
    }

    /// Send a request and decode a JSON body
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CheckerError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CheckerError::Timeout(self.timeout)
            } else {
                CheckerError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CheckerError::Upstream {
                status: status.as_u16(),
                body: truncate(&body, 256),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CheckerError::Malformed(e.to_string()))
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_url_join() {
        let client = SourceClient::with_timeout(Duration::from_secs(1)).unwrap();
        let request = client
            .get("http://127.0.0.1:9/api/", "/cases")
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://127.0.0.1:9/api/cases");
    }
}
