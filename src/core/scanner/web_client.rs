// src/core/scanner/web_client.rs

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;
use tracing::debug;

use crate::error::ReconError;

/// Desktop browser user agents rotated across requests to look less like a bot.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 OPR/109.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 OPR/109.0.0.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux i686; rv:124.0) Gecko/20100101 Firefox/124.0",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// The HTTP operations the harvester needs. Swapped for fakes in tests.
#[async_trait]
pub trait WebClient: Send + Sync {
    /// GETs `url` and returns the body of a 200 response.
    async fn fetch_page(&self, url: &str) -> Result<String, ReconError>;

    /// GETs `url` and returns only the status code.
    async fn probe(&self, url: &str) -> Result<StatusCode, ReconError>;
}

/// `reqwest`-backed client; every request carries a random user agent and a short timeout.
#[derive(Debug, Clone)]
pub struct HttpWebClient {
    client: reqwest::Client,
}

impl HttpWebClient {
    pub fn new(timeout: Duration) -> Result<Self, ReconError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReconError::Http {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ReconError> {
        self.client
            .get(url)
            .header(USER_AGENT, random_user_agent())
            .send()
            .await
            .map_err(|e| ReconError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl WebClient for HttpWebClient {
    async fn fetch_page(&self, url: &str) -> Result<String, ReconError> {
        let response = self.get(url).await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ReconError::Http {
                url: url.to_string(),
                reason: format!("non-OK HTTP status: {status}"),
            });
        }
        let body = response.text().await.map_err(|e| ReconError::Http {
            url: url.to_string(),
            reason: format!("failed to read body: {e}"),
        })?;
        debug!(url, bytes = body.len(), "Fetched page.");
        Ok(body)
    }

    async fn probe(&self, url: &str) -> Result<StatusCode, ReconError> {
        Ok(self.get(url).await?.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_user_agent_comes_from_the_pool() {
        for _ in 0..32 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }
}
