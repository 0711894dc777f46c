pub mod error;

pub use error::{FirecrawlError, Result};

use std::time::Duration;

use serde::Deserialize;

const BASE_URL: &str = "https://api.firecrawl.dev/v1";

/// Default cache age: 30 days in milliseconds.
pub const DEFAULT_MAX_AGE_MS: u64 = 2_592_000_000;

/// Firecrawl client with a cache-first posture: `maxAge` tells the service
/// to serve its cached copy when one is fresh enough, which makes it usable
/// as a "recent past" archive layer.
pub struct FirecrawlClient {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ScrapeEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<ScrapeData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeData {
    pub html: Option<String>,
    pub markdown: Option<String>,
    #[serde(default)]
    pub metadata: ScrapeMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlJob {
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub success: bool,
}

impl FirecrawlClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    pub fn with_client(api_key: String, client: reqwest::Client) -> Self {
        Self { client, api_key }
    }

    /// Scrape a URL. `max_age_ms = Some(n)` allows a cached copy up to `n`
    /// milliseconds old; `None` forces a fresh scrape.
    pub async fn scrape(&self, url: &str, max_age_ms: Option<u64>) -> Result<ScrapeData> {
        let mut body = serde_json::json!({
            "url": url,
            "formats": ["markdown", "html"],
        });
        if let Some(age) = max_age_ms {
            body["maxAge"] = age.into();
        }

        let resp = self
            .client
            .post(format!("{BASE_URL}/scrape"))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ScrapeEnvelope = resp.json().await?;
        match envelope.data {
            Some(data) if envelope.success => Ok(data),
            _ => Err(FirecrawlError::Unsuccessful),
        }
    }

    /// Submit a crawl job starting from `url`. Returns immediately with the
    /// job handle; Firecrawl crawls asynchronously.
    pub async fn crawl(&self, url: &str, limit: u32, max_age_ms: u64) -> Result<CrawlJob> {
        let body = serde_json::json!({
            "url": url,
            "limit": limit,
            "maxAge": max_age_ms,
        });

        let resp = self
            .client
            .post(format!("{BASE_URL}/crawl"))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}
