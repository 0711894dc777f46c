//! Firecrawl adapter: treats Firecrawl's scrape cache as a "recent past"
//! archive layer. `max_age_ms` controls how stale a cached copy may be.

use async_trait::async_trait;
use chrono::Utc;
use firecrawl_client::{FirecrawlClient, DEFAULT_MAX_AGE_MS};
use hindsight_common::{ArchiveSource, DateRange, FetchResult, Result};
use tracing::debug;

use crate::adapter::{require_url, SourceAdapter};

pub struct FirecrawlAdapter {
    client: FirecrawlClient,
    max_age_ms: u64,
}

impl FirecrawlAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: FirecrawlClient::new(api_key),
            max_age_ms: DEFAULT_MAX_AGE_MS,
        }
    }

    pub fn with_max_age_ms(mut self, max_age_ms: u64) -> Self {
        self.max_age_ms = max_age_ms;
        self
    }

    pub fn cache_age_days(&self) -> f64 {
        self.max_age_ms as f64 / (1000.0 * 60.0 * 60.0 * 24.0)
    }

    /// Fetch via the cache window, or bypass it with `force_fresh`.
    pub async fn fetch_cached(&self, url: &str, force_fresh: bool) -> Result<FetchResult> {
        require_url(url)?;

        let max_age = (!force_fresh).then_some(self.max_age_ms);
        let data = match self.client.scrape(url, max_age).await {
            Ok(d) => d,
            Err(e) => {
                debug!(url, error = %e, "Firecrawl fetch failed");
                return Ok(FetchResult::empty(url));
            }
        };

        let mut result = FetchResult {
            url: url.to_string(),
            html: data.html,
            content: data.markdown,
            // Firecrawl does not expose the cache capture time.
            timestamp: Some(Utc::now().format("%Y%m%d%H%M%S").to_string()),
            source: Some(ArchiveSource::FirecrawlCache),
            status_code: Some(200),
            mime_type: Some("text/html".to_string()),
            digest: None,
            metadata: Default::default(),
        };
        result
            .metadata
            .insert("cached".into(), serde_json::Value::Bool(!force_fresh));
        if let Some(title) = data.metadata.title {
            result
                .metadata
                .insert("title".into(), serde_json::Value::String(title));
        }
        if let Some(desc) = data.metadata.description {
            result
                .metadata
                .insert("description".into(), serde_json::Value::String(desc));
        }
        Ok(result)
    }

    /// Submit an asynchronous crawl job rooted at `url`.
    pub async fn submit_crawl(
        &self,
        url: &str,
        max_pages: u32,
    ) -> Result<Option<firecrawl_client::CrawlJob>> {
        require_url(url)?;
        match self.client.crawl(url, max_pages, self.max_age_ms).await {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                debug!(url, error = %e, "Firecrawl crawl submission failed");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for FirecrawlAdapter {
    fn source(&self) -> ArchiveSource {
        ArchiveSource::FirecrawlCache
    }

    /// Date ranges don't apply to a rolling cache; the range is ignored
    /// beyond the inverted-range precondition.
    async fn fetch(&self, url: &str, range: &DateRange) -> Result<FetchResult> {
        if range.is_inverted() {
            return Ok(FetchResult::empty(url));
        }
        self.fetch_cached(url, false).await
    }
}
