//! Exa adapter: semantic search with publication-date bounds, used to find
//! historical content by when it was published rather than when it was
//! crawled.

use async_trait::async_trait;
use exa_client::{ExaClient, ExaResult, SearchOptions};
use hindsight_common::{ArchiveSource, DateRange, Result};
use tracing::debug;

use crate::adapter::{require_url, SourceAdapter};

pub struct ExaAdapter {
    client: ExaClient,
}

impl ExaAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: ExaClient::new(api_key),
        }
    }

    /// Search within a publication-date window.
    pub async fn search(
        &self,
        query: &str,
        range: &DateRange,
        num_results: u32,
    ) -> Result<Vec<ExaResult>> {
        if query.trim().is_empty() {
            return Err(hindsight_common::HindsightError::InvalidInput(
                "empty query".into(),
            ));
        }
        if range.is_inverted() {
            return Ok(Vec::new());
        }

        let opts = options(range, num_results);
        match self.client.search(query, &opts).await {
            Ok(results) => Ok(results),
            Err(e) => {
                debug!(query, error = %e, "Exa search failed");
                Ok(Vec::new())
            }
        }
    }

    /// Pages similar to a URL, optionally pinned to a window.
    pub async fn find_similar(
        &self,
        url: &str,
        range: &DateRange,
        num_results: u32,
    ) -> Result<Vec<ExaResult>> {
        require_url(url)?;
        if range.is_inverted() {
            return Ok(Vec::new());
        }

        let opts = options(range, num_results);
        match self.client.find_similar(url, &opts).await {
            Ok(results) => Ok(results),
            Err(e) => {
                debug!(url, error = %e, "Exa find_similar failed");
                Ok(Vec::new())
            }
        }
    }

    /// Search and attach page text in one call.
    pub async fn search_with_content(
        &self,
        query: &str,
        range: &DateRange,
        num_results: u32,
    ) -> Result<Vec<(ExaResult, Option<String>)>> {
        let results = self.search(query, range, num_results).await?;
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();
        let contents = match self.client.contents(&urls).await {
            Ok(c) => c,
            Err(e) => {
                debug!(query, error = %e, "Exa contents failed");
                Vec::new()
            }
        };

        Ok(results
            .into_iter()
            .map(|r| {
                let text = contents
                    .iter()
                    .find(|c| c.url == r.url)
                    .and_then(|c| c.text.clone());
                (r, text)
            })
            .collect())
    }
}

/// Exa is a query source: it searches by meaning, not by URL, so the
/// per-URL operations of the adapter contract are unsupported.
#[async_trait]
impl SourceAdapter for ExaAdapter {
    fn source(&self) -> ArchiveSource {
        ArchiveSource::ExaHistorical
    }
}

fn options(range: &DateRange, num_results: u32) -> SearchOptions {
    SearchOptions {
        start_published_date: range.start.clone(),
        end_published_date: range.end.clone(),
        num_results: Some(num_results),
        ..SearchOptions::default()
    }
}
