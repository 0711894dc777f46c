pub mod error;
pub mod types;

pub use error::{ExaError, Result};
pub use types::{ExaContent, ExaResult, SearchOptions};

use std::time::Duration;

use types::{ContentsRequest, FindSimilarRequest, ResultsEnvelope, SearchRequest};

const BASE_URL: &str = "https://api.exa.ai";

/// Exa semantic-search client. The published-date bounds make it usable as
/// a historical source: results can be pinned to a past window.
pub struct ExaClient {
    client: reqwest::Client,
    api_key: String,
}

impl ExaClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    pub fn with_client(api_key: String, client: reqwest::Client) -> Self {
        Self { client, api_key }
    }

    /// Search with optional publication-date filtering.
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<ExaResult>> {
        let body = SearchRequest {
            query: query.to_string(),
            num_results: opts.num_results.unwrap_or(10),
            use_autoprompt: true,
            start_published_date: opts.start_published_date.as_deref().map(to_iso),
            end_published_date: opts.end_published_date.as_deref().map(to_iso),
            include_domains: opts.include_domains.clone(),
            exclude_domains: opts.exclude_domains.clone(),
        };

        let envelope: ResultsEnvelope<ExaResult> = self.post("/search", &body).await?;
        tracing::debug!(query, count = envelope.results.len(), "Exa search complete");
        Ok(envelope.results)
    }

    /// Find pages similar to a URL, optionally pinned to a date window.
    pub async fn find_similar(&self, url: &str, opts: &SearchOptions) -> Result<Vec<ExaResult>> {
        let body = FindSimilarRequest {
            url: url.to_string(),
            num_results: opts.num_results.unwrap_or(10),
            exclude_source_domain: true,
            start_published_date: opts.start_published_date.as_deref().map(to_iso),
            end_published_date: opts.end_published_date.as_deref().map(to_iso),
        };

        let envelope: ResultsEnvelope<ExaResult> = self.post("/findSimilar", &body).await?;
        Ok(envelope.results)
    }

    /// Fetch page text for a list of URLs.
    pub async fn contents(&self, urls: &[String]) -> Result<Vec<ExaContent>> {
        let body = ContentsRequest {
            ids: urls.to_vec(),
            text: true,
        };

        let envelope: ResultsEnvelope<ExaContent> = self.post("/contents", &body).await?;
        Ok(envelope.results)
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .client
            .post(format!("{BASE_URL}{path}"))
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ExaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}

/// Exa wants full ISO 8601; callers pass `YYYY-MM-DD`.
fn to_iso(date: &str) -> String {
    if date.contains('T') {
        date.to_string()
    } else {
        format!("{date}T00:00:00.000Z")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_gets_time_component() {
        assert_eq!(to_iso("2020-01-01"), "2020-01-01T00:00:00.000Z");
    }

    #[test]
    fn iso_date_passes_through() {
        assert_eq!(to_iso("2020-01-01T12:30:00Z"), "2020-01-01T12:30:00Z");
    }

    #[test]
    fn search_request_serializes_camel_case() {
        let body = SearchRequest {
            query: "acquisition".into(),
            num_results: 10,
            use_autoprompt: true,
            start_published_date: Some(to_iso("2020-01-01")),
            end_published_date: None,
            include_domains: vec![],
            exclude_domains: vec![],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["startPublishedDate"], "2020-01-01T00:00:00.000Z");
        assert!(json.get("endPublishedDate").is_none());
        assert!(json.get("includeDomains").is_none());
    }
}
