use serde::{Deserialize, Serialize};

/// Options shared by `/search` and `/findSimilar`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Filter content published on/after this date (`YYYY-MM-DD`).
    pub start_published_date: Option<String>,
    /// Filter content published on/before this date (`YYYY-MM-DD`).
    pub end_published_date: Option<String>,
    pub num_results: Option<u32>,
    pub include_domains: Vec<String>,
    pub exclude_domains: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchRequest {
    pub query: String,
    pub num_results: u32,
    pub use_autoprompt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_published_date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FindSimilarRequest {
    pub url: String,
    pub num_results: u32,
    pub exclude_source_domain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_published_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ContentsRequest {
    /// Exa calls these `ids` but accepts plain URLs.
    pub ids: Vec<String>,
    pub text: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultsEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaResult {
    #[serde(default)]
    pub url: String,
    pub title: Option<String>,
    pub published_date: Option<String>,
    pub score: Option<f64>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExaContent {
    #[serde(default)]
    pub url: String,
    pub title: Option<String>,
    pub text: Option<String>,
}
