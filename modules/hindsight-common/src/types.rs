use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Archive data sources in priority order. The tag travels with every
/// result for provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveSource {
    CcIndex,
    CcData,
    CcWat,
    WaybackCdx,
    WaybackData,
    Memento,
    EsWdcOrgs,
    EsWdcPersons,
    EsWebGraph,
    EsDomains,
    EsCcPdfs,
    FirecrawlCache,
    ExaHistorical,
}

impl ArchiveSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CcIndex => "cc_index",
            Self::CcData => "cc_data",
            Self::CcWat => "cc_wat",
            Self::WaybackCdx => "wb_cdx",
            Self::WaybackData => "wb_data",
            Self::Memento => "memento",
            Self::EsWdcOrgs => "es_wdc_orgs",
            Self::EsWdcPersons => "es_wdc_persons",
            Self::EsWebGraph => "es_webgraph",
            Self::EsDomains => "es_domains",
            Self::EsCcPdfs => "es_cc_pdfs",
            Self::FirecrawlCache => "firecrawl",
            Self::ExaHistorical => "exa",
        }
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of retrieving an archived URL from one source.
///
/// `success()` is derived, never stored: a result succeeded iff at least
/// one of `html` / `content` is non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    /// Extracted or markdown text, when the source provides it.
    pub content: Option<String>,
    /// Raw HTML bytes decoded to a string.
    pub html: Option<String>,
    /// 14-digit archive timestamp (`YYYYMMDDhhmmss`), when known.
    pub timestamp: Option<String>,
    pub source: Option<ArchiveSource>,
    pub status_code: Option<u16>,
    pub mime_type: Option<String>,
    pub digest: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FetchResult {
    /// An empty result for a URL no source could serve.
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
            || self.html.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Whichever body is present, preferring raw HTML.
    pub fn body(&self) -> Option<&str> {
        self.html
            .as_deref()
            .filter(|h| !h.is_empty())
            .or_else(|| self.content.as_deref().filter(|c| !c.is_empty()))
    }
}

/// A single observation of a URL at one time by one archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    /// 14-digit `YYYYMMDDhhmmss`.
    pub timestamp: String,
    pub source: ArchiveSource,
    pub status: Option<u16>,
    pub mime: Option<String>,
    pub digest: Option<String>,
    /// Link to view this capture in the source archive.
    pub view_url: Option<String>,
}

impl Snapshot {
    /// Cross-source equivalence key: digest when present, otherwise
    /// (url, day-truncated timestamp).
    pub fn dedup_key(&self) -> String {
        match self.digest.as_deref().filter(|d| !d.is_empty()) {
            Some(d) => d.to_string(),
            None => {
                let day = self.timestamp.get(..8).unwrap_or(&self.timestamp);
                format!("{}@{}", self.url, day)
            }
        }
    }
}

/// Caller-supplied date filter, both bounds inclusive, `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn new(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// True when start > end. Such a range matches nothing and adapters
    /// return empty without making any external call.
    pub fn is_inverted(&self) -> bool {
        match (self.start_compact(), self.end_compact()) {
            (Some(s), Some(e)) => s > e,
            _ => false,
        }
    }

    /// Start bound as `YYYYMMDD`, the native form of the CDX APIs.
    pub fn start_compact(&self) -> Option<String> {
        self.start.as_deref().map(compact_date)
    }

    /// End bound as `YYYYMMDD`.
    pub fn end_compact(&self) -> Option<String> {
        self.end.as_deref().map(compact_date)
    }

    /// Client-side filter for a 14-digit timestamp. Bounds compare on the
    /// day prefix so `2020-01-01` includes all captures on that day.
    pub fn contains_ts(&self, ts: &str) -> bool {
        let day = ts.get(..8).unwrap_or(ts);
        if let Some(s) = self.start_compact() {
            if day < s.as_str() {
                return false;
            }
        }
        if let Some(e) = self.end_compact() {
            if day > e.as_str() {
                return false;
            }
        }
        true
    }
}

fn compact_date(date: &str) -> String {
    date.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// First four digits of a 14-digit timestamp, when present.
pub fn ts_year(ts: &str) -> Option<&str> {
    let y = ts.get(..4)?;
    y.bytes().all(|b| b.is_ascii_digit()).then_some(y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_nonempty_body() {
        let mut r = FetchResult::empty("https://example.com");
        assert!(!r.success());
        r.html = Some(String::new());
        assert!(!r.success());
        r.html = Some("<html></html>".into());
        assert!(r.success());
    }

    #[test]
    fn content_alone_is_success() {
        let mut r = FetchResult::empty("https://example.com");
        r.content = Some("extracted text".into());
        assert!(r.success());
        assert_eq!(r.body(), Some("extracted text"));
    }

    #[test]
    fn snapshot_dedup_prefers_digest() {
        let snap = Snapshot {
            url: "https://example.com/".into(),
            timestamp: "20240115120000".into(),
            source: ArchiveSource::WaybackCdx,
            status: Some(200),
            mime: None,
            digest: Some("ABCDEF".into()),
            view_url: None,
        };
        assert_eq!(snap.dedup_key(), "ABCDEF");
    }

    #[test]
    fn snapshot_dedup_falls_back_to_url_day() {
        let snap = Snapshot {
            url: "https://example.com/".into(),
            timestamp: "20240115120000".into(),
            source: ArchiveSource::CcIndex,
            status: None,
            mime: None,
            digest: None,
            view_url: None,
        };
        assert_eq!(snap.dedup_key(), "https://example.com/@20240115");
    }

    #[test]
    fn date_range_compact_and_contains() {
        let range = DateRange::new(Some("2020-01-01"), Some("2023-12-31"));
        assert_eq!(range.start_compact().as_deref(), Some("20200101"));
        assert_eq!(range.end_compact().as_deref(), Some("20231231"));
        assert!(range.contains_ts("20200101000000"));
        assert!(range.contains_ts("20231231235959"));
        assert!(!range.contains_ts("20191231235959"));
        assert!(!range.contains_ts("20240101000000"));
    }

    #[test]
    fn inverted_range_detected() {
        let range = DateRange::new(Some("2023-01-01"), Some("2020-01-01"));
        assert!(range.is_inverted());
        assert!(!DateRange::default().is_inverted());
    }

    #[test]
    fn source_wire_names_round_trip() {
        let json = serde_json::to_string(&ArchiveSource::WaybackData).unwrap();
        assert_eq!(json, "\"wayback_data\"");
        let back: ArchiveSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ArchiveSource::WaybackData);
    }

    #[test]
    fn year_extraction() {
        assert_eq!(ts_year("20240115120000"), Some("2024"));
        assert_eq!(ts_year("bad"), None);
        assert_eq!(ts_year(""), None);
    }
}
