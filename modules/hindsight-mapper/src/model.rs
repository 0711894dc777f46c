use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use hindsight_common::{host_of, normalize_domain, DateRange};
use serde::{Deserialize, Serialize};

/// A URL found during domain mapping. Every discovery shares this header;
/// what else a source knows lives in its `details` extension. Identity is
/// the URL alone — two discoveries of the same URL are the same URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    pub domain: String,
    /// Discovery source name (`wayback`, `crt.sh`, `google`, …).
    pub source: String,
    pub discovered_at: DateTime<Utc>,
    pub subdomain: Option<String>,
    pub path: Option<String>,
    #[serde(default)]
    pub details: SourceDetails,
}

/// Per-source-category extension of a discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDetails {
    #[default]
    None,
    Archive {
        /// 14-digit capture timestamp.
        timestamp: Option<String>,
        status_code: Option<u16>,
        mime_type: Option<String>,
        content_length: Option<u64>,
        digest: Option<String>,
        /// Link to view the archived version.
        archive_url: Option<String>,
        /// CommonCrawl WARC location.
        warc_file: Option<String>,
        /// Memento archive name.
        archive_name: Option<String>,
    },
    Sitemap {
        priority: Option<f64>,
        lastmod: Option<String>,
        changefreq: Option<String>,
    },
    Backlink {
        trust_flow: Option<u32>,
        citation_flow: Option<u32>,
        ref_domains: Option<u32>,
    },
    Search {
        title: Option<String>,
        description: Option<String>,
    },
    Liveness {
        current_exists: Option<bool>,
        current_status: Option<u16>,
    },
}

impl DiscoveredUrl {
    pub fn new(url: impl Into<String>, domain: impl Into<String>, source: &str) -> Self {
        let url = url.into();
        let domain = domain.into();
        let (subdomain, path) = split_url(&url, &domain);
        Self {
            url,
            domain,
            source: source.to_string(),
            discovered_at: Utc::now(),
            subdomain,
            path,
            details: SourceDetails::None,
        }
    }

    pub fn with_details(mut self, details: SourceDetails) -> Self {
        self.details = details;
        self
    }

    /// Capture timestamp, when this discovery came from an archive.
    pub fn timestamp(&self) -> Option<&str> {
        match &self.details {
            SourceDetails::Archive { timestamp, .. } => timestamp.as_deref(),
            _ => None,
        }
    }
}

impl PartialEq for DiscoveredUrl {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for DiscoveredUrl {}

impl Hash for DiscoveredUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

fn split_url(url: &str, domain: &str) -> (Option<String>, Option<String>) {
    let host = host_of(url);
    let subdomain = host.as_deref().and_then(|h| {
        let h = h.strip_prefix("www.").unwrap_or(h);
        h.strip_suffix(domain)
            .map(|prefix| prefix.trim_end_matches('.').to_string())
            .filter(|p| !p.is_empty())
    });
    let path = url::Url::parse(url)
        .ok()
        .map(|u| u.path().to_string())
        .filter(|p| !p.is_empty() && p != "/");
    (subdomain, path)
}

/// Caller-tunable discovery filters, pushed down to sources that support
/// them and applied client-side elsewhere.
#[derive(Debug, Clone)]
pub struct MapFilters {
    pub range: DateRange,
    pub mime: Option<String>,
    pub status: Option<u16>,
    pub limit_per_source: usize,
    pub dedupe: bool,
}

impl Default for MapFilters {
    fn default() -> Self {
        Self {
            range: DateRange::default(),
            mime: Some("text/html".to_string()),
            status: Some(200),
            limit_per_source: 10_000,
            dedupe: true,
        }
    }
}

/// Accumulated result of a full domain mapping run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainMap {
    pub domain: String,
    pub urls: Vec<DiscoveredUrl>,
    pub total_urls: usize,
    pub unique_urls: usize,
    pub by_source: BTreeMap<String, usize>,
    /// Capture counts per year, for archive-backed discoveries.
    pub by_year: BTreeMap<String, usize>,
    pub earliest: Option<String>,
    pub latest: Option<String>,
    pub sources_completed: BTreeMap<String, usize>,
    pub sources_failed: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub deduplicated: bool,
}

impl DomainMap {
    pub(crate) fn new(domain: &str) -> Self {
        let now = Utc::now();
        Self {
            domain: normalize_domain(domain),
            urls: Vec::new(),
            total_urls: 0,
            unique_urls: 0,
            by_source: BTreeMap::new(),
            by_year: BTreeMap::new(),
            earliest: None,
            latest: None,
            sources_completed: BTreeMap::new(),
            sources_failed: BTreeMap::new(),
            started_at: now,
            completed_at: now,
            duration_ms: 0,
            deduplicated: true,
        }
    }

    pub(crate) fn record(&mut self, url: &DiscoveredUrl) {
        *self.by_source.entry(url.source.clone()).or_insert(0) += 1;
        if let Some(ts) = url.timestamp() {
            if let Some(year) = hindsight_common::types::ts_year(ts) {
                *self.by_year.entry(year.to_string()).or_insert(0) += 1;
            }
            let ts = ts.to_string();
            if self.earliest.as_deref().is_none_or(|e| ts.as_str() < e) {
                self.earliest = Some(ts.clone());
            }
            if self.latest.as_deref().is_none_or(|l| ts.as_str() > l) {
                self.latest = Some(ts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_url_alone() {
        let a = DiscoveredUrl::new("https://example.com/x", "example.com", "wayback");
        let b = DiscoveredUrl::new("https://example.com/x", "example.com", "crt.sh");
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn subdomain_and_path_are_derived() {
        let u = DiscoveredUrl::new("https://api.example.com/v1/users", "example.com", "crt.sh");
        assert_eq!(u.subdomain.as_deref(), Some("api"));
        assert_eq!(u.path.as_deref(), Some("/v1/users"));

        let root = DiscoveredUrl::new("https://example.com/", "example.com", "wayback");
        assert_eq!(root.subdomain, None);
        assert_eq!(root.path, None);

        let www = DiscoveredUrl::new("https://www.example.com/about", "example.com", "google");
        assert_eq!(www.subdomain, None);
        assert_eq!(www.path.as_deref(), Some("/about"));
    }

    #[test]
    fn wire_round_trip_preserves_identity_fields() {
        let u = DiscoveredUrl::new("https://example.com/report", "example.com", "wayback")
            .with_details(SourceDetails::Archive {
                timestamp: Some("20230115083000".to_string()),
                status_code: Some(200),
                mime_type: Some("text/html".to_string()),
                content_length: Some(1234),
                digest: Some("ABC".to_string()),
                archive_url: Some("https://web.archive.org/web/20230115083000/https://example.com/report".to_string()),
                warc_file: None,
                archive_name: None,
            });

        let json = serde_json::to_string(&u).unwrap();
        let back: DiscoveredUrl = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, u.url);
        assert_eq!(back.source, u.source);
        assert_eq!(back.discovered_at, u.discovered_at);
        assert_eq!(back.timestamp(), Some("20230115083000"));
        assert_eq!(back.details, u.details);
    }

    #[test]
    fn stats_track_year_and_bounds() {
        let mut map = DomainMap::new("Example.com");
        assert_eq!(map.domain, "example.com");

        for (ts, src) in [
            ("20200115000000", "wayback"),
            ("20220601000000", "wayback"),
            ("20220801000000", "commoncrawl"),
        ] {
            let u = DiscoveredUrl::new(format!("https://example.com/{ts}"), "example.com", src)
                .with_details(SourceDetails::Archive {
                    timestamp: Some(ts.to_string()),
                    status_code: None,
                    mime_type: None,
                    content_length: None,
                    digest: None,
                    archive_url: None,
                    warc_file: None,
                    archive_name: None,
                });
            map.record(&u);
        }

        assert_eq!(map.by_year.get("2020"), Some(&1));
        assert_eq!(map.by_year.get("2022"), Some(&2));
        assert_eq!(map.by_source.get("wayback"), Some(&2));
        assert_eq!(map.earliest.as_deref(), Some("20200115000000"));
        assert_eq!(map.latest.as_deref(), Some("20220801000000"));
    }
}
