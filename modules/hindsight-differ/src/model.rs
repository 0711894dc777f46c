use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ChangeKind;

/// One observed version of a page. Two versions are the same version when
/// URL and content hash agree, regardless of which archive served them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVersion {
    pub url: String,
    /// 14-digit `YYYYMMDDhhmmss`.
    pub timestamp: String,
    pub source: String,
    pub content_hash: Option<String>,
    pub title: Option<String>,
    pub content_length: Option<usize>,
    pub status_code: Option<u16>,
    pub archive_url: Option<String>,
}

impl PartialEq for PageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.content_hash == other.content_hash
    }
}

/// A pairwise comparison of two versions of the same URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageChange {
    pub url: String,
    pub change_type: ChangeKind,
    pub from_timestamp: String,
    pub to_timestamp: String,
    pub from_hash: Option<String>,
    pub to_hash: Option<String>,
    /// Diff ratio in [0, 1].
    pub similarity: f64,
    pub added_lines: usize,
    pub removed_lines: usize,
}

/// A domain-level change event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainChange {
    pub change_type: String,
    pub url: String,
    pub timestamp: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub year: String,
    pub url_count: usize,
    /// Sample of the period's URLs, capped.
    pub urls: Vec<String>,
}

/// Evolution of a domain across years: what appeared, what vanished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvolution {
    pub domain: String,
    pub periods: Vec<PeriodSummary>,
    pub pages_added: Vec<DomainChange>,
    pub pages_removed: Vec<DomainChange>,
    pub total_unique_urls: usize,
    pub earliest_snapshot: Option<String>,
    pub latest_snapshot: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Set comparison between two time periods of one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub domain: String,
    pub period1: String,
    pub period2: String,
    pub urls_period1: BTreeSet<String>,
    pub urls_period2: BTreeSet<String>,
    /// In period 2 but not period 1.
    pub urls_added: BTreeSet<String>,
    /// In period 1 but not period 2.
    pub urls_removed: BTreeSet<String>,
    pub urls_common: BTreeSet<String>,
    /// Content deltas of sampled common URLs.
    pub content_changed: Vec<PageChange>,
}

/// Complete version history of one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageHistory {
    pub url: String,
    pub versions: Vec<PageVersion>,
    pub changes: Vec<PageChange>,
    pub total_versions: usize,
    /// Distinct content hashes.
    pub unique_versions: usize,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

/// When a piece of content first appeared on (or vanished from) a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAppearance {
    pub search_text: String,
    pub domain: String,
    pub change_type: String,
    pub url: Option<String>,
    pub timestamp: Option<String>,
    pub surrounding_text: Option<String>,
    pub found: bool,
}

/// What a domain looked like around one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSnapshotAt {
    pub domain: String,
    pub target_date: String,
    pub urls_found: usize,
    pub urls: Vec<String>,
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_equality_is_url_plus_hash() {
        let a = PageVersion {
            url: "https://example.com/about".into(),
            timestamp: "20200101000000".into(),
            source: "wayback".into(),
            content_hash: Some("aaaa".into()),
            title: None,
            content_length: None,
            status_code: None,
            archive_url: None,
        };
        let mut b = a.clone();
        b.timestamp = "20240101000000".into();
        b.source = "commoncrawl".into();
        assert_eq!(a, b); // same content at a different time is the same version

        b.content_hash = Some("bbbb".into());
        assert_ne!(a, b);
    }
}
