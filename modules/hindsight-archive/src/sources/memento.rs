//! Memento TimeMap adapter: one aggregator endpoint federating ~40 web
//! archives. Snapshots are attributed to their home archive by matching
//! the memento URL's host against a table of known hosts.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use hindsight_common::{ArchiveSource, DateRange, FetchResult, Result, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::{require_url, SourceAdapter};

const MEMENTO_AGGREGATOR: &str = "http://timetravel.mementoweb.org/timemap/json";

const TIMEMAP_TIMEOUT: Duration = Duration::from_secs(60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// How many ranked candidates a fetch will try before giving up.
const FETCH_CANDIDATES: usize = 5;

/// Known archive hosts for source identification.
const ARCHIVE_PATTERNS: &[(&str, &str)] = &[
    ("web.archive.org", "Internet Archive"),
    ("archive.org", "Internet Archive"),
    ("archive.today", "Archive.today"),
    ("archive.is", "Archive.today"),
    ("archive.ph", "Archive.today"),
    ("archive.md", "Archive.today"),
    ("perma.cc", "Perma.cc"),
    ("webarchive.org.uk", "UK Web Archive"),
    ("arquivo.pt", "Portuguese Web Archive"),
    ("haw.nsk.hr", "Croatian Web Archive"),
    ("webarchive.nla.gov.au", "Australian Web Archive"),
    ("webarchive.loc.gov", "Library of Congress"),
    ("swap.stanford.edu", "Stanford Web Archive"),
    ("vefsafn.is", "Icelandic Web Archive"),
    ("webarchive.proni.gov.uk", "Northern Ireland Web Archive"),
    ("webarchive.nationalarchives.gov.uk", "UK National Archives"),
    ("web.archive.org.au", "Pandora (Australia)"),
    ("webarchive.bnf.fr", "French Web Archive (BnF)"),
    ("nukrobi2.nuk.uni-lj.si", "Slovenian Web Archive"),
    ("wayback.archive-it.org", "Archive-It"),
];

/// One memento from the TimeMap, with its attributed archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MementoSnapshot {
    pub original_url: String,
    pub memento_url: String,
    pub archive: String,
    pub timestamp_raw: Option<String>,
    pub datetime: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub count: usize,
    pub oldest: Option<NaiveDateTime>,
    pub newest: Option<NaiveDateTime>,
}

/// Per-archive availability roll-up for one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveComparison {
    pub url: String,
    pub total_snapshots: usize,
    pub archives: BTreeMap<String, ArchiveSummary>,
}

pub struct Memento {
    client: reqwest::Client,
    /// Archive names in fetch-preference order; anything unlisted ranks last.
    preference: Vec<String>,
}

impl Memento {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            preference: vec!["Internet Archive".to_string(), "Archive.today".to_string()],
        }
    }

    pub fn with_preference(mut self, preference: Vec<String>) -> Self {
        self.preference = preference;
        self
    }

    /// All mementos known to the aggregator, newest first, date-filtered
    /// client-side (the aggregator has no range parameters).
    pub async fn timemap(&self, url: &str, range: &DateRange) -> Result<Vec<MementoSnapshot>> {
        require_url(url)?;
        if range.is_inverted() {
            return Ok(Vec::new());
        }

        let encoded = urlencoded(url);
        let timemap_url = format!("{MEMENTO_AGGREGATOR}/{encoded}");

        let resp = match self
            .client
            .get(&timemap_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(TIMEMAP_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(url, error = %e, "TimeMap request failed");
                return Ok(Vec::new());
            }
        };
        if !resp.status().is_success() {
            debug!(url, status = resp.status().as_u16(), "TimeMap request failed");
            return Ok(Vec::new());
        }

        let body: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                debug!(url, error = %e, "TimeMap parse failed");
                return Ok(Vec::new());
            }
        };

        let mut snapshots = parse_timemap(url, &body);

        // Client-side date filter against the parsed capture time.
        if !range.is_unbounded() {
            snapshots.retain(|s| match &s.datetime {
                Some(dt) => range.contains_ts(&dt.format("%Y%m%d%H%M%S").to_string()),
                None => false,
            });
        }

        snapshots.sort_by(|a, b| b.datetime.cmp(&a.datetime));
        Ok(snapshots)
    }

    /// Archive names that hold at least one capture of this URL.
    pub async fn archives_for(&self, url: &str) -> Result<Vec<String>> {
        let snapshots = self.timemap(url, &DateRange::default()).await?;
        let mut names: Vec<String> = snapshots.into_iter().map(|s| s.archive).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Fetch content from the best available archive: candidates ranked by
    /// the preference list then recency, trying the top few sequentially
    /// until one answers with a 2xx.
    pub async fn fetch_preferred(
        &self,
        url: &str,
        range: &DateRange,
        prefer_archive: Option<&str>,
    ) -> Result<FetchResult> {
        let mut snapshots = self.timemap(url, range).await?;
        if snapshots.is_empty() {
            return Ok(FetchResult::empty(url));
        }

        snapshots.sort_by(|a, b| {
            self.rank(&a.archive, prefer_archive)
                .cmp(&self.rank(&b.archive, prefer_archive))
                .then(b.datetime.cmp(&a.datetime))
        });

        for snap in snapshots.iter().take(FETCH_CANDIDATES) {
            let resp = match self
                .client
                .get(&snap.memento_url)
                .timeout(FETCH_TIMEOUT)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(archive = %snap.archive, error = %e, "memento fetch failed");
                    continue;
                }
            };
            if !resp.status().is_success() {
                debug!(
                    archive = %snap.archive,
                    status = resp.status().as_u16(),
                    "memento fetch failed"
                );
                continue;
            }

            let status = resp.status().as_u16();
            let mime = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let Ok(html) = resp.text().await else {
                continue;
            };

            let mut result = FetchResult {
                url: url.to_string(),
                html: Some(html),
                content: None,
                timestamp: snap
                    .datetime
                    .map(|dt| dt.format("%Y%m%d%H%M%S").to_string()),
                source: Some(ArchiveSource::Memento),
                status_code: Some(status),
                mime_type: mime,
                digest: None,
                metadata: Default::default(),
            };
            result.metadata.insert(
                "archive".into(),
                serde_json::Value::String(snap.archive.clone()),
            );
            result.metadata.insert(
                "memento_url".into(),
                serde_json::Value::String(snap.memento_url.clone()),
            );
            return Ok(result);
        }

        Ok(FetchResult::empty(url))
    }

    /// Fetch the newest capture from one named archive.
    pub async fn fetch_from_archive(&self, url: &str, archive_name: &str) -> Result<FetchResult> {
        self.fetch_preferred(url, &DateRange::default(), Some(archive_name))
            .await
    }

    /// Group captures by archive and summarize each archive's coverage.
    pub async fn compare_archives(&self, url: &str) -> Result<ArchiveComparison> {
        let snapshots = self.timemap(url, &DateRange::default()).await?;

        let mut archives: BTreeMap<String, ArchiveSummary> = BTreeMap::new();
        for snap in &snapshots {
            let entry = archives.entry(snap.archive.clone()).or_insert(ArchiveSummary {
                count: 0,
                oldest: None,
                newest: None,
            });
            entry.count += 1;
            if let Some(dt) = snap.datetime {
                entry.oldest = Some(entry.oldest.map_or(dt, |o| o.min(dt)));
                entry.newest = Some(entry.newest.map_or(dt, |n| n.max(dt)));
            }
        }

        Ok(ArchiveComparison {
            url: url.to_string(),
            total_snapshots: snapshots.len(),
            archives,
        })
    }

    fn rank(&self, archive: &str, prefer: Option<&str>) -> usize {
        if let Some(p) = prefer {
            if archive.to_lowercase().contains(&p.to_lowercase()) {
                return 0;
            }
        }
        self.preference
            .iter()
            .position(|p| archive.contains(p.as_str()))
            .map(|i| i + 1)
            .unwrap_or(self.preference.len() + 1)
    }
}

fn identify_archive(memento_url: &str) -> String {
    for (pattern, name) in ARCHIVE_PATTERNS {
        if memento_url.contains(pattern) {
            return (*name).to_string();
        }
    }
    "Unknown Archive".to_string()
}

/// The aggregator answers either `mementos.list` or first/last links.
fn parse_timemap(original_url: &str, body: &serde_json::Value) -> Vec<MementoSnapshot> {
    let mementos = &body["mementos"];
    let mut entries: Vec<&serde_json::Value> = match mementos["list"].as_array() {
        Some(list) if !list.is_empty() => list.iter().collect(),
        _ => {
            let mut fallback = Vec::new();
            if mementos["first"].is_object() {
                fallback.push(&mementos["first"]);
            }
            if mementos["last"].is_object() {
                fallback.push(&mementos["last"]);
            }
            fallback
        }
    };
    entries.retain(|m| m["uri"].as_str().is_some());

    entries
        .into_iter()
        .map(|m| {
            let uri = m["uri"].as_str().unwrap_or_default().to_string();
            let ts = m["datetime"].as_str().map(str::to_string);
            MementoSnapshot {
                original_url: original_url.to_string(),
                archive: identify_archive(&uri),
                memento_url: uri,
                datetime: ts.as_deref().and_then(parse_timestamp),
                timestamp_raw: ts,
            }
        })
        .collect()
}

/// Archives report capture times in several formats.
fn parse_timestamp(ts: &str) -> Option<NaiveDateTime> {
    for fmt in ["%Y%m%d%H%M%S", "%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(ts, fmt) {
            return Some(dt);
        }
    }
    chrono::DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.naive_utc())
}

fn urlencoded(url: &str) -> String {
    url.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for Memento {
    fn source(&self) -> ArchiveSource {
        ArchiveSource::Memento
    }

    async fn fetch(&self, url: &str, range: &DateRange) -> Result<FetchResult> {
        self.fetch_preferred(url, range, None).await
    }

    async fn list_snapshots(
        &self,
        url: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<Snapshot>> {
        let mementos = self.timemap(url, range).await?;
        Ok(mementos
            .into_iter()
            .take(limit)
            .map(|m| Snapshot {
                url: m.original_url,
                timestamp: m
                    .datetime
                    .map(|dt| dt.format("%Y%m%d%H%M%S").to_string())
                    .unwrap_or_default(),
                source: ArchiveSource::Memento,
                status: None,
                mime: None,
                digest: None,
                view_url: Some(m.memento_url),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_identification() {
        assert_eq!(
            identify_archive("https://web.archive.org/web/2024/https://x.com"),
            "Internet Archive"
        );
        assert_eq!(identify_archive("https://archive.ph/abc12"), "Archive.today");
        assert_eq!(identify_archive("https://arquivo.pt/wayback/2020/x"), "Portuguese Web Archive");
        assert_eq!(identify_archive("https://mystery.example/x"), "Unknown Archive");
    }

    #[test]
    fn timestamp_formats() {
        assert!(parse_timestamp("20240115120000").is_some());
        assert!(parse_timestamp("2024-01-15T12:00:00Z").is_some());
        assert!(parse_timestamp("2024-01-15 12:00:00").is_some());
        assert!(parse_timestamp("Mon, 15 Jan 2024 12:00:00 +0000").is_some());
        assert!(parse_timestamp("garbage").is_none());
    }

    #[test]
    fn timemap_list_parsing() {
        let body = serde_json::json!({
            "mementos": {
                "list": [
                    {"uri": "https://web.archive.org/web/20240101000000/https://x.com/", "datetime": "20240101000000"},
                    {"uri": "https://archive.ph/abc", "datetime": "2023-06-01T00:00:00Z"},
                    {"datetime": "20220101000000"}
                ]
            }
        });
        let snaps = parse_timemap("https://x.com/", &body);
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].archive, "Internet Archive");
        assert_eq!(snaps[1].archive, "Archive.today");
    }

    #[test]
    fn timemap_first_last_fallback() {
        let body = serde_json::json!({
            "mementos": {
                "first": {"uri": "https://web.archive.org/web/2001/x", "datetime": "20010101000000"},
                "last": {"uri": "https://web.archive.org/web/2024/x", "datetime": "20240101000000"}
            }
        });
        let snaps = parse_timemap("https://x.com/", &body);
        assert_eq!(snaps.len(), 2);
    }

    #[test]
    fn preference_ranking() {
        let m = Memento::new(reqwest::Client::new());
        assert!(m.rank("Internet Archive", None) < m.rank("Archive.today", None));
        assert!(m.rank("Archive.today", None) < m.rank("Perma.cc", None));
        // An explicit preference outranks the default list.
        assert_eq!(m.rank("Perma.cc", Some("perma")), 0);
    }

    #[test]
    fn url_encoding_is_aggressive() {
        assert_eq!(
            urlencoded("https://x.com/a b"),
            "https%3A%2F%2Fx.com%2Fa%20b"
        );
    }
}
