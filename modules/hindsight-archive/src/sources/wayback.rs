//! Wayback Machine adapter: CDX queries, content fetching via the `id_`
//! modifier, and Save Page Now submission.

use std::time::Duration;

use async_trait::async_trait;
use hindsight_common::{ArchiveSource, DateRange, FetchResult, Result, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::{require_url, SourceAdapter};

const CDX_API: &str = "https://web.archive.org/cdx/search/cdx";
const WAYBACK_URL: &str = "https://web.archive.org/web";
const SAVE_API: &str = "https://web.archive.org/save";

const LIST_TIMEOUT: Duration = Duration::from_secs(20);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const RAW_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Wayback {
    client: reqwest::Client,
}

/// Acknowledgement from Save Page Now. Submission only — the capture
/// completes asynchronously on the archive side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub status: String,
    pub url: String,
    pub response: String,
}

/// One row of a raw CDX pattern query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdxRow {
    pub timestamp: String,
    pub original: String,
    pub status: Option<u16>,
    pub mime: Option<String>,
    pub length: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosestSnapshot {
    pub timestamp: String,
    pub url: String,
    pub status: Option<String>,
}

impl Wayback {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// List captures via the CDX API, newest first.
    ///
    /// `collapse` defaults to one capture per day (`timestamp:8`); 4xx/5xx
    /// captures are excluded unless `include_errors` is set.
    pub async fn list_snapshots_with(
        &self,
        url: &str,
        range: &DateRange,
        limit: usize,
        collapse: Option<&str>,
        include_errors: bool,
    ) -> Result<Vec<Snapshot>> {
        require_url(url)?;
        if range.is_inverted() {
            return Ok(Vec::new());
        }

        let mut params: Vec<(&str, String)> = vec![
            ("url", url.to_string()),
            ("output", "json".to_string()),
            ("fl", "timestamp,original,statuscode,mimetype,digest".to_string()),
            ("limit", limit.to_string()),
        ];
        if !include_errors {
            params.push(("filter", "!statuscode:[45]..".to_string()));
        }
        params.push((
            "collapse",
            collapse.unwrap_or("timestamp:8").to_string(),
        ));
        if let Some(from) = range.start_compact() {
            params.push(("from", from));
        }
        if let Some(to) = range.end_compact() {
            params.push(("to", to));
        }

        let rows = match self.cdx_rows(&params, LIST_TIMEOUT).await {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };

        let mut snapshots: Vec<Snapshot> = rows
            .iter()
            .filter(|row| row.len() >= 4)
            .map(|row| Snapshot {
                timestamp: row[0].clone(),
                url: row[1].clone(),
                source: ArchiveSource::WaybackCdx,
                status: row[2].parse().ok(),
                mime: Some(row[3].clone()).filter(|m| !m.is_empty() && m != "-"),
                digest: row.get(4).cloned().filter(|d| !d.is_empty()),
                view_url: Some(format!("{WAYBACK_URL}/{}/{}", row[0], row[1])),
            })
            .collect();

        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    /// Capture nearest to a target date (`YYYY-MM-DD` or `YYYYMMDDhhmmss`).
    pub async fn closest(&self, url: &str, target_date: &str) -> Result<Option<ClosestSnapshot>> {
        require_url(url)?;

        let ts: String = target_date
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();

        let resp = self
            .client
            .get(format!("{CDX_API}/closest"))
            .query(&[
                ("url", url),
                ("timestamp", ts.as_str()),
                ("output", "json"),
                ("limit", "1"),
            ])
            .timeout(LIST_TIMEOUT)
            .send()
            .await;

        let body: serde_json::Value = match resp {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(v) => v,
                Err(e) => {
                    debug!(url, error = %e, "Closest snapshot parse failed");
                    return Ok(None);
                }
            },
            Ok(r) => {
                debug!(url, status = r.status().as_u16(), "Closest snapshot query failed");
                return Ok(None);
            }
            Err(e) => {
                debug!(url, error = %e, "Closest snapshot query failed");
                return Ok(None);
            }
        };

        let closest = &body["archived_snapshots"]["closest"];
        if closest["available"].as_bool() != Some(true) {
            return Ok(None);
        }
        Ok(Some(ClosestSnapshot {
            timestamp: closest["timestamp"].as_str().unwrap_or_default().to_string(),
            url: closest["url"].as_str().unwrap_or_default().to_string(),
            status: closest["status"].as_str().map(str::to_string),
        }))
    }

    /// Fetch archived content. When no timestamp is given, uses the newest
    /// capture in range. The `id_` modifier returns the original bytes
    /// without the archive's replay chrome.
    pub async fn fetch_at(
        &self,
        url: &str,
        range: &DateRange,
        timestamp: Option<&str>,
    ) -> Result<FetchResult> {
        require_url(url)?;
        if range.is_inverted() {
            return Ok(FetchResult::empty(url));
        }

        let timestamp = match timestamp {
            Some(ts) => ts.to_string(),
            None => {
                let snapshots = self.list_snapshots_with(url, range, 1, None, false).await?;
                match snapshots.into_iter().next() {
                    Some(s) => s.timestamp,
                    None => return Ok(FetchResult::empty(url)),
                }
            }
        };

        let wb_url = format!("{WAYBACK_URL}/{timestamp}id_/{url}");
        let resp = match self.client.get(&wb_url).timeout(FETCH_TIMEOUT).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url, error = %e, "Wayback fetch failed");
                return Ok(FetchResult::empty(url));
            }
        };

        let status = resp.status().as_u16();
        if status != 200 {
            let mut result = FetchResult::empty(url);
            result.status_code = Some(status);
            return Ok(result);
        }

        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = resp.url().to_string();
        let html = match resp.text().await {
            Ok(t) => t,
            Err(e) => {
                debug!(url, error = %e, "Wayback body read failed");
                return Ok(FetchResult::empty(url));
            }
        };

        let mut result = FetchResult {
            url: url.to_string(),
            html: Some(html),
            content: None,
            timestamp: Some(timestamp),
            source: Some(ArchiveSource::WaybackData),
            status_code: Some(status),
            mime_type: mime,
            digest: None,
            metadata: Default::default(),
        };
        result
            .metadata
            .insert("wayback_url".into(), serde_json::Value::String(final_url));
        Ok(result)
    }

    /// Fetch raw bytes for a capture — for PDFs and other binary files.
    pub async fn fetch_raw(&self, url: &str, timestamp: &str) -> Option<Vec<u8>> {
        let wb_url = format!("{WAYBACK_URL}/{timestamp}id_/{url}");
        match self.client.get(&wb_url).timeout(RAW_TIMEOUT).send().await {
            Ok(r) if r.status().as_u16() == 200 => r.bytes().await.ok().map(|b| b.to_vec()),
            Ok(r) => {
                debug!(url, status = r.status().as_u16(), "Raw fetch failed");
                None
            }
            Err(e) => {
                debug!(url, error = %e, "Raw fetch failed");
                None
            }
        }
    }

    /// Submit a URL to Save Page Now. Does not wait for the capture.
    pub async fn save(
        &self,
        url: &str,
        capture_all: bool,
        capture_outlinks: bool,
    ) -> Result<Option<SaveReceipt>> {
        require_url(url)?;

        let mut form: Vec<(&str, String)> = vec![("url", url.to_string())];
        if capture_all {
            form.push(("capture_all", "1".to_string()));
        }
        if capture_outlinks {
            form.push(("capture_outlinks", "1".to_string()));
        }

        let resp = match self
            .client
            .post(SAVE_API)
            .form(&form)
            .timeout(RAW_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(url, error = %e, "Save Page Now failed");
                return Ok(None);
            }
        };

        let status = resp.status();
        if status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            Ok(Some(SaveReceipt {
                status: "submitted".into(),
                url: url.to_string(),
                response: text.chars().take(500).collect(),
            }))
        } else {
            Ok(Some(SaveReceipt {
                status: "failed".into(),
                url: url.to_string(),
                response: format!("HTTP {}", status.as_u16()),
            }))
        }
    }

    /// All unique URLs captured for a domain, via a wildcard CDX query
    /// collapsed on URL key.
    pub async fn domain_snapshots(&self, domain: &str, limit: usize) -> Result<Vec<Snapshot>> {
        require_url(domain)?;

        let params: Vec<(&str, String)> = vec![
            ("url", format!("*.{domain}/*")),
            ("matchType", "domain".to_string()),
            ("output", "json".to_string()),
            ("fl", "timestamp,original,statuscode".to_string()),
            ("collapse", "urlkey".to_string()),
            ("limit", limit.to_string()),
        ];

        let rows = match self.cdx_rows(&params, RAW_TIMEOUT).await {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };

        Ok(rows
            .iter()
            .filter(|row| row.len() >= 2)
            .map(|row| Snapshot {
                timestamp: row[0].clone(),
                url: row[1].clone(),
                source: ArchiveSource::WaybackCdx,
                status: row.get(2).and_then(|s| s.parse().ok()),
                mime: None,
                digest: None,
                view_url: Some(format!("{WAYBACK_URL}/{}/{}", row[0], row[1])),
            })
            .collect())
    }

    /// Raw CDX rows for an arbitrary URL pattern with server-side filter
    /// pushdown — the domain mapper's bulk query. Patterns may use CDX
    /// wildcards (`domain/*`).
    pub async fn cdx_search(
        &self,
        pattern: &str,
        range: &DateRange,
        mime: Option<&str>,
        status: Option<u16>,
        limit: usize,
        collapse: Option<&str>,
    ) -> Result<Vec<CdxRow>> {
        require_url(pattern)?;
        if range.is_inverted() {
            return Ok(Vec::new());
        }

        let mut params: Vec<(&str, String)> = vec![
            ("url", pattern.to_string()),
            ("output", "json".to_string()),
            (
                "fl",
                "timestamp,original,statuscode,mimetype,length,digest".to_string(),
            ),
            ("limit", limit.to_string()),
        ];
        if let Some(status) = status {
            params.push(("filter", format!("statuscode:{status}")));
        }
        if let Some(mime) = mime {
            params.push(("filter", format!("mimetype:{mime}")));
        }
        if let Some(collapse) = collapse {
            params.push(("collapse", collapse.to_string()));
        }
        if let Some(from) = range.start_compact() {
            params.push(("from", from));
        }
        if let Some(to) = range.end_compact() {
            params.push(("to", to));
        }

        let rows = match self.cdx_rows(&params, RAW_TIMEOUT).await {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };

        Ok(rows
            .iter()
            .filter(|row| row.len() >= 2)
            .map(|row| CdxRow {
                timestamp: row[0].clone(),
                original: row[1].clone(),
                status: row.get(2).and_then(|s| s.parse().ok()),
                mime: row.get(3).cloned().filter(|m| !m.is_empty() && m != "-"),
                length: row.get(4).and_then(|l| l.parse().ok()),
                digest: row.get(5).cloned().filter(|d| !d.is_empty()),
            })
            .collect())
    }

    /// CDX helper: GET, parse the row-array JSON, drop the header row.
    /// Any failure becomes an empty result.
    async fn cdx_rows(
        &self,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Option<Vec<Vec<String>>> {
        let resp = match self
            .client
            .get(CDX_API)
            .query(params)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "CDX query failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            debug!(status = resp.status().as_u16(), "CDX query failed");
            return None;
        }

        match resp.json::<Vec<Vec<String>>>().await {
            Ok(mut rows) => {
                if rows.is_empty() {
                    return None;
                }
                rows.remove(0); // header row
                Some(rows)
            }
            Err(e) => {
                debug!(error = %e, "CDX response parse failed");
                None
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for Wayback {
    fn source(&self) -> ArchiveSource {
        ArchiveSource::WaybackData
    }

    async fn fetch(&self, url: &str, range: &DateRange) -> Result<FetchResult> {
        self.fetch_at(url, range, None).await
    }

    async fn list_snapshots(
        &self,
        url: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<Snapshot>> {
        self.list_snapshots_with(url, range, limit, None, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_url_is_a_precondition_violation() {
        let wb = Wayback::new(reqwest::Client::new());
        let err = wb.fetch_at("", &DateRange::default(), None).await;
        assert!(err.is_err());
        let err = wb
            .list_snapshots_with("  ", &DateRange::default(), 10, None, false)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn inverted_range_makes_no_call() {
        let wb = Wayback::new(reqwest::Client::new());
        let range = DateRange::new(Some("2024-01-01"), Some("2020-01-01"));
        let snaps = wb
            .list_snapshots_with("https://example.com", &range, 10, None, false)
            .await
            .unwrap();
        assert!(snaps.is_empty());
        let result = wb.fetch_at("https://example.com", &range, None).await.unwrap();
        assert!(!result.success());
    }
}
