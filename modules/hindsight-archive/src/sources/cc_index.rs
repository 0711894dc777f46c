//! CommonCrawl Index reader.
//!
//! Two modes:
//! 1. CDX Server API — simple per-URL lookups against the hosted index.
//! 2. cluster.idx binary search — the fast path for domain-wide
//!    enumeration: bisect the sparse top-level index for the domain's SURT
//!    prefix, then range-fetch and gunzip only the blocks that can contain
//!    it. The cluster index is a few MB per archive and amortizes across
//!    every domain query in that archive; each block is tens of KB of gzip.

use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use hindsight_common::{surt, ArchiveSource, DateRange, FetchResult, Result, Snapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tracing::{debug, info, warn};

use crate::adapter::{require_url, SourceAdapter};

const CC_DATA_URL: &str = "https://data.commoncrawl.org";
const CC_INDEX_URL: &str = "https://index.commoncrawl.org";

const CDX_TIMEOUT: Duration = Duration::from_secs(30);
const INDEX_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const COLLINFO_TTL: Duration = Duration::from_secs(3600);

/// WARC paths that index crawler noise rather than page captures.
const NOISE_WARC_PATHS: &[&str] = &["robotstxt/", "crawldiagnostics/"];

#[derive(Debug, Clone)]
pub struct CcIndexConfig {
    /// Archive collection id, e.g. `CC-MAIN-2024-51`.
    pub archive: String,
    /// Where the downloaded cluster index is cached. Safe to delete.
    pub data_dir: PathBuf,
    /// Upper bound on index blocks scanned per domain. Large domains may
    /// span more; the scan logs when it truncates.
    pub max_blocks: usize,
    /// Concurrent shard range-fetches.
    pub block_concurrency: usize,
}

impl Default for CcIndexConfig {
    fn default() -> Self {
        Self {
            archive: "CC-MAIN-2024-51".to_string(),
            data_dir: std::env::temp_dir().join("hindsight"),
            max_blocks: 20,
            block_concurrency: 8,
        }
    }
}

/// One CC index record with its WARC location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub url: String,
    pub timestamp: String,
    pub status: Option<String>,
    pub mime: Option<String>,
    pub digest: Option<String>,
    pub warc_filename: Option<String>,
    pub warc_offset: Option<u64>,
    pub warc_length: Option<u64>,
}

/// One entry of `cluster.idx`: the first SURT key of a gzip-compressed
/// NDJSON range inside a shard file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBlock {
    pub key: String,
    pub shard: String,
    pub offset: u64,
    pub length: u64,
}

pub(crate) struct ClusterIndex {
    blocks: Vec<IndexBlock>,
    /// Parallel array of keys for bisection.
    keys: Vec<String>,
}

pub struct CcIndex {
    client: reqwest::Client,
    config: CcIndexConfig,
    cluster: OnceCell<ClusterIndex>,
    collections: Mutex<Option<(Instant, Vec<String>)>>,
}

impl CcIndex {
    pub fn new(client: reqwest::Client, config: CcIndexConfig) -> Self {
        Self {
            client,
            config,
            cluster: OnceCell::new(),
            collections: Mutex::new(None),
        }
    }

    pub fn archive(&self) -> &str {
        &self.config.archive
    }

    // ------------------------------------------------------------------
    // CDX Server API
    // ------------------------------------------------------------------

    /// Query the hosted CDX server for one URL.
    pub async fn lookup_url(&self, url: &str, limit: usize) -> Result<Vec<IndexRecord>> {
        require_url(url)?;

        let api_url = format!("{CC_INDEX_URL}/{}-index", self.config.archive);
        let limit_s = limit.to_string();
        let resp = match self
            .client
            .get(&api_url)
            .query(&[("url", url), ("output", "json"), ("limit", limit_s.as_str())])
            .timeout(CDX_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(url, error = %e, "CC Index query failed");
                return Ok(Vec::new());
            }
        };

        if !resp.status().is_success() {
            debug!(url, status = resp.status().as_u16(), "CC Index query failed");
            return Ok(Vec::new());
        }

        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => {
                debug!(url, error = %e, "CC Index body read failed");
                return Ok(Vec::new());
            }
        };

        Ok(text
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .map(|v| record_from_meta(&v, None))
            })
            .collect())
    }

    pub async fn url_exists(&self, url: &str) -> Result<bool> {
        Ok(!self.lookup_url(url, 1).await?.is_empty())
    }

    /// List of archive collection ids, newest first. Cached for one hour.
    pub async fn collections(&self) -> Vec<String> {
        let mut guard = self.collections.lock().await;
        if let Some((at, ids)) = guard.as_ref() {
            if at.elapsed() < COLLINFO_TTL {
                return ids.clone();
            }
        }

        let resp = match self
            .client
            .get(format!("{CC_INDEX_URL}/collinfo.json"))
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = r.status().as_u16(), "collinfo fetch failed");
                return guard.as_ref().map(|(_, ids)| ids.clone()).unwrap_or_default();
            }
            Err(e) => {
                debug!(error = %e, "collinfo fetch failed");
                return guard.as_ref().map(|(_, ids)| ids.clone()).unwrap_or_default();
            }
        };

        let items: Vec<serde_json::Value> = resp.json().await.unwrap_or_default();
        let mut ids: Vec<String> = items
            .iter()
            .filter_map(|v| v["id"].as_str().map(str::to_string))
            .collect();
        ids.sort_by(|a, b| b.cmp(a));

        *guard = Some((Instant::now(), ids.clone()));
        ids
    }

    // ------------------------------------------------------------------
    // cluster.idx binary search
    // ------------------------------------------------------------------

    /// Enumerate index records for a whole domain (and its subdomains)
    /// via the cluster index.
    pub async fn scan_domain(&self, domain: &str, limit: usize) -> Result<Vec<IndexRecord>> {
        self.scan_domain_with(domain, limit, &DateRange::default(), None)
            .await
    }

    /// Domain scan with date and MIME filters applied while parsing.
    pub async fn scan_domain_with(
        &self,
        domain: &str,
        limit: usize,
        range: &DateRange,
        mime: Option<&str>,
    ) -> Result<Vec<IndexRecord>> {
        require_url(domain)?;
        if range.is_inverted() {
            return Ok(Vec::new());
        }

        let cluster = match self.cluster().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "cluster index unavailable");
                return Ok(Vec::new());
            }
        };

        let prefix = surt::domain_key(domain);
        let blocks = cluster.candidate_blocks(&prefix, self.config.max_blocks);
        if blocks.is_empty() {
            return Ok(Vec::new());
        }
        if blocks.len() == self.config.max_blocks {
            info!(
                domain,
                max_blocks = self.config.max_blocks,
                "block walk hit the configured cap; results may be truncated"
            );
        }

        // Fetch candidate blocks concurrently, bounded by the semaphore.
        // One bad block (range error, gzip failure) is skipped, never fatal.
        let semaphore = Arc::new(Semaphore::new(self.config.block_concurrency));
        let fetches = blocks.iter().map(|block| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                self.fetch_block(block).await
            }
        });
        let block_bodies = futures::future::join_all(fetches).await;

        let mut results = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();

        for body in block_bodies.into_iter().flatten() {
            for line in body.lines() {
                let Some(record) = parse_block_line(line, &prefix) else {
                    continue;
                };
                if record
                    .warc_filename
                    .as_deref()
                    .is_some_and(|f| NOISE_WARC_PATHS.iter().any(|p| f.contains(p)))
                {
                    continue;
                }
                if !range.contains_ts(&record.timestamp) {
                    continue;
                }
                if let Some(want) = mime {
                    if record.mime.as_deref() != Some(want) {
                        continue;
                    }
                }
                if !seen_urls.insert(record.url.clone()) {
                    continue;
                }

                results.push(record);
                if results.len() >= limit {
                    return Ok(results);
                }
            }
        }

        Ok(results)
    }

    async fn cluster(&self) -> anyhow::Result<&ClusterIndex> {
        self.cluster
            .get_or_try_init(|| self.load_cluster())
            .await
    }

    /// Download cluster.idx once, cache it on disk (atomic write: temp then
    /// rename, so racing processes are safe), and load it into memory.
    async fn load_cluster(&self) -> anyhow::Result<ClusterIndex> {
        tokio::fs::create_dir_all(&self.config.data_dir)
            .await
            .context("creating data dir")?;
        let path = self
            .config
            .data_dir
            .join(format!("cluster_{}.idx", self.config.archive));

        if tokio::fs::metadata(&path).await.is_err() {
            info!(archive = %self.config.archive, "downloading cluster index");
            let url = format!(
                "{CC_DATA_URL}/cc-index/collections/{}/indexes/cluster.idx",
                self.config.archive
            );
            let resp = self
                .client
                .get(&url)
                .timeout(INDEX_DOWNLOAD_TIMEOUT)
                .send()
                .await
                .context("downloading cluster.idx")?;
            if !resp.status().is_success() {
                anyhow::bail!("cluster.idx download failed: HTTP {}", resp.status());
            }
            let bytes = resp.bytes().await.context("reading cluster.idx body")?;

            let tmp = path.with_extension(format!("idx.tmp-{}", std::process::id()));
            tokio::fs::write(&tmp, &bytes).await.context("writing cache")?;
            tokio::fs::rename(&tmp, &path).await.context("renaming cache")?;
            info!(path = %path.display(), bytes = bytes.len(), "cluster index cached");
        }

        let text = tokio::fs::read_to_string(&path)
            .await
            .context("reading cached cluster.idx")?;
        let cluster = ClusterIndex::parse(&text);
        info!(blocks = cluster.blocks.len(), "cluster index loaded");
        Ok(cluster)
    }

    /// Range-fetch one block and gunzip it. `None` on any failure.
    async fn fetch_block(&self, block: &IndexBlock) -> Option<String> {
        let url = format!(
            "{CC_DATA_URL}/cc-index/collections/{}/indexes/{}",
            self.config.archive, block.shard
        );
        let range_header = format!(
            "bytes={}-{}",
            block.offset,
            block.offset + block.length - 1
        );

        let resp = match self
            .client
            .get(&url)
            .header(reqwest::header::RANGE, range_header)
            .timeout(CDX_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(shard = %block.shard, error = %e, "block fetch failed");
                return None;
            }
        };
        let status = resp.status().as_u16();
        if status != 200 && status != 206 {
            debug!(shard = %block.shard, status, "block fetch failed");
            return None;
        }

        let bytes = resp.bytes().await.ok()?;
        let mut decoder = flate2::read::GzDecoder::new(bytes.as_ref());
        let mut body = String::new();
        if let Err(e) = decoder.read_to_string(&mut body) {
            debug!(shard = %block.shard, error = %e, "block gunzip failed, skipping");
            return None;
        }
        Some(body)
    }

    /// Snapshot listing via the CDX server, with client-side date filtering.
    pub async fn snapshots(
        &self,
        url: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<Snapshot>> {
        if range.is_inverted() {
            return Ok(Vec::new());
        }
        let records = self.lookup_url(url, limit * 2).await?;
        let mut snapshots: Vec<Snapshot> = records
            .into_iter()
            .filter(|r| range.contains_ts(&r.timestamp))
            .map(|r| Snapshot {
                url: r.url,
                timestamp: r.timestamp,
                source: ArchiveSource::CcIndex,
                status: r.status.as_deref().and_then(|s| s.parse().ok()),
                mime: r.mime,
                digest: r.digest,
                view_url: None,
            })
            .collect();
        snapshots.truncate(limit);
        Ok(snapshots)
    }
}

impl ClusterIndex {
    pub(crate) fn parse(text: &str) -> Self {
        let blocks: Vec<IndexBlock> = text.lines().filter_map(parse_cluster_line).collect();
        let keys = blocks.iter().map(|b| b.key.clone()).collect();
        Self { blocks, keys }
    }

    /// Blocks whose range may contain keys of the domain: bisect to the
    /// rightmost block starting at or before the prefix, then walk forward
    /// while blocks still start inside the domain's key range.
    pub(crate) fn candidate_blocks(&self, prefix: &str, max_blocks: usize) -> Vec<&IndexBlock> {
        let upto = self.keys.partition_point(|k| k.as_str() <= prefix);
        if upto == 0 {
            return Vec::new();
        }
        let start = upto - 1;

        let mut out = Vec::new();
        for i in start..self.blocks.len().min(start + max_blocks) {
            let key = &self.blocks[i].key;
            if i > start && key.as_str() > prefix && !key.starts_with(prefix) {
                break;
            }
            out.push(&self.blocks[i]);
        }
        out
    }
}

/// `cluster.idx` line: `<SURT> <ts>\t<shard>\t<offset>\t<length>\t<n>`.
fn parse_cluster_line(line: &str) -> Option<IndexBlock> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }
    Some(IndexBlock {
        key: parts[0].to_string(),
        shard: parts[2].to_string(),
        offset: parts[3].parse().ok()?,
        length: parts[4].parse().ok()?,
    })
}

/// Block data line: `<SURT-key> <ts> <json-metadata>`. Returns a record
/// only when the key belongs to the domain — the character after the
/// prefix must close the host (`)`) or start a subdomain label (`,`),
/// otherwise `example.com` would silently match `examplecompany.com`.
fn parse_block_line(line: &str, prefix: &str) -> Option<IndexRecord> {
    let mut parts = line.splitn(3, ' ');
    let key = parts.next()?;
    let ts = parts.next()?;
    let meta_json = parts.next()?;

    if !surt::key_in_domain(key, prefix) {
        return None;
    }

    let meta: serde_json::Value = serde_json::from_str(meta_json).ok()?;
    let record = record_from_meta(&meta, Some(ts));
    if record.url.is_empty() {
        return None;
    }
    Some(record)
}

fn record_from_meta(meta: &serde_json::Value, fallback_ts: Option<&str>) -> IndexRecord {
    IndexRecord {
        url: meta["url"].as_str().unwrap_or_default().to_string(),
        timestamp: meta["timestamp"]
            .as_str()
            .or(fallback_ts)
            .unwrap_or_default()
            .to_string(),
        status: meta["status"].as_str().map(str::to_string),
        mime: meta["mime"].as_str().map(str::to_string),
        digest: meta["digest"].as_str().map(str::to_string),
        warc_filename: meta["filename"].as_str().map(str::to_string),
        warc_offset: value_as_u64(&meta["offset"]),
        warc_length: value_as_u64(&meta["length"]),
    }
}

/// CDX metadata carries numbers as strings; tolerate both.
fn value_as_u64(v: &serde_json::Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

#[async_trait]
impl SourceAdapter for CcIndex {
    fn source(&self) -> ArchiveSource {
        ArchiveSource::CcIndex
    }

    /// Index-only fetch: WARC location metadata without content. The
    /// result never wins a race (no body), but gives callers the
    /// coordinates to fetch bytes themselves.
    async fn fetch(&self, url: &str, range: &DateRange) -> Result<FetchResult> {
        require_url(url)?;
        if range.is_inverted() {
            return Ok(FetchResult::empty(url));
        }

        let records = self.lookup_url(url, 5).await?;
        let Some(record) = records.into_iter().find(|r| range.contains_ts(&r.timestamp)) else {
            return Ok(FetchResult::empty(url));
        };

        let mut result = FetchResult::empty(url);
        result.source = Some(ArchiveSource::CcIndex);
        result.timestamp = Some(record.timestamp);
        result.status_code = record.status.as_deref().and_then(|s| s.parse().ok());
        result.mime_type = record.mime;
        result.digest = record.digest;
        if let Some(f) = record.warc_filename {
            result
                .metadata
                .insert("warc_filename".into(), serde_json::Value::String(f));
        }
        if let Some(o) = record.warc_offset {
            result.metadata.insert("warc_offset".into(), o.into());
        }
        if let Some(l) = record.warc_length {
            result.metadata.insert("warc_length".into(), l.into());
        }
        Ok(result)
    }

    async fn exists(&self, url: &str, _range: &DateRange) -> Result<bool> {
        self.url_exists(url).await
    }

    async fn list_snapshots(
        &self,
        url: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<Snapshot>> {
        self.snapshots(url, range, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_from(keys: &[&str]) -> ClusterIndex {
        let text: String = keys
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{k} 20240101000000\tcdx-00000.gz\t{}\t1000\t{i}\n", i * 1000))
            .collect();
        ClusterIndex::parse(&text)
    }

    #[test]
    fn cluster_line_parsing() {
        let block =
            parse_cluster_line("com,example)/ 20240101120000\tcdx-00123.gz\t4096\t2048\t17")
                .unwrap();
        assert_eq!(block.key, "com,example)/");
        assert_eq!(block.shard, "cdx-00123.gz");
        assert_eq!(block.offset, 4096);
        assert_eq!(block.length, 2048);

        assert!(parse_cluster_line("short line").is_none());
        assert!(parse_cluster_line("k ts shard notanumber 12 0").is_none());
    }

    #[test]
    fn candidate_blocks_cover_the_domain_range() {
        let cluster = cluster_from(&[
            "com,aaa)/",
            "com,example)/",
            "com,example)/products/page50",
            "com,example,api)/v2",
            "com,examplecompany)/",
            "com,zzz)/",
        ]);

        let blocks = cluster.candidate_blocks("com,example", 20);
        let keys: Vec<&str> = blocks.iter().map(|b| b.key.as_str()).collect();
        // Starts one before the first in-domain block (the domain's keys
        // may begin mid-block). The sibling `examplecompany` block shares
        // the string prefix so it is fetched too; its records are rejected
        // line-by-line by the SURT boundary check. The walk stops at the
        // first block that can no longer contain the prefix.
        assert_eq!(
            keys,
            vec![
                "com,aaa)/",
                "com,example)/",
                "com,example)/products/page50",
                "com,example,api)/v2",
                "com,examplecompany)/",
            ]
        );
    }

    #[test]
    fn candidate_blocks_respect_max_blocks() {
        let cluster = cluster_from(&[
            "com,example)/a",
            "com,example)/b",
            "com,example)/c",
            "com,example)/d",
        ]);
        let blocks = cluster.candidate_blocks("com,example", 2);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn no_matching_blocks_for_unknown_domain() {
        let cluster = cluster_from(&["com,bbb)/", "com,ccc)/"]);
        // Sorts before every block start.
        assert!(cluster.candidate_blocks("com,aaa", 20).is_empty());
    }

    #[test]
    fn single_block_domain() {
        let cluster = cluster_from(&["com,aaa)/", "com,zzz)/"]);
        // Domain between two block starts: only the covering block matters.
        let blocks = cluster.candidate_blocks("com,example", 20);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].key, "com,aaa)/");
    }

    #[test]
    fn block_line_boundary_filtering() {
        let prefix = "com,example";
        let hit = parse_block_line(
            r#"com,example)/about 20240101120000 {"url": "https://example.com/about", "status": "200", "mime": "text/html", "digest": "ABC", "filename": "crawl-data/CC-MAIN-2024-51/warc/x.warc.gz", "offset": "100", "length": "5000"}"#,
            prefix,
        )
        .unwrap();
        assert_eq!(hit.url, "https://example.com/about");
        assert_eq!(hit.timestamp, "20240101120000");
        assert_eq!(hit.warc_offset, Some(100));
        assert_eq!(hit.warc_length, Some(5000));

        // Boundary: a different domain sharing the string prefix.
        assert!(parse_block_line(
            r#"com,examplecompany)/ 20240101120000 {"url": "https://examplecompany.com/"}"#,
            prefix,
        )
        .is_none());

        // Subdomain is in range.
        assert!(parse_block_line(
            r#"com,example,api)/v1 20240101120000 {"url": "https://api.example.com/v1"}"#,
            prefix,
        )
        .is_some());

        assert!(parse_block_line("malformed", prefix).is_none());
        assert!(parse_block_line("com,example)/x 20240101 not-json", prefix).is_none());
    }

    #[test]
    fn block_line_falls_back_to_line_timestamp() {
        let rec = parse_block_line(
            r#"com,example)/ 20231115083000 {"url": "https://example.com/"}"#,
            "com,example",
        )
        .unwrap();
        assert_eq!(rec.timestamp, "20231115083000");
    }

    #[test]
    fn numeric_offsets_accepted_in_both_forms() {
        let s: serde_json::Value =
            serde_json::json!({"url": "u", "offset": "42", "length": 7});
        let rec = record_from_meta(&s, None);
        assert_eq!(rec.warc_offset, Some(42));
        assert_eq!(rec.warc_length, Some(7));
    }

    #[tokio::test]
    async fn inverted_range_short_circuits() {
        let cc = CcIndex::new(reqwest::Client::new(), CcIndexConfig::default());
        let range = DateRange::new(Some("2024-01-01"), Some("2020-01-01"));
        let out = cc
            .scan_domain_with("example.com", 100, &range, None)
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
