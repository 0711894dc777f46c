//! High-throughput archive searcher over Wayback and CommonCrawl.
//!
//! The engine walks a year × source grid: an outer semaphore bounds how
//! many years run at once, an inner semaphore bounds snapshot fetches per
//! year-source. Snapshots are fetched in priority order (document URLs and
//! high-signal path terms first) so the most interesting hits surface
//! early. Every producer writes into one bounded channel; the stream ends
//! when the last producer finishes and the channel closes.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Datelike;
use futures::Stream;
use hindsight_common::{host_of, ArchiveSource};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, info};

use crate::search::events::{ArchiveEvent, SearchHit};
use crate::text_extract::{extract_outlinks, fold_ascii, html_to_text, snippet};

const WAYBACK_CDX: &str = "https://web.archive.org/cdx/search/cdx";
const WAYBACK_BASE: &str = "https://web.archive.org/web";
const CC_INDEX_URL: &str = "https://index.commoncrawl.org";
const CC_DATA_URL: &str = "https://data.commoncrawl.org";

const CDX_TIMEOUT: Duration = Duration::from_secs(20);
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30);
const GHOST_TIMEOUT: Duration = Duration::from_secs(10);
const COLLINFO_TTL: Duration = Duration::from_secs(3600);

/// Direct-download document types get the strongest ranking boost.
const DOC_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx"];

/// Unfiltered snippets take the head of the page text.
const HEAD_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource {
    Wayback,
    CommonCrawl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Newest snapshots first within a year.
    #[default]
    Backwards,
    Forwards,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub sources: Vec<SearchSource>,
    pub max_concurrent_years: usize,
    pub max_concurrent_per_year: usize,
    /// Path terms that boost a snapshot's fetch priority.
    pub priority_terms: Vec<String>,
    /// Prefix bytes for ghost fetches; 0 disables them.
    pub ghost_fetch_bytes: usize,
    pub max_outlinks: usize,
    /// CommonCrawl crawls consulted per year.
    pub crawls_per_year: usize,
    pub channel_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            sources: vec![SearchSource::Wayback, SearchSource::CommonCrawl],
            max_concurrent_years: 4,
            max_concurrent_per_year: 20,
            priority_terms: default_priority_terms(),
            ghost_fetch_bytes: 0,
            max_outlinks: 50,
            crawls_per_year: 3,
            channel_capacity: 256,
        }
    }
}

fn default_priority_terms() -> Vec<String> {
    [
        "report",
        "annual",
        "financial",
        "investor",
        "investors",
        "investor-relations",
        "ir",
        "10-k",
        "10q",
        "20-f",
        "prospectus",
        "team",
        "leadership",
        "management",
        "board",
        "about",
        "company",
        "press",
        "news",
        "blog",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Domain or URL whose history is searched.
    pub url: String,
    /// Keywords to match; empty means emit every snapshot unfiltered.
    pub keywords: Vec<String>,
    /// Years to walk; empty means the recent default window.
    pub years: Vec<i32>,
    pub direction: Direction,
    /// Attach raw HTML to hits.
    pub return_html: bool,
    /// Try a ranged prefix fetch before committing to the full download.
    pub fast_first: bool,
}

impl SearchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keywords: Vec::new(),
            years: Vec::new(),
            direction: Direction::default(),
            return_html: false,
            fast_first: false,
        }
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn years(mut self, years: Vec<i32>) -> Self {
        self.years = years;
        self
    }
}

/// A CDX row the engine will fetch: (timestamp, original URL, digest).
#[derive(Debug, Clone, PartialEq)]
struct CdxSnap {
    timestamp: String,
    url: String,
    digest: String,
}

pub struct ArchiveSearcher {
    client: reqwest::Client,
    config: SearchConfig,
}

struct Ctx {
    client: reqwest::Client,
    config: SearchConfig,
    host: String,
    keywords: Vec<String>,
    skip_filter: bool,
    direction: Direction,
    return_html: bool,
    fast_first: bool,
    collinfo: Mutex<Option<(Instant, Vec<String>)>>,
}

impl ArchiveSearcher {
    pub fn new(client: reqwest::Client, config: SearchConfig) -> Self {
        Self { client, config }
    }

    /// Stream every matching snapshot plus progress events. The stream
    /// terminates after exactly one `year_complete` event per requested
    /// year; dropping it cancels outstanding work cooperatively.
    pub fn search_keywords_streaming(
        &self,
        request: SearchRequest,
    ) -> impl Stream<Item = ArchiveEvent> + Send {
        let years = if request.years.is_empty() {
            default_years(chrono::Utc::now().year())
        } else {
            let mut years = request.years.clone();
            years.sort_unstable_by(|a, b| b.cmp(a));
            years.dedup();
            years
        };

        let keywords: Vec<String> = request
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let skip_filter = keywords.is_empty();

        let host = host_of(&request.url).unwrap_or_else(|| request.url.clone());
        info!(
            url = %request.url,
            host = %host,
            years = ?years,
            keywords = ?keywords,
            "starting streaming archive search"
        );

        let ctx = Arc::new(Ctx {
            client: self.client.clone(),
            config: self.config.clone(),
            host,
            keywords,
            skip_filter,
            direction: request.direction,
            return_html: request.return_html,
            fast_first: request.fast_first,
            collinfo: Mutex::new(None),
        });

        let (tx, mut rx) = mpsc::channel::<ArchiveEvent>(self.config.channel_capacity);
        let total_years = years.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let year_semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_years));

        let coordinator = tokio::spawn(async move {
            let mut handles = Vec::new();
            for year in years {
                let ctx = ctx.clone();
                let tx = tx.clone();
                let semaphore = year_semaphore.clone();
                let completed = completed.clone();
                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };
                    ctx.fetch_year(year, &tx).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = tx
                        .send(ArchiveEvent::year_complete(year, done, total_years))
                        .await;
                }));
            }
            for handle in handles {
                let _ = handle.await;
            }
            // The last sender clone drops here; the channel closes and the
            // consumer loop below ends.
        });

        async_stream::stream! {
            let mut emitted = 0usize;
            while let Some(event) = rx.recv().await {
                if event.as_hit().is_some() {
                    emitted += 1;
                }
                yield event;
            }
            let _ = coordinator.await;
            info!(hits = emitted, "streaming archive search complete");
        }
    }
}

impl Ctx {
    async fn fetch_year(&self, year: i32, tx: &mpsc::Sender<ArchiveEvent>) {
        let mut jobs: Vec<Pin<Box<dyn Future<Output = ()> + Send + '_>>> = Vec::new();
        for source in &self.config.sources {
            match source {
                SearchSource::Wayback => {
                    jobs.push(Box::pin(self.fetch_wayback_year(year, tx.clone())));
                }
                SearchSource::CommonCrawl => {
                    jobs.push(Box::pin(self.fetch_cc_year(year, tx.clone())));
                }
            }
        }
        futures::future::join_all(jobs).await;
    }

    // ------------------------------------------------------------------
    // Wayback side
    // ------------------------------------------------------------------

    async fn fetch_wayback_year(&self, year: i32, tx: mpsc::Sender<ArchiveEvent>) {
        let snapshots = self.wayback_snapshots(year).await;
        if snapshots.is_empty() {
            return;
        }
        info!(year, count = snapshots.len(), "wayback snapshots found");

        let ranked = prioritize(snapshots, &self.config.priority_terms, self.direction);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_per_year));

        let fetches = ranked.into_iter().map(|snap| {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                self.fetch_wayback_snapshot(snap, year, &tx).await;
            }
        });
        futures::future::join_all(fetches).await;
    }

    /// Candidate snapshots for one year: five CDX URL patterns covering the
    /// host, its `www.` twin, and all subdomains, deduplicated on
    /// (timestamp, url).
    async fn wayback_snapshots(&self, year: i32) -> Vec<CdxSnap> {
        let host = &self.host;
        let patterns = [
            host.clone(),
            format!("{host}/*"),
            format!("www.{host}"),
            format!("www.{host}/*"),
            format!("*.{host}/*"),
        ];

        let mut seen: std::collections::HashSet<(String, String)> = Default::default();
        let mut snapshots = Vec::new();

        for pattern in &patterns {
            let params: Vec<(&str, String)> = vec![
                ("url", pattern.clone()),
                ("output", "json".to_string()),
                ("fl", "timestamp,original,digest".to_string()),
                ("filter", "statuscode:200".to_string()),
                ("filter", "mimetype:text/html".to_string()),
                ("collapse", "digest".to_string()),
                ("from", format!("{year}0101")),
                ("to", format!("{year}1231")),
            ];

            let resp = match self
                .client
                .get(WAYBACK_CDX)
                .query(&params)
                .timeout(CDX_TIMEOUT)
                .send()
                .await
            {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    debug!(pattern, status = r.status().as_u16(), "wayback CDX error");
                    continue;
                }
                Err(e) => {
                    debug!(pattern, error = %e, "wayback CDX error");
                    continue;
                }
            };

            let rows: Vec<Vec<String>> = match resp.json().await {
                Ok(rows) => rows,
                Err(e) => {
                    debug!(pattern, error = %e, "wayback CDX parse error");
                    continue;
                }
            };
            for row in rows.into_iter().skip(1) {
                if row.len() < 2 {
                    continue;
                }
                let key = (row[0].clone(), row[1].clone());
                if !seen.insert(key) {
                    continue;
                }
                snapshots.push(CdxSnap {
                    timestamp: row[0].clone(),
                    url: row[1].clone(),
                    digest: row.get(2).cloned().unwrap_or_default(),
                });
            }
        }

        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        snapshots
    }

    async fn fetch_wayback_snapshot(
        &self,
        snap: CdxSnap,
        year: i32,
        tx: &mpsc::Sender<ArchiveEvent>,
    ) {
        let snapshot_url = format!("{WAYBACK_BASE}/{}id_/{}", snap.timestamp, snap.url);
        let display_target = host_of(&snap.url).unwrap_or_else(|| snap.url.clone());

        if tx
            .send(ArchiveEvent::deep_progress(format!(
                "{year} ▸ {} ▸ {display_target}",
                snap.timestamp
            )))
            .await
            .is_err()
        {
            return; // consumer gone
        }

        // Ghost fetch: a ranged prefix read that can confirm a keyword
        // before paying for the full body.
        if self.fast_first && !self.skip_filter && self.config.ghost_fetch_bytes > 0 {
            if let Some(prefix) = self.ghost_fetch(&snapshot_url).await {
                if let Some(keyword) = match_keywords(&prefix, &self.keywords) {
                    let hit = SearchHit {
                        url: snap.url.clone(),
                        timestamp: snap.timestamp.clone(),
                        year,
                        keyword: Some(keyword.clone()),
                        source: ArchiveSource::WaybackData,
                        digest: some_nonempty(&snap.digest),
                        snippet: snippet(&prefix, &keyword, 150),
                        html: self.return_html.then(|| prefix.clone()),
                        ghost: true,
                        outlinks: Vec::new(),
                        outlink_notes: Vec::new(),
                        outlink_domains: Vec::new(),
                    };
                    let message =
                        format!("Match • {keyword} • {display_target} • {}", snap.timestamp);
                    let _ = tx.send(ArchiveEvent::Hit(hit.clone())).await;
                    let _ = tx.send(ArchiveEvent::deep_hit(message, hit)).await;
                    return;
                }
            }
        }

        let resp = match self
            .client
            .get(&snapshot_url)
            .timeout(SNAPSHOT_TIMEOUT)
            .send()
            .await
        {
            Ok(r) if r.status().as_u16() == 200 => r,
            Ok(_) => return,
            Err(e) => {
                debug!(url = %snap.url, error = %e, "wayback snapshot fetch error");
                return;
            }
        };
        let Ok(html) = resp.text().await else {
            return;
        };

        let text = html_to_text(&html);
        let links = extract_outlinks(&html, &snap.url, self.config.max_outlinks);

        // Unfiltered mode: every snapshot is a hit, snippet from the head.
        if self.skip_filter {
            let hit = SearchHit {
                url: snap.url.clone(),
                timestamp: snap.timestamp.clone(),
                year,
                keyword: None,
                source: ArchiveSource::WaybackData,
                digest: some_nonempty(&snap.digest),
                snippet: head_chars(&text, HEAD_SNIPPET_CHARS),
                html: self.return_html.then(|| html.clone()),
                ghost: false,
                outlinks: links.urls,
                outlink_notes: links.notes,
                outlink_domains: links.domains,
            };
            let _ = tx.send(ArchiveEvent::Hit(hit)).await;
            return;
        }

        if let Some(keyword) = match_keywords(&text, &self.keywords) {
            let hit = SearchHit {
                url: snap.url.clone(),
                timestamp: snap.timestamp.clone(),
                year,
                keyword: Some(keyword.clone()),
                source: ArchiveSource::WaybackData,
                digest: some_nonempty(&snap.digest),
                snippet: snippet(&text, &keyword, 150),
                html: self.return_html.then(|| html.clone()),
                ghost: false,
                outlinks: links.urls,
                outlink_notes: links.notes,
                outlink_domains: links.domains,
            };
            let message = format!("Match • {keyword} • {display_target} • {}", snap.timestamp);
            let _ = tx.send(ArchiveEvent::Hit(hit.clone())).await;
            let _ = tx.send(ArchiveEvent::deep_hit(message, hit)).await;
        }
    }

    async fn ghost_fetch(&self, snapshot_url: &str) -> Option<String> {
        let range = format!("bytes=0-{}", self.config.ghost_fetch_bytes - 1);
        let resp = self
            .client
            .get(snapshot_url)
            .header(reqwest::header::RANGE, range)
            .timeout(GHOST_TIMEOUT)
            .send()
            .await
            .ok()?;
        let status = resp.status().as_u16();
        if status != 200 && status != 206 {
            return None;
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !content_type.is_empty()
            && !content_type.contains("text")
            && !content_type.contains("html")
        {
            return None;
        }
        let bytes = resp.bytes().await.ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    // ------------------------------------------------------------------
    // CommonCrawl side
    // ------------------------------------------------------------------

    async fn fetch_cc_year(&self, year: i32, tx: mpsc::Sender<ArchiveEvent>) {
        let crawls = self.collections().await;
        let year_crawls = crawls_for_year(&crawls, year, self.config.crawls_per_year);
        if year_crawls.is_empty() {
            return;
        }
        info!(year, crawls = year_crawls.len(), "searching commoncrawl");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_per_year));
        let jobs = year_crawls
            .into_iter()
            .map(|crawl| self.search_cc_crawl(crawl, year, semaphore.clone(), tx.clone()));
        futures::future::join_all(jobs).await;
    }

    /// Archive ids, newest first, cached for an hour.
    async fn collections(&self) -> Vec<String> {
        let mut guard = self.collinfo.lock().await;
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
            _ => return guard.as_ref().map(|(_, ids)| ids.clone()).unwrap_or_default(),
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

    async fn search_cc_crawl(
        &self,
        crawl_id: String,
        year: i32,
        semaphore: Arc<Semaphore>,
        tx: mpsc::Sender<ArchiveEvent>,
    ) {
        let host = &self.host;
        let patterns = [format!("{host}/*"), format!("*.{host}/*"), host.clone()];

        for pattern in &patterns {
            let index_url = format!("{CC_INDEX_URL}/{crawl_id}-index");
            let params: Vec<(&str, String)> = vec![
                ("url", pattern.clone()),
                ("output", "json".to_string()),
                ("limit", "500".to_string()),
                (
                    "fl",
                    "url,timestamp,status,offset,length,filename,mime,digest".to_string(),
                ),
            ];

            let resp = match self
                .client
                .get(&index_url)
                .query(&params)
                .timeout(CDX_TIMEOUT)
                .send()
                .await
            {
                Ok(r) if r.status().is_success() => r,
                Ok(_) | Err(_) => continue,
            };
            let Ok(body) = resp.text().await else {
                continue;
            };

            let records: Vec<serde_json::Value> = body
                .lines()
                .filter(|l| !l.is_empty())
                .filter_map(|l| serde_json::from_str(l).ok())
                .filter(|r: &serde_json::Value| {
                    r["status"].as_str().unwrap_or_default().starts_with("200")
                        && r["mime"].as_str().unwrap_or_default().contains("text/html")
                })
                .collect();

            let fetches = records.into_iter().map(|record| {
                let semaphore = semaphore.clone();
                let tx = tx.clone();
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return;
                    };
                    self.fetch_cc_content(record, year, &tx).await;
                }
            });
            futures::future::join_all(fetches).await;

            // First pattern that answered wins; the others overlap it.
            break;
        }
    }

    async fn fetch_cc_content(
        &self,
        record: serde_json::Value,
        year: i32,
        tx: &mpsc::Sender<ArchiveEvent>,
    ) {
        let Some(filename) = record["filename"].as_str() else {
            return;
        };
        let (Some(offset), Some(length)) = (field_u64(&record, "offset"), field_u64(&record, "length"))
        else {
            return;
        };

        let warc_url = format!("{CC_DATA_URL}/{filename}");
        let range = format!("bytes={}-{}", offset, offset + length - 1);

        let resp = match self
            .client
            .get(&warc_url)
            .header(reqwest::header::RANGE, range)
            .timeout(SNAPSHOT_TIMEOUT)
            .send()
            .await
        {
            Ok(r) if r.status().as_u16() == 206 => r,
            Ok(_) => return,
            Err(e) => {
                debug!(error = %e, "cc content fetch error");
                return;
            }
        };
        let Ok(bytes) = resp.bytes().await else {
            return;
        };

        // WARC ranges come gzip-compressed; fall back to the raw bytes for
        // servers that already decoded.
        let content = gunzip_or_raw(&bytes);
        let Some(html) = html_payload(&content) else {
            return;
        };

        let page_url = record["url"].as_str().unwrap_or_default().to_string();
        let timestamp = record["timestamp"].as_str().unwrap_or_default().to_string();
        let digest = record["digest"].as_str().unwrap_or_default().to_string();

        let text = html_to_text(html);
        let links = extract_outlinks(html, &page_url, self.config.max_outlinks);

        if self.skip_filter {
            let hit = SearchHit {
                url: page_url,
                timestamp,
                year,
                keyword: None,
                source: ArchiveSource::CcData,
                digest: some_nonempty(&digest),
                snippet: head_chars(&text, HEAD_SNIPPET_CHARS),
                html: self.return_html.then(|| html.to_string()),
                ghost: false,
                outlinks: links.urls,
                outlink_notes: links.notes,
                outlink_domains: links.domains,
            };
            let _ = tx.send(ArchiveEvent::Hit(hit)).await;
            return;
        }

        if let Some(keyword) = match_keywords(&text, &self.keywords) {
            let hit = SearchHit {
                url: page_url,
                timestamp,
                year,
                keyword: Some(keyword.clone()),
                source: ArchiveSource::CcData,
                digest: some_nonempty(&digest),
                snippet: snippet(&text, &keyword, 150),
                html: self.return_html.then(|| html.to_string()),
                ghost: false,
                outlinks: links.urls,
                outlink_notes: links.notes,
                outlink_domains: links.domains,
            };
            let _ = tx.send(ArchiveEvent::Hit(hit)).await;
        }
    }
}

// ----------------------------------------------------------------------
// Pure helpers
// ----------------------------------------------------------------------

/// Default search window: the last four years, plus 2022 as a historical
/// anchor when the window has moved past it.
fn default_years(current_year: i32) -> Vec<i32> {
    let mut years: Vec<i32> = (current_year - 3..=current_year).rev().collect();
    if current_year - 3 > 2022 {
        years.push(2022);
    }
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}

/// Composite snapshot priority: document extensions strongly boosted,
/// every priority term in the URL adds a smaller boost, timestamp breaks
/// ties per the search direction.
fn priority_score(url: &str, terms: &[String]) -> i64 {
    let lower = url.to_lowercase();
    let mut points = 0;
    if DOC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        points += 6;
    }
    for term in terms {
        if lower.contains(term.as_str()) {
            points += 3;
        }
    }
    points
}

fn prioritize(mut snapshots: Vec<CdxSnap>, terms: &[String], direction: Direction) -> Vec<CdxSnap> {
    let ts_value = |ts: &str| ts.parse::<i64>().unwrap_or(0);
    snapshots.sort_by_key(|snap| {
        let time = match direction {
            Direction::Backwards => -ts_value(&snap.timestamp),
            Direction::Forwards => ts_value(&snap.timestamp),
        };
        (-priority_score(&snap.url, terms), time)
    });
    snapshots
}

/// Up to `max` crawls whose id mentions the year, newest first.
fn crawls_for_year(crawls: &[String], year: i32, max: usize) -> Vec<String> {
    let needle = year.to_string();
    crawls
        .iter()
        .filter(|c| c.contains(&needle))
        .take(max)
        .cloned()
        .collect()
}

/// First keyword present in the text, case-insensitively, with an
/// NFKD-folded comparison as fallback so accented pages still match.
fn match_keywords(text: &str, keywords: &[String]) -> Option<String> {
    let lower = text.to_lowercase();
    let folded = fold_ascii(&lower);
    for keyword in keywords {
        let k = keyword.to_lowercase();
        if lower.contains(&k) {
            return Some(keyword.clone());
        }
        let kf = fold_ascii(&k);
        if !kf.is_empty() && folded.contains(&kf) {
            return Some(keyword.clone());
        }
    }
    None
}

fn head_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn some_nonempty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn field_u64(record: &serde_json::Value, field: &str) -> Option<u64> {
    record[field]
        .as_u64()
        .or_else(|| record[field].as_str().and_then(|s| s.parse().ok()))
}

fn gunzip_or_raw(bytes: &[u8]) -> String {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = String::new();
    match decoder.read_to_string(&mut out) {
        Ok(_) => out,
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// WARC record bodies carry framing headers before the document; the page
/// starts at the first `<html`.
fn html_payload(content: &str) -> Option<&str> {
    let lower = content.to_lowercase();
    let start = lower.find("<html")?;
    // Offsets in the lowered copy are only safe when lowering preserved
    // byte positions; headers are ASCII so this holds in practice.
    content.get(start..).or(Some(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ts: &str, url: &str) -> CdxSnap {
        CdxSnap {
            timestamp: ts.to_string(),
            url: url.to_string(),
            digest: String::new(),
        }
    }

    #[test]
    fn default_years_recent_window() {
        assert_eq!(default_years(2025), vec![2025, 2024, 2023, 2022]);
    }

    #[test]
    fn default_years_appends_anchor_when_window_moves_on() {
        assert_eq!(default_years(2027), vec![2027, 2026, 2025, 2024, 2022]);
    }

    #[test]
    fn documents_outrank_plain_pages() {
        let terms = default_priority_terms();
        let ranked = prioritize(
            vec![
                snap("20230601000000", "https://acme.com/random"),
                snap("20230101000000", "https://acme.com/annual-report-2022.pdf"),
                snap("20230301000000", "https://acme.com/about"),
            ],
            &terms,
            Direction::Backwards,
        );
        // PDF scores ext(6) + report(3) + annual(3); /about scores 3.
        assert_eq!(ranked[0].url, "https://acme.com/annual-report-2022.pdf");
        assert_eq!(ranked[1].url, "https://acme.com/about");
        assert_eq!(ranked[2].url, "https://acme.com/random");
    }

    #[test]
    fn ties_break_by_direction() {
        let ranked = prioritize(
            vec![snap("20230101000000", "https://a.com/x"), snap("20230601000000", "https://a.com/y")],
            &[],
            Direction::Backwards,
        );
        assert_eq!(ranked[0].timestamp, "20230601000000");

        let ranked = prioritize(
            vec![snap("20230601000000", "https://a.com/y"), snap("20230101000000", "https://a.com/x")],
            &[],
            Direction::Forwards,
        );
        assert_eq!(ranked[0].timestamp, "20230101000000");
    }

    #[test]
    fn crawl_selection_is_year_scoped_and_capped() {
        let crawls: Vec<String> = [
            "CC-MAIN-2024-51",
            "CC-MAIN-2024-46",
            "CC-MAIN-2024-42",
            "CC-MAIN-2024-38",
            "CC-MAIN-2023-50",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let selected = crawls_for_year(&crawls, 2024, 3);
        assert_eq!(
            selected,
            vec!["CC-MAIN-2024-51", "CC-MAIN-2024-46", "CC-MAIN-2024-42"]
        );
        assert!(crawls_for_year(&crawls, 2021, 3).is_empty());
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let found = match_keywords("The Annual Report is out", &["annual report".to_string()]);
        assert_eq!(found.as_deref(), Some("annual report"));
    }

    #[test]
    fn keyword_match_folds_accents() {
        let found = match_keywords("Bericht über München", &["munchen".to_string()]);
        assert_eq!(found.as_deref(), Some("munchen"));
        assert!(match_keywords("nothing here", &["munchen".to_string()]).is_none());
    }

    #[test]
    fn first_matching_keyword_short_circuits() {
        let found = match_keywords(
            "board of directors",
            &["missing".to_string(), "board".to_string(), "directors".to_string()],
        );
        assert_eq!(found.as_deref(), Some("board"));
    }

    #[test]
    fn html_payload_skips_warc_framing() {
        let body = "WARC/1.0\r\nWARC-Type: response\r\n\r\nHTTP/1.1 200 OK\r\n\r\n<HTML><body>hi</body></HTML>";
        let html = html_payload(body).unwrap();
        assert!(html.starts_with("<HTML"));
        assert!(html_payload("no markup at all").is_none());
    }

    #[test]
    fn gunzip_falls_back_to_raw() {
        assert_eq!(gunzip_or_raw(b"plain text"), "plain text");

        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<html>compressed</html>").unwrap();
        let gz = encoder.finish().unwrap();
        assert_eq!(gunzip_or_raw(&gz), "<html>compressed</html>");
    }

    #[tokio::test]
    async fn unfiltered_request_marks_skip() {
        let searcher = ArchiveSearcher::new(reqwest::Client::new(), SearchConfig::default());
        // Whitespace-only keywords collapse to the unfiltered mode.
        let request = SearchRequest::new("example.com").keywords(vec!["  ".to_string()]);
        // The stream itself needs the network; only the request shaping is
        // checked here.
        let _stream = searcher.search_keywords_streaming(request);
    }
}
