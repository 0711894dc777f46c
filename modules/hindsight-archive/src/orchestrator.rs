//! The fetch orchestrator: one facade over every archive source.
//!
//! A fetch races all enabled sources and returns the first usable result;
//! snapshot listings and existence checks fan out and merge. Adapters are
//! constructed once from config; a source without its prerequisites simply
//! contributes no task.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use hindsight_common::{
    ArchiveSource, Config, DateRange, FetchResult, HindsightError, Result, Snapshot,
};
use tracing::{debug, info};

use crate::adapter::{require_url, SourceAdapter};
use crate::ga::{extract_ga_codes, GaCodes};
use crate::search::{ArchiveSearcher, SearchConfig};
use crate::sources::cc_index::{CcIndex, CcIndexConfig};
use crate::sources::cc_warc::{CcWarcFetcher, WarcPage, DEFAULT_THREADS, DEFAULT_TIMEOUT_SECS};
use crate::sources::cc_wat::CcLinksExtractor;
use crate::sources::es_bridge::EsBridge;
use crate::sources::exa::ExaAdapter;
use crate::sources::firecrawl::FirecrawlAdapter;
use crate::sources::memento::Memento;
use crate::sources::wayback::Wayback;

/// How a multi-source fetch resolves.
///
/// `GatherAll` awaits every source then scans for the first success in
/// insertion order — deterministic, but as slow as the slowest source.
/// `FirstSuccess` returns as soon as any source produces content and
/// abandons the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RaceMode {
    #[default]
    GatherAll,
    FirstSuccess,
}

#[derive(Debug, Clone)]
pub struct HindsightConfig {
    pub enable_cc: bool,
    pub enable_wayback: bool,
    pub enable_memento: bool,
    pub enable_elastic: bool,
    /// Paid APIs are opt-in.
    pub enable_paid: bool,
    pub race_mode: RaceMode,
    /// Overall wall-clock budget for one racing fetch.
    pub fetch_timeout: Duration,
    /// In-flight URL bound for batch fetches.
    pub batch_concurrency: usize,
    pub cc: CcIndexConfig,
    pub es_host: String,
    pub es_username: String,
    pub es_password: String,
    pub firecrawl_api_key: String,
    pub firecrawl_max_age_ms: u64,
    pub exa_api_key: String,
    pub ccwarc_bin: String,
    pub cclinks_bin: String,
}

impl Default for HindsightConfig {
    fn default() -> Self {
        Self {
            enable_cc: true,
            enable_wayback: true,
            enable_memento: true,
            enable_elastic: true,
            enable_paid: false,
            race_mode: RaceMode::default(),
            fetch_timeout: Duration::from_secs(30),
            batch_concurrency: 50,
            cc: CcIndexConfig::default(),
            es_host: "http://localhost:9200".to_string(),
            es_username: String::new(),
            es_password: String::new(),
            firecrawl_api_key: String::new(),
            firecrawl_max_age_ms: firecrawl_client::DEFAULT_MAX_AGE_MS,
            exa_api_key: String::new(),
            ccwarc_bin: String::new(),
            cclinks_bin: String::new(),
        }
    }
}

impl HindsightConfig {
    pub fn from_env() -> Self {
        let env = Config::from_env();
        Self {
            cc: CcIndexConfig {
                data_dir: env.data_dir.clone(),
                ..CcIndexConfig::default()
            },
            es_host: env.es_host,
            es_username: env.es_username,
            es_password: env.es_password,
            firecrawl_api_key: env.firecrawl_api_key,
            exa_api_key: env.exa_api_key,
            ccwarc_bin: env.ccwarc_bin,
            cclinks_bin: env.cclinks_bin,
            ..Self::default()
        }
    }
}

pub struct Hindsight {
    config: HindsightConfig,
    client: reqwest::Client,
    wayback: Option<Arc<Wayback>>,
    cc_index: Option<Arc<CcIndex>>,
    cc_warc: Option<Arc<CcWarcFetcher>>,
    cc_links: Option<Arc<CcLinksExtractor>>,
    memento: Option<Arc<Memento>>,
    elastic: Option<Arc<EsBridge>>,
    firecrawl: Option<Arc<FirecrawlAdapter>>,
    exa: Option<Arc<ExaAdapter>>,
}

impl Hindsight {
    pub fn new(config: HindsightConfig) -> Self {
        // One shared client for every adapter; private clients are a
        // test-only path inside individual adapters.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .gzip(true)
            .build()
            .expect("Failed to build HTTP client");

        let wayback = config
            .enable_wayback
            .then(|| Arc::new(Wayback::new(client.clone())));
        let cc_index = config
            .enable_cc
            .then(|| Arc::new(CcIndex::new(client.clone(), config.cc.clone())));
        let cc_warc = config.enable_cc.then(|| {
            Arc::new(CcWarcFetcher::new(&config.ccwarc_bin, &config.cc.archive))
        });
        let cc_links = config.enable_cc.then(|| {
            Arc::new(CcLinksExtractor::new(&config.cclinks_bin, &config.cc.archive))
        });
        let memento = config
            .enable_memento
            .then(|| Arc::new(Memento::new(client.clone())));
        let elastic = config.enable_elastic.then(|| {
            Arc::new(EsBridge::new(
                client.clone(),
                &config.es_host,
                &config.es_username,
                &config.es_password,
            ))
        });
        let firecrawl = (config.enable_paid && !config.firecrawl_api_key.is_empty()).then(|| {
            Arc::new(
                FirecrawlAdapter::new(config.firecrawl_api_key.clone())
                    .with_max_age_ms(config.firecrawl_max_age_ms),
            )
        });
        let exa = (config.enable_paid && !config.exa_api_key.is_empty())
            .then(|| Arc::new(ExaAdapter::new(config.exa_api_key.clone())));

        if config.enable_paid && firecrawl.is_none() {
            debug!("paid sources enabled but FIRECRAWL_API_KEY missing; firecrawl skipped");
        }

        Self {
            config,
            client,
            wayback,
            cc_index,
            cc_warc,
            cc_links,
            memento,
            elastic,
            firecrawl,
            exa,
        }
    }

    pub fn from_env() -> Self {
        Self::new(HindsightConfig::from_env())
    }

    pub fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub fn config(&self) -> &HindsightConfig {
        &self.config
    }

    // --- Adapter accessors (shared with the mapper and differ) ---

    pub fn wayback(&self) -> Option<Arc<Wayback>> {
        self.wayback.clone()
    }

    pub fn cc(&self) -> Option<Arc<CcIndex>> {
        self.cc_index.clone()
    }

    pub fn cc_warc(&self) -> Option<Arc<CcWarcFetcher>> {
        self.cc_warc.clone()
    }

    pub fn cc_links(&self) -> Option<Arc<CcLinksExtractor>> {
        self.cc_links.clone()
    }

    pub fn memento(&self) -> Option<Arc<Memento>> {
        self.memento.clone()
    }

    pub fn elastic(&self) -> Option<Arc<EsBridge>> {
        self.elastic.clone()
    }

    pub fn exa(&self) -> Option<Arc<ExaAdapter>> {
        self.exa.clone()
    }

    /// Streaming keyword searcher sharing this orchestrator's HTTP client.
    pub fn searcher(&self) -> ArchiveSearcher {
        ArchiveSearcher::new(self.client.clone(), SearchConfig::default())
    }

    /// Stream keyword matches across the archive year grid. Convenience
    /// over [`Hindsight::searcher`] with default search settings.
    pub fn search_keywords_streaming(
        &self,
        request: crate::search::SearchRequest,
    ) -> impl futures::Stream<Item = crate::search::ArchiveEvent> + Send {
        self.searcher().search_keywords_streaming(request)
    }

    // ------------------------------------------------------------------
    // Racing fetch
    // ------------------------------------------------------------------

    /// Fetch archived content for a URL. With `prefer` set only that
    /// source is tried; otherwise every enabled source races and the
    /// first usable result wins per the configured `RaceMode`.
    pub async fn fetch(
        &self,
        url: &str,
        range: &DateRange,
        prefer: Option<ArchiveSource>,
        timeout: Option<Duration>,
    ) -> Result<FetchResult> {
        require_url(url)?;
        if range.is_inverted() {
            return Ok(FetchResult::empty(url));
        }

        if let Some(source) = prefer {
            return self.fetch_from(url, range, source).await;
        }

        let tasks = self.spawn_fetch_tasks(url, range);
        if tasks.is_empty() {
            return Ok(FetchResult::empty(url));
        }

        let budget = timeout.unwrap_or(self.config.fetch_timeout);
        let result = match self.config.race_mode {
            RaceMode::GatherAll => self.gather_all(tasks, budget).await,
            RaceMode::FirstSuccess => self.first_success(tasks, budget).await,
        };

        Ok(result.unwrap_or_else(|| FetchResult::empty(url)))
    }

    fn spawn_fetch_tasks(
        &self,
        url: &str,
        range: &DateRange,
    ) -> Vec<tokio::task::JoinHandle<FetchResult>> {
        let mut tasks = Vec::new();
        let url = url.to_string();
        let range = range.clone();

        // Insertion order is priority order for GatherAll.
        if let Some(wayback) = self.wayback.clone() {
            let (u, r) = (url.clone(), range.clone());
            tasks.push(tokio::spawn(async move {
                wayback
                    .fetch_at(&u, &r, None)
                    .await
                    .unwrap_or_else(|_| FetchResult::empty(&u))
            }));
        }
        if self.cc_index.is_some() {
            let cc_index = self.cc_index.clone();
            let cc_warc = self.cc_warc.clone();
            let (u, r) = (url.clone(), range.clone());
            tasks.push(tokio::spawn(async move {
                fetch_cc(cc_index, cc_warc, &u, &r).await
            }));
        }
        if let Some(memento) = self.memento.clone() {
            let (u, r) = (url.clone(), range.clone());
            tasks.push(tokio::spawn(async move {
                memento
                    .fetch_preferred(&u, &r, None)
                    .await
                    .unwrap_or_else(|_| FetchResult::empty(&u))
            }));
        }
        if let Some(firecrawl) = self.firecrawl.clone() {
            let u = url.clone();
            tasks.push(tokio::spawn(async move {
                firecrawl
                    .fetch_cached(&u, false)
                    .await
                    .unwrap_or_else(|_| FetchResult::empty(&u))
            }));
        }

        tasks
    }

    /// Await every task under the budget, then scan insertion order for
    /// the first success. On budget expiry whatever already finished is
    /// scanned and the rest are aborted.
    async fn gather_all(
        &self,
        tasks: Vec<tokio::task::JoinHandle<FetchResult>>,
        budget: Duration,
    ) -> Option<FetchResult> {
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        let mut arrived: Vec<Option<FetchResult>> = (0..tasks.len()).map(|_| None).collect();

        let mut indexed: FuturesUnordered<_> = tasks
            .into_iter()
            .enumerate()
            .map(|(i, handle)| async move { (i, handle.await) })
            .collect();

        let deadline = tokio::time::Instant::now() + budget;
        loop {
            match tokio::time::timeout_at(deadline, indexed.next()).await {
                Ok(Some((i, Ok(result)))) => arrived[i] = Some(result),
                // A panicked source must not poison the race.
                Ok(Some((_, Err(_)))) => continue,
                Ok(None) => break,
                Err(_) => {
                    debug!("fetch race timed out; scanning partial results");
                    for abort in &aborts {
                        abort.abort();
                    }
                    break;
                }
            }
        }

        // First success in insertion order (source priority order).
        arrived.into_iter().flatten().find(FetchResult::success)
    }

    /// Resolve on the first task whose result has content; abort the rest.
    async fn first_success(
        &self,
        tasks: Vec<tokio::task::JoinHandle<FetchResult>>,
        budget: Duration,
    ) -> Option<FetchResult> {
        let mut pending: FuturesUnordered<_> = tasks.into_iter().collect();
        let deadline = tokio::time::Instant::now() + budget;

        let winner = loop {
            let next = tokio::time::timeout_at(deadline, pending.next()).await;
            match next {
                Ok(Some(Ok(result))) if result.success() => break Some(result),
                Ok(Some(_)) => continue, // failed source or panicked task
                Ok(None) => break None,  // all losers
                Err(_) => {
                    debug!("fetch race timed out");
                    break None;
                }
            }
        };

        // Cancel whatever is still in flight.
        for handle in pending.iter() {
            handle.abort();
        }
        winner
    }

    async fn fetch_from(
        &self,
        url: &str,
        range: &DateRange,
        source: ArchiveSource,
    ) -> Result<FetchResult> {
        match source {
            ArchiveSource::WaybackData | ArchiveSource::WaybackCdx => match &self.wayback {
                Some(wb) => wb.fetch_at(url, range, None).await,
                None => Ok(FetchResult::empty(url)),
            },
            ArchiveSource::CcData | ArchiveSource::CcIndex | ArchiveSource::CcWat => {
                Ok(fetch_cc(self.cc_index.clone(), self.cc_warc.clone(), url, range).await)
            }
            ArchiveSource::Memento => match &self.memento {
                Some(m) => m.fetch_preferred(url, range, None).await,
                None => Ok(FetchResult::empty(url)),
            },
            ArchiveSource::FirecrawlCache => match &self.firecrawl {
                Some(fc) => fc.fetch_cached(url, false).await,
                None => Ok(FetchResult::empty(url)),
            },
            // Index-query sources have nothing to fetch.
            _ => Ok(FetchResult::empty(url)),
        }
    }

    /// Fetch many URLs, each as its own race, bounded in flight.
    pub async fn fetch_batch(
        &self,
        urls: &[String],
        range: &DateRange,
    ) -> Result<Vec<FetchResult>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.batch_concurrency));
        let fetches = urls.iter().map(|url| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await;
                self.fetch(url, range, None, None)
                    .await
                    .unwrap_or_else(|_| FetchResult::empty(url))
            }
        });

        Ok(futures::future::join_all(fetches).await)
    }

    /// High-throughput batch fetch straight from CommonCrawl WARC data.
    /// Falls back to per-URL racing when the native fetcher is absent.
    pub async fn fetch_batch_cc(&self, domains: &[String]) -> Result<Vec<FetchResult>> {
        if domains.is_empty() {
            return Ok(Vec::new());
        }

        let warc = self.cc_warc.as_ref().filter(|w| w.available());
        let Some(warc) = warc else {
            info!("ccwarc unavailable - falling back to racing fetch per domain");
            let urls: Vec<String> = domains.iter().map(|d| format!("https://{d}")).collect();
            return self.fetch_batch(&urls, &DateRange::default()).await;
        };

        let pages = warc
            .batch_fetch(domains, DEFAULT_THREADS, DEFAULT_TIMEOUT_SECS)
            .await;
        info!(
            fetched = pages.len(),
            requested = domains.len(),
            "CC batch fetch complete"
        );
        Ok(pages.into_iter().map(warc_page_to_result).collect())
    }

    // ------------------------------------------------------------------
    // Index fan-outs
    // ------------------------------------------------------------------

    /// True if any enabled index knows the URL.
    pub async fn exists(&self, url: &str, range: &DateRange) -> Result<bool> {
        require_url(url)?;
        if range.is_inverted() {
            return Ok(false);
        }

        let wayback = self.wayback.clone();
        let cc = self.cc_index.clone();
        let (wb_hit, cc_hit) = tokio::join!(
            async {
                match wayback {
                    Some(wb) => wb.exists(url, range).await.unwrap_or(false),
                    None => false,
                }
            },
            async {
                match cc {
                    Some(cc) => cc.url_exists(url).await.unwrap_or(false),
                    None => false,
                }
            }
        );
        Ok(wb_hit || cc_hit)
    }

    /// Union of snapshots across all enabled sources, newest first,
    /// deduplicated by digest (or URL + day when a source has no digest).
    pub async fn list_snapshots(
        &self,
        url: &str,
        range: &DateRange,
        limit_per_source: usize,
    ) -> Result<Vec<Snapshot>> {
        require_url(url)?;
        if range.is_inverted() {
            return Ok(Vec::new());
        }

        let wayback = self.wayback.clone();
        let cc = self.cc_index.clone();
        let memento = self.memento.clone();

        let (wb, cc, mem) = tokio::join!(
            async {
                match wayback {
                    Some(a) => a
                        .list_snapshots(url, range, limit_per_source)
                        .await
                        .unwrap_or_default(),
                    None => Vec::new(),
                }
            },
            async {
                match cc {
                    Some(a) => a
                        .list_snapshots(url, range, limit_per_source)
                        .await
                        .unwrap_or_default(),
                    None => Vec::new(),
                }
            },
            async {
                match memento {
                    Some(a) => a
                        .list_snapshots(url, range, limit_per_source)
                        .await
                        .unwrap_or_default(),
                    None => Vec::new(),
                }
            }
        );

        let mut all: Vec<Snapshot> = wb.into_iter().chain(cc).chain(mem).collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut seen: HashSet<String> = HashSet::new();
        all.retain(|s| seen.insert(s.dedup_key()));
        Ok(all)
    }

    // ------------------------------------------------------------------
    // Elasticsearch passthroughs
    // ------------------------------------------------------------------

    pub async fn search_wdc_orgs(&self, query: &str, limit: usize) -> Vec<serde_json::Value> {
        match &self.elastic {
            Some(es) => es.search_wdc_orgs(query, limit).await,
            None => Vec::new(),
        }
    }

    pub async fn search_wdc_persons(&self, query: &str, limit: usize) -> Vec<serde_json::Value> {
        match &self.elastic {
            Some(es) => es.search_wdc_persons(query, limit).await,
            None => Vec::new(),
        }
    }

    pub async fn search_webgraph(&self, domain: &str, limit: usize) -> Vec<serde_json::Value> {
        match &self.elastic {
            Some(es) => {
                es.search_webgraph(domain, crate::sources::es_bridge::LinkDirection::Both, limit, false)
                    .await
            }
            None => Vec::new(),
        }
    }

    pub async fn search_domains(&self, query: &str, limit: usize) -> Vec<serde_json::Value> {
        match &self.elastic {
            Some(es) => es.search_domains(query, limit, true).await,
            None => Vec::new(),
        }
    }

    pub async fn search_cc_pdfs(
        &self,
        query: &str,
        jurisdiction: Option<&str>,
        limit: usize,
    ) -> Vec<serde_json::Value> {
        match &self.elastic {
            Some(es) => es.search_cc_pdfs(query, jurisdiction, limit).await,
            None => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Extractors
    // ------------------------------------------------------------------

    /// Pull tracking codes out of the best archived copy of a URL.
    pub async fn extract_ga_codes(&self, url: &str) -> Result<GaCodes> {
        let result = self.fetch(url, &DateRange::default(), None, None).await?;
        Ok(match result.body() {
            Some(body) => extract_ga_codes(body),
            None => GaCodes::default(),
        })
    }
}

/// CommonCrawl content fetch: prefer the native WARC fetcher, fall back to
/// index-only metadata when the binary is absent.
async fn fetch_cc(
    cc_index: Option<Arc<CcIndex>>,
    cc_warc: Option<Arc<CcWarcFetcher>>,
    url: &str,
    range: &DateRange,
) -> FetchResult {
    if let Some(warc) = cc_warc.filter(|w| w.available()) {
        if let Some(page) = warc.fetch_single(url).await {
            if page.html.as_deref().is_some_and(|h| !h.is_empty()) {
                return warc_page_to_result(page);
            }
        }
    }

    match cc_index {
        Some(index) => match SourceAdapter::fetch(index.as_ref(), url, range).await {
            Ok(result) => result,
            Err(_) => FetchResult::empty(url),
        },
        None => FetchResult::empty(url),
    }
}

fn warc_page_to_result(page: WarcPage) -> FetchResult {
    FetchResult {
        url: page.url,
        html: page.html,
        content: page.text,
        timestamp: page.timestamp,
        source: Some(ArchiveSource::CcData),
        status_code: page.status,
        mime_type: page.mime,
        digest: page.digest,
        metadata: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled() -> HindsightConfig {
        HindsightConfig {
            enable_cc: false,
            enable_wayback: false,
            enable_memento: false,
            enable_elastic: false,
            enable_paid: false,
            ..HindsightConfig::default()
        }
    }

    #[tokio::test]
    async fn no_enabled_sources_returns_empty_immediately() {
        let hs = Hindsight::new(disabled());
        let result = hs
            .fetch("https://example.com", &DateRange::default(), None, None)
            .await
            .unwrap();
        assert!(!result.success());
        assert!(result.source.is_none());
    }

    #[tokio::test]
    async fn prefer_on_disabled_source_is_empty_not_mislabeled() {
        let hs = Hindsight::new(disabled());
        for source in [
            ArchiveSource::WaybackData,
            ArchiveSource::CcData,
            ArchiveSource::Memento,
            ArchiveSource::FirecrawlCache,
            ArchiveSource::ExaHistorical,
        ] {
            let result = hs
                .fetch("https://example.com", &DateRange::default(), Some(source), None)
                .await
                .unwrap();
            // Either the preferred source answered, or nothing did.
            assert!(result.source == Some(source) || !result.success());
        }
    }

    #[tokio::test]
    async fn empty_url_is_rejected_before_any_dispatch() {
        let hs = Hindsight::new(disabled());
        assert!(hs
            .fetch("", &DateRange::default(), None, None)
            .await
            .is_err());
        assert!(hs.exists("", &DateRange::default()).await.is_err());
        assert!(hs
            .list_snapshots(" ", &DateRange::default(), 10)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn inverted_range_short_circuits() {
        let hs = Hindsight::new(disabled());
        let range = DateRange::new(Some("2024-01-01"), Some("2020-01-01"));
        assert!(!hs.exists("https://example.com", &range).await.unwrap());
        assert!(hs
            .list_snapshots("https://example.com", &range, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn empty_batches_make_no_calls() {
        let hs = Hindsight::new(disabled());
        assert!(hs
            .fetch_batch(&[], &DateRange::default())
            .await
            .unwrap()
            .is_empty());
        assert!(hs.fetch_batch_cc(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn es_passthroughs_without_bridge_are_empty() {
        let hs = Hindsight::new(disabled());
        assert!(hs.search_wdc_orgs("acme", 10).await.is_empty());
        assert!(hs.search_webgraph("example.com", 10).await.is_empty());
        assert!(hs.search_cc_pdfs("report", Some("DE"), 10).await.is_empty());
    }
}
