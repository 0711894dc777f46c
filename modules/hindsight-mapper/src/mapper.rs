//! Unified domain URL discovery: every enabled source produces into one
//! bounded channel, the merge loop dedups on normalized URL and yields in
//! arrival order — fast sources (sitemaps, crt.sh) surface in seconds
//! while backlink APIs are still working.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::Stream;
use hindsight_archive::{CcIndex, CcIndexConfig, EsBridge, Memento, Wayback};
use hindsight_common::{normalize_domain, normalize_url, Config, HindsightError, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::model::{DiscoveredUrl, DomainMap, MapFilters};
use crate::rate_limit::RateLimiter;
use crate::sources::subdomains::{CrtShProvider, SubdomainProvider};
use crate::sources::{archives, backlinks, search_engines, sitemaps, subdomains, ProducerMsg, Tx};

#[derive(Debug, Clone)]
pub struct MapperConfig {
    pub enable_wayback: bool,
    pub enable_commoncrawl: bool,
    /// Off by default: the aggregator is slow and overlaps Wayback.
    pub enable_memento: bool,
    pub enable_subdomains: bool,
    pub enable_search_engines: bool,
    pub enable_sitemaps: bool,
    pub enable_backlinks: bool,
    pub enable_elastic: bool,
    pub channel_capacity: usize,
    /// Max results per search engine.
    pub search_engine_limit: usize,
    pub google_rps: f64,
    pub brave_rps: f64,
    pub majestic_rps: f64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            enable_wayback: true,
            enable_commoncrawl: true,
            enable_memento: false,
            enable_subdomains: true,
            enable_search_engines: true,
            enable_sitemaps: true,
            enable_backlinks: true,
            enable_elastic: true,
            channel_capacity: 1024,
            search_engine_limit: 200,
            google_rps: 1.0,
            brave_rps: 1.0,
            majestic_rps: 1.0,
        }
    }
}

pub struct Mapper {
    client: reqwest::Client,
    config: MapperConfig,
    keys: Config,
    wayback: Arc<Wayback>,
    cc: Arc<CcIndex>,
    memento: Arc<Memento>,
    es: Arc<EsBridge>,
    subdomain_providers: Vec<Arc<dyn SubdomainProvider>>,
    google_limiter: Arc<RateLimiter>,
    brave_limiter: Arc<RateLimiter>,
    majestic_limiter: Arc<RateLimiter>,
}

impl Mapper {
    pub fn new(client: reqwest::Client, config: MapperConfig, keys: Config) -> Self {
        let cc_config = CcIndexConfig {
            data_dir: keys.data_dir.clone(),
            ..CcIndexConfig::default()
        };
        let google_limiter = Arc::new(RateLimiter::per_second(config.google_rps));
        let brave_limiter = Arc::new(RateLimiter::per_second(config.brave_rps));
        let majestic_limiter = Arc::new(RateLimiter::per_second(config.majestic_rps));

        Self {
            wayback: Arc::new(Wayback::new(client.clone())),
            cc: Arc::new(CcIndex::new(client.clone(), cc_config)),
            memento: Arc::new(Memento::new(client.clone())),
            es: Arc::new(EsBridge::new(
                client.clone(),
                &keys.es_host,
                &keys.es_username,
                &keys.es_password,
            )),
            subdomain_providers: vec![Arc::new(CrtShProvider::new(client.clone()))],
            google_limiter,
            brave_limiter,
            majestic_limiter,
            client,
            config,
            keys,
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        Self::new(client, MapperConfig::default(), Config::from_env())
    }

    /// Replace the subdomain enumeration backends (the default is crt.sh
    /// alone; commercial providers plug in here).
    pub fn with_subdomain_providers(
        mut self,
        providers: Vec<Arc<dyn SubdomainProvider>>,
    ) -> Self {
        self.subdomain_providers = providers;
        self
    }

    /// Stream discoveries in arrival order, deduplicated on normalized
    /// URL (first occurrence wins) unless `filters.dedupe` is off.
    pub fn map_domain_stream(
        &self,
        domain: &str,
        filters: MapFilters,
    ) -> impl Stream<Item = DiscoveredUrl> + Send {
        let dedupe = filters.dedupe;
        let mut rx = self.launch(domain, &filters);

        async_stream::stream! {
            let mut seen: HashSet<String> = HashSet::new();
            while let Some(msg) = rx.recv().await {
                if let ProducerMsg::Url(url) = msg {
                    if dedupe && !seen.insert(normalize_url(&url.url)) {
                        continue;
                    }
                    yield url;
                }
            }
        }
    }

    /// Accumulate the full map with per-source and per-year statistics.
    pub async fn map_domain(&self, domain: &str, filters: MapFilters) -> Result<DomainMap> {
        if domain.trim().is_empty() {
            return Err(HindsightError::InvalidInput("empty domain".into()));
        }

        let mut map = DomainMap::new(domain);
        map.deduplicated = filters.dedupe;
        if filters.range.is_inverted() {
            return Ok(map);
        }

        let mut rx = self.launch(domain, &filters);
        let mut seen: HashSet<String> = HashSet::new();
        let mut total = 0usize;

        while let Some(msg) = rx.recv().await {
            match msg {
                ProducerMsg::Url(url) => {
                    total += 1;
                    if filters.dedupe && !seen.insert(normalize_url(&url.url)) {
                        continue;
                    }
                    map.record(&url);
                    map.urls.push(url);
                }
                ProducerMsg::Done { source, count } => {
                    map.sources_completed.insert(source.to_string(), count);
                }
                ProducerMsg::Failed { source, error } => {
                    map.sources_failed.insert(source.to_string(), error);
                }
            }
        }

        map.total_urls = total;
        map.unique_urls = map.urls.len();
        map.completed_at = Utc::now();
        map.duration_ms = (map.completed_at - map.started_at).num_milliseconds();
        info!(
            domain = %map.domain,
            unique = map.unique_urls,
            total = map.total_urls,
            sources = map.sources_completed.len(),
            failed = map.sources_failed.len(),
            "domain mapping complete"
        );
        Ok(map)
    }

    /// Spawn one producer per enabled source. The receiver closes when
    /// the last producer drops its sender.
    fn launch(&self, domain: &str, filters: &MapFilters) -> mpsc::Receiver<ProducerMsg> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let domain = normalize_domain(domain);
        if domain.is_empty() || filters.range.is_inverted() {
            return rx; // tx drops here; the stream ends immediately
        }

        if self.config.enable_wayback {
            spawn_producer(
                "wayback",
                &tx,
                archives::discover_wayback(
                    self.wayback.clone(),
                    domain.clone(),
                    filters.clone(),
                    tx.clone(),
                ),
            );
        }
        if self.config.enable_commoncrawl {
            spawn_producer(
                "commoncrawl",
                &tx,
                archives::discover_commoncrawl(
                    self.cc.clone(),
                    domain.clone(),
                    filters.clone(),
                    tx.clone(),
                ),
            );
        }
        if self.config.enable_memento {
            spawn_producer(
                "memento",
                &tx,
                archives::discover_memento(
                    self.memento.clone(),
                    domain.clone(),
                    filters.clone(),
                    tx.clone(),
                ),
            );
        }
        if self.config.enable_subdomains && !self.subdomain_providers.is_empty() {
            spawn_producer(
                "subdomains",
                &tx,
                subdomains::discover_subdomains(
                    self.subdomain_providers.clone(),
                    domain.clone(),
                    tx.clone(),
                ),
            );
        }
        if self.config.enable_sitemaps {
            spawn_producer(
                "sitemap",
                &tx,
                sitemaps::discover_sitemaps(
                    self.client.clone(),
                    domain.clone(),
                    filters.limit_per_source,
                    tx.clone(),
                ),
            );
        }
        if self.config.enable_search_engines {
            spawn_producer(
                "google",
                &tx,
                search_engines::discover_google(
                    self.client.clone(),
                    self.keys.google_api_key.clone(),
                    self.keys.google_cse_id.clone(),
                    domain.clone(),
                    self.config.search_engine_limit,
                    self.google_limiter.clone(),
                    tx.clone(),
                ),
            );
            spawn_producer(
                "bing",
                &tx,
                search_engines::discover_bing(
                    self.client.clone(),
                    self.keys.serpapi_key.clone(),
                    domain.clone(),
                    self.config.search_engine_limit,
                    tx.clone(),
                ),
            );
            spawn_producer(
                "brave",
                &tx,
                search_engines::discover_brave(
                    self.client.clone(),
                    self.keys.brave_api_key.clone(),
                    domain.clone(),
                    self.brave_limiter.clone(),
                    tx.clone(),
                ),
            );
            spawn_producer(
                "duckduckgo",
                &tx,
                search_engines::discover_duckduckgo(
                    self.client.clone(),
                    domain.clone(),
                    tx.clone(),
                ),
            );
        }
        if self.config.enable_backlinks {
            spawn_producer(
                "majestic",
                &tx,
                backlinks::discover_majestic(
                    self.client.clone(),
                    self.keys.majestic_api_key.clone(),
                    domain.clone(),
                    1000,
                    self.majestic_limiter.clone(),
                    tx.clone(),
                ),
            );
            spawn_producer(
                "cc_webgraph",
                &tx,
                backlinks::discover_es_webgraph(
                    self.es.clone(),
                    domain.clone(),
                    filters.limit_per_source,
                    tx.clone(),
                ),
            );
        }
        if self.config.enable_elastic {
            spawn_producer(
                "elasticsearch",
                &tx,
                backlinks::discover_es_pages(
                    self.es.clone(),
                    domain.clone(),
                    filters.limit_per_source,
                    tx.clone(),
                ),
            );
        }

        rx
    }
}

fn spawn_producer<F>(name: &'static str, tx: &Tx, work: F)
where
    F: Future<Output = anyhow::Result<usize>> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        match work.await {
            Ok(count) => {
                let _ = tx.send(ProducerMsg::Done { source: name, count }).await;
            }
            Err(e) => {
                debug!(source = name, error = %e, "discovery source failed");
                let _ = tx
                    .send(ProducerMsg::Failed {
                        source: name,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;

    struct StubProvider {
        name: &'static str,
        hosts: Vec<String>,
    }

    #[async_trait]
    impl SubdomainProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn enumerate(&self, _domain: &str) -> anyhow::Result<Vec<String>> {
            Ok(self.hosts.clone())
        }
    }

    fn offline_config() -> MapperConfig {
        MapperConfig {
            enable_wayback: false,
            enable_commoncrawl: false,
            enable_memento: false,
            enable_subdomains: true,
            enable_search_engines: false,
            enable_sitemaps: false,
            enable_backlinks: false,
            enable_elastic: false,
            ..MapperConfig::default()
        }
    }

    fn offline_keys() -> Config {
        Config {
            es_host: String::new(),
            es_username: String::new(),
            es_password: String::new(),
            firecrawl_api_key: String::new(),
            exa_api_key: String::new(),
            google_api_key: String::new(),
            google_cse_id: String::new(),
            serpapi_key: String::new(),
            brave_api_key: String::new(),
            majestic_api_key: String::new(),
            ccwarc_bin: String::new(),
            cclinks_bin: String::new(),
            data_dir: std::env::temp_dir(),
        }
    }

    fn stub_mapper(providers: Vec<Arc<dyn SubdomainProvider>>) -> Mapper {
        Mapper::new(reqwest::Client::new(), offline_config(), offline_keys())
            .with_subdomain_providers(providers)
    }

    #[tokio::test]
    async fn empty_domain_is_a_precondition_violation() {
        let mapper = stub_mapper(vec![]);
        assert!(mapper.map_domain("  ", MapFilters::default()).await.is_err());
    }

    #[tokio::test]
    async fn inverted_range_returns_empty_without_work() {
        let mapper = stub_mapper(vec![Arc::new(StubProvider {
            name: "stub",
            hosts: vec!["a.example.com".into()],
        })]);
        let filters = MapFilters {
            range: hindsight_common::DateRange::new(Some("2024-01-01"), Some("2020-01-01")),
            ..MapFilters::default()
        };
        let map = mapper.map_domain("example.com", filters).await.unwrap();
        assert!(map.urls.is_empty());
        assert!(map.sources_completed.is_empty());
    }

    #[tokio::test]
    async fn merge_dedups_across_providers_and_counts_totals() {
        let providers: Vec<Arc<dyn SubdomainProvider>> = vec![
            Arc::new(StubProvider {
                name: "stub-a",
                hosts: vec!["a.example.com".into(), "b.example.com".into()],
            }),
            Arc::new(StubProvider {
                name: "stub-b",
                // Overlaps stub-a; provider-level dedup collapses it.
                hosts: vec!["a.example.com".into(), "c.example.com".into()],
            }),
        ];
        let mapper = stub_mapper(providers);

        let map = mapper
            .map_domain("example.com", MapFilters::default())
            .await
            .unwrap();
        let mut urls: Vec<&str> = map.urls.iter().map(|u| u.url.as_str()).collect();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "https://a.example.com/",
                "https://b.example.com/",
                "https://c.example.com/",
            ]
        );
        assert_eq!(map.unique_urls, 3);
        assert_eq!(map.sources_completed.get("subdomains"), Some(&3));
        assert!(map.sources_failed.is_empty());
    }

    #[tokio::test]
    async fn stream_yields_in_arrival_order_with_dedup() {
        let mapper = stub_mapper(vec![Arc::new(StubProvider {
            name: "stub",
            hosts: vec!["a.example.com".into(), "b.example.com".into()],
        })]);

        let stream = mapper.map_domain_stream("example.com", MapFilters::default());
        let urls: Vec<DiscoveredUrl> = stream.collect().await;
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].url, "https://a.example.com/");
        assert_eq!(urls[0].source, "stub");
        assert_eq!(urls[0].subdomain.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn failing_provider_reports_without_poisoning_the_run() {
        struct FailingProvider;
        #[async_trait]
        impl SubdomainProvider for FailingProvider {
            fn name(&self) -> &'static str {
                "failing"
            }
            async fn enumerate(&self, _domain: &str) -> anyhow::Result<Vec<String>> {
                anyhow::bail!("upstream exploded")
            }
        }

        // Provider errors are swallowed inside discover_subdomains; the
        // run completes with whatever the healthy providers found.
        let providers: Vec<Arc<dyn SubdomainProvider>> = vec![
            Arc::new(FailingProvider),
            Arc::new(StubProvider {
                name: "stub",
                hosts: vec!["ok.example.com".into()],
            }),
        ];
        let map = stub_mapper(providers)
            .map_domain("example.com", MapFilters::default())
            .await
            .unwrap();
        assert_eq!(map.unique_urls, 1);
        assert_eq!(map.sources_completed.get("subdomains"), Some(&1));
    }
}
