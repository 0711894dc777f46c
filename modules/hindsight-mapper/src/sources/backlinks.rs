//! Backlink discovery: pages that link TO the target domain. Majestic
//! returns the linked-to target pages with trust metrics; the ES web
//! graph returns the referring hosts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use hindsight_archive::EsBridge;
use tracing::debug;

use crate::model::{DiscoveredUrl, SourceDetails};
use crate::rate_limit::RateLimiter;
use crate::sources::{emit, Tx};

const MAJESTIC_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) async fn discover_majestic(
    client: reqwest::Client,
    api_key: String,
    domain: String,
    max_results: usize,
    limiter: Arc<RateLimiter>,
    tx: Tx,
) -> anyhow::Result<usize> {
    if api_key.is_empty() {
        debug!("majestic: no API key, skipping");
        return Ok(0);
    }

    limiter.acquire().await;
    let count_s = max_results.to_string();
    let resp = client
        .get("https://api.majestic.com/api/json")
        .query(&[
            ("app_api_key", api_key.as_str()),
            ("cmd", "GetBackLinkData"),
            ("item", domain.as_str()),
            ("Count", count_s.as_str()),
            ("datasource", "fresh"),
            ("Mode", "0"),
        ])
        .timeout(MAJESTIC_TIMEOUT)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("majestic returned HTTP {}", resp.status());
    }

    let body: serde_json::Value = resp.json().await?;
    let rows = body["DataTables"]["BackLinks"]["Data"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut seen: HashSet<String> = HashSet::new();
    let mut count = 0;
    for row in rows {
        // The linked-to page reveals what on the target matters enough to
        // earn links.
        let Some(target) = row["TargetURL"].as_str() else {
            continue;
        };
        if !seen.insert(target.to_string()) {
            continue;
        }
        let url = DiscoveredUrl::new(target, domain.clone(), "majestic").with_details(
            SourceDetails::Backlink {
                trust_flow: row["SourceTrustFlow"].as_u64().map(|v| v as u32),
                citation_flow: row["SourceCitationFlow"].as_u64().map(|v| v as u32),
                ref_domains: row["RefDomains"].as_u64().map(|v| v as u32),
            },
        );
        if !emit(&tx, url).await {
            break;
        }
        count += 1;
    }
    Ok(count)
}

/// Referring hosts from the CC web graph edge index.
pub(crate) async fn discover_es_webgraph(
    es: Arc<EsBridge>,
    domain: String,
    max_results: usize,
    tx: Tx,
) -> anyhow::Result<usize> {
    let edges = es.backlinks(&domain, max_results).await;

    let mut seen: HashSet<String> = HashSet::new();
    let mut count = 0;
    for edge in edges {
        let Some(source_host) = edge["source_host"].as_str() else {
            continue;
        };
        if !seen.insert(source_host.to_string()) {
            continue;
        }
        let url = DiscoveredUrl::new(
            format!("https://{source_host}/"),
            domain.clone(),
            "cc_webgraph",
        )
        .with_details(SourceDetails::Backlink {
            trust_flow: None,
            citation_flow: None,
            ref_domains: None,
        });
        if !emit(&tx, url).await {
            break;
        }
        count += 1;
    }
    Ok(count)
}

/// Locally crawled pages already indexed for the domain.
pub(crate) async fn discover_es_pages(
    es: Arc<EsBridge>,
    domain: String,
    max_results: usize,
    tx: Tx,
) -> anyhow::Result<usize> {
    let hits = es
        .raw_search(
            "crawled_pages",
            serde_json::json!({"term": {"domain": domain}}),
            max_results,
        )
        .await;

    let mut count = 0;
    for hit in hits {
        let Some(url) = hit["url"].as_str() else {
            continue;
        };
        let discovered = DiscoveredUrl::new(url, domain.clone(), "elasticsearch").with_details(
            SourceDetails::Search {
                title: hit["title"].as_str().map(str::to_string),
                description: None,
            },
        );
        if !emit(&tx, discovered).await {
            break;
        }
        count += 1;
    }
    Ok(count)
}
