//! Search-engine discovery via `site:` queries: Google Custom Search,
//! Bing through SerpAPI (four markets in parallel), Brave, and the
//! DuckDuckGo HTML endpoint. Engines without a configured key skip
//! cleanly.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::model::{DiscoveredUrl, SourceDetails};
use crate::rate_limit::RateLimiter;
use crate::sources::{emit, Tx};

const ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bing markets queried in parallel; each surfaces a different slice of
/// the index.
const BING_MARKETS: &[&str] = &["en-US", "en-GB", "de-DE", "fr-FR"];

pub(crate) async fn discover_google(
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
    domain: String,
    max_results: usize,
    limiter: Arc<RateLimiter>,
    tx: Tx,
) -> anyhow::Result<usize> {
    if api_key.is_empty() || cse_id.is_empty() {
        debug!("google: no API key or CSE id, skipping");
        return Ok(0);
    }

    let query = format!("site:{domain}");
    let mut count = 0;
    let mut start = 1u32;

    while count < max_results {
        limiter.acquire().await;

        let start_s = start.to_string();
        let resp = client
            .get("https://www.googleapis.com/customsearch/v1")
            .query(&[
                ("key", api_key.as_str()),
                ("cx", cse_id.as_str()),
                ("q", query.as_str()),
                ("start", start_s.as_str()),
                ("num", "10"),
            ])
            .timeout(ENGINE_TIMEOUT)
            .send()
            .await?;

        match resp.status().as_u16() {
            200 => {}
            429 => {
                warn!("google: rate limited, stopping");
                break;
            }
            status => {
                debug!(status, "google: query failed");
                break;
            }
        }

        let body: serde_json::Value = resp.json().await?;
        let Some(items) = body["items"].as_array().filter(|i| !i.is_empty()) else {
            break;
        };

        for item in items {
            let Some(link) = item["link"].as_str() else {
                continue;
            };
            let url = DiscoveredUrl::new(link, domain.clone(), "google").with_details(
                SourceDetails::Search {
                    title: item["title"].as_str().map(str::to_string),
                    description: item["snippet"].as_str().map(str::to_string),
                },
            );
            if !emit(&tx, url).await {
                return Ok(count);
            }
            count += 1;
        }

        if body["queries"]["nextPage"].is_null() {
            break;
        }
        start += 10;
    }

    Ok(count)
}

/// Bing via SerpAPI, all markets concurrently.
pub(crate) async fn discover_bing(
    client: reqwest::Client,
    serpapi_key: String,
    domain: String,
    max_per_market: usize,
    tx: Tx,
) -> anyhow::Result<usize> {
    if serpapi_key.is_empty() {
        debug!("bing: no SerpAPI key, skipping");
        return Ok(0);
    }

    let queries = BING_MARKETS.iter().map(|market| {
        let client = client.clone();
        let key = serpapi_key.clone();
        let domain = domain.clone();
        let market: &'static str = *market;
        async move {
            let query = format!("site:{domain}");
            let count_s = max_per_market.to_string();
            let resp = client
                .get("https://serpapi.com/search")
                .query(&[
                    ("engine", "bing"),
                    ("q", query.as_str()),
                    ("mkt", market),
                    ("count", count_s.as_str()),
                    ("api_key", key.as_str()),
                ])
                .timeout(ENGINE_TIMEOUT)
                .send()
                .await
                .ok()?;
            if !resp.status().is_success() {
                debug!(market, status = resp.status().as_u16(), "bing: query failed");
                return None;
            }
            resp.json::<serde_json::Value>().await.ok()
        }
    });

    let bodies = futures::future::join_all(queries).await;

    let mut count = 0;
    for body in bodies.into_iter().flatten() {
        let Some(results) = body["organic_results"].as_array() else {
            continue;
        };
        for item in results {
            let Some(link) = item["link"].as_str() else {
                continue;
            };
            let url = DiscoveredUrl::new(link, domain.clone(), "bing").with_details(
                SourceDetails::Search {
                    title: item["title"].as_str().map(str::to_string),
                    description: item["snippet"].as_str().map(str::to_string),
                },
            );
            if !emit(&tx, url).await {
                return Ok(count);
            }
            count += 1;
        }
    }

    Ok(count)
}

pub(crate) async fn discover_brave(
    client: reqwest::Client,
    api_key: String,
    domain: String,
    limiter: Arc<RateLimiter>,
    tx: Tx,
) -> anyhow::Result<usize> {
    if api_key.is_empty() {
        debug!("brave: no API key, skipping");
        return Ok(0);
    }

    limiter.acquire().await;
    let resp = client
        .get("https://api.search.brave.com/res/v1/web/search")
        .header("X-Subscription-Token", &api_key)
        .header("Accept", "application/json")
        .query(&[("q", format!("site:{domain}"))])
        .timeout(ENGINE_TIMEOUT)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("brave returned HTTP {}", resp.status());
    }

    let body: serde_json::Value = resp.json().await?;
    let mut count = 0;
    if let Some(results) = body["web"]["results"].as_array() {
        for item in results {
            let Some(link) = item["url"].as_str() else {
                continue;
            };
            let url = DiscoveredUrl::new(link, domain.clone(), "brave").with_details(
                SourceDetails::Search {
                    title: item["title"].as_str().map(str::to_string),
                    description: item["description"].as_str().map(str::to_string),
                },
            );
            if !emit(&tx, url).await {
                return Ok(count);
            }
            count += 1;
        }
    }
    Ok(count)
}

/// DuckDuckGo has no API; the HTML endpoint wraps result targets in a
/// redirect parameter that needs decoding.
pub(crate) async fn discover_duckduckgo(
    client: reqwest::Client,
    domain: String,
    tx: Tx,
) -> anyhow::Result<usize> {
    let resp = client
        .get("https://html.duckduckgo.com/html/")
        .query(&[("q", format!("site:{domain}"))])
        .timeout(ENGINE_TIMEOUT)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("duckduckgo returned HTTP {}", resp.status());
    }
    let html = resp.text().await?;

    let mut count = 0;
    for link in extract_ddg_links(&html) {
        let url = DiscoveredUrl::new(link, domain.clone(), "duckduckgo");
        if !emit(&tx, url).await {
            break;
        }
        count += 1;
    }
    Ok(count)
}

static DDG_RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="[^"]*uddg=([^"&]+)"#).expect("valid regex")
});

fn extract_ddg_links(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    DDG_RESULT_RE
        .captures_iter(html)
        .filter_map(|cap| {
            let decoded = percent_decode(&cap[1]);
            (decoded.starts_with("http://") || decoded.starts_with("https://"))
                .then(|| decoded.clone())
                .filter(|d| seen.insert(d.clone()))
        })
        .collect()
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddg_links_are_decoded_and_deduped() {
        let html = r#"
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fabout&rut=x">About</a>
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fabout&rut=y">Dup</a>
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fteam">Team</a>
        "#;
        let links = extract_ddg_links(html);
        assert_eq!(
            links,
            vec!["https://example.com/about", "https://example.com/team"]
        );
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(
            percent_decode("https%3A%2F%2Fx.com%2Fa+b"),
            "https://x.com/a b"
        );
        assert_eq!(percent_decode("plain"), "plain");
        // Truncated escape survives as-is.
        assert_eq!(percent_decode("x%2"), "x%2");
    }

    #[test]
    fn four_bing_markets() {
        assert_eq!(BING_MARKETS.len(), 4);
        assert!(BING_MARKETS.contains(&"de-DE"));
    }
}
