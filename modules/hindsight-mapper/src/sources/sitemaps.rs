//! Sitemap discovery: robots.txt `Sitemap:` lines first, the conventional
//! `/sitemap.xml` as fallback, with one level of sitemap-index recursion.

use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::model::{DiscoveredUrl, SourceDetails};
use crate::sources::{emit, Tx};

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Child sitemaps followed from one sitemap index.
const MAX_CHILD_SITEMAPS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SitemapEntry {
    pub url: String,
    pub priority: Option<f64>,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct SitemapFile {
    pub entries: Vec<SitemapEntry>,
    /// `<sitemapindex>` children.
    pub children: Vec<String>,
}

pub(crate) async fn discover_sitemaps(
    client: reqwest::Client,
    domain: String,
    limit: usize,
    tx: Tx,
) -> anyhow::Result<usize> {
    let mut roots = sitemaps_from_robots(&client, &domain).await;
    if roots.is_empty() {
        roots.push(format!("https://{domain}/sitemap.xml"));
    }

    let mut count = 0;
    for root in roots {
        let Some(file) = fetch_sitemap(&client, &root).await else {
            continue;
        };

        count += emit_entries(&tx, &domain, file.entries, limit - count).await;
        if count >= limit {
            break;
        }

        // One level of index recursion covers the common generators.
        for child in file.children.into_iter().take(MAX_CHILD_SITEMAPS) {
            let Some(child_file) = fetch_sitemap(&client, &child).await else {
                continue;
            };
            count += emit_entries(&tx, &domain, child_file.entries, limit - count).await;
            if count >= limit {
                return Ok(count);
            }
        }
    }
    Ok(count)
}

async fn emit_entries(
    tx: &Tx,
    domain: &str,
    entries: Vec<SitemapEntry>,
    budget: usize,
) -> usize {
    let mut sent = 0;
    for entry in entries.into_iter().take(budget) {
        let url = DiscoveredUrl::new(entry.url, domain.to_string(), "sitemap").with_details(
            SourceDetails::Sitemap {
                priority: entry.priority,
                lastmod: entry.lastmod,
                changefreq: entry.changefreq,
            },
        );
        if !emit(tx, url).await {
            break;
        }
        sent += 1;
    }
    sent
}

async fn sitemaps_from_robots(client: &reqwest::Client, domain: &str) -> Vec<String> {
    let robots_url = format!("https://{domain}/robots.txt");
    let resp = match client.get(&robots_url).timeout(FETCH_TIMEOUT).send().await {
        Ok(r) if r.status().is_success() => r,
        _ => return Vec::new(),
    };
    let Ok(body) = resp.text().await else {
        return Vec::new();
    };
    parse_robots_sitemaps(&body)
}

pub(crate) fn parse_robots_sitemaps(robots: &str) -> Vec<String> {
    robots
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("sitemap")
                .then(|| value.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .collect()
}

async fn fetch_sitemap(client: &reqwest::Client, url: &str) -> Option<SitemapFile> {
    let resp = match client.get(url).timeout(FETCH_TIMEOUT).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            debug!(url, status = r.status().as_u16(), "sitemap fetch failed");
            return None;
        }
        Err(e) => {
            debug!(url, error = %e, "sitemap fetch failed");
            return None;
        }
    };
    let body = resp.text().await.ok()?;
    Some(parse_sitemap(&body))
}

/// Parse a `<urlset>` or `<sitemapindex>` document. Malformed XML yields
/// whatever was readable before the error.
pub(crate) fn parse_sitemap(xml: &str) -> SitemapFile {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut file = SitemapFile::default();
    let mut in_sitemap_index = false;
    let mut current: Option<SitemapEntry> = None;
    let mut element: Vec<u8> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"sitemapindex" => in_sitemap_index = true,
                    b"url" | b"sitemap" => current = Some(SitemapEntry::default()),
                    _ => {}
                }
                element = name;
            }
            Ok(Event::Text(text)) => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                let Ok(value) = text.unescape() else {
                    continue;
                };
                let value = value.trim().to_string();
                match element.as_slice() {
                    b"loc" => entry.url = value,
                    b"priority" => entry.priority = value.parse().ok(),
                    b"lastmod" => entry.lastmod = Some(value),
                    b"changefreq" => entry.changefreq = Some(value),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"url" => {
                    if let Some(entry) = current.take() {
                        if !entry.url.is_empty() {
                            file.entries.push(entry);
                        }
                    }
                }
                b"sitemap" => {
                    if let Some(entry) = current.take() {
                        if in_sitemap_index && !entry.url.is_empty() {
                            file.children.push(entry.url);
                        }
                    }
                }
                _ => element.clear(),
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(error = %e, "sitemap XML error, keeping partial parse");
                break;
            }
            Ok(_) => {}
        }
    }

    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robots_sitemap_lines() {
        let robots = "User-agent: *\nDisallow: /admin\nSitemap: https://example.com/sitemap.xml\nsitemap: https://example.com/news.xml\n";
        assert_eq!(
            parse_robots_sitemaps(robots),
            vec![
                "https://example.com/sitemap.xml",
                "https://example.com/news.xml"
            ]
        );
        assert!(parse_robots_sitemaps("User-agent: *\n").is_empty());
    }

    #[test]
    fn urlset_parsing_with_metadata() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url>
                <loc>https://example.com/</loc>
                <priority>1.0</priority>
                <lastmod>2024-01-15</lastmod>
                <changefreq>daily</changefreq>
              </url>
              <url><loc>https://example.com/about</loc></url>
            </urlset>"#;
        let file = parse_sitemap(xml);
        assert_eq!(file.entries.len(), 2);
        assert_eq!(file.entries[0].url, "https://example.com/");
        assert_eq!(file.entries[0].priority, Some(1.0));
        assert_eq!(file.entries[0].lastmod.as_deref(), Some("2024-01-15"));
        assert_eq!(file.entries[0].changefreq.as_deref(), Some("daily"));
        assert_eq!(file.entries[1].priority, None);
        assert!(file.children.is_empty());
    }

    #[test]
    fn sitemap_index_parsing() {
        let xml = r#"<sitemapindex>
              <sitemap><loc>https://example.com/sitemap-posts.xml</loc></sitemap>
              <sitemap><loc>https://example.com/sitemap-pages.xml</loc></sitemap>
            </sitemapindex>"#;
        let file = parse_sitemap(xml);
        assert!(file.entries.is_empty());
        assert_eq!(
            file.children,
            vec![
                "https://example.com/sitemap-posts.xml",
                "https://example.com/sitemap-pages.xml"
            ]
        );
    }

    #[test]
    fn malformed_xml_keeps_partial_entries() {
        let xml = "<urlset><url><loc>https://example.com/ok</loc></url><url><loc>https://example.com/broken";
        let file = parse_sitemap(xml);
        assert_eq!(file.entries.len(), 1);
        assert_eq!(file.entries[0].url, "https://example.com/ok");
    }
}
