//! Subdomain enumeration. Certificate-transparency logs (crt.sh) ship as
//! the live implementation; commercial enumerators plug in behind the
//! `SubdomainProvider` trait.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::model::DiscoveredUrl;
use crate::sources::{emit, Tx};

/// A subdomain enumeration backend. Implementations return bare
/// hostnames (`api.example.com`); the mapper turns them into URLs.
#[async_trait]
pub trait SubdomainProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn enumerate(&self, domain: &str) -> anyhow::Result<Vec<String>>;
}

/// crt.sh certificate-transparency search. Free, no key, and usually the
/// fastest discovery source in the whole mapper.
pub struct CrtShProvider {
    client: reqwest::Client,
}

impl CrtShProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubdomainProvider for CrtShProvider {
    fn name(&self) -> &'static str {
        "crt.sh"
    }

    async fn enumerate(&self, domain: &str) -> anyhow::Result<Vec<String>> {
        let resp = self
            .client
            .get("https://crt.sh/")
            .query(&[("q", format!("%.{domain}")), ("output", "json".to_string())])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("crt.sh returned HTTP {}", resp.status());
        }

        let entries: Vec<serde_json::Value> = resp.json().await?;
        Ok(extract_hosts(&entries, domain))
    }
}

/// Certificate `name_value` fields hold newline-separated SANs, often
/// with wildcard entries. Keep unique concrete hosts under the domain.
fn extract_hosts(entries: &[serde_json::Value], domain: &str) -> Vec<String> {
    let mut hosts: BTreeSet<String> = BTreeSet::new();
    for entry in entries {
        let Some(names) = entry["name_value"].as_str() else {
            continue;
        };
        for name in names.lines() {
            let name = name.trim().to_lowercase();
            if name.is_empty() || name.starts_with('*') {
                continue;
            }
            if name == domain || name.ends_with(&format!(".{domain}")) {
                hosts.insert(name);
            }
        }
    }
    hosts.into_iter().collect()
}

/// Run every provider and emit each discovered host as an HTTPS root URL.
pub(crate) async fn discover_subdomains(
    providers: Vec<std::sync::Arc<dyn SubdomainProvider>>,
    domain: String,
    tx: Tx,
) -> anyhow::Result<usize> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut count = 0;

    for provider in providers {
        let hosts = match provider.enumerate(&domain).await {
            Ok(hosts) => hosts,
            Err(e) => {
                debug!(provider = provider.name(), error = %e, "subdomain provider failed");
                continue;
            }
        };
        for host in hosts {
            if !seen.insert(host.clone()) {
                continue;
            }
            let url = DiscoveredUrl::new(format!("https://{host}/"), domain.clone(), provider.name());
            if !emit(&tx, url).await {
                return Ok(count);
            }
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_are_filtered_to_the_domain() {
        let entries = vec![
            serde_json::json!({"name_value": "api.example.com\nwww.example.com"}),
            serde_json::json!({"name_value": "*.example.com"}),
            serde_json::json!({"name_value": "EXAMPLE.COM"}),
            serde_json::json!({"name_value": "evil-example.com"}),
            serde_json::json!({"name_value": "deep.api.example.com"}),
            serde_json::json!({"other": "ignored"}),
        ];
        let hosts = extract_hosts(&entries, "example.com");
        assert_eq!(
            hosts,
            vec![
                "api.example.com",
                "deep.api.example.com",
                "example.com",
                "www.example.com",
            ]
        );
    }

    #[test]
    fn duplicate_sans_collapse() {
        let entries = vec![
            serde_json::json!({"name_value": "a.example.com"}),
            serde_json::json!({"name_value": "a.example.com"}),
        ];
        assert_eq!(extract_hosts(&entries, "example.com").len(), 1);
    }
}
