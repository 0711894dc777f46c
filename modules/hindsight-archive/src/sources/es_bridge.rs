//! Query bridge to the local Elasticsearch entity superindex: WDC entity
//! extractions, the CC host web graph (two variants), unified domains, and
//! the CC PDF collection. Thin by design — it builds queries with stable
//! field weights, decorates hits with index provenance, and returns raw
//! documents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, error};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Hostname-keyed web graph edges.
const WDC_EDGES_INDEX: &str = "cc_web_graph_host_edges";
/// Vertex-id-keyed web graph edges. Needs a vertex lookup first.
const CYM_EDGES_INDEX: &str = "cymonides_cc_domain_edges";
const CYM_VERTICES_INDEX: &str = "cymonides_cc_domain_vertices";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    Inbound,
    Outbound,
    Both,
}

pub struct EsBridge {
    client: reqwest::Client,
    host: String,
    auth: Option<(String, String)>,
    /// A 401/403 is remembered so later calls fast-path to empty instead
    /// of hammering a misconfigured cluster.
    auth_failed: AtomicBool,
}

impl EsBridge {
    pub fn new(
        client: reqwest::Client,
        host: &str,
        username: &str,
        password: &str,
    ) -> Self {
        let auth = (!username.is_empty())
            .then(|| (username.to_string(), password.to_string()));
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            auth,
            auth_failed: AtomicBool::new(false),
        }
    }

    /// Static catalog of the indices this bridge serves, with data years.
    pub fn index_info(index: &str) -> Option<(&'static str, &'static str)> {
        // (description, data year)
        match index {
            "wdc-organization-entities" => Some(("WDC organization entities", "2023")),
            "wdc-person-entities" => Some(("WDC person entities", "2023")),
            "wdc-product-entities" => Some(("WDC product entities", "2023")),
            "cc_web_graph_host_edges" => Some(("CC web graph host edges", "2024")),
            "cymonides_cc_domain_edges" => Some(("Cymonides CC domain edges", "2024")),
            "cc_host_vertices" => Some(("CC host vertices", "2024")),
            "cymonides_cc_domain_vertices" => Some(("Cymonides CC domain vertices", "2024")),
            "domains_unified" => Some(("Unified domain index", "2020-2024")),
            "cc_pdfs" => Some(("CC PDF documents", "2025")),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // WDC entity searches
    // ------------------------------------------------------------------

    /// Organization entities (`wdc-organization-entities`).
    pub async fn search_wdc_orgs(&self, query: &str, limit: usize) -> Vec<Value> {
        let hits = self
            .search("wdc-organization-entities", orgs_query(query), limit)
            .await;
        decorate(hits, "2023", "Web Data Commons")
    }

    /// Person entities (`wdc-person-entities`).
    pub async fn search_wdc_persons(&self, query: &str, limit: usize) -> Vec<Value> {
        let hits = self
            .search("wdc-person-entities", persons_query(query), limit)
            .await;
        decorate(hits, "2023", "Web Data Commons")
    }

    /// Product entities (`wdc-product-entities`).
    pub async fn search_wdc_products(&self, query: &str, limit: usize) -> Vec<Value> {
        let hits = self
            .search("wdc-product-entities", products_query(query), limit)
            .await;
        decorate(hits, "2023", "Web Data Commons")
    }

    // ------------------------------------------------------------------
    // Web graph
    // ------------------------------------------------------------------

    /// Edges touching a domain. The WDC graph keys edges by hostname; the
    /// Cymonides graph keys them by vertex id, so that variant resolves
    /// the domain to a vertex first and skips the edge query when no
    /// vertex exists.
    pub async fn search_webgraph(
        &self,
        domain: &str,
        direction: LinkDirection,
        limit: usize,
        use_original_graph: bool,
    ) -> Vec<Value> {
        let (index, query) = if use_original_graph {
            let vertex = self
                .search(CYM_VERTICES_INDEX, json!({"term": {"domain": domain}}), 1)
                .await;
            let Some(vertex_id) = vertex.first().and_then(|v| v["vertex_id"].as_u64()) else {
                debug!(domain, "no vertex for domain, skipping edge query");
                return Vec::new();
            };
            (CYM_EDGES_INDEX, vertex_edges_query(vertex_id, direction))
        } else {
            (WDC_EDGES_INDEX, host_edges_query(domain, direction))
        };

        let hits = self.search(index, query, limit).await;
        let source = if use_original_graph {
            "Cymonides Original"
        } else {
            "CommonCrawl Host Graph"
        };
        decorate(hits, "2024", source)
    }

    /// Domains linking TO this domain.
    pub async fn backlinks(&self, domain: &str, limit: usize) -> Vec<Value> {
        self.search_webgraph(domain, LinkDirection::Inbound, limit, false)
            .await
    }

    /// Domains this domain links TO.
    pub async fn outlinks(&self, domain: &str, limit: usize) -> Vec<Value> {
        self.search_webgraph(domain, LinkDirection::Outbound, limit, false)
            .await
    }

    /// Host vertices (`cc_host_vertices`).
    pub async fn search_host_vertices(&self, query: &str, limit: usize) -> Vec<Value> {
        let body = json!({
            "multi_match": {
                "query": query,
                "fields": ["host^3", "domain"],
            }
        });
        let hits = self.search("cc_host_vertices", body, limit).await;
        decorate(hits, "2024", "CommonCrawl Host Graph")
    }

    // ------------------------------------------------------------------
    // Domains
    // ------------------------------------------------------------------

    /// Unified domain index, optionally enriched with backlink counts
    /// aggregated from the hostname edge graph.
    pub async fn search_domains(&self, query: &str, limit: usize, enrich: bool) -> Vec<Value> {
        let body = json!({
            "multi_match": {
                "query": query,
                "fields": ["domain^3", "tld", "category"],
            }
        });
        let mut hits = self.search("domains_unified", body, limit).await;
        if hits.is_empty() {
            return hits;
        }
        hits = decorate(hits, "2020-2024", "Multi-source aggregation");

        if enrich {
            self.enrich_with_backlink_counts(&mut hits).await;
        }
        hits
    }

    /// Second round-trip: one terms aggregation over the edge index,
    /// attaching `graph_stats.inlink_count` per domain hit.
    async fn enrich_with_backlink_counts(&self, domains: &mut [Value]) {
        let names: Vec<&str> = domains
            .iter()
            .filter_map(|d| d["domain"].as_str())
            .collect();
        if names.is_empty() {
            return;
        }

        let body = json!({
            "size": 0,
            "query": {"terms": {"target_host": names}},
            "aggs": {
                "by_domain": {
                    "terms": {"field": "target_host", "size": names.len()},
                }
            }
        });

        let Some(response) = self.raw_request(WDC_EDGES_INDEX, &body).await else {
            return;
        };
        let Some(buckets) = response["aggregations"]["by_domain"]["buckets"].as_array() else {
            return;
        };

        for domain in domains.iter_mut() {
            let Some(name) = domain["domain"].as_str() else {
                continue;
            };
            if let Some(bucket) = buckets.iter().find(|b| b["key"].as_str() == Some(name)) {
                domain["graph_stats"] = json!({
                    "inlink_count": bucket["doc_count"],
                    "source": WDC_EDGES_INDEX,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // PDFs
    // ------------------------------------------------------------------

    /// CC PDF collection, optionally narrowed to a jurisdiction.
    pub async fn search_cc_pdfs(
        &self,
        query: &str,
        jurisdiction: Option<&str>,
        limit: usize,
    ) -> Vec<Value> {
        let hits = self
            .search("cc_pdfs", pdfs_query(query, jurisdiction), limit)
            .await;
        decorate(hits, "2025", "CC PDF Discovery")
    }

    /// Every indexed PDF hosted on one domain.
    pub async fn pdfs_for_domain(&self, domain: &str, limit: usize) -> Vec<Value> {
        self.search("cc_pdfs", json!({"term": {"domain": domain}}), limit)
            .await
    }

    // ------------------------------------------------------------------
    // Raw access
    // ------------------------------------------------------------------

    /// Escape hatch for queries the helpers don't cover.
    pub async fn raw_search(&self, index: &str, query: Value, size: usize) -> Vec<Value> {
        self.search(index, query, size).await
    }

    async fn search(&self, index: &str, query: Value, size: usize) -> Vec<Value> {
        let body = json!({"query": query, "size": size});
        let Some(response) = self.raw_request(index, &body).await else {
            return Vec::new();
        };

        let Some(hits) = response["hits"]["hits"].as_array() else {
            return Vec::new();
        };
        hits.iter()
            .map(|hit| {
                let mut doc = hit["_source"].clone();
                if doc.is_null() {
                    doc = json!({});
                }
                doc["_id"] = hit["_id"].clone();
                doc["_score"] = hit["_score"].clone();
                doc
            })
            .collect()
    }

    async fn raw_request(&self, index: &str, body: &Value) -> Option<Value> {
        if self.auth_failed.load(Ordering::Relaxed) {
            return None;
        }

        let mut request = self
            .client
            .post(format!("{}/{index}/_search", self.host))
            .header("Content-Type", "application/json")
            .timeout(SEARCH_TIMEOUT)
            .json(body);
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, Some(pass));
        }

        let resp = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(index, error = %e, "ES search failed");
                return None;
            }
        };

        match resp.status().as_u16() {
            200 => resp.json().await.ok(),
            401 | 403 => {
                error!(index, "ES authentication failed; disabling bridge until reinit");
                self.auth_failed.store(true, Ordering::Relaxed);
                None
            }
            status => {
                debug!(index, status, "ES search failed");
                None
            }
        }
    }
}

fn decorate(mut hits: Vec<Value>, year: &str, source: &str) -> Vec<Value> {
    for hit in hits.iter_mut() {
        hit["_index_year"] = Value::String(year.to_string());
        hit["_index_source"] = Value::String(source.to_string());
    }
    hits
}

fn orgs_query(query: &str) -> Value {
    json!({
        "multi_match": {
            "query": query,
            "fields": ["name^3", "legalName^2", "description", "url"],
            "type": "best_fields",
        }
    })
}

fn persons_query(query: &str) -> Value {
    json!({
        "multi_match": {
            "query": query,
            "fields": ["name^3", "givenName", "familyName", "jobTitle", "description"],
            "type": "best_fields",
        }
    })
}

fn products_query(query: &str) -> Value {
    json!({
        "multi_match": {
            "query": query,
            "fields": ["name^3", "description", "brand", "manufacturer"],
            "type": "best_fields",
        }
    })
}

fn host_edges_query(domain: &str, direction: LinkDirection) -> Value {
    let mut should = Vec::new();
    if matches!(direction, LinkDirection::Inbound | LinkDirection::Both) {
        should.push(json!({"term": {"target_host": domain}}));
    }
    if matches!(direction, LinkDirection::Outbound | LinkDirection::Both) {
        should.push(json!({"term": {"source_host": domain}}));
    }
    json!({"bool": {"should": should, "minimum_should_match": 1}})
}

fn vertex_edges_query(vertex_id: u64, direction: LinkDirection) -> Value {
    let mut should = Vec::new();
    if matches!(direction, LinkDirection::Inbound | LinkDirection::Both) {
        should.push(json!({"term": {"target_vertex_id": vertex_id}}));
    }
    if matches!(direction, LinkDirection::Outbound | LinkDirection::Both) {
        should.push(json!({"term": {"source_vertex_id": vertex_id}}));
    }
    json!({"bool": {"should": should, "minimum_should_match": 1}})
}

fn pdfs_query(query: &str, jurisdiction: Option<&str>) -> Value {
    let mut must = vec![json!({
        "multi_match": {
            "query": query,
            "fields": ["title^3", "url^2", "content", "domain"],
        }
    })];
    if let Some(j) = jurisdiction {
        must.push(json!({"term": {"jurisdiction": j.to_uppercase()}}));
    }
    json!({"bool": {"must": must}})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_query_weights_are_stable() {
        let q = orgs_query("Deutsche Bank");
        assert_eq!(
            q["multi_match"]["fields"],
            json!(["name^3", "legalName^2", "description", "url"])
        );
        assert_eq!(q["multi_match"]["query"], "Deutsche Bank");
    }

    #[test]
    fn edge_query_directions() {
        let both = host_edges_query("example.com", LinkDirection::Both);
        assert_eq!(both["bool"]["should"].as_array().unwrap().len(), 2);

        let inbound = host_edges_query("example.com", LinkDirection::Inbound);
        let clauses = inbound["bool"]["should"].as_array().unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0]["term"]["target_host"], "example.com");

        let outbound = host_edges_query("example.com", LinkDirection::Outbound);
        assert_eq!(
            outbound["bool"]["should"][0]["term"]["source_host"],
            "example.com"
        );
    }

    #[test]
    fn vertex_edge_query_uses_ids() {
        let q = vertex_edges_query(42, LinkDirection::Inbound);
        assert_eq!(q["bool"]["should"][0]["term"]["target_vertex_id"], 42);
    }

    #[test]
    fn pdf_query_jurisdiction_is_uppercased() {
        let q = pdfs_query("annual report", Some("de"));
        let must = q["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert_eq!(must[1]["term"]["jurisdiction"], "DE");

        let q = pdfs_query("annual report", None);
        assert_eq!(q["bool"]["must"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn decoration_adds_provenance() {
        let hits = decorate(vec![json!({"name": "x"})], "2023", "Web Data Commons");
        assert_eq!(hits[0]["_index_year"], "2023");
        assert_eq!(hits[0]["_index_source"], "Web Data Commons");
    }

    #[test]
    fn index_catalog_lookup() {
        assert!(EsBridge::index_info("cc_pdfs").is_some());
        assert!(EsBridge::index_info("nope").is_none());
    }
}
