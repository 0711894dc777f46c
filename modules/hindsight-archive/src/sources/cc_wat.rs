//! CommonCrawl WAT link extraction via an external binary.
//!
//! WAT files carry the extracted-link metadata of each crawl, so link
//! queries never touch page bodies. The binary does the segment scanning;
//! this wrapper manages inputs, batching, NDJSON output, and cleanup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

const DEFAULT_THREADS: u32 = 10;
const DEFAULT_MAX_RESULTS: u32 = 500;
const DEFAULT_BATCH_SIZE: usize = 200;
const DEFAULT_MAX_OUTLINKS: usize = 200;

const CHILD_DEADLINE: Duration = Duration::from_secs(600);

pub struct CcLinksExtractor {
    binary: Option<PathBuf>,
    archive: String,
}

impl CcLinksExtractor {
    /// `binary_path` comes from config (`CCLINKS_BIN`); empty means not
    /// installed.
    pub fn new(binary_path: &str, archive: &str) -> Self {
        let binary = Some(PathBuf::from(binary_path))
            .filter(|p| !binary_path.is_empty() && p.exists());
        match &binary {
            Some(p) => info!(binary = %p.display(), "cclinks extractor available"),
            None => warn!("cclinks binary not found - WAT extraction unavailable"),
        }
        Self {
            binary,
            archive: archive.to_string(),
        }
    }

    pub fn available(&self) -> bool {
        self.binary.is_some()
    }

    /// Extract outlinks FROM the given source domains. Domains are
    /// processed in batches; the result maps source domain → target URLs,
    /// capped per domain.
    pub async fn extract_outlinks(
        &self,
        domains: &[String],
        max_per_domain: Option<usize>,
    ) -> HashMap<String, Vec<String>> {
        if !self.available() || domains.is_empty() {
            return HashMap::new();
        }
        let max_per_domain = max_per_domain.unwrap_or(DEFAULT_MAX_OUTLINKS);
        let mut outlinks: HashMap<String, Vec<String>> = HashMap::new();

        for chunk in domains.chunks(DEFAULT_BATCH_SIZE) {
            let Ok(tmp) = tempfile::tempdir() else {
                continue;
            };
            let output_file = tmp.path().join("links.ndjson");

            let args = vec![
                "extract".to_string(),
                format!("--domains={}", chunk.join(",")),
                format!("--archive={}", self.archive),
                format!("--output={}", output_file.display()),
                "--format=ndjson".to_string(),
                format!("--threads={DEFAULT_THREADS}"),
                format!("--max-results={DEFAULT_MAX_RESULTS}"),
            ];

            if !self.run("extract", &args).await {
                continue;
            }

            for record in read_ndjson(&output_file).await {
                let source = record["sourceDomain"]
                    .as_str()
                    .or_else(|| record["source_domain"].as_str());
                let target = record["target"]
                    .as_str()
                    .or_else(|| record["target_url"].as_str());
                if let (Some(source), Some(target)) = (source, target) {
                    let entry = outlinks.entry(source.to_string()).or_default();
                    if entry.len() < max_per_domain {
                        entry.push(target.to_string());
                    }
                }
            }
        }

        outlinks
    }

    /// Trawl WAT segments for pages linking TO a target domain.
    pub async fn find_backlinks(
        &self,
        target_domain: &str,
        source_tlds: &[String],
        max_results: u32,
        segments: &str,
    ) -> Vec<serde_json::Value> {
        if !self.available() {
            return Vec::new();
        }
        let Ok(tmp) = tempfile::tempdir() else {
            return Vec::new();
        };
        let output_file = tmp.path().join("backlinks.ndjson");

        let mut args = vec![
            "backlinks".to_string(),
            format!("--target-domain={target_domain}"),
            format!("--archive={}", self.archive),
            format!("--segments={segments}"),
            format!("--threads={DEFAULT_THREADS}"),
            format!("--max-results={max_results}"),
            format!("--output={}", output_file.display()),
        ];
        if !source_tlds.is_empty() {
            args.push(format!("--source-tlds={}", source_tlds.join(",")));
        }

        if !self.run("backlinks", &args).await {
            return Vec::new();
        }
        read_ndjson(&output_file).await
    }

    /// Sniper mode: check only the named source domains for links to the
    /// target. Much faster than the full trawl.
    pub async fn sniper_search(
        &self,
        target_domain: &str,
        source_domains: &[String],
    ) -> Vec<serde_json::Value> {
        if !self.available() || source_domains.is_empty() {
            return Vec::new();
        }
        let Ok(tmp) = tempfile::tempdir() else {
            return Vec::new();
        };
        let output_file = tmp.path().join("sniper.ndjson");

        let args = vec![
            "sniper".to_string(),
            format!("--target-domain={target_domain}"),
            format!("--source-domains={}", source_domains.join(",")),
            format!("--archive={}", self.archive),
            format!("--threads={DEFAULT_THREADS}"),
            format!("--output={}", output_file.display()),
        ];

        if !self.run("sniper", &args).await {
            return Vec::new();
        }
        read_ndjson(&output_file).await
    }

    async fn run(&self, subcommand: &str, args: &[String]) -> bool {
        let Some(binary) = &self.binary else {
            return false;
        };

        let result = tokio::time::timeout(
            CHILD_DEADLINE,
            Command::new(binary).args(args).output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => true,
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(subcommand, stderr = %stderr.trim(), "cclinks exited with error");
                false
            }
            Ok(Err(e)) => {
                warn!(subcommand, error = %e, "failed to launch cclinks");
                false
            }
            Err(_) => {
                warn!(subcommand, "cclinks run exceeded deadline");
                false
            }
        }
    }
}

async fn read_ndjson(path: &Path) -> Vec<serde_json::Value> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no cclinks output to read");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_unavailable() {
        let extractor = CcLinksExtractor::new("", "CC-MAIN-2024-51");
        assert!(!extractor.available());
    }

    #[tokio::test]
    async fn unavailable_extractor_is_a_no_op() {
        let extractor = CcLinksExtractor::new("", "CC-MAIN-2024-51");
        assert!(extractor
            .extract_outlinks(&["example.com".into()], None)
            .await
            .is_empty());
        assert!(extractor
            .find_backlinks("example.com", &[], 500, "0")
            .await
            .is_empty());
        assert!(extractor
            .sniper_search("example.com", &["source.com".into()])
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn outlink_records_accept_both_field_spellings() {
        // Exercise the parsing path by pointing the reader at a prepared file.
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("links.ndjson");
        tokio::fs::write(
            &path,
            concat!(
                "{\"sourceDomain\":\"a.com\",\"target\":\"https://x.org/1\"}\n",
                "{\"source_domain\":\"a.com\",\"target_url\":\"https://x.org/2\"}\n",
            ),
        )
        .await
        .unwrap();
        let records = read_ndjson(&path).await;
        assert_eq!(records.len(), 2);
    }
}
