//! CommonCrawl WARC content fetching via an external binary.
//!
//! The heavy lifting (index lookup + ranged WARC reads at 50+ threads)
//! lives in a native helper. This wrapper probes availability, writes
//! input files to a temp directory, launches the child with concurrency
//! and timeout arguments, streams back NDJSON results, and cleans up.
//! When the binary is absent every method is a clean no-op and callers
//! degrade to CDX metadata.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_THREADS: u32 = 50;
pub const DEFAULT_TIMEOUT_SECS: u32 = 30;

/// Hard cap on a single child-process run.
const CHILD_DEADLINE: Duration = Duration::from_secs(600);

/// One content record emitted by the fetcher binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarcPage {
    #[serde(default)]
    pub url: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "flexible_status")]
    pub status: Option<u16>,
    pub mime: Option<String>,
    pub digest: Option<String>,
}

/// The binary reports status as either a number or a string.
fn flexible_status<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        v.as_u64()
            .map(|n| n as u16)
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    }))
}

pub struct CcWarcFetcher {
    binary: Option<PathBuf>,
    archive: String,
}

impl CcWarcFetcher {
    /// `binary_path` comes from config (`CCWARC_BIN`); empty means not
    /// installed. Availability is decided once, here.
    pub fn new(binary_path: &str, archive: &str) -> Self {
        let binary = Some(PathBuf::from(binary_path))
            .filter(|p| !binary_path.is_empty() && p.exists());
        match &binary {
            Some(p) => info!(binary = %p.display(), "ccwarc fetcher available"),
            None => warn!("ccwarc binary not found - WARC fetching unavailable"),
        }
        Self {
            binary,
            archive: archive.to_string(),
        }
    }

    pub fn available(&self) -> bool {
        self.binary.is_some()
    }

    /// Query the CC index for WARC locations of a set of domains.
    pub async fn index_lookup(
        &self,
        domains: &[String],
        threads: u32,
    ) -> Vec<serde_json::Value> {
        if !self.available() || domains.is_empty() {
            return Vec::new();
        }
        let Ok(tmp) = tempfile::tempdir() else {
            return Vec::new();
        };
        let output_file = tmp.path().join("index.ndjson");

        let args = vec![
            "index".to_string(),
            format!("--domains={}", domains.join(",")),
            format!("--archive={}", self.archive),
            format!("--threads={threads}"),
            format!("--output={}", output_file.display()),
        ];

        if !self.run("index", &args).await {
            return Vec::new();
        }
        read_ndjson(&output_file).await
    }

    /// Fetch content from WARC files using pre-computed index records.
    pub async fn fetch_content(
        &self,
        records_file: &Path,
        output_file: &Path,
        threads: u32,
        timeout_secs: u32,
    ) -> Vec<WarcPage> {
        if !self.available() || !records_file.exists() {
            return Vec::new();
        }

        let args = vec![
            "fetch".to_string(),
            format!("--records={}", records_file.display()),
            format!("--threads={threads}"),
            format!("--timeout={timeout_secs}"),
            format!("--output={}", output_file.display()),
        ];

        if !self.run("fetch", &args).await {
            return Vec::new();
        }
        read_pages(output_file).await
    }

    /// Full pipeline for a set of domains: index lookup + WARC fetch in one
    /// child-process run.
    pub async fn batch_fetch(
        &self,
        domains: &[String],
        threads: u32,
        timeout_secs: u32,
    ) -> Vec<WarcPage> {
        if !self.available() || domains.is_empty() {
            return Vec::new();
        }
        let Ok(tmp) = tempfile::tempdir() else {
            return Vec::new();
        };

        let input_file = tmp.path().join("domains.txt");
        if let Err(e) = tokio::fs::write(&input_file, domains.join("\n")).await {
            warn!(error = %e, "failed to write ccwarc input file");
            return Vec::new();
        }
        let output_file = tmp.path().join("results.ndjson");

        let args = vec![
            "batch".to_string(),
            format!("--input={}", input_file.display()),
            format!("--archive={}", self.archive),
            format!("--threads={threads}"),
            format!("--timeout={timeout_secs}"),
            format!("--output={}", output_file.display()),
        ];

        if !self.run("batch", &args).await {
            return Vec::new();
        }
        let pages = read_pages(&output_file).await;
        info!(
            pages = pages.len(),
            domains = domains.len(),
            "ccwarc batch fetch complete"
        );
        pages
        // tmp dir (input + output) dropped here on every path
    }

    /// Fetch the single best capture for one URL.
    pub async fn fetch_single(&self, url: &str) -> Option<WarcPage> {
        let host = hindsight_common::host_of(url)?;
        let pages = self
            .batch_fetch(&[host], DEFAULT_THREADS, DEFAULT_TIMEOUT_SECS)
            .await;
        pages
            .iter()
            .find(|p| p.url == url)
            .cloned()
            .or_else(|| pages.into_iter().next())
    }

    /// Run the child; true on exit code 0. Stderr is logged, never raised.
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
                warn!(subcommand, stderr = %stderr.trim(), "ccwarc exited with error");
                false
            }
            Ok(Err(e)) => {
                warn!(subcommand, error = %e, "failed to launch ccwarc");
                false
            }
            Err(_) => {
                warn!(subcommand, "ccwarc run exceeded deadline");
                false
            }
        }
    }
}

async fn read_pages(path: &Path) -> Vec<WarcPage> {
    read_lines(path)
        .await
        .iter()
        .filter_map(|line| match serde_json::from_str::<WarcPage>(line) {
            Ok(p) => Some(p),
            Err(e) => {
                debug!(error = %e, "skipping malformed ccwarc record");
                None
            }
        })
        .collect()
}

async fn read_ndjson(path: &Path) -> Vec<serde_json::Value> {
    read_lines(path)
        .await
        .iter()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

async fn read_lines(path: &Path) -> Vec<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no ccwarc output to read");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_unavailable() {
        let fetcher = CcWarcFetcher::new("", "CC-MAIN-2024-51");
        assert!(!fetcher.available());
        let fetcher = CcWarcFetcher::new("/definitely/not/a/binary", "CC-MAIN-2024-51");
        assert!(!fetcher.available());
    }

    #[tokio::test]
    async fn unavailable_fetcher_is_a_no_op() {
        let fetcher = CcWarcFetcher::new("", "CC-MAIN-2024-51");
        assert!(fetcher
            .batch_fetch(&["example.com".into()], 10, 30)
            .await
            .is_empty());
        assert!(fetcher
            .index_lookup(&["example.com".into()], 10)
            .await
            .is_empty());
        assert!(fetcher.fetch_single("https://example.com").await.is_none());
    }

    #[test]
    fn warc_page_accepts_string_and_numeric_status() {
        let a: WarcPage =
            serde_json::from_str(r#"{"url":"u","status":"200","html":"<p>x</p>"}"#).unwrap();
        assert_eq!(a.status, Some(200));
        let b: WarcPage = serde_json::from_str(r#"{"url":"u","status":404}"#).unwrap();
        assert_eq!(b.status, Some(404));
        let c: WarcPage = serde_json::from_str(r#"{"url":"u"}"#).unwrap();
        assert_eq!(c.status, None);
    }

    #[tokio::test]
    async fn ndjson_reader_skips_bad_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.ndjson");
        tokio::fs::write(
            &path,
            "{\"url\":\"https://a.com\",\"html\":\"<p>a</p>\"}\nnot json\n\n{\"url\":\"https://b.com\"}\n",
        )
        .await
        .unwrap();
        let pages = read_pages(&path).await;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].url, "https://a.com");
    }
}
