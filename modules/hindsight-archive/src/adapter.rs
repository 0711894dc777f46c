use async_trait::async_trait;
use hindsight_common::{ArchiveSource, DateRange, FetchResult, HindsightError, Result, Snapshot};

/// Capability set every archive source exposes. Not every source implements
/// every method; unsupported operations return `HindsightError::Unsupported`.
///
/// Adapters are the swallow point for transient failures: network errors,
/// 5xx responses, and malformed payloads become empty results logged at
/// debug, never errors. Only precondition violations (and unsupported
/// operations) surface to the caller.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> ArchiveSource;

    /// Retrieve archived content for a URL, optionally within a date range.
    async fn fetch(&self, url: &str, range: &DateRange) -> Result<FetchResult> {
        let _ = (url, range);
        Err(HindsightError::Unsupported("fetch"))
    }

    /// Fast existence probe against the source's index.
    async fn exists(&self, url: &str, range: &DateRange) -> Result<bool> {
        Ok(!self.list_snapshots(url, range, 1).await?.is_empty())
    }

    /// Enumerate captures of a URL, newest first.
    async fn list_snapshots(
        &self,
        url: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<Snapshot>> {
        let _ = (url, range, limit);
        Err(HindsightError::Unsupported("list_snapshots"))
    }
}

/// Reject empty target URLs up front — a caller bug, not a source failure.
pub(crate) fn require_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(HindsightError::InvalidInput("empty URL".into()));
    }
    Ok(())
}
