//! Archive-backed discovery: Wayback CDX, CommonCrawl cluster index, and
//! the Memento aggregator. Filters push down where the service supports
//! them (Wayback); otherwise the adapter applies them while scanning.

use std::sync::Arc;

use hindsight_archive::{CcIndex, Memento, Wayback};
use tracing::debug;

use crate::model::{DiscoveredUrl, MapFilters, SourceDetails};
use crate::sources::{emit, Tx};

pub(crate) async fn discover_wayback(
    wayback: Arc<Wayback>,
    domain: String,
    filters: MapFilters,
    tx: Tx,
) -> anyhow::Result<usize> {
    let rows = wayback
        .cdx_search(
            &format!("{domain}/*"),
            &filters.range,
            filters.mime.as_deref(),
            filters.status,
            filters.limit_per_source,
            Some("urlkey"),
        )
        .await?;

    let mut count = 0;
    for row in rows {
        let archive_url = format!(
            "https://web.archive.org/web/{}/{}",
            row.timestamp, row.original
        );
        let url = DiscoveredUrl::new(row.original.clone(), domain.clone(), "wayback")
            .with_details(SourceDetails::Archive {
                timestamp: Some(row.timestamp),
                status_code: row.status,
                mime_type: row.mime,
                content_length: row.length,
                digest: row.digest,
                archive_url: Some(archive_url),
                warc_file: None,
                archive_name: None,
            });
        if !emit(&tx, url).await {
            break;
        }
        count += 1;
    }
    Ok(count)
}

pub(crate) async fn discover_commoncrawl(
    cc: Arc<CcIndex>,
    domain: String,
    filters: MapFilters,
    tx: Tx,
) -> anyhow::Result<usize> {
    let records = cc
        .scan_domain_with(
            &domain,
            filters.limit_per_source,
            &filters.range,
            filters.mime.as_deref(),
        )
        .await?;

    let mut count = 0;
    for record in records {
        if let Some(want) = filters.status {
            let status: Option<u16> = record.status.as_deref().and_then(|s| s.parse().ok());
            if status != Some(want) {
                continue;
            }
        }
        let url = DiscoveredUrl::new(record.url.clone(), domain.clone(), "commoncrawl")
            .with_details(SourceDetails::Archive {
                timestamp: Some(record.timestamp),
                status_code: record.status.as_deref().and_then(|s| s.parse().ok()),
                mime_type: record.mime,
                content_length: record.warc_length,
                digest: record.digest,
                archive_url: None,
                warc_file: record.warc_filename,
                archive_name: None,
            });
        if !emit(&tx, url).await {
            break;
        }
        count += 1;
    }
    Ok(count)
}

pub(crate) async fn discover_memento(
    memento: Arc<Memento>,
    domain: String,
    filters: MapFilters,
    tx: Tx,
) -> anyhow::Result<usize> {
    let snapshots = memento
        .timemap(&format!("https://{domain}/"), &filters.range)
        .await?;

    let mut count = 0;
    for snap in snapshots.into_iter().take(filters.limit_per_source) {
        let timestamp = snap
            .datetime
            .map(|dt| dt.format("%Y%m%d%H%M%S").to_string());
        let url = DiscoveredUrl::new(snap.original_url.clone(), domain.clone(), "memento")
            .with_details(SourceDetails::Archive {
                timestamp,
                status_code: None,
                mime_type: None,
                content_length: None,
                digest: None,
                archive_url: Some(snap.memento_url),
                warc_file: None,
                archive_name: Some(snap.archive),
            });
        if !emit(&tx, url).await {
            break;
        }
        count += 1;
    }
    debug!(domain, count, "memento discovery complete");
    Ok(count)
}
