//! Cross-archive timeline tools for a single URL: chronological roll-ups,
//! two-version diffs, and first/last appearance of a piece of text.

use std::collections::HashSet;

use hindsight_archive::{Hindsight, Wayback};
use hindsight_common::{DateRange, Result};
use serde::{Deserialize, Serialize};
use similar::TextDiff;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: String,
    pub source: String,
    pub url: String,
    pub status: Option<u16>,
    pub mime: Option<String>,
    pub digest: Option<String>,
}

/// Chronological roll-up of every archive's captures of one URL, oldest
/// first, duplicate digests collapsed.
pub async fn build_timeline(
    hindsight: &Hindsight,
    url: &str,
    max_snapshots: usize,
) -> Result<Vec<TimelineEntry>> {
    let snapshots = hindsight
        .list_snapshots(url, &DateRange::default(), max_snapshots)
        .await?;

    let mut seen_digests: HashSet<String> = HashSet::new();
    let mut timeline: Vec<TimelineEntry> = snapshots
        .into_iter()
        .take(max_snapshots)
        .filter(|snap| match snap.digest.as_deref() {
            Some(digest) if !digest.is_empty() => seen_digests.insert(digest.to_string()),
            _ => true,
        })
        .map(|snap| TimelineEntry {
            timestamp: snap.timestamp,
            source: snap.source.to_string(),
            url: snap.url,
            status: snap.status,
            mime: snap.mime,
            digest: snap.digest,
        })
        .collect();

    timeline.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(timeline)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub url: String,
    pub ts1: String,
    pub ts2: String,
    /// Unified diff of the two bodies.
    pub diff: String,
    pub added_lines: usize,
    pub removed_lines: usize,
    pub changed: bool,
}

/// Unified diff between two archived versions of a URL.
pub async fn diff_versions(
    wayback: &Wayback,
    url: &str,
    ts1: &str,
    ts2: &str,
    context_lines: usize,
) -> Result<VersionDiff> {
    let range = DateRange::default();
    let from = wayback.fetch_at(url, &range, Some(ts1)).await?;
    let to = wayback.fetch_at(url, &range, Some(ts2)).await?;

    let from_body = from.body().unwrap_or_default();
    let to_body = to.body().unwrap_or_default();

    let diff = TextDiff::from_lines(from_body, to_body);
    let mut added = 0;
    let mut removed = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Insert => added += 1,
            similar::ChangeTag::Delete => removed += 1,
            similar::ChangeTag::Equal => {}
        }
    }

    let rendered = diff
        .unified_diff()
        .context_radius(context_lines)
        .header(&format!("{url} @ {ts1}"), &format!("{url} @ {ts2}"))
        .to_string();

    Ok(VersionDiff {
        url: url.to_string(),
        ts1: ts1.to_string(),
        ts2: ts2.to_string(),
        changed: added + removed > 0,
        diff: rendered,
        added_lines: added,
        removed_lines: removed,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestChange {
    pub timestamp: String,
    pub source: String,
    pub previous_digest: String,
    pub new_digest: String,
}

/// Scan the timeline for digest transitions — the cheap way to spot when
/// content changed without fetching any bodies.
pub async fn detect_changes(
    hindsight: &Hindsight,
    url: &str,
    max_snapshots: usize,
) -> Result<Vec<DigestChange>> {
    let timeline = build_timeline(hindsight, url, max_snapshots).await?;

    let mut changes = Vec::new();
    let mut prev_digest: Option<String> = None;

    for entry in timeline {
        let Some(digest) = entry.digest.clone().filter(|d| !d.is_empty()) else {
            continue;
        };
        if let Some(prev) = prev_digest.as_ref() {
            if prev != &digest {
                changes.push(DigestChange {
                    timestamp: entry.timestamp.clone(),
                    source: entry.source.clone(),
                    previous_digest: prev.clone(),
                    new_digest: digest.clone(),
                });
            }
        }
        prev_digest = Some(digest);
    }

    Ok(changes)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appearance {
    pub timestamp: String,
    pub source: String,
    pub url: String,
    pub found: bool,
}

/// Earliest capture whose body contains the text.
pub async fn find_first_appearance(
    hindsight: &Hindsight,
    wayback: &Wayback,
    url: &str,
    search_text: &str,
) -> Result<Option<Appearance>> {
    let timeline = build_timeline(hindsight, url, 100).await?;
    let needle = search_text.to_lowercase();

    for entry in timeline {
        if body_contains(wayback, url, &entry.timestamp, &needle).await {
            return Ok(Some(Appearance {
                timestamp: entry.timestamp,
                source: entry.source,
                url: url.to_string(),
                found: true,
            }));
        }
    }
    Ok(None)
}

/// Latest capture whose body contains the text — where it was last seen
/// before removal.
pub async fn find_last_appearance(
    hindsight: &Hindsight,
    wayback: &Wayback,
    url: &str,
    search_text: &str,
) -> Result<Option<Appearance>> {
    let timeline = build_timeline(hindsight, url, 100).await?;
    let needle = search_text.to_lowercase();

    for entry in timeline.into_iter().rev() {
        if body_contains(wayback, url, &entry.timestamp, &needle).await {
            return Ok(Some(Appearance {
                timestamp: entry.timestamp,
                source: entry.source,
                url: url.to_string(),
                found: true,
            }));
        }
    }
    Ok(None)
}

async fn body_contains(wayback: &Wayback, url: &str, timestamp: &str, needle: &str) -> bool {
    match wayback
        .fetch_at(url, &DateRange::default(), Some(timestamp))
        .await
    {
        Ok(result) => result
            .body()
            .is_some_and(|body| body.to_lowercase().contains(needle)),
        Err(_) => false,
    }
}
