//! Domain-level change tracking: how a domain's URL set and page content
//! evolved over time. URL discovery goes through the mapper; content
//! comes from Wayback at explicit timestamps.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use hindsight_archive::Wayback;
use hindsight_common::{normalize_domain, DateRange, HindsightError, Result};
use hindsight_mapper::{DiscoveredUrl, MapFilters, Mapper};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::content::{compare_texts, content_hash, extract_text};
use crate::model::{
    ContentAppearance, DomainChange, DomainEvolution, DomainSnapshotAt, PageChange, PageHistory,
    PageVersion, PeriodComparison, PeriodSummary,
};

/// Content comparisons below this similarity count as significant.
const SIGNIFICANT_SIMILARITY: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct DifferConfig {
    /// Concurrent content fetches.
    pub max_concurrent: usize,
    /// Common URLs sampled for content comparison per period pair.
    pub content_sample: usize,
    /// Timestamps sampled by the content-appearance search.
    pub timestamp_samples: usize,
    /// URLs checked per sampled timestamp.
    pub urls_per_timestamp: usize,
    /// URL sample kept per evolution period.
    pub period_sample_cap: usize,
    /// Cap on reported added/removed pages.
    pub change_list_cap: usize,
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            content_sample: 20,
            timestamp_samples: 20,
            urls_per_timestamp: 5,
            period_sample_cap: 100,
            change_list_cap: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMode {
    Appeared,
    Disappeared,
}

impl ChangeMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Appeared => "appeared",
            Self::Disappeared => "disappeared",
        }
    }
}

pub struct DomainDiffer {
    mapper: Mapper,
    wayback: Arc<Wayback>,
    config: DifferConfig,
}

impl DomainDiffer {
    pub fn new(mapper: Mapper, wayback: Arc<Wayback>, config: DifferConfig) -> Self {
        Self {
            mapper,
            wayback,
            config,
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        Self::new(
            Mapper::from_env(client.clone()),
            Arc::new(Wayback::new(client)),
            DifferConfig::default(),
        )
    }

    // ------------------------------------------------------------------
    // Domain evolution
    // ------------------------------------------------------------------

    /// Group every observed URL by capture year and derive what appeared
    /// and what vanished between consecutive years.
    pub async fn domain_evolution(
        &self,
        domain: &str,
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> Result<DomainEvolution> {
        let map = self
            .mapper
            .map_domain(
                domain,
                MapFilters {
                    dedupe: false, // every capture counts toward its year
                    ..MapFilters::default()
                },
            )
            .await?;

        let groups = group_by_year(&map.urls, start_year, end_year);
        let (periods, pages_added, pages_removed) = evolution_from_groups(
            &groups,
            self.config.period_sample_cap,
            self.config.change_list_cap,
        );

        let all_urls: BTreeSet<&String> = groups.values().flatten().collect();
        info!(
            domain = %map.domain,
            years = periods.len(),
            added = pages_added.len(),
            removed = pages_removed.len(),
            "domain evolution computed"
        );

        Ok(DomainEvolution {
            domain: map.domain.clone(),
            periods,
            pages_added,
            pages_removed,
            total_unique_urls: all_urls.len(),
            earliest_snapshot: map.earliest.clone(),
            latest_snapshot: map.latest.clone(),
            analyzed_at: Utc::now(),
        })
    }

    // ------------------------------------------------------------------
    // Period comparison
    // ------------------------------------------------------------------

    /// Map the domain once per period, compare the URL sets, and
    /// optionally sample common URLs for content comparison.
    pub async fn compare_periods(
        &self,
        domain: &str,
        period1: &str,
        period2: &str,
        fetch_content: bool,
    ) -> Result<PeriodComparison> {
        let domain = normalize_domain(domain);
        let range1 = expand_period(period1).ok_or_else(|| {
            HindsightError::InvalidInput(format!("unparseable period: {period1}"))
        })?;
        let range2 = expand_period(period2).ok_or_else(|| {
            HindsightError::InvalidInput(format!("unparseable period: {period2}"))
        })?;

        let map1 = self
            .mapper
            .map_domain(&domain, filters_for(&range1))
            .await?;
        let map2 = self
            .mapper
            .map_domain(&domain, filters_for(&range2))
            .await?;

        let urls1: BTreeSet<String> = map1.urls.iter().map(|u| u.url.clone()).collect();
        let urls2: BTreeSet<String> = map2.urls.iter().map(|u| u.url.clone()).collect();

        let mut comparison = PeriodComparison {
            domain,
            period1: period1.to_string(),
            period2: period2.to_string(),
            urls_added: urls2.difference(&urls1).cloned().collect(),
            urls_removed: urls1.difference(&urls2).cloned().collect(),
            urls_common: urls1.intersection(&urls2).cloned().collect(),
            urls_period1: urls1,
            urls_period2: urls2,
            content_changed: Vec::new(),
        };

        if fetch_content && !comparison.urls_common.is_empty() {
            let ts1 = range1.start_compact().unwrap_or_default();
            let ts2 = range2.start_compact().unwrap_or_default();
            let sample: Vec<String> = comparison
                .urls_common
                .iter()
                .take(self.config.content_sample)
                .cloned()
                .collect();

            let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
            let comparisons = sample.iter().map(|url| {
                let semaphore = semaphore.clone();
                let (ts1, ts2) = (ts1.clone(), ts2.clone());
                async move {
                    let _permit = semaphore.acquire().await.ok()?;
                    self.compare_url_versions(url, &ts1, &ts2).await
                }
            });

            comparison.content_changed = futures::future::join_all(comparisons)
                .await
                .into_iter()
                .flatten()
                .filter(|change| change.similarity < SIGNIFICANT_SIMILARITY)
                .collect();
        }

        Ok(comparison)
    }

    /// Fetch one URL at two (possibly partial) timestamps and score the
    /// content delta. `None` when either side has no usable text.
    async fn compare_url_versions(
        &self,
        url: &str,
        ts1: &str,
        ts2: &str,
    ) -> Option<PageChange> {
        let range = DateRange::default();
        let from = self.wayback.fetch_at(url, &range, Some(ts1)).await.ok()?;
        let to = self.wayback.fetch_at(url, &range, Some(ts2)).await.ok()?;

        let from_text = extract_text(from.body()?);
        let to_text = extract_text(to.body()?);
        if from_text.is_empty() || to_text.is_empty() {
            return None;
        }

        let cmp = compare_texts(&from_text, &to_text);
        Some(PageChange {
            url: url.to_string(),
            change_type: cmp.kind,
            from_timestamp: ts1.to_string(),
            to_timestamp: ts2.to_string(),
            from_hash: Some(cmp.from_hash),
            to_hash: Some(cmp.to_hash),
            similarity: cmp.similarity,
            added_lines: cmp.added_lines,
            removed_lines: cmp.removed_lines,
        })
    }

    // ------------------------------------------------------------------
    // Page history
    // ------------------------------------------------------------------

    /// Version history of one URL, oldest first, with a change record for
    /// every content-hash transition.
    pub async fn page_history(
        &self,
        url: &str,
        max_versions: usize,
        fetch_content: bool,
    ) -> Result<PageHistory> {
        let snapshots = self
            .wayback
            .list_snapshots_with(url, &DateRange::default(), max_versions, None, false)
            .await?;

        let mut versions: Vec<PageVersion> = snapshots
            .into_iter()
            .map(|snap| PageVersion {
                url: snap.url,
                timestamp: snap.timestamp,
                source: snap.source.to_string(),
                content_hash: None,
                title: None,
                content_length: None,
                status_code: snap.status,
                archive_url: snap.view_url,
            })
            .collect();

        if fetch_content {
            let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
            let bodies = futures::future::join_all(versions.iter().map(|version| {
                let semaphore = semaphore.clone();
                let wayback = self.wayback.clone();
                let (url, ts) = (version.url.clone(), version.timestamp.clone());
                async move {
                    let _permit = semaphore.acquire().await.ok()?;
                    let result = wayback
                        .fetch_at(&url, &DateRange::default(), Some(&ts))
                        .await
                        .ok()?;
                    let html = result.body()?.to_string();
                    let text = extract_text(&html);
                    Some((
                        content_hash(&text),
                        hindsight_archive::text_extract::extract_title(&html),
                        text.len(),
                    ))
                }
            }))
            .await;

            for (version, body) in versions.iter_mut().zip(bodies) {
                if let Some((hash, title, len)) = body {
                    version.content_hash = Some(hash);
                    version.title = title;
                    version.content_length = Some(len);
                }
            }
        }

        versions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut changes = Vec::new();
        for pair in versions.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if let (Some(from), Some(to)) = (&prev.content_hash, &next.content_hash) {
                if from != to {
                    changes.push(PageChange {
                        url: url.to_string(),
                        change_type: crate::content::ChangeKind::Modified,
                        from_timestamp: prev.timestamp.clone(),
                        to_timestamp: next.timestamp.clone(),
                        from_hash: Some(from.clone()),
                        to_hash: Some(to.clone()),
                        similarity: 0.0,
                        added_lines: 0,
                        removed_lines: 0,
                    });
                }
            }
        }

        let unique_hashes: BTreeSet<&String> =
            versions.iter().filter_map(|v| v.content_hash.as_ref()).collect();

        Ok(PageHistory {
            url: url.to_string(),
            first_seen: versions.first().map(|v| v.timestamp.clone()),
            last_seen: versions.last().map(|v| v.timestamp.clone()),
            total_versions: versions.len(),
            unique_versions: if unique_hashes.is_empty() {
                versions.len()
            } else {
                unique_hashes.len()
            },
            versions,
            changes,
        })
    }

    // ------------------------------------------------------------------
    // Content appearance
    // ------------------------------------------------------------------

    /// Walk sampled capture timestamps in order and report when the text
    /// first appeared (or first went missing after being present).
    pub async fn find_content_change(
        &self,
        domain: &str,
        search_text: &str,
        mode: ChangeMode,
        max_pages: usize,
    ) -> Result<ContentAppearance> {
        if search_text.trim().is_empty() {
            return Err(HindsightError::InvalidInput("empty search text".into()));
        }
        let domain = normalize_domain(domain);

        let map = self
            .mapper
            .map_domain(
                &domain,
                MapFilters {
                    limit_per_source: max_pages,
                    ..MapFilters::default()
                },
            )
            .await?;

        // Capture timestamps, ascending, each with the URLs seen then.
        let mut by_ts: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for url in &map.urls {
            if let Some(ts) = url.timestamp() {
                by_ts.entry(ts.to_string()).or_default().push(url.url.clone());
            }
        }
        let timestamps: Vec<String> = by_ts.keys().cloned().collect();
        let sampled = sample_evenly(&timestamps, self.config.timestamp_samples);

        let needle = search_text.to_lowercase();
        let mut prev_found: Option<bool> = None;

        for (i, ts) in sampled.into_iter().enumerate() {
            let urls = &by_ts[ts.as_str()];
            let mut found_here = false;
            let mut context: Option<(String, String)> = None; // (url, surrounding)

            for url in urls.iter().take(self.config.urls_per_timestamp) {
                let result = match self
                    .wayback
                    .fetch_at(url, &DateRange::default(), Some(ts.as_str()))
                    .await
                {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let Some(body) = result.body() else {
                    continue;
                };
                let lower = body.to_lowercase();
                if let Some(surrounding) = surrounding_text(&lower, &needle, 100) {
                    found_here = true;
                    context = Some((url.clone(), surrounding));
                    break;
                }
            }

            match mode {
                ChangeMode::Appeared => {
                    if found_here && (i == 0 || prev_found == Some(false)) {
                        let (url, surrounding) = context.unwrap_or_default();
                        return Ok(ContentAppearance {
                            search_text: search_text.to_string(),
                            domain,
                            change_type: mode.as_str().to_string(),
                            url: Some(url),
                            timestamp: Some(ts.clone()),
                            surrounding_text: Some(surrounding),
                            found: true,
                        });
                    }
                }
                ChangeMode::Disappeared => {
                    if !found_here && prev_found == Some(true) {
                        return Ok(ContentAppearance {
                            search_text: search_text.to_string(),
                            domain,
                            change_type: mode.as_str().to_string(),
                            url: urls.first().cloned(),
                            timestamp: Some(ts.clone()),
                            surrounding_text: None,
                            found: true,
                        });
                    }
                }
            }

            prev_found = Some(found_here);
        }

        debug!(domain = %domain, text = search_text, "content change not located");
        Ok(ContentAppearance {
            search_text: search_text.to_string(),
            domain,
            change_type: mode.as_str().to_string(),
            url: None,
            timestamp: None,
            surrounding_text: None,
            found: false,
        })
    }

    // ------------------------------------------------------------------
    // Point-in-time view
    // ------------------------------------------------------------------

    /// URLs observed in the same month as the target date.
    pub async fn domain_snapshot_at(
        &self,
        domain: &str,
        target_date: &str,
    ) -> Result<DomainSnapshotAt> {
        let compact: String = target_date
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        if compact.len() < 6 {
            return Err(HindsightError::InvalidInput(format!(
                "target date must be YYYY-MM-DD: {target_date}"
            )));
        }
        let year = &compact[..4];
        let month_prefix = &compact[..6];

        let map = self
            .mapper
            .map_domain(
                domain,
                MapFilters {
                    range: DateRange::new(
                        Some(&format!("{year}-01-01")),
                        Some(&format!("{year}-12-31")),
                    ),
                    ..MapFilters::default()
                },
            )
            .await?;

        let matching: Vec<&DiscoveredUrl> = map
            .urls
            .iter()
            .filter(|u| u.timestamp().is_some_and(|ts| ts.starts_with(month_prefix)))
            .collect();

        let mut sources: Vec<String> = matching.iter().map(|u| u.source.clone()).collect();
        sources.sort();
        sources.dedup();

        Ok(DomainSnapshotAt {
            domain: map.domain.clone(),
            target_date: target_date.to_string(),
            urls_found: matching.len(),
            urls: matching
                .iter()
                .take(self.config.period_sample_cap)
                .map(|u| u.url.clone())
                .collect(),
            sources,
        })
    }
}

// ----------------------------------------------------------------------
// Pure helpers
// ----------------------------------------------------------------------

fn filters_for(range: &DateRange) -> MapFilters {
    MapFilters {
        range: range.clone(),
        ..MapFilters::default()
    }
}

/// Bucket URLs by the year of their capture timestamp. URLs with no
/// timestamp (live-discovery sources) don't belong to any year.
fn group_by_year(
    urls: &[DiscoveredUrl],
    start_year: Option<i32>,
    end_year: Option<i32>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for url in urls {
        let Some(year) = url.timestamp().and_then(hindsight_common::types::ts_year) else {
            continue;
        };
        let Ok(numeric) = year.parse::<i32>() else {
            continue;
        };
        if start_year.is_some_and(|s| numeric < s) || end_year.is_some_and(|e| numeric > e) {
            continue;
        }
        groups
            .entry(year.to_string())
            .or_default()
            .insert(url.url.clone());
    }
    groups
}

/// Periods plus appeared/removed lists from consecutive year pairs.
fn evolution_from_groups(
    groups: &BTreeMap<String, BTreeSet<String>>,
    sample_cap: usize,
    change_cap: usize,
) -> (Vec<PeriodSummary>, Vec<DomainChange>, Vec<DomainChange>) {
    let periods: Vec<PeriodSummary> = groups
        .iter()
        .map(|(year, urls)| PeriodSummary {
            year: year.clone(),
            url_count: urls.len(),
            urls: urls.iter().take(sample_cap).cloned().collect(),
        })
        .collect();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut prev: Option<(&String, &BTreeSet<String>)> = None;

    for (year, urls) in groups {
        if let Some((prev_year, prev_urls)) = prev {
            for url in urls.difference(prev_urls) {
                added.push(DomainChange {
                    change_type: "page_added".to_string(),
                    url: url.clone(),
                    timestamp: year.clone(),
                    details: Some(format!("First seen in {year} (not in {prev_year})")),
                });
            }
            for url in prev_urls.difference(urls) {
                removed.push(DomainChange {
                    change_type: "page_removed".to_string(),
                    url: url.clone(),
                    timestamp: year.clone(),
                    details: Some(format!("Not seen in {year} (was in {prev_year})")),
                });
            }
        }
        prev = Some((year, urls));
    }

    added.truncate(change_cap);
    removed.truncate(change_cap);
    (periods, added, removed)
}

/// Expand a period spec into an inclusive date range: a bare year covers
/// the whole year, a full date covers that single day. Compact forms
/// (`20200615`) are accepted.
fn expand_period(period: &str) -> Option<DateRange> {
    let digits: String = period.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        4 => Some(DateRange::new(
            Some(&format!("{digits}-01-01")),
            Some(&format!("{digits}-12-31")),
        )),
        8 => {
            let formatted = format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..8]);
            Some(DateRange::new(Some(&formatted), Some(&formatted)))
        }
        _ => None,
    }
}

/// Evenly spaced sample of ~`target` items; exhaustive when the input is
/// already small enough.
fn sample_evenly<'a, T>(items: &'a [T], target: usize) -> Vec<&'a T> {
    if items.is_empty() || target == 0 {
        return Vec::new();
    }
    let stride = (items.len() / target).max(1);
    items.iter().step_by(stride).collect()
}

/// ±`context` characters around the needle, on char boundaries.
fn surrounding_text(haystack: &str, needle: &str, context: usize) -> Option<String> {
    let pos = haystack.find(needle)?;
    let mut start = pos.saturating_sub(context);
    while start > 0 && !haystack.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + needle.len() + context).min(haystack.len());
    while end < haystack.len() && !haystack.is_char_boundary(end) {
        end += 1;
    }
    Some(haystack[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hindsight_mapper::SourceDetails;

    fn archived(url: &str, ts: &str) -> DiscoveredUrl {
        DiscoveredUrl::new(url, "acme.com", "wayback").with_details(SourceDetails::Archive {
            timestamp: Some(ts.to_string()),
            status_code: Some(200),
            mime_type: None,
            content_length: None,
            digest: None,
            archive_url: None,
            warc_file: None,
            archive_name: None,
        })
    }

    #[test]
    fn grouping_by_year_skips_untimestamped() {
        let urls = vec![
            archived("https://acme.com/a", "20200101000000"),
            archived("https://acme.com/b", "20200601000000"),
            archived("https://acme.com/c", "20220101000000"),
            DiscoveredUrl::new("https://acme.com/live", "acme.com", "crt.sh"),
        ];
        let groups = group_by_year(&urls, None, None);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["2020"].len(), 2);
        assert_eq!(groups["2022"].len(), 1);
    }

    #[test]
    fn grouping_honors_year_bounds() {
        let urls = vec![
            archived("https://acme.com/a", "20190101000000"),
            archived("https://acme.com/b", "20210101000000"),
            archived("https://acme.com/c", "20250101000000"),
        ];
        let groups = group_by_year(&urls, Some(2020), Some(2024));
        assert_eq!(groups.len(), 1);
        assert!(groups.contains_key("2021"));
    }

    #[test]
    fn evolution_derives_additions_and_removals() {
        // 2020: {a, b}; 2022: {b, c}; 2024: {c}
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        groups.insert("2020".into(), ["a", "b"].iter().map(|s| s.to_string()).collect());
        groups.insert("2022".into(), ["b", "c"].iter().map(|s| s.to_string()).collect());
        groups.insert("2024".into(), ["c"].iter().map(|s| s.to_string()).collect());

        let (periods, added, removed) = evolution_from_groups(&groups, 100, 500);
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].year, "2020");
        assert_eq!(periods[0].url_count, 2);

        // c appeared in 2022; nothing new in 2024.
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].url, "c");
        assert_eq!(added[0].timestamp, "2022");

        // a vanished by 2022, b vanished by 2024.
        let removed_urls: Vec<&str> = removed.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(removed_urls, vec!["a", "b"]);
    }

    #[test]
    fn evolution_caps_change_lists() {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        groups.insert("2020".into(), BTreeSet::new());
        groups.insert(
            "2021".into(),
            (0..600).map(|i| format!("https://acme.com/p{i}")).collect(),
        );
        let (_, added, _) = evolution_from_groups(&groups, 100, 500);
        assert_eq!(added.len(), 500);
    }

    #[test]
    fn period_expansion() {
        let year = expand_period("2020").unwrap();
        assert_eq!(year.start.as_deref(), Some("2020-01-01"));
        assert_eq!(year.end.as_deref(), Some("2020-12-31"));

        let day = expand_period("2020-06-15").unwrap();
        assert_eq!(day.start.as_deref(), Some("2020-06-15"));
        assert_eq!(day.end.as_deref(), Some("2020-06-15"));

        let compact = expand_period("20200615").unwrap();
        assert_eq!(compact.start.as_deref(), Some("2020-06-15"));

        assert!(expand_period("junk").is_none());
        assert!(expand_period("202").is_none());
    }

    #[test]
    fn sampling_is_exhaustive_at_the_low_end() {
        let items: Vec<i32> = (0..10).collect();
        let sampled = sample_evenly(&items, 20);
        assert_eq!(sampled.len(), 10);

        let items: Vec<i32> = (0..100).collect();
        let sampled = sample_evenly(&items, 20);
        assert_eq!(sampled.len(), 20);
        assert_eq!(*sampled[0], 0);
        assert_eq!(*sampled[1], 5);
    }

    #[test]
    fn surrounding_text_is_boundary_safe() {
        let text = format!("{}john smith{}", "é".repeat(200), "ü".repeat(200));
        let lower = text.to_lowercase();
        let ctx = surrounding_text(&lower, "john smith", 100).unwrap();
        assert!(ctx.contains("john smith"));
        assert!(surrounding_text("nothing here", "absent", 100).is_none());
    }
}
