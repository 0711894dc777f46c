use hindsight_common::ArchiveSource;
use serde::{Deserialize, Serialize};

use crate::text_extract::OutlinkNote;

/// One matched snapshot, with its context and link roll-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub timestamp: String,
    pub year: i32,
    /// The keyword that matched; `None` when the search ran unfiltered.
    pub keyword: Option<String>,
    pub source: ArchiveSource,
    pub digest: Option<String>,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Matched inside a ranged prefix fetch, before the full download.
    #[serde(default)]
    pub ghost: bool,
    #[serde(default)]
    pub outlinks: Vec<String>,
    #[serde(default)]
    pub outlink_notes: Vec<OutlinkNote>,
    #[serde(default)]
    pub outlink_domains: Vec<String>,
}

/// Which consumer-facing lane a status event belongs to: `progress` for
/// coarse completion tracking, `deep` for per-snapshot activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Deep,
    Progress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub channel: Channel,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<SearchHit>>,
}

/// One item of the search engine's output stream. The engine never throws
/// across the stream boundary — failures become `Error` events or silence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArchiveEvent {
    Hit(SearchHit),
    Status(StatusEvent),
    Error { message: String },
}

impl ArchiveEvent {
    pub fn year_complete(year: i32, completed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (100 * completed / total) as u8
        };
        ArchiveEvent::Status(StatusEvent {
            channel: Channel::Progress,
            state: "year_complete".to_string(),
            year: Some(year),
            completed: Some(completed),
            total: Some(total),
            percent: Some(percent),
            message: format!("Year {year} complete ({completed}/{total})"),
            payload: None,
        })
    }

    pub fn deep_progress(message: String) -> Self {
        ArchiveEvent::Status(StatusEvent {
            channel: Channel::Deep,
            state: "progress".to_string(),
            year: None,
            completed: None,
            total: None,
            percent: None,
            message,
            payload: None,
        })
    }

    pub fn deep_hit(message: String, hit: SearchHit) -> Self {
        ArchiveEvent::Status(StatusEvent {
            channel: Channel::Deep,
            state: "hit".to_string(),
            year: None,
            completed: None,
            total: None,
            percent: None,
            message,
            payload: Some(Box::new(hit)),
        })
    }

    pub fn as_hit(&self) -> Option<&SearchHit> {
        match self {
            ArchiveEvent::Hit(hit) => Some(hit),
            _ => None,
        }
    }

    pub fn is_year_complete(&self) -> bool {
        matches!(self, ArchiveEvent::Status(s) if s.state == "year_complete")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_complete_carries_progress_fields() {
        let ev = ArchiveEvent::year_complete(2023, 1, 2);
        let ArchiveEvent::Status(status) = &ev else {
            panic!("expected status event");
        };
        assert_eq!(status.channel, Channel::Progress);
        assert_eq!(status.state, "year_complete");
        assert_eq!(status.percent, Some(50));
        assert!(ev.is_year_complete());
    }

    #[test]
    fn events_serialize_tagged() {
        let ev = ArchiveEvent::deep_progress("2023 ▸ 20230601120000 ▸ example.com".into());
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["channel"], "deep");
        assert_eq!(json["state"], "progress");
        // Unset optionals are omitted from the wire form.
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn hit_round_trips() {
        let hit = SearchHit {
            url: "https://example.com/".into(),
            timestamp: "20230601120000".into(),
            year: 2023,
            keyword: Some("annual report".into()),
            source: ArchiveSource::WaybackData,
            digest: None,
            snippet: "…the annual report shows…".into(),
            html: None,
            ghost: false,
            outlinks: vec!["https://other.org/".into()],
            outlink_notes: vec![],
            outlink_domains: vec!["other.org".into()],
        };
        let json = serde_json::to_string(&ArchiveEvent::Hit(hit)).unwrap();
        let back: ArchiveEvent = serde_json::from_str(&json).unwrap();
        let hit = back.as_hit().unwrap();
        assert_eq!(hit.keyword.as_deref(), Some("annual report"));
        assert_eq!(hit.year, 2023);
    }
}
