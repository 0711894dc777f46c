//! Page-content comparison: visible-text hashing, similarity scoring, and
//! change classification.

use hindsight_archive::text_extract::{collapse_whitespace, html_to_text};
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// Diff computation runs inline on the event loop; comparing whole pages
/// unbounded would stall it, so compared text is capped.
pub const MAX_COMPARED_CHARS: usize = 50 * 1024;

/// Change classification thresholds on the similarity ratio.
const IDENTICAL_THRESHOLD: f64 = 0.99;
const MINOR_THRESHOLD: f64 = 0.90;
const MODIFIED_THRESHOLD: f64 = 0.50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Identical,
    MinorChange,
    Modified,
    MajorChange,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identical => "identical",
            Self::MinorChange => "minor_change",
            Self::Modified => "modified",
            Self::MajorChange => "major_change",
        }
    }
}

pub fn classify(similarity: f64) -> ChangeKind {
    if similarity >= IDENTICAL_THRESHOLD {
        ChangeKind::Identical
    } else if similarity >= MINOR_THRESHOLD {
        ChangeKind::MinorChange
    } else if similarity >= MODIFIED_THRESHOLD {
        ChangeKind::Modified
    } else {
        ChangeKind::MajorChange
    }
}

/// First 16 hex chars of MD5 over whitespace-normalized text. Used only
/// for equality, never ordering.
pub fn content_hash(text: &str) -> String {
    let normalized = collapse_whitespace(text.trim());
    let digest = md5::compute(normalized.as_bytes());
    format!("{digest:x}")[..16].to_string()
}

/// Visible page text for comparison purposes.
pub fn extract_text(html: &str) -> String {
    html_to_text(html)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextComparison {
    pub similarity: f64,
    pub added_lines: usize,
    pub removed_lines: usize,
    pub from_hash: String,
    pub to_hash: String,
    pub kind: ChangeKind,
}

/// Compare two extracted texts: similarity ratio in [0, 1], line-level
/// add/remove counts, truncated hashes, and the classified change kind.
/// Equal hashes short-circuit to similarity 1.0.
pub fn compare_texts(from: &str, to: &str) -> TextComparison {
    let from = cap_chars(from, MAX_COMPARED_CHARS);
    let to = cap_chars(to, MAX_COMPARED_CHARS);

    let from_hash = content_hash(from);
    let to_hash = content_hash(to);

    if from_hash == to_hash {
        return TextComparison {
            similarity: 1.0,
            added_lines: 0,
            removed_lines: 0,
            from_hash,
            to_hash,
            kind: ChangeKind::Identical,
        };
    }

    let similarity = if from.is_empty() || to.is_empty() {
        0.0
    } else {
        TextDiff::from_chars(from, to).ratio() as f64
    };

    let line_diff = TextDiff::from_lines(from, to);
    let mut added_lines = 0;
    let mut removed_lines = 0;
    for change in line_diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added_lines += 1,
            ChangeTag::Delete => removed_lines += 1,
            ChangeTag::Equal => {}
        }
    }

    TextComparison {
        similarity,
        added_lines,
        removed_lines,
        from_hash,
        to_hash,
        kind: classify(similarity),
    }
}

fn cap_chars(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_under_whitespace() {
        let a = content_hash("hello   world");
        let b = content_hash("  hello\n\tworld  ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_text_different_hash() {
        assert_ne!(content_hash("alpha"), content_hash("beta"));
    }

    #[test]
    fn equal_hashes_imply_full_similarity() {
        // Same normalized text, different raw whitespace.
        let cmp = compare_texts("hello   world", "hello\nworld");
        assert_eq!(cmp.similarity, 1.0);
        assert_eq!(cmp.kind, ChangeKind::Identical);
        assert_eq!(cmp.added_lines, 0);
        assert_eq!(cmp.removed_lines, 0);
    }

    #[test]
    fn similarity_is_bounded() {
        let cmp = compare_texts("completely different", "nothing in common at all zzz");
        assert!((0.0..=1.0).contains(&cmp.similarity));
        let cmp = compare_texts("", "some text");
        assert_eq!(cmp.similarity, 0.0);
        assert_eq!(cmp.kind, ChangeKind::MajorChange);
    }

    #[test]
    fn line_counts_track_insertions_and_deletions() {
        let from = "line one\nline two\nline three\n";
        let to = "line one\nline 2\nline three\nline four\n";
        let cmp = compare_texts(from, to);
        assert_eq!(cmp.removed_lines, 1); // "line two"
        assert_eq!(cmp.added_lines, 2); // "line 2", "line four"
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(1.0), ChangeKind::Identical);
        assert_eq!(classify(0.99), ChangeKind::Identical);
        assert_eq!(classify(0.95), ChangeKind::MinorChange);
        assert_eq!(classify(0.90), ChangeKind::MinorChange);
        assert_eq!(classify(0.70), ChangeKind::Modified);
        assert_eq!(classify(0.50), ChangeKind::Modified);
        assert_eq!(classify(0.10), ChangeKind::MajorChange);
    }

    #[test]
    fn oversized_text_is_capped_not_panicked() {
        let big = "é".repeat(MAX_COMPARED_CHARS);
        let cmp = compare_texts(&big, &big);
        assert_eq!(cmp.similarity, 1.0);
    }
}
