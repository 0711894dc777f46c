//! Google Analytics / Tag Manager code extraction from archived HTML.
//!
//! Tracking codes persist across redesigns and rebrands, which makes them
//! useful for tying domains together over time.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static UA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bUA-\d{4,10}-\d{1,4}\b").expect("valid regex"));
static GA4_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bG-[A-Z0-9]{6,12}\b").expect("valid regex"));
static GTM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bGTM-[A-Z0-9]{4,9}\b").expect("valid regex"));
static AW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bAW-\d{9,11}\b").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaCodes {
    /// Universal Analytics (`UA-123456-1`).
    pub ua: Vec<String>,
    /// GA4 measurement IDs (`G-XXXXXXX`).
    pub ga4: Vec<String>,
    /// Tag Manager containers (`GTM-XXXXXX`).
    pub gtm: Vec<String>,
    /// Google Ads conversion IDs (`AW-XXXXXXXXX`).
    pub aw: Vec<String>,
}

impl GaCodes {
    pub fn is_empty(&self) -> bool {
        self.ua.is_empty() && self.ga4.is_empty() && self.gtm.is_empty() && self.aw.is_empty()
    }
}

/// Extract all tracking codes present in a page, deduplicated, grouped by kind.
pub fn extract_ga_codes(html: &str) -> GaCodes {
    GaCodes {
        ua: matches_of(&UA_RE, html),
        ga4: matches_of(&GA4_RE, html),
        gtm: matches_of(&GTM_RE, html),
        aw: matches_of(&AW_RE, html),
    }
}

fn matches_of(re: &Regex, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    re.find_iter(text)
        .filter_map(|m| {
            let code = m.as_str().to_string();
            seen.insert(code.clone()).then_some(code)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_kinds() {
        let html = r#"
            ga('create', 'UA-123456-1', 'auto');
            gtag('config', 'G-AB12CD34');
            <script src="https://www.googletagmanager.com/gtm.js?id=GTM-WXYZ12"></script>
            gtag('config', 'AW-123456789');
        "#;
        let codes = extract_ga_codes(html);
        assert_eq!(codes.ua, vec!["UA-123456-1"]);
        assert_eq!(codes.ga4, vec!["G-AB12CD34"]);
        assert_eq!(codes.gtm, vec!["GTM-WXYZ12"]);
        assert_eq!(codes.aw, vec!["AW-123456789"]);
    }

    #[test]
    fn duplicates_collapse() {
        let html = "UA-111111-1 UA-111111-1 UA-111111-2";
        let codes = extract_ga_codes(html);
        assert_eq!(codes.ua, vec!["UA-111111-1", "UA-111111-2"]);
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(extract_ga_codes("<html><body>hello</body></html>").is_empty());
    }

    #[test]
    fn does_not_match_lookalikes() {
        // Lowercase and truncated forms are not valid codes.
        let codes = extract_ga_codes("ua-123456-1 G-AB GTM-X");
        assert!(codes.is_empty());
    }
}
