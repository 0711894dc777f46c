//! Text and link extraction from archived HTML.

use std::collections::HashSet;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Elements whose text is chrome, not page content.
const EXCLUDED_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "noscript"];

/// Extract visible text from HTML: everything except script/style/nav/
/// footer/header content, whitespace-collapsed.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::new();

    for node in doc.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let excluded = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| EXCLUDED_TAGS.contains(&e.name()))
        });
        if !excluded {
            out.push_str(text);
            out.push(' ');
        }
    }

    collapse_whitespace(&out)
}

/// First `<title>` text, if any.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").expect("valid selector");
    doc.select(&selector).next().map(|el| {
        collapse_whitespace(&el.text().collect::<String>())
    })
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlinkNote {
    pub url: String,
    pub anchor_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outlinks {
    pub urls: Vec<String>,
    pub notes: Vec<OutlinkNote>,
    /// Sorted, unique target domains.
    pub domains: Vec<String>,
}

/// Extract external links from a page: anchors resolved against the base
/// URL, same-domain and non-http(s) targets dropped, deduplicated, capped
/// at `max`. Anchor text travels alongside for note-taking.
pub fn extract_outlinks(html: &str, base_url: &str, max: usize) -> Outlinks {
    if max == 0 {
        return Outlinks::default();
    }

    let doc = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("valid selector");
    let base = url::Url::parse(base_url).ok();
    let base_domain = base
        .as_ref()
        .and_then(|b| b.host_str())
        .map(strip_www)
        .unwrap_or_default();

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Outlinks::default();
    let mut domains: HashSet<String> = HashSet::new();

    for el in doc.select(&selector) {
        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("javascript:")
        {
            continue;
        }

        let resolved = match (&base, url::Url::parse(href)) {
            (_, Ok(abs)) => abs,
            (Some(b), Err(_)) => match b.join(href) {
                Ok(u) => u,
                Err(_) => continue,
            },
            (None, Err(_)) => continue,
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }

        let target_domain = match resolved.host_str() {
            Some(h) => strip_www(h),
            None => continue,
        };
        // Internal links are not outlinks. The suffix check covers
        // subdomain pages linking to the root and vice versa.
        if !base_domain.is_empty()
            && (target_domain.ends_with(&base_domain) || base_domain.ends_with(&target_domain))
        {
            continue;
        }

        let full = resolved.to_string();
        if !seen.insert(full.clone()) {
            continue;
        }

        let anchor = collapse_whitespace(&el.text().collect::<String>());
        let anchor = truncate_chars(&anchor, 200);

        out.urls.push(full.clone());
        domains.insert(target_domain);
        if !anchor.is_empty() {
            out.notes.push(OutlinkNote {
                url: full,
                anchor_text: anchor,
            });
        }

        if out.urls.len() >= max {
            break;
        }
    }

    out.domains = domains.into_iter().collect();
    out.domains.sort();
    out
}

fn strip_www(host: &str) -> String {
    let lowered = host.to_lowercase();
    lowered.strip_prefix("www.").unwrap_or(&lowered).to_string()
}

/// ASCII-fold text for accent-insensitive matching: NFKD decomposition
/// with combining marks stripped.
pub fn fold_ascii(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Contextual excerpt around the first case-insensitive occurrence of
/// `keyword`, roughly `context` characters wide, with ellipses at cut
/// edges. Falls back to the head of the text when the keyword is absent.
pub fn snippet(text: &str, keyword: &str, context: usize) -> String {
    let lower = text.to_lowercase();
    let kw = keyword.to_lowercase();

    // Byte offsets into the lowered copy are only valid against the
    // original when lowering preserved the length; otherwise excerpt the
    // lowered text, which is what was matched.
    let hay: &str = if lower.len() == text.len() { text } else { &lower };

    let Some(pos) = (if kw.is_empty() { None } else { lower.find(&kw) }) else {
        return hay[..floor_boundary(hay, context.min(hay.len()))].to_string();
    };

    let start = floor_boundary(hay, pos.saturating_sub(context / 2));
    let end = floor_boundary(hay, (pos + kw.len() + context / 2).min(hay.len()));

    let mut excerpt = hay[start..end].to_string();
    if start > 0 {
        excerpt = format!("...{excerpt}");
    }
    if end < hay.len() {
        excerpt.push_str("...");
    }
    excerpt
}

/// Largest char boundary ≤ `index`.
fn floor_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head><title>Acme Corp — About</title>
        <script>var tracking = "ignore me";</script>
        <style>.x { color: red }</style></head>
        <body>
        <nav><a href="/home">Home</a> navigation text</nav>
        <header>site header</header>
        <p>Annual report for investors.</p>
        <a href="https://partner.example.org/deal">Partner deal</a>
        <a href="https://acme.com/internal">Internal</a>
        <a href="mailto:info@acme.com">Mail</a>
        <a href="/relative/page">Relative</a>
        <footer>footer junk</footer>
        </body></html>
    "#;

    #[test]
    fn visible_text_skips_chrome_and_scripts() {
        let text = html_to_text(PAGE);
        assert!(text.contains("Annual report for investors."));
        assert!(!text.contains("ignore me"));
        assert!(!text.contains("navigation text"));
        assert!(!text.contains("footer junk"));
        assert!(!text.contains("site header"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn title_extraction() {
        assert_eq!(extract_title(PAGE).as_deref(), Some("Acme Corp — About"));
        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn outlinks_are_external_only() {
        let links = extract_outlinks(PAGE, "https://acme.com/about", 50);
        assert_eq!(links.urls, vec!["https://partner.example.org/deal"]);
        assert_eq!(links.domains, vec!["partner.example.org"]);
        assert_eq!(links.notes.len(), 1);
        assert_eq!(links.notes[0].anchor_text, "Partner deal");
    }

    #[test]
    fn outlinks_skip_mailto_and_fragments() {
        let html = r##"
            <a href="mailto:a@b.c">m</a>
            <a href="#top">t</a>
            <a href="tel:+123">p</a>
            <a href="javascript:void(0)">j</a>
            <a href="https://other.org/x">ok</a>
        "##;
        let links = extract_outlinks(html, "https://acme.com/", 50);
        assert_eq!(links.urls, vec!["https://other.org/x"]);
    }

    #[test]
    fn outlinks_dedup_and_cap() {
        let html = r#"
            <a href="https://a.org/1">one</a>
            <a href="https://a.org/1">dup</a>
            <a href="https://b.org/2">two</a>
            <a href="https://c.org/3">three</a>
        "#;
        let links = extract_outlinks(html, "https://acme.com/", 2);
        assert_eq!(links.urls.len(), 2);
        assert_eq!(links.domains, vec!["a.org", "b.org"]);
    }

    #[test]
    fn outlinks_respect_subdomain_boundary() {
        let html = r#"
            <a href="https://blog.acme.com/post">internal</a>
            <a href="https://www.acme.com/">internal www</a>
            <a href="https://acmeco.com/">external</a>
        "#;
        let links = extract_outlinks(html, "https://acme.com/", 50);
        assert_eq!(links.urls, vec!["https://acmeco.com/"]);
    }

    #[test]
    fn zero_max_returns_nothing() {
        let links = extract_outlinks(PAGE, "https://acme.com/", 0);
        assert!(links.urls.is_empty() && links.notes.is_empty() && links.domains.is_empty());
    }

    #[test]
    fn snippet_centers_on_keyword() {
        let text = format!("{}annual report{}", "x".repeat(500), "y".repeat(500));
        let s = snippet(&text, "Annual Report", 150);
        assert!(s.to_lowercase().contains("annual report"));
        assert!(s.starts_with("..."));
        assert!(s.ends_with("..."));
        assert!(s.len() < 200);
    }

    #[test]
    fn snippet_missing_keyword_returns_head() {
        let s = snippet("short text here", "absent", 150);
        assert_eq!(s, "short text here");
    }

    #[test]
    fn snippet_does_not_split_multibyte_chars() {
        let text = format!("{}münchen report{}", "é".repeat(200), "ü".repeat(200));
        let s = snippet(&text, "münchen", 150);
        assert!(s.contains("münchen"));
    }

    #[test]
    fn ascii_folding_strips_accents() {
        assert_eq!(fold_ascii("Müller Şirket São"), "Muller Sirket Sao");
        assert_eq!(fold_ascii("plain"), "plain");
    }
}
