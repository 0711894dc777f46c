//! URL and domain normalization used for querying and dedup keys.

/// Normalize a domain for querying: trim, downcase, strip scheme and path
/// if a full URL was passed, strip a leading `www.`.
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim().to_lowercase();
    let host = if trimmed.contains("://") {
        match url::Url::parse(&trimmed) {
            Ok(u) => u.host_str().unwrap_or_default().to_string(),
            Err(_) => trimmed,
        }
    } else {
        // Bare domain, possibly with a path tacked on.
        trimmed.split('/').next().unwrap_or_default().to_string()
    };
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

/// Normalize a URL into a dedup key: scheme and host lowercased, `www.`
/// stripped from the host, fragment dropped. Idempotent —
/// `normalize_url(normalize_url(u)) == normalize_url(u)`.
pub fn normalize_url(raw: &str) -> String {
    let mut parsed = match url::Url::parse(raw.trim()) {
        Ok(u) => u,
        // Not an absolute URL: fall back to a case-folded trim so dedup
        // still behaves deterministically.
        Err(_) => return raw.trim().to_lowercase(),
    };
    parsed.set_fragment(None);
    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        let stripped = lowered.strip_prefix("www.").unwrap_or(&lowered).to_string();
        if stripped != host {
            // set_host only fails on cannot-be-a-base URLs, which parsed fine above.
            let _ = parsed.set_host(Some(&stripped));
        }
    }
    parsed.to_string()
}

/// Extract the host of a URL, accepting bare domains.
pub fn host_of(url: &str) -> Option<String> {
    let candidate = if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    };
    url::Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_from_bare_name() {
        assert_eq!(normalize_domain("Example.COM"), "example.com");
        assert_eq!(normalize_domain("  example.com  "), "example.com");
    }

    #[test]
    fn domain_from_url() {
        assert_eq!(normalize_domain("https://www.example.com/path"), "example.com");
        assert_eq!(normalize_domain("http://api.example.com"), "api.example.com");
    }

    #[test]
    fn domain_strips_www_but_not_inner_w() {
        assert_eq!(normalize_domain("www.example.com"), "example.com");
        // A domain that merely starts with 'w' keeps its name.
        assert_eq!(normalize_domain("web.example.com"), "web.example.com");
        assert_eq!(normalize_domain("wwwx.com"), "wwwx.com");
    }

    #[test]
    fn domain_with_trailing_path_no_scheme() {
        assert_eq!(normalize_domain("example.com/about"), "example.com");
    }

    #[test]
    fn url_normalization_is_idempotent() {
        let cases = [
            "HTTPS://WWW.Example.com/Path?q=1#frag",
            "http://example.com",
            "https://sub.example.com/a/b",
            "not a url at all",
        ];
        for raw in cases {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn url_normalization_strips_fragment_and_www() {
        assert_eq!(
            normalize_url("https://WWW.Example.com/Path#section"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn url_path_case_is_preserved() {
        // Paths are case-sensitive on most servers; only scheme/host fold.
        assert_eq!(
            normalize_url("https://example.com/CaseSensitive"),
            "https://example.com/CaseSensitive"
        );
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://api.example.com/x").as_deref(), Some("api.example.com"));
        assert_eq!(host_of("example.com").as_deref(), Some("example.com"));
        assert_eq!(host_of(""), None);
    }
}
