//! SURT (Sort-friendly URI Reordering Transform) keys.
//!
//! CommonCrawl's cluster index sorts on reversed hostnames: labels of the
//! DNS name reversed and comma-joined, so every URL of a domain (and its
//! subdomains) clusters under a common prefix. `api.example.com/path`
//! sorts under `com,example,api)/path`.

/// Convert a domain to its SURT key: downcase, drop a leading `www.`,
/// reverse the labels, join with commas.
pub fn domain_key(domain: &str) -> String {
    let host = domain.trim().to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let mut labels: Vec<&str> = host.split('.').collect();
    labels.reverse();
    labels.join(",")
}

/// Recover the original host from a SURT key (modulo case).
pub fn surt_to_host(key: &str) -> String {
    let host_part = key.split([')', '/']).next().unwrap_or(key);
    let mut labels: Vec<&str> = host_part.split(',').collect();
    labels.reverse();
    labels.join(".")
}

/// Whether a full SURT key belongs to the domain identified by `prefix`.
///
/// The character immediately after the prefix must be `)` (domain root) or
/// `,` (a subdomain label follows). Anything else is a different domain
/// that merely shares a string prefix — `com,example` must not match
/// `com,examplecompany)/`.
pub fn key_in_domain(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        None => false,
        Some("") => true,
        Some(rest) => matches!(rest.as_bytes()[0], b')' | b','),
    }
}

/// Whether `host` is `domain` itself or one of its subdomains.
pub fn host_within(host: &str, domain: &str) -> bool {
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let domain = domain.to_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverses_labels() {
        assert_eq!(domain_key("example.com"), "com,example");
        assert_eq!(domain_key("api.example.com"), "com,example,api");
    }

    #[test]
    fn strips_www_and_downcases() {
        assert_eq!(domain_key("WWW.Example.COM"), "com,example");
        assert_eq!(domain_key("www.api.example.com"), "com,example,api");
    }

    #[test]
    fn surt_is_reversible() {
        for host in ["example.com", "api.example.com", "a.b.c.example.co.uk"] {
            assert_eq!(surt_to_host(&domain_key(host)), host);
        }
    }

    #[test]
    fn reversible_from_full_key() {
        assert_eq!(surt_to_host("com,example,api)/path"), "api.example.com");
    }

    #[test]
    fn subdomains_share_a_contiguous_range() {
        // All subdomains of example.com sort between the root key and any
        // sibling domain, so a sorted index clusters them under one prefix.
        let mut keys = vec![
            domain_key("examplecompany.com"),
            domain_key("example.com"),
            domain_key("zzz.example.com"),
            domain_key("api.example.com"),
            domain_key("exampl.com"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "com,exampl",
                "com,example",
                "com,example,api",
                "com,example,zzz",
                "com,examplecompany",
            ]
        );
    }

    #[test]
    fn surt_ordering_follows_label_ordering() {
        // SURT(a.b.c) < SURT(a.bz.c) iff b < bz.
        assert!(domain_key("a.b.c") < domain_key("a.bz.c"));
        assert!(domain_key("a.ba.c") < domain_key("a.bz.c"));
        assert!(domain_key("a.bz.c") > domain_key("a.b.c"));
    }

    #[test]
    fn boundary_rejects_string_prefix_collisions() {
        let prefix = domain_key("example.com");
        assert!(key_in_domain("com,example)/", &prefix));
        assert!(key_in_domain("com,example)/path/page", &prefix));
        assert!(key_in_domain("com,example,api)/v1", &prefix));
        assert!(!key_in_domain("com,examplecompany)/", &prefix));
        assert!(!key_in_domain("com,exampleco)/about", &prefix));
        assert!(!key_in_domain("com,exam)/", &prefix));
    }

    #[test]
    fn host_containment() {
        assert!(host_within("example.com", "example.com"));
        assert!(host_within("www.example.com", "example.com"));
        assert!(host_within("api.example.com", "example.com"));
        assert!(!host_within("exampleco.com", "example.com"));
        assert!(!host_within("notexample.com", "example.com"));
    }
}
