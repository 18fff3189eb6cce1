use url::Url;

/// Checks if a host belongs to a configured site domain
///
/// Three pattern forms are supported:
/// 1. Exact: "opentable.com" matches "opentable.com"
/// 2. Implicit www: "opentable.com" also matches "www.opentable.com"
/// 3. Wildcard: "*.opentable.com" matches the bare domain and any subdomain
///
/// # Examples
///
/// ```
/// use table_reviews::url::matches_site_domain;
///
/// assert!(matches_site_domain("opentable.com", "www.opentable.com"));
/// assert!(matches_site_domain("opentable.co.uk", "opentable.co.uk"));
/// assert!(!matches_site_domain("opentable.com", "opentable.com.au"));
/// assert!(matches_site_domain("*.opentable.com", "fr.opentable.com"));
/// ```
pub fn matches_site_domain(pattern: &str, host: &str) -> bool {
    let host = host.to_lowercase();
    if let Some(base) = pattern.strip_prefix("*.") {
        host == base || host.ends_with(&format!(".{}", base))
    } else {
        host == pattern || host.strip_prefix("www.") == Some(pattern)
    }
}

/// Checks if a URL points at a restaurant detail page on a supported site
///
/// The URL must be HTTP(S), its host must match one of `domains`, and its path
/// must start with the `/r/` restaurant segment.
pub fn is_detail_link(url: &Url, domains: &[String]) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }

    let Some(host) = url.host_str() else {
        return false;
    };

    if !domains.iter().any(|d| matches_site_domain(d, host)) {
        return false;
    }

    url.path().starts_with("/r/") && url.path().len() > "/r/".len()
}
