use crate::UrlError;
use url::Url;

/// Normalizes a crawl request URL
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not HTTP or HTTPS
/// 3. Reject URLs without a host
/// 4. Remove the query string
/// 5. Remove the fragment
///
/// Host lowercasing and percent-encoding cleanup come from the `url` parser.
///
/// # Examples
///
/// ```
/// use table_reviews::url::normalize_url;
///
/// let url = normalize_url("https://www.opentable.com/r/bistro?corrid=1#reviews").unwrap();
/// assert_eq!(url.as_str(), "https://www.opentable.com/r/bistro");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}
