use std::time::Duration;

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

pub(crate) fn backoff(current: Duration, max: Duration) -> Duration {
    let next = current.mul_f64(1.5).max(Duration::from_millis(1));
    if next > max { max } else { next }
}

pub(crate) fn guess_filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().and_then(|s| {
        if s.is_empty() || s.contains(':') {
            None
        } else {
            Some(s.to_string())
        }
    })
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// Percent-encodes twice, the form the platform proxies expect for URLs
/// embedded in a path segment.
pub(crate) fn double_encode(value: &str) -> String {
    let once = urlencoding::encode(value);
    urlencoding::encode(&once).into_owned()
}

/// `s3://bucket/key` -> `https://bucket.s3.amazonaws.com/key`
pub(crate) fn s3_to_http(url: &str) -> Option<String> {
    let rest = url.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some(format!("https://{}.s3.amazonaws.com/{}", bucket, key))
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let max = Duration::from_secs(10);
        let next = backoff(Duration::from_secs(2), max);
        assert_eq!(next, Duration::from_secs(3));
        assert_eq!(backoff(Duration::from_secs(9), max), max);
    }

    #[test]
    fn urljoin_trims_slashes() {
        assert_eq!(urljoin("https://h/api/", "/dps/job/"), "https://h/api/dps/job");
        assert_eq!(urljoin("https://h/api", "https://other/x"), "https://other/x");
        assert_eq!(urljoin("https://h/api/", ""), "https://h/api");
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(
            guess_filename_from_url("https://data.example/a/b/file.h5?x=1").as_deref(),
            Some("file.h5")
        );
        assert_eq!(guess_filename_from_url("https://data.example/dir/"), None);
    }

    #[test]
    fn s3_conversion() {
        assert_eq!(
            s3_to_http("s3://bucket/path/to/f.tif").as_deref(),
            Some("https://bucket.s3.amazonaws.com/path/to/f.tif")
        );
        assert_eq!(s3_to_http("s3://bucket"), None);
        assert_eq!(s3_to_http("https://x/y"), None);
    }

    #[test]
    fn double_encoding_escapes_percent() {
        assert_eq!(double_encode("a b/c"), "a%2520b%252Fc");
    }
}
