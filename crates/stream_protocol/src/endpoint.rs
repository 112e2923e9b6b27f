use url::Url;

use crate::error::StreamApiError;

/// Default origin for the local agent proxy.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5050";
pub const DEFAULT_QUERY_PATH: &str = "/api/input/sdk/query";
pub const DEFAULT_INTERRUPT_PATH: &str = "/api/input/sdk/interrupt";

/// Resolve an endpoint path against a base URL.
///
/// Resolution rules:
/// 1) an empty base falls back to [`DEFAULT_BASE_URL`]
/// 2) any path prefix already on the base is preserved
/// 3) an absolute `http(s)` endpoint is used as-is
pub fn endpoint_url(base: &str, path: &str) -> Result<Url, StreamApiError> {
    let path = path.trim();
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path)
            .map_err(|error| StreamApiError::InvalidBaseUrl(format!("{path}: {error}")));
    }

    let base = if base.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        base.trim()
    };

    let mut root = Url::parse(base)
        .map_err(|error| StreamApiError::InvalidBaseUrl(format!("{base}: {error}")))?;
    if !matches!(root.scheme(), "http" | "https") {
        return Err(StreamApiError::InvalidBaseUrl(format!(
            "{base}: unsupported scheme '{}'",
            root.scheme()
        )));
    }
    if !root.path().ends_with('/') {
        let with_slash = format!("{}/", root.path());
        root.set_path(&with_slash);
    }

    root.join(path.trim_start_matches('/'))
        .map_err(|error| StreamApiError::InvalidBaseUrl(format!("{base} + {path}: {error}")))
}
