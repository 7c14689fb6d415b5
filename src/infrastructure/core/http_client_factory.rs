use anyhow::{Context, Result};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;
use url::Url;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates a new HTTP client with retry middleware
    pub fn create_client(timeout: Duration, max_retries: u32) -> ClientWithMiddleware {
        // Exponential backoff on transient failures (connect errors, 5xx, 429)
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .unwrap_or_else(|_| Client::new());

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }
}

/// Joins `path` onto `base_url` and appends percent-encoded query parameters.
/// reqwest-middleware's builder has no `.query()`, so the URL is built up front.
///
/// `path` is resolved below the base path, so a base such as
/// `http://host/terminal` keeps its `/terminal` prefix with or without a
/// trailing slash.
pub fn build_url_with_query<K, V>(base_url: &str, path: &str, params: &[(K, V)]) -> Result<Url>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut base =
        Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    let mut url = base
        .join(path.trim_start_matches('/'))
        .with_context(|| format!("Cannot join '{}' onto {}", path, base_url))?;

    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (k, v) in params {
            query.append_pair(k.as_ref(), v.as_ref());
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_with_query() {
        let url = build_url_with_query(
            "http://127.0.0.1:8080",
            "api/v1/candles",
            &[("s", "BTCUSDT"), ("i", "15"), ("l", "99")],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/api/v1/candles?s=BTCUSDT&i=15&l=99"
        );
    }

    #[test]
    fn test_build_url_encodes_values() {
        let url = build_url_with_query(
            "http://localhost/",
            "api/v1/predict/trend",
            &[("m", "xgb_linear-H1_,xgb linear")],
        )
        .unwrap();
        assert_eq!(url.query(), Some("m=xgb_linear-H1_%2Cxgb+linear"));
    }

    #[test]
    fn test_build_url_keeps_base_path_prefix() {
        let empty: [(&str, &str); 0] = [];
        for base in ["http://host/terminal", "http://host/terminal/"] {
            for path in ["api/v1/candle", "/api/v1/candle"] {
                let url = build_url_with_query(base, path, &empty).unwrap();
                assert_eq!(url.as_str(), "http://host/terminal/api/v1/candle");
            }
        }
    }

    #[test]
    fn test_build_url_rejects_bad_base() {
        let empty: [(&str, &str); 0] = [];
        assert!(build_url_with_query("not a url", "/x", &empty).is_err());
    }
}
