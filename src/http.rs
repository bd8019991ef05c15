//! Shared HTTP client settings for provider adapters

use std::time::Duration;

/// Timeout for reachability probes during `initialize`
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a whole generation or synthesis request
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build a client with the request timeout applied
pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Read the body of a failed response for error messages
pub(crate) async fn failure_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    body.trim().to_string()
}
