//! HTTP plumbing shared by the crawlers and the fetcher.

use std::time::Duration;

use crate::error::CoreError;

/// Retry schedule for transient upstream failures.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_FACTOR: u32 = 2;
const BACKOFF_MAX: Duration = Duration::from_secs(30);
const MAX_TRIES: u32 = 5;

pub const USER_AGENT: &str = concat!("scandex/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, CoreError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| CoreError::Internal(format!("build http client: {}", e)))
}

fn classify_status(status: reqwest::StatusCode) -> Option<CoreError> {
    if status.is_success() {
        return None;
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(CoreError::TransientUpstream(format!("HTTP {}", status)))
    } else {
        Some(CoreError::PermanentUpstream(format!("HTTP {}", status)))
    }
}

/// GET a URL, retrying transient failures with exponential backoff
/// (1 s base, doubling, capped at 30 s, up to 5 tries). Client errors fail
/// immediately as permanent.
pub async fn get_with_backoff(
    client: &reqwest::Client,
    url: &str,
    accept: Option<&str>,
) -> Result<reqwest::Response, CoreError> {
    let mut delay = BACKOFF_BASE;
    let mut last_error = CoreError::Internal("request never attempted".into());

    for attempt in 1..=MAX_TRIES {
        let mut request = client.get(url);
        if let Some(accept) = accept {
            request = request.header("accept", accept);
        }

        match request.send().await {
            Ok(response) => match classify_status(response.status()) {
                None => return Ok(response),
                Some(err @ CoreError::PermanentUpstream(_)) => return Err(err),
                Some(err) => last_error = err,
            },
            Err(e) => {
                last_error = CoreError::TransientUpstream(format!("request {}: {}", url, e));
            }
        }

        if attempt < MAX_TRIES {
            tracing::debug!(
                "Retrying {} in {:?} (attempt {}/{}): {}",
                url,
                delay,
                attempt,
                MAX_TRIES,
                last_error
            );
            tokio::time::sleep(delay).await;
            delay = (delay * BACKOFF_FACTOR).min(BACKOFF_MAX);
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(reqwest::StatusCode::OK).is_none());
        assert_eq!(
            classify_status(reqwest::StatusCode::NOT_FOUND).unwrap().kind(),
            "permanent_upstream"
        );
        assert_eq!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS)
                .unwrap()
                .kind(),
            "transient_upstream"
        );
        assert_eq!(
            classify_status(reqwest::StatusCode::BAD_GATEWAY).unwrap().kind(),
            "transient_upstream"
        );
    }
}
