//! Source feed fetching.
//!
//! Supports `http(s)://` URLs via reqwest and `file://` URLs via tokio's
//! filesystem API. A fetch failure is scoped to its source: the caller logs
//! it and the merge cycle continues with the remaining feeds.

use std::time::Duration;

use calfuse_core::config::SourceConfig;
use tracing::debug;

/// Error fetching one source feed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported URL scheme in {0}")]
    UnsupportedScheme(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Fetches the raw text of one configured source.
///
/// ## Errors
/// Returns an error when the URL scheme is unsupported, the request fails,
/// the server answers with an error status, or the file cannot be read.
pub async fn fetch_source(
    client: &reqwest::Client,
    source: &SourceConfig,
) -> Result<String, FetchError> {
    debug!(source = %source.name, url = %source.url, "fetching");

    if let Some(path) = source.url.strip_prefix("file://") {
        return Ok(tokio::fs::read_to_string(path).await?);
    }

    if source.url.starts_with("http://") || source.url.starts_with("https://") {
        let response = client
            .get(&source.url)
            .send()
            .await?
            .error_for_status()?;
        return Ok(response.text().await?);
    }

    Err(FetchError::UnsupportedScheme(source.url.clone()))
}

/// Fetches one source with a deadline.
///
/// ## Errors
/// Returns `FetchError::TimedOut` when the deadline elapses, otherwise
/// whatever `fetch_source` returns.
pub async fn fetch_source_with_timeout(
    client: &reqwest::Client,
    source: &SourceConfig,
    timeout: Duration,
) -> Result<String, FetchError> {
    match tokio::time::timeout(timeout, fetch_source(client, source)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(FetchError::TimedOut(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, url: String) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            url,
        }
    }

    #[test_log::test(tokio::test)]
    async fn fetches_file_url() {
        let path = std::env::temp_dir().join("calfuse-fetch-test.ics");
        tokio::fs::write(&path, "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n")
            .await
            .unwrap();

        let client = reqwest::Client::new();
        let src = source("local", format!("file://{}", path.display()));
        let text = fetch_source(&client, &src).await.unwrap();
        assert!(text.starts_with("BEGIN:VCALENDAR"));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn missing_file_is_io_error() {
        let client = reqwest::Client::new();
        let src = source("missing", "file:///no/such/calfuse-file.ics".to_string());
        let err = fetch_source(&client, &src).await.unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
    }

    #[test_log::test(tokio::test)]
    async fn rejects_unknown_scheme() {
        let client = reqwest::Client::new();
        let src = source("ftp", "ftp://example.com/cal.ics".to_string());
        let err = fetch_source(&client, &src).await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(_)));
    }
}
