// ─── HTTP Client Pool ───
// One shared reqwest client for the whole backend: connection reuse,
// retry policy for transient failures, and streaming downloads.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::paths::{LAUNCHER_NAME, LAUNCHER_VERSION};
use crate::debug_if;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Large asset downloads can legitimately take minutes.
const TOTAL_TIMEOUT: Duration = Duration::from_secs(600);

/// Backoff schedule for transient failures: 1s, 2s, 4s, 8s.
const RETRY_DELAYS: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(format!("{}/{}", LAUNCHER_NAME, LAUNCHER_VERSION))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .build()
}

/// GET `url`, retrying transient failures with exponential backoff.
///
/// Transient: connect errors, timeouts, 5xx. A 4xx status is terminal.
pub async fn get_with_retry(client: &Client, url: &str) -> LauncherResult<Response> {
    let mut last_error: Option<LauncherError> = None;

    for (attempt, delay) in std::iter::once(None)
        .chain(RETRY_DELAYS.iter().map(Some))
        .enumerate()
    {
        if let Some(delay) = delay {
            warn!(
                "Retrying {} (attempt {}) after {:?}: {}",
                url,
                attempt + 1,
                delay,
                last_error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default()
            );
            tokio::time::sleep(*delay).await;
        }

        debug_if!("REQWEST_DEBUG", "GET {}", url);
        let error = match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                let error = LauncherError::Network {
                    url: url.to_string(),
                    status: status.as_u16(),
                };
                if !status.is_server_error() {
                    return Err(error);
                }
                error
            }
            Err(source) => LauncherError::Http(source),
        };

        if !error.is_retriable() {
            return Err(error);
        }
        last_error = Some(error);
    }

    Err(last_error.expect("at least one attempt was made"))
}

/// GET `url` and decode the body as JSON, mapping decode failures to
/// `Schema` errors that carry the url for diagnosis.
pub async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> LauncherResult<T> {
    let response = get_with_retry(client, url).await?;
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|source| LauncherError::Schema {
        context: url.to_string(),
        source,
    })
}

/// GET `url` and return the body as text.
pub async fn get_text(client: &Client, url: &str) -> LauncherResult<String> {
    let response = get_with_retry(client, url).await?;
    Ok(response.text().await?)
}

/// GET `url` and return the raw body bytes. Only used for small documents;
/// file downloads stream through the download executor instead.
pub async fn get_bytes(client: &Client, url: &str) -> LauncherResult<Vec<u8>> {
    let response = get_with_retry(client, url).await?;
    let bytes = response.bytes().await?;
    debug!("Fetched {} ({} bytes)", url, bytes.len());
    Ok(bytes.to_vec())
}
