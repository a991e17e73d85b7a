use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};

const USER_AGENT: &str = concat!("storefront/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by the remote backends.
///
/// No timeout or retry is layered on top of reqwest's defaults: a remote
/// call fails once and the backend falls back to the local snapshot.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

/// `None` for 404, the response for any success, an error otherwise.
pub async fn found(response: Response, what: &str) -> Result<Option<Response>> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{what} returned HTTP {status}: {}", body.trim());
    }
    Ok(Some(response))
}

/// Error unless the response is a success.
pub async fn success(response: Response, what: &str) -> Result<()> {
    match found(response, what).await? {
        Some(_) => Ok(()),
        None => anyhow::bail!("{what} returned HTTP 404"),
    }
}
