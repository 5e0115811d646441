//! Reference document retrieval.
//!
//! Documents live in public storage and change rarely, so fetched text is
//! cached for the process lifetime, keyed by URL. Any fetch problem is
//! logged and reported as an absent document; the prompt section is then
//! simply omitted.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

/// Cached document text with lazy initialization.
static DOCUMENT_CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn get_cache() -> &'static RwLock<HashMap<String, String>> {
    DOCUMENT_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetch a reference document as text, or `None` when it is unavailable.
pub async fn fetch_document(client: &reqwest::Client, url: &str) -> Option<String> {
    {
        let cache = get_cache().read().await;
        if let Some(text) = cache.get(url) {
            return Some(text.clone());
        }
    }

    let text = match fetch_text(client, url).await {
        Ok(text) => text,
        Err(message) => {
            warn!(url, error = %message, "document fetch failed");
            return None;
        }
    };

    {
        let mut cache = get_cache().write().await;
        cache.insert(url.to_string(), text.clone());
    }

    Some(text)
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, String> {
    let response = client
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(format!("unexpected status {status}"));
    }

    response.text().await.map_err(|e| e.to_string())
}

/// Clear the document cache (useful for testing).
pub async fn clear_cache() {
    let mut cache = get_cache().write().await;
    cache.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_200_yields_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/docs/missing.txt")
            .with_status(404)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/docs/missing.txt", server.url());
        assert!(fetch_document(&client, &url).await.is_none());
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/docs/schedule.txt")
            .with_status(200)
            .with_body("campus schedule")
            .expect(1)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/docs/schedule.txt", server.url());

        assert_eq!(fetch_document(&client, &url).await.as_deref(), Some("campus schedule"));
        assert_eq!(fetch_document(&client, &url).await.as_deref(), Some("campus schedule"));
        mock.assert_async().await;
    }
}
