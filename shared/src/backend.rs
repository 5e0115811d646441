//! Supabase backend client and the concurrent context fetcher.
//!
//! All reads go through named stored procedures (`/rest/v1/rpc/{name}`);
//! the only write is the forecast insert into the `predictiondata` table.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::{Config, Error, Result};

/// Upper bound on concurrent fetches within one invocation.
pub const MAX_CONCURRENT_FETCHES: usize = 10;

/// Stored procedures exposed by the backend.
pub mod procedures {
    pub const CURRENT: &str = "get_current_time_data";
    pub const LAST_WEEK: &str = "get_last_week_data";
    pub const SUSPICIOUS: &str = "get_find_suspicious";
    pub const ENTRY_EXIT: &str = "get_start_time_and_last_time";
    pub const MAX_MIN: &str = "get_max_min_data";
    pub const HOUR_DATA: &str = "get_thirdfloor_hourdata";
    pub const WEATHER: &str = "get_weather_data_for_next_days";
    pub const ZONES: &str = "get_thirdfloor_zones";
    pub const PREDICTIONS: &str = "get_all_predictiondata";
}

/// Table receiving forecast inserts.
pub const PREDICTION_TABLE: &str = "predictiondata";

/// Backend seam: named procedure calls returning rows, plus table inserts.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Invoke a stored procedure with optional keyword parameters.
    async fn rpc(&self, procedure: &str, params: Option<Value>) -> Result<Vec<Value>>;

    /// Insert a row into a table.
    async fn insert(&self, table: &str, row: &Value) -> Result<()>;
}

/// Supabase REST client. One instance lives for the process lifetime and is
/// shared across invocations of the same function instance.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self::from_parts(&config.supabase_url, &config.supabase_key)
    }

    pub fn from_parts(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[async_trait]
impl Backend for SupabaseClient {
    async fn rpc(&self, procedure: &str, params: Option<Value>) -> Result<Vec<Value>> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, procedure);
        let body = params.unwrap_or_else(|| Value::Object(Default::default()));

        let response = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("rpc {procedure} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Backend(format!("rpc {procedure} returned {status}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::Backend(format!("rpc {procedure} body read failed: {e}")))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&text)? {
            Value::Null => Ok(Vec::new()),
            Value::Array(rows) => Ok(rows),
            // Scalar-returning procedures come back as a single value.
            other => Ok(vec![other]),
        }
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<()> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);

        let response = self
            .authorized(self.http.post(&url))
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("insert into {table} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Backend(format!("insert into {table} returned {status}")));
        }
        Ok(())
    }
}

/// One named context read: a procedure plus optional keyword parameters.
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub name: String,
    pub procedure: String,
    pub params: Option<Value>,
}

impl ContextRequest {
    pub fn new(name: &str, procedure: &str) -> Self {
        Self {
            name: name.to_string(),
            procedure: procedure.to_string(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Rows fetched for one invocation, keyed by request name. `None` marks a
/// fetch that failed or returned nothing.
pub type ContextMap = HashMap<String, Option<Vec<Value>>>;

/// Run the given context reads concurrently and collect their results.
///
/// Each fetch is independent: a failure or empty result is logged and
/// recorded as `None` without aborting sibling fetches. Concurrency is
/// bounded by the number of requests, capped at [`MAX_CONCURRENT_FETCHES`].
pub async fn fetch_context(backend: &dyn Backend, requests: Vec<ContextRequest>) -> ContextMap {
    let limit = requests.len().clamp(1, MAX_CONCURRENT_FETCHES);

    stream::iter(requests)
        .map(|request| async move {
            let rows = match backend.rpc(&request.procedure, request.params.clone()).await {
                Ok(rows) if !rows.is_empty() => Some(rows),
                Ok(_) => {
                    warn!(source = %request.name, "no rows returned");
                    None
                }
                Err(e) => {
                    warn!(source = %request.name, error = %e, "context fetch failed");
                    None
                }
            };
            (request.name, rows)
        })
        .buffer_unordered(limit)
        .collect()
        .await
}

/// Treat a context source as required, mapping an absent or empty result to
/// a 404-style [`Error::NotFound`].
pub fn require<'a>(context: &'a ContextMap, name: &str) -> Result<&'a [Value]> {
    context
        .get(name)
        .and_then(|rows| rows.as_deref())
        .filter(|rows| !rows.is_empty())
        .ok_or_else(|| Error::NotFound(format!("No {name} data found.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn rpc_decodes_row_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/rpc/get_current_time_data")
            .match_header("apikey", "test-key")
            .with_status(200)
            .with_body(r#"[{"time": "2025-01-01T12:00:00", "num": 12}]"#)
            .create_async()
            .await;

        let client = SupabaseClient::from_parts(&server.url(), "test-key");
        let rows = client.rpc(procedures::CURRENT, None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["num"], json!(12));
    }

    #[tokio::test]
    async fn rpc_treats_null_body_as_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/get_find_suspicious")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        let client = SupabaseClient::from_parts(&server.url(), "test-key");
        let rows = client.rpc(procedures::SUSPICIOUS, None).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn rpc_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/get_max_min_data")
            .with_status(500)
            .create_async()
            .await;

        let client = SupabaseClient::from_parts(&server.url(), "test-key");
        let err = client.rpc(procedures::MAX_MIN, None).await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[tokio::test]
    async fn fetch_context_isolates_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/get_current_time_data")
            .with_status(200)
            .with_body(r#"[{"time": "2025-01-01T12:00:00", "num": 3}]"#)
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/get_find_suspicious")
            .with_status(500)
            .create_async()
            .await;

        let client = SupabaseClient::from_parts(&server.url(), "test-key");
        let context = fetch_context(
            &client,
            vec![
                ContextRequest::new("current", procedures::CURRENT),
                ContextRequest::new("suspicious", procedures::SUSPICIOUS),
            ],
        )
        .await;

        assert!(context["current"].is_some());
        assert!(context["suspicious"].is_none());
    }

    #[test]
    fn require_maps_absent_to_not_found() {
        let mut context = ContextMap::new();
        context.insert("suspicious".to_string(), None);

        let err = require(&context, "suspicious").unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Not found: No suspicious data found.");
    }

    #[tokio::test]
    async fn insert_posts_to_table() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/predictiondata")
            .match_header("Prefer", "return=minimal")
            .with_status(201)
            .create_async()
            .await;

        let client = SupabaseClient::from_parts(&server.url(), "test-key");
        client
            .insert(PREDICTION_TABLE, &json!({"time": "t", "num": 1, "reasons": "r"}))
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
