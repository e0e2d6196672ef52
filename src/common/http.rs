//! Shared HTTP client.
//!
//! One `reqwest::Client` serves every data source; timeouts are set per
//! request because the sources have very different latency profiles (a
//! channel probe gets 10s, the Noogle corpus download gets 60s).

use std::time::Duration;

use reqwest::header::ACCEPT;
use serde_json::Value;

use crate::common::config::{NIXOS_API, NIXOS_AUTH_PASS, NIXOS_AUTH_USER};
use crate::common::error::ApiError;

/// Timeout for Elasticsearch queries and channel probes.
pub const ES_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for JSON metadata APIs (FlakeHub, NixHub, wiki).
pub const API_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for documentation page fetches.
pub const DOC_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for narinfo checks against the binary cache.
pub const NARINFO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, ApiError> {
        let inner = reqwest::Client::builder()
            .user_agent(crate::common::config::user_agent())
            .build()
            .map_err(|e| ApiError::Request(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Count documents in a search backend index.
    pub async fn es_count(&self, index: &str, query: Value) -> Result<u64, ApiError> {
        let url = format!("{}/{}/_count", NIXOS_API, index);
        let resp = self
            .inner
            .post(&url)
            .basic_auth(NIXOS_AUTH_USER, Some(NIXOS_AUTH_PASS))
            .json(&serde_json::json!({ "query": query }))
            .timeout(ES_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                code: resp.status().as_u16(),
            });
        }
        let body: Value = resp.json().await?;
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    /// Run a search against a backend index and return the raw response
    /// body. Callers that need totals or aggregations use this directly.
    pub async fn es_search_raw(&self, index: &str, body: Value) -> Result<Value, ApiError> {
        let url = format!("{}/{}/_search", NIXOS_API, index);
        let resp = self
            .inner
            .post(&url)
            .basic_auth(NIXOS_AUTH_USER, Some(NIXOS_AUTH_PASS))
            .json(&body)
            .timeout(ES_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                code: resp.status().as_u16(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Run a search and return just the hit documents.
    pub async fn es_query(
        &self,
        index: &str,
        query: Value,
        size: usize,
    ) -> Result<Vec<Value>, ApiError> {
        let data = self
            .es_search_raw(index, serde_json::json!({ "query": query, "size": size }))
            .await?;
        Ok(es_hits(&data))
    }

    /// GET a JSON document.
    pub async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, ApiError> {
        self.get_json_query(url, &[], timeout).await
    }

    /// GET a JSON document with query parameters.
    pub async fn get_json_query(
        &self,
        url: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, ApiError> {
        let resp = self
            .inner
            .get(url)
            .query(params)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                code: resp.status().as_u16(),
            });
        }
        Ok(resp.json().await?)
    }

    /// GET a text document (HTML pages, the nix.dev search index).
    pub async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, ApiError> {
        let resp = self.inner.get(url).timeout(timeout).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                code: resp.status().as_u16(),
            });
        }
        Ok(resp.text().await?)
    }

    /// HEAD request returning the status code. Non-2xx is not an error
    /// here: the binary cache reports absence with a 404.
    pub async fn head_status(&self, url: &str, timeout: Duration) -> Result<u16, ApiError> {
        let resp = self.inner.head(url).timeout(timeout).send().await?;
        Ok(resp.status().as_u16())
    }

    /// GET returning status and body without treating non-2xx as failure.
    pub async fn get_text_status(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<(u16, String), ApiError> {
        let resp = self.inner.get(url).timeout(timeout).send().await?;
        let status = resp.status().as_u16();
        Ok((status, resp.text().await?))
    }
}

/// Pull the hit documents out of an Elasticsearch response body.
pub fn es_hits(data: &Value) -> Vec<Value> {
    data.get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Pull the total hit count out of an Elasticsearch response body.
pub fn es_total(data: &Value) -> u64 {
    data.get("hits")
        .and_then(|h| h.get("total"))
        .and_then(|t| t.get("value"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_es_hits_shapes() {
        let body = json!({"hits": {"hits": [{"_source": {"a": 1}}], "total": {"value": 7}}});
        assert_eq!(es_hits(&body).len(), 1);
        assert_eq!(es_total(&body), 7);

        assert!(es_hits(&json!({})).is_empty());
        assert_eq!(es_total(&json!({"hits": {}})), 0);
    }
}
