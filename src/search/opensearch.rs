//! OpenSearch REST client
//!
//! Talks to a single node or cluster endpoint over HTTP(S). Bulk writes always
//! request `refresh=true`; the poller still refreshes explicitly because a
//! refresh on one shard does not guarantee search visibility everywhere.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{
    BackendError, BulkAck, CollectionStatus, IndexedDocument, LatestHit, Schema, SearchBackend,
};
use crate::config::EndpointConfig;

const ALREADY_EXISTS: &str = "resource_already_exists_exception";
const NDJSON: &str = "application/x-ndjson";

#[derive(Clone)]
pub struct OpenSearchClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl OpenSearchClient {
    pub fn new(config: &EndpointConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build client: {}", e)))?;

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            (Some(user), None) => Some((user.clone(), String::new())),
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.credentials {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }
}

/// Fail with the status and body of a non-2xx response.
async fn check(resp: Response) -> Result<Response, BackendError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Status { status, body })
}

/// NDJSON bulk body: one action line and one source line per document.
pub fn bulk_body(name: &str, documents: &[IndexedDocument]) -> Result<String, BackendError> {
    let mut body = String::with_capacity(documents.len() * 128);
    for doc in documents {
        let action = json!({ "index": { "_index": name, "_id": doc.id.to_string() } });
        body.push_str(&action.to_string());
        body.push('\n');
        let source = serde_json::to_string(&doc.source)
            .map_err(|e| BackendError::Decode(format!("document {}: {}", doc.id, e)))?;
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

/// Turn a bulk response into an ack, or `Rejected` when any item failed.
pub fn parse_bulk_response(response: &Value) -> Result<BulkAck, BackendError> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Decode("bulk response has no items".to_string()))?;
    let took_ms = response.get("took").and_then(Value::as_u64);

    if !response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(BulkAck {
            items: items.len(),
            took_ms,
        });
    }

    let failures: Vec<&Value> = items
        .iter()
        .filter_map(|item| item.as_object().and_then(|o| o.values().next()))
        .filter(|result| result.get("error").is_some())
        .collect();
    let first_reason = failures
        .first()
        .and_then(|f| f.get("error"))
        .map(|e| {
            e.get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    Err(BackendError::Rejected {
        failed: failures.len().max(1),
        first_reason,
    })
}

/// Search body for the top document by `sort_field`.
pub fn latest_query(sort_field: &str, descending: bool, limit: usize) -> Value {
    let order = if descending { "desc" } else { "asc" };
    json!({
        "query": { "match_all": {} },
        "size": limit,
        "sort": [ { sort_field: { "order": order } } ]
    })
}

#[async_trait]
impl SearchBackend for OpenSearchClient {
    async fn create_collection(
        &self,
        name: &str,
        schema: &Schema,
    ) -> Result<CollectionStatus, BackendError> {
        let resp = self
            .request(Method::PUT, name)
            .json(schema.body())
            .send()
            .await?;

        if resp.status().is_success() {
            debug!("created index {}", name);
            return Ok(CollectionStatus::Created);
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains(ALREADY_EXISTS) {
            debug!("index {} already exists", name);
            return Ok(CollectionStatus::AlreadyExists);
        }
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_schema(&self, name: &str) -> Result<Schema, BackendError> {
        let resp = self
            .request(Method::GET, &format!("{}/_mapping", name))
            .send()
            .await?;
        let body: Value = check(resp).await?.json().await?;

        // Keyed by the concrete index name, which differs from `name` for aliases.
        let entry = body
            .get(name)
            .or_else(|| body.as_object().and_then(|o| o.values().next()))
            .cloned()
            .ok_or_else(|| BackendError::Decode(format!("no mapping returned for {}", name)))?;
        Ok(Schema::from_value(entry))
    }

    async fn bulk_write(
        &self,
        name: &str,
        documents: &[IndexedDocument],
    ) -> Result<BulkAck, BackendError> {
        let body = bulk_body(name, documents)?;
        let resp = self
            .request(Method::POST, "_bulk?refresh=true")
            .header(reqwest::header::CONTENT_TYPE, NDJSON)
            .body(body)
            .send()
            .await?;
        let response: Value = check(resp).await?.json().await?;
        parse_bulk_response(&response)
    }

    async fn query_latest(
        &self,
        name: &str,
        sort_field: &str,
        descending: bool,
        limit: usize,
    ) -> Result<Option<LatestHit>, BackendError> {
        let resp = self
            .request(Method::POST, &format!("{}/_search", name))
            .json(&latest_query(sort_field, descending, limit))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = check(resp).await?.json().await?;

        let Some(hit) = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .and_then(|hits| hits.first())
        else {
            return Ok(None);
        };

        let id = hit
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Decode("hit without _id".to_string()))?;
        Ok(Some(LatestHit {
            id: id.to_string(),
            source: hit.get("_source").cloned().unwrap_or(Value::Null),
        }))
    }

    async fn refresh(&self, name: &str) -> Result<(), BackendError> {
        let resp = self
            .request(Method::POST, &format!("{}/_refresh", name))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("refresh skipped, index {} not found", name);
            return Ok(());
        }
        check(resp).await.map(|_| ())
    }
}
