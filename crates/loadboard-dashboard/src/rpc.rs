//! Record queries over the backend's JSON-RPC `call_kw` endpoint

use crate::error::{DashboardError, DashboardResult};
use crate::service::{GroupCount, ListOptions, Record, RecordQueryService};
use async_trait::async_trait;
use loadboard_core::config::BackendConfig;
use loadboard_core::{Domain, Model};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument};

/// Error object of a JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: String,
}

impl RpcError {
    /// Most specific message available
    fn into_message(self) -> String {
        match self.data {
            Some(data) if !data.message.is_empty() => data.message,
            _ if self.message.is_empty() => "Unknown backend error".to_string(),
            _ => self.message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

fn records(value: Value) -> DashboardResult<Vec<Record>> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect()),
        other => Err(DashboardError::backend(format!(
            "expected a list of records, got {other}"
        ))),
    }
}

/// [`RecordQueryService`] backed by the backend's web client API
#[derive(Debug)]
pub struct JsonRpcQueryService {
    client: Client,
    base_url: String,
    session_id: Option<String>,
    next_id: AtomicU64,
}

impl JsonRpcQueryService {
    /// Client for the backend at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> DashboardResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            session_id: config.session_id.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Call `method` of `model` with positional and keyword arguments
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::Backend`] when the response carries an error
    /// object, or a transport error.
    #[instrument(skip(self, args, kwargs))]
    pub async fn call_kw(
        &self,
        model: Model,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> DashboardResult<Value> {
        let url = format!("{}/web/dataset/call_kw/{}/{method}", self.base_url, model.as_str());
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "params": {
                "model": model.as_str(),
                "method": method,
                "args": args,
                "kwargs": kwargs,
            },
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(session_id) = &self.session_id {
            request = request.header(reqwest::header::COOKIE, format!("session_id={session_id}"));
        }

        let envelope: RpcEnvelope = request.send().await?.error_for_status()?.json().await?;
        if let Some(error) = envelope.error {
            let message = error.into_message();
            debug!(%message, "Backend returned an error");
            return Err(DashboardError::backend(message));
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RecordQueryService for JsonRpcQueryService {
    async fn count(&self, model: Model, domain: &Domain) -> DashboardResult<u64> {
        let result = self
            .call_kw(model, "search_count", json!([domain]), json!({}))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| DashboardError::backend(format!("expected a count, got {result}")))
    }

    async fn search_read(
        &self,
        model: Model,
        domain: &Domain,
        fields: &[&str],
        options: &ListOptions,
    ) -> DashboardResult<Vec<Record>> {
        let mut kwargs = json!({ "domain": domain, "fields": fields });
        if let Some(map) = kwargs.as_object_mut() {
            if let Some(order) = &options.order {
                map.insert("order".to_string(), json!(order));
            }
            if let Some(limit) = options.limit {
                map.insert("limit".to_string(), json!(limit));
            }
        }
        records(self.call_kw(model, "search_read", json!([]), kwargs).await?)
    }

    async fn read_group(
        &self,
        model: Model,
        domain: &Domain,
        group_by: &str,
    ) -> DashboardResult<Vec<GroupCount>> {
        let kwargs = json!({
            "domain": domain,
            "fields": [group_by],
            "groupby": [group_by],
            "lazy": true,
        });
        let count_key = format!("{group_by}_count");
        Ok(records(self.call_kw(model, "read_group", json!([]), kwargs).await?)?
            .into_iter()
            .map(|row| GroupCount {
                count: row
                    .get(&count_key)
                    .or_else(|| row.get("__count"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                key: row.get(group_by).cloned().unwrap_or(Value::Bool(false)),
            })
            .collect())
    }

    async fn read_by_ids(
        &self,
        model: Model,
        ids: &[i64],
        fields: &[&str],
    ) -> DashboardResult<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        records(
            self.call_kw(model, "read", json!([ids, fields]), json!({}))
                .await?,
        )
    }

    async fn sum(&self, model: Model, domain: &Domain, field: &str) -> DashboardResult<f64> {
        let kwargs = json!({
            "domain": domain,
            "fields": [format!("{field}:sum")],
            "groupby": [],
            "lazy": true,
        });
        Ok(records(self.call_kw(model, "read_group", json!([]), kwargs).await?)?
            .first()
            .and_then(|row| row.get(field))
            .and_then(Value::as_f64)
            .unwrap_or(0.0))
    }
}
