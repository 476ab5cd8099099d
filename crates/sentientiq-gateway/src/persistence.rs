//! Persistence gateway adapters and the single-writer queue
//!
//! The core only ever calls `insert(table, record)` and `query(table, filters)`.
//! Writes are fire-and-forget: they go through a bounded queue drained by one
//! worker task, and a full queue drops the record.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Table names understood by the persistence backend
pub mod tables {
    pub const EMOTIONAL_EVENTS: &str = "emotional_events";
    pub const INTERVENTION_LOGS: &str = "intervention_logs";
    pub const INTERVENTION_DECISIONS: &str = "intervention_decisions";
    pub const SESSION_OUTCOMES: &str = "session_outcomes";
    pub const EMOTIONAL_PATTERNS: &str = "emotional_patterns";
    pub const VOLATILITY_METRICS: &str = "volatility_metrics";
}

/// Errors from persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),

    #[error("Record rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for sentientiq_common::SentientError {
    fn from(err: StoreError) -> Self {
        sentientiq_common::SentientError::Storage(err.to_string())
    }
}

/// External persistence collaborator
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Append one record to a table
    async fn insert(&self, table: &str, record: Value) -> Result<(), StoreError>;

    /// Records whose fields equal every `(field, value)` filter
    async fn query(&self, table: &str, filters: &[(String, String)]) -> Result<Vec<Value>, StoreError>;
}

/// In-process gateway; the default when no backend is configured
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    tables: DashMap<String, Vec<Value>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in a table
    pub fn records(&self, table: &str) -> Vec<Value> {
        self.tables.get(table).map(|rows| rows.clone()).unwrap_or_default()
    }
}

fn field_matches(record: &Value, field: &str, expected: &str) -> bool {
    match record.get(field) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == expected,
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn insert(&self, table: &str, record: Value) -> Result<(), StoreError> {
        self.tables.entry(table.to_string()).or_default().push(record);
        Ok(())
    }

    async fn query(&self, table: &str, filters: &[(String, String)]) -> Result<Vec<Value>, StoreError> {
        let Some(rows) = self.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|r| filters.iter().all(|(f, v)| field_matches(r, f, v)))
            .cloned()
            .collect())
    }
}

/// REST gateway speaking the PostgREST dialect (`POST /{table}`, `GET /{table}?field=eq.value`)
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestGateway {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, table));
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn check(table: &str, response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(table.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PersistenceGateway for RestGateway {
    async fn insert(&self, table: &str, record: Value) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(&record)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::check(table, response).await?;
        Ok(())
    }

    async fn query(&self, table: &str, filters: &[(String, String)]) -> Result<Vec<Value>, StoreError> {
        let params: Vec<(String, String)> = filters
            .iter()
            .map(|(field, value)| (field.clone(), format!("eq.{value}")))
            .collect();
        let response = self
            .request(reqwest::Method::GET, table)
            .query(&params)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::check(table, response)
            .await?
            .json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// One queued write
#[derive(Debug)]
struct PendingWrite {
    table: &'static str,
    record: Value,
}

/// Writer queue counters
#[derive(Debug, Default)]
pub struct WriterMetrics {
    pub enqueued: AtomicU64,
    pub dropped: AtomicU64,
    pub written: AtomicU64,
    pub failed: AtomicU64,
}

/// Handle to the single persistence writer
#[derive(Clone)]
pub struct PersistenceWriter {
    tx: mpsc::Sender<PendingWrite>,
    metrics: Arc<WriterMetrics>,
}

impl PersistenceWriter {
    /// Start the writer task; it exits once every handle is dropped and the queue drained
    pub fn spawn(gateway: Arc<dyn PersistenceGateway>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let metrics = Arc::new(WriterMetrics::default());
        let handle = tokio::spawn(Self::drain(gateway, rx, metrics.clone()));
        (Self { tx, metrics }, handle)
    }

    /// Queue a record; returns false if it was dropped
    pub fn enqueue<T: Serialize>(&self, table: &'static str, record: &T) -> bool {
        let record = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(e) => {
                error!(table, error = %e, "Failed to serialize record");
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        match self.tx.try_send(PendingWrite { table, record }) {
            Ok(()) => {
                self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(table, "Persistence queue full, dropping record");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(table, "Persistence writer stopped, dropping record");
                false
            }
        }
    }

    pub fn metrics(&self) -> &WriterMetrics {
        &self.metrics
    }

    async fn drain(
        gateway: Arc<dyn PersistenceGateway>,
        mut rx: mpsc::Receiver<PendingWrite>,
        metrics: Arc<WriterMetrics>,
    ) {
        while let Some(write) = rx.recv().await {
            match gateway.insert(write.table, write.record).await {
                Ok(()) => {
                    metrics.written.fetch_add(1, Ordering::Relaxed);
                    debug!(table = write.table, "Record persisted");
                }
                Err(e) => {
                    metrics.failed.fetch_add(1, Ordering::Relaxed);
                    error!(table = write.table, error = %e, "Failed to persist record");
                }
            }
        }
        info!("Persistence queue closed, writer exiting");
    }
}
