//! SQL Statement Execution API client
//!
//! Statements run over the warehouse REST endpoint:
//! - POST /api/2.0/sql/statements submits and waits up to `wait_timeout`
//! - GET /api/2.0/sql/statements/{id} polls until the statement is terminal
//! - GET on `next_chunk_internal_link` pages through inline results
//! - POST /api/2.0/sql/statements/{id}/cancel releases unfinished work on close

use crate::config::{ClientOptions, ConnectionConfig, Secret};
use crate::error::{MetricsError, Result};
use crate::warehouse::{ResultSet, Warehouse, WarehouseConnection};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// The endpoint only accepts 0 (asynchronous) or 5-50 seconds.
const MAX_WAIT_SECS: u64 = 50;
const MIN_WAIT_SECS: u64 = 5;
// Head room between the server-side wait and the client request deadline.
const REQUEST_MARGIN: Duration = Duration::from_secs(5);
const MAX_CHUNKS: usize = 10_000;

/// Warehouse reached through the SQL Statement Execution REST API
pub struct StatementApiWarehouse {
    client: Client,
    options: ClientOptions,
}

impl StatementApiWarehouse {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }
}

#[async_trait]
impl Warehouse for StatementApiWarehouse {
    fn name(&self) -> &'static str {
        "statement-api"
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn WarehouseConnection>> {
        let mut conn = StatementApiConnection {
            client: self.client.clone(),
            base_url: config.base_url(),
            token: config.token().clone(),
            warehouse_id: config.warehouse_id().to_string(),
            options: self.options.clone(),
            in_flight: Vec::new(),
            closed: false,
        };

        match conn.handshake().await {
            Ok(()) => Ok(Box::new(conn)),
            Err(e) => {
                // Nothing was submitted yet, so there is nothing to release.
                conn.closed = true;
                Err(e)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    warehouse_id: &'a str,
    wait_timeout: String,
    on_wait_timeout: &'static str,
    disposition: &'static str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<ResultManifest>,
    #[serde(default)]
    result: Option<ResultChunk>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: StatementState,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
    #[serde(other)]
    Unknown,
}

impl StatementState {
    fn is_terminal(self) -> bool {
        !matches!(self, StatementState::Pending | StatementState::Running)
    }
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultManifest {
    schema: ResultSchema,
}

#[derive(Debug, Deserialize)]
struct ResultSchema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
    #[serde(default)]
    position: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultChunk {
    #[serde(default)]
    data_array: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WarehouseInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

/// One open session against a warehouse.
///
/// Tracks submitted statements that have not reached a terminal state so
/// `close` can cancel them.
pub struct StatementApiConnection {
    client: Client,
    base_url: String,
    token: Secret,
    warehouse_id: String,
    options: ClientOptions,
    in_flight: Vec<String>,
    closed: bool,
}

impl StatementApiConnection {
    async fn handshake(&self) -> Result<()> {
        let url = format!("{}/api/2.0/sql/warehouses/{}", self.base_url, self.warehouse_id);
        let info: WarehouseInfo = self
            .send_json(self.client.get(&url), "open warehouse connection")
            .await?;

        info!(
            warehouse_id = %self.warehouse_id,
            warehouse_name = info.name.as_deref().unwrap_or(""),
            state = info.state.as_deref().unwrap_or("UNKNOWN"),
            "Connected to SQL warehouse"
        );
        Ok(())
    }

    fn wait_timeout(&self) -> String {
        wait_timeout_for(self.options.statement_timeout, self.options.request_timeout)
    }

    fn resolve(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.base_url, link)
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response> {
        let response = request
            .bearer_auth(self.token.expose())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MetricsError::Timeout(format!("{} timed out: {}", action, e))
                } else {
                    MetricsError::Connection(format!("failed to {}: {}", action, e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MetricsError::Authentication(format!(
                "{} rejected with status {}",
                action, status
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MetricsError::Connection(format!(
                "{} failed with status {}: {}",
                action, status, text
            )));
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
        let response = self.send(request, action).await?;
        response.json::<T>().await.map_err(|e| {
            MetricsError::MalformedResult(format!("failed to parse {} response: {}", action, e))
        })
    }
}

#[async_trait]
impl WarehouseConnection for StatementApiConnection {
    async fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        if self.closed {
            return Err(MetricsError::Connection("connection is closed".to_string()));
        }

        let started = Instant::now();
        debug!(sql, "Submitting statement");

        let request = StatementRequest {
            statement: sql,
            warehouse_id: &self.warehouse_id,
            wait_timeout: self.wait_timeout(),
            on_wait_timeout: "CONTINUE",
            disposition: "INLINE",
            format: "JSON_ARRAY",
        };
        let url = format!("{}/api/2.0/sql/statements", self.base_url);
        let mut response: StatementResponse = self
            .send_json(self.client.post(&url).json(&request), "submit statement")
            .await?;

        let statement_id = response.statement_id.clone();
        self.in_flight.push(statement_id.clone());

        let status_url = format!("{}/api/2.0/sql/statements/{}", self.base_url, statement_id);
        while !response.status.state.is_terminal() {
            if started.elapsed() >= self.options.statement_timeout {
                return Err(MetricsError::Timeout(format!(
                    "statement {} still {:?} after {:?}",
                    statement_id, response.status.state, self.options.statement_timeout
                )));
            }
            tokio::time::sleep(self.options.poll_interval).await;
            response = self
                .send_json(self.client.get(&status_url), "poll statement")
                .await?;
        }
        self.in_flight.retain(|id| id != &statement_id);

        if response.status.state != StatementState::Succeeded {
            return Err(MetricsError::Statement(describe_failure(
                &statement_id,
                response.status.state,
                response.status.error.as_ref(),
            )));
        }

        let manifest = response.manifest.ok_or_else(|| {
            MetricsError::MalformedResult(format!("statement {} returned no manifest", statement_id))
        })?;
        let mut columns = manifest.schema.columns;
        columns.sort_by_key(|c| c.position.unwrap_or(usize::MAX));
        let columns: Vec<String> = columns.into_iter().map(|c| c.name).collect();

        let first = response.result.unwrap_or_default();
        let mut data = first.data_array.unwrap_or_default();
        let mut next = first.next_chunk_internal_link;
        let mut chunks = 0;

        while let Some(link) = next {
            chunks += 1;
            if chunks > MAX_CHUNKS {
                return Err(MetricsError::MalformedResult(format!(
                    "statement {} exceeded {} result chunks",
                    statement_id, MAX_CHUNKS
                )));
            }
            let chunk: ResultChunk = self
                .send_json(self.client.get(self.resolve(&link)), "fetch result chunk")
                .await?;
            data.extend(chunk.data_array.unwrap_or_default());
            next = chunk.next_chunk_internal_link;
        }

        let result = ResultSet::from_json_rows(columns, data)?;
        info!(
            statement_id = %statement_id,
            rows = result.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Statement succeeded"
        );
        Ok(result)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let unfinished = std::mem::take(&mut self.in_flight);
        let mut first_error = None;
        for statement_id in unfinished {
            let url = format!("{}/api/2.0/sql/statements/{}/cancel", self.base_url, statement_id);
            match self.send(self.client.post(&url), "cancel statement").await {
                Ok(_) => info!(statement_id = %statement_id, "Cancelled unfinished statement"),
                Err(e) => {
                    warn!(statement_id = %statement_id, error = %e, "Failed to cancel statement");
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(warehouse_id = %self.warehouse_id, "Warehouse connection closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for StatementApiConnection {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                warehouse_id = %self.warehouse_id,
                in_flight = self.in_flight.len(),
                "Warehouse connection dropped without close"
            );
        }
    }
}

/// Server-side wait for the submit call. It stays below the client request
/// deadline so a slow statement falls back to polling instead of timing out
/// the submit before its id is known.
fn wait_timeout_for(statement_timeout: Duration, request_timeout: Duration) -> String {
    let request_bound = request_timeout.saturating_sub(REQUEST_MARGIN).as_secs();
    let secs = statement_timeout
        .as_secs()
        .min(request_bound)
        .min(MAX_WAIT_SECS);
    let secs = if secs < MIN_WAIT_SECS { 0 } else { secs };
    format!("{}s", secs)
}

fn describe_failure(statement_id: &str, state: StatementState, error: Option<&ServiceError>) -> String {
    let message = error
        .and_then(|e| e.message.as_deref())
        .unwrap_or("no message from warehouse");
    match error.and_then(|e| e.error_code.as_deref()) {
        Some(code) => format!("statement {} {:?}: {} ({})", statement_id, state, message, code),
        None => format!("statement {} {:?}: {}", statement_id, state, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_timeout_respects_endpoint_bounds() {
        let request = Duration::from_secs(60);
        assert_eq!(wait_timeout_for(Duration::from_secs(120), request), "50s");
        assert_eq!(wait_timeout_for(Duration::from_secs(30), request), "30s");
        assert_eq!(wait_timeout_for(Duration::from_secs(3), request), "0s");
        assert_eq!(wait_timeout_for(Duration::from_millis(200), request), "0s");
    }

    #[test]
    fn test_wait_timeout_stays_below_request_timeout() {
        let statement = Duration::from_secs(120);
        assert_eq!(wait_timeout_for(statement, Duration::from_secs(30)), "25s");
        assert_eq!(wait_timeout_for(statement, Duration::from_secs(9)), "0s");
        assert_eq!(wait_timeout_for(statement, Duration::from_secs(5)), "0s");
        assert_eq!(wait_timeout_for(statement, Duration::from_millis(500)), "0s");
    }

    #[test]
    fn test_state_parsing() {
        let status: StatementStatus =
            serde_json::from_str(r#"{"state": "RUNNING"}"#).unwrap();
        assert_eq!(status.state, StatementState::Running);
        assert!(!status.state.is_terminal());

        let status: StatementStatus =
            serde_json::from_str(r#"{"state": "SOMETHING_NEW"}"#).unwrap();
        assert_eq!(status.state, StatementState::Unknown);
        assert!(status.state.is_terminal());
    }

    #[test]
    fn test_failure_description_includes_server_detail() {
        let error = ServiceError {
            error_code: Some("BAD_REQUEST".to_string()),
            message: Some("TABLE_OR_VIEW_NOT_FOUND".to_string()),
        };
        let text = describe_failure("01ef", StatementState::Failed, Some(&error));
        assert_eq!(text, "statement 01ef Failed: TABLE_OR_VIEW_NOT_FOUND (BAD_REQUEST)");

        let text = describe_failure("01ef", StatementState::Canceled, None);
        assert_eq!(text, "statement 01ef Canceled: no message from warehouse");
    }
}
