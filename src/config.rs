//! Warehouse configuration
//!
//! Everything is read from the process environment. The binary loads a `.env`
//! file first, so local development can keep credentials out of the shell.
//! Lookups go through a closure so tests never touch the real environment.

use crate::error::{MetricsError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::time::Duration;

pub const HOST_VAR: &str = "WAREHOUSE_HOST";
pub const HTTP_PATH_VAR: &str = "WAREHOUSE_HTTP_PATH";
pub const TOKEN_VAR: &str = "WAREHOUSE_TOKEN";
pub const TABLE_VAR: &str = "WAREHOUSE_TABLE";
pub const CONNECT_TIMEOUT_VAR: &str = "WAREHOUSE_CONNECT_TIMEOUT_SECS";
pub const REQUEST_TIMEOUT_VAR: &str = "WAREHOUSE_REQUEST_TIMEOUT_SECS";
pub const STATEMENT_TIMEOUT_VAR: &str = "WAREHOUSE_STATEMENT_TIMEOUT_SECS";
pub const POLL_INTERVAL_VAR: &str = "WAREHOUSE_POLL_INTERVAL_MS";
pub const CACHE_TTL_VAR: &str = "METRICS_CACHE_TTL_SECS";

// Older deployments exported the Databricks connector names.
const LEGACY_HOST_VAR: &str = "DATABRICKS_HOST";
const LEGACY_HTTP_PATH_VAR: &str = "DATABRICKS_HTTP_PATH";
const LEGACY_TOKEN_VAR: &str = "DATABRICKS_TOKEN";

/// Gold-layer table the dashboard reads by default.
pub const DEFAULT_TABLE: &str = "lakehouse_tea.gold.kpis_proporcao_formal_tea";

/// Default validity window of a cached load (10 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// A credential that never shows up in logs or `Debug` output.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Raw connection values as found in the environment. Any of them may be missing.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub host: Option<String>,
    pub http_path: Option<String>,
    pub token: Option<Secret>,
}

impl ConnectionSettings {
    pub fn new(
        host: impl Into<String>,
        http_path: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            http_path: Some(http_path.into()),
            token: Some(Secret::new(token)),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            host: lookup_with_fallback(&lookup, HOST_VAR, LEGACY_HOST_VAR),
            http_path: lookup_with_fallback(&lookup, HTTP_PATH_VAR, LEGACY_HTTP_PATH_VAR),
            token: lookup_with_fallback(&lookup, TOKEN_VAR, LEGACY_TOKEN_VAR).map(Secret::new),
        }
    }

    /// Check that all three values are present and produce an immutable config.
    ///
    /// Never touches the network.
    pub fn validate(&self) -> Result<ConnectionConfig> {
        let host = non_blank(self.host.as_deref());
        let http_path = non_blank(self.http_path.as_deref());
        let token = non_blank(self.token.as_ref().map(Secret::expose));

        let mut missing = Vec::new();
        if host.is_none() {
            missing.push(HOST_VAR);
        }
        if http_path.is_none() {
            missing.push(HTTP_PATH_VAR);
        }
        if token.is_none() {
            missing.push(TOKEN_VAR);
        }

        match (host, http_path, token) {
            (Some(host), Some(http_path), Some(token)) => {
                let warehouse_id = warehouse_id_from_path(http_path)?;
                Ok(ConnectionConfig {
                    host: host.to_string(),
                    http_path: http_path.to_string(),
                    token: Secret::new(token),
                    warehouse_id,
                })
            }
            _ => Err(MetricsError::Config(format!(
                "missing {}",
                missing.join(", ")
            ))),
        }
    }
}

fn lookup_with_fallback<F>(lookup: &F, primary: &str, legacy: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(primary)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| lookup(legacy).filter(|v| !v.trim().is_empty()))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn warehouse_id_from_path(http_path: &str) -> Result<String> {
    let segments: Vec<&str> = http_path.split('/').filter(|s| !s.is_empty()).collect();
    segments
        .iter()
        .position(|s| *s == "warehouses")
        .and_then(|idx| segments.get(idx + 1))
        .map(|id| id.to_string())
        .ok_or_else(|| {
            MetricsError::Config(format!(
                "{} '{}' does not identify a SQL warehouse",
                HTTP_PATH_VAR, http_path
            ))
        })
}

/// Validated connection parameters. Built once per load cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionConfig {
    host: String,
    http_path: String,
    token: Secret,
    warehouse_id: String,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        http_path: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        ConnectionSettings::new(host, http_path, token).validate()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn http_path(&self) -> &str {
        &self.http_path
    }

    pub fn token(&self) -> &Secret {
        &self.token
    }

    pub fn warehouse_id(&self) -> &str {
        &self.warehouse_id
    }

    /// Endpoint root. Bare hostnames are assumed to speak HTTPS.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }
}

/// Table identifier safe to interpolate into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef(String);

impl TableRef {
    /// Accepts `table`, `schema.table` or `catalog.schema.table`.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        let parts: Vec<&str> = name.split('.').collect();
        if parts.is_empty() || parts.len() > 3 || !parts.iter().all(|p| IDENTIFIER.is_match(p)) {
            return Err(MetricsError::Config(format!(
                "invalid table identifier '{}'",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(TABLE_VAR).filter(|v| !v.trim().is_empty()) {
            Some(name) => Self::parse(&name),
            None => Ok(Self::default()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self(DEFAULT_TABLE.to_string())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTTP and statement timing for the warehouse client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    /// Upper bound for a single HTTP round trip.
    pub request_timeout: Duration,
    /// Upper bound for one statement, polling included.
    pub statement_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            statement_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ClientOptions {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            connect_timeout: duration_var(&lookup, CONNECT_TIMEOUT_VAR, Duration::from_secs)?
                .unwrap_or(defaults.connect_timeout),
            request_timeout: duration_var(&lookup, REQUEST_TIMEOUT_VAR, Duration::from_secs)?
                .unwrap_or(defaults.request_timeout),
            statement_timeout: duration_var(&lookup, STATEMENT_TIMEOUT_VAR, Duration::from_secs)?
                .unwrap_or(defaults.statement_timeout),
            poll_interval: duration_var(&lookup, POLL_INTERVAL_VAR, Duration::from_millis)?
                .unwrap_or(defaults.poll_interval),
        })
    }
}

fn duration_var<F>(lookup: &F, key: &str, unit: fn(u64) -> Duration) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|n| Some(unit(n)))
            .map_err(|_| {
                MetricsError::Config(format!(
                    "{} must be a non-negative integer, got '{}'",
                    key, raw
                ))
            }),
    }
}

/// Everything the binary needs, read in one pass.
///
/// Missing credentials are not an error here; they surface as a configuration
/// error from the loader so the report can degrade instead of aborting.
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub table: TableRef,
    pub client: ClientOptions,
    pub cache_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            connection: ConnectionSettings::from_lookup(&lookup),
            table: TableRef::from_lookup(&lookup)?,
            client: ClientOptions::from_lookup(&lookup)?,
            cache_ttl: duration_var(&lookup, CACHE_TTL_VAR, Duration::from_secs)?
                .unwrap_or(DEFAULT_CACHE_TTL),
        })
    }
}
