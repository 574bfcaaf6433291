//! Metrics loader
//!
//! One load validates the connection settings, opens a warehouse connection,
//! runs the aggregate and detail statements, materializes both tables and
//! closes the connection. `load` never fails: errors are logged and reported
//! next to an empty snapshot so the presentation layer can still render.

use crate::config::{ClientOptions, ConnectionConfig, ConnectionSettings, TableRef};
use crate::error::{ErrorKind, MetricsError, Result};
use crate::metrics::{self, queries, MetricsSnapshot};
use crate::warehouse::{StatementApiWarehouse, Warehouse, WarehouseConnection};
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of a load as seen by the presentation layer.
#[derive(Debug)]
pub struct LoadReport {
    pub snapshot: MetricsSnapshot,
    /// Why the snapshot is empty, when it is empty because something failed.
    pub error: Option<MetricsError>,
    pub from_cache: bool,
}

impl LoadReport {
    pub fn loaded(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot,
            error: None,
            from_cache: false,
        }
    }

    pub fn cached(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot,
            error: None,
            from_cache: true,
        }
    }

    pub fn not_ready(error: MetricsError) -> Self {
        Self {
            snapshot: MetricsSnapshot::not_ready(),
            error: Some(error),
            from_cache: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.error.is_none() && self.snapshot.is_ready()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(MetricsError::kind)
    }
}

pub struct MetricsLoader<W: Warehouse = StatementApiWarehouse> {
    warehouse: W,
}

impl MetricsLoader<StatementApiWarehouse> {
    /// Loader backed by the REST statement API.
    pub fn from_options(options: ClientOptions) -> Result<Self> {
        Ok(Self::new(StatementApiWarehouse::new(options)?))
    }
}

impl<W: Warehouse> MetricsLoader<W> {
    pub fn new(warehouse: W) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Load the dashboard tables, degrading to an empty snapshot on any failure.
    pub async fn load(&self, settings: &ConnectionSettings, table: &TableRef) -> LoadReport {
        match self.try_load(settings, table).await {
            Ok(snapshot) => LoadReport::loaded(snapshot),
            Err(e) => degrade(e, table),
        }
    }

    /// Same work as `load`, with errors propagated.
    pub async fn try_load(&self, settings: &ConnectionSettings, table: &TableRef) -> Result<MetricsSnapshot> {
        let config = settings.validate()?;
        self.load_with_config(&config, table).await
    }

    pub async fn load_with_config(&self, config: &ConnectionConfig, table: &TableRef) -> Result<MetricsSnapshot> {
        let started = Instant::now();
        info!(
            warehouse = self.warehouse.name(),
            host = config.host(),
            table = %table,
            "Loading dashboard metrics"
        );

        let mut conn = self.warehouse.connect(config).await?;
        let outcome = run_statements(conn.as_mut(), table).await;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to release warehouse connection");
        }
        let snapshot = outcome?;

        info!(
            regions = snapshot.regions.len(),
            occupations = snapshot.occupations.len(),
            overall_proportion = snapshot.summary.overall_proportion,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded dashboard metrics"
        );
        Ok(snapshot)
    }
}

async fn run_statements(conn: &mut dyn WarehouseConnection, table: &TableRef) -> Result<MetricsSnapshot> {
    let region_rows = conn.execute(&queries::region_aggregate(table)).await?;
    let regions = metrics::regions_from_result(&region_rows)?;

    let occupation_rows = conn.execute(&queries::occupation_detail(table)).await?;
    let occupations = metrics::occupations_from_result(&occupation_rows)?;

    Ok(MetricsSnapshot::new(regions, occupations))
}

/// Log a failed load and turn it into the empty report.
pub(crate) fn degrade(error: MetricsError, table: &TableRef) -> LoadReport {
    match error.kind() {
        ErrorKind::Config => {
            warn!(error = %error, "Warehouse configuration incomplete, metrics unavailable")
        }
        _ => error!(error = %error, table = %table, "Failed to load metrics"),
    }
    LoadReport::not_ready(error)
}
