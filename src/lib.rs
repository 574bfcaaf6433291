pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod warehouse;

pub use cache::{CacheKey, MetricsCache};
pub use config::{ClientOptions, ConnectionConfig, ConnectionSettings, Secret, Settings, TableRef};
pub use error::{ErrorKind, MetricsError, Result};
pub use loader::{LoadReport, MetricsLoader};
pub use metrics::{MetricsSnapshot, NationalSummary, OccupationDetail, RegionAggregate};
pub use warehouse::{ResultSet, StatementApiWarehouse, Warehouse, WarehouseConnection};
