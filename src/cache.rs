//! Time-windowed cache for loaded metrics
//!
//! Holds at most one snapshot, keyed by everything that determines its
//! content: connection, table and statement text. Only ready snapshots are
//! stored, so a failed or empty load is attempted again on the next call.

use crate::config::{ConnectionConfig, ConnectionSettings, TableRef, DEFAULT_CACHE_TTL};
use crate::loader::{degrade, LoadReport, MetricsLoader};
use crate::metrics::{queries, MetricsSnapshot};
use crate::warehouse::Warehouse;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(config: &ConnectionConfig, table: &TableRef) -> Self {
        let mut hasher = DefaultHasher::new();
        config.hash(&mut hasher);
        table.hash(&mut hasher);
        queries::region_aggregate(table).hash(&mut hasher);
        queries::occupation_detail(table).hash(&mut hasher);
        Self(hasher.finish())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    key: CacheKey,
    snapshot: MetricsSnapshot,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MetricsCache {
    ttl: Duration,
    entry: Option<CacheEntry>,
}

impl Default for MetricsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl MetricsCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|e| e.fetched_at)
    }

    /// True when there is no entry or the entry is at least `ttl` old.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match &self.entry {
            None => true,
            Some(entry) => {
                // A clock that moved backwards reads as age zero.
                let age = now
                    .signed_duration_since(entry.fetched_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                age >= self.ttl
            }
        }
    }

    pub fn get(&self, key: CacheKey, now: DateTime<Utc>) -> Option<&MetricsSnapshot> {
        if self.is_stale(now) {
            return None;
        }
        self.entry
            .as_ref()
            .filter(|e| e.key == key)
            .map(|e| &e.snapshot)
    }

    pub fn insert(&mut self, key: CacheKey, snapshot: MetricsSnapshot, fetched_at: DateTime<Utc>) {
        self.entry = Some(CacheEntry {
            key,
            snapshot,
            fetched_at,
        });
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Serve from the cache when fresh, otherwise load and remember the result.
    pub async fn load_through<W: Warehouse>(
        &mut self,
        loader: &MetricsLoader<W>,
        settings: &ConnectionSettings,
        table: &TableRef,
        now: DateTime<Utc>,
    ) -> LoadReport {
        let config = match settings.validate() {
            Ok(config) => config,
            Err(e) => return degrade(e, table),
        };
        let key = CacheKey::new(&config, table);

        if let Some(snapshot) = self.get(key, now) {
            debug!(table = %table, "Serving metrics from cache");
            return LoadReport::cached(snapshot.clone());
        }

        match loader.load_with_config(&config, table).await {
            Ok(snapshot) => {
                if snapshot.is_ready() {
                    self.insert(key, snapshot.clone(), now);
                }
                LoadReport::loaded(snapshot)
            }
            Err(e) => degrade(e, table),
        }
    }
}
