// # SQLite Durable Store
//
// This crate provides the SQLite implementation of DurableStore.
//
// ## Schema
//
// ```text
// domain_summary                         latency_records
// ┌───────────────────┐                  ┌────────────────────┐
// │ id (PK)           │◀─────────────────│ domain_id (FK)     │
// │ domain_name UNIQUE│  ON DELETE       │ id (PK, autoinc)   │
// │ record_count      │  RESTRICT        │ latency            │
// │ mean_latency      │  ON UPDATE       │ created_at         │
// │ std_dev           │  CASCADE         └────────────────────┘
// │ first_update_time │
// │ last_update_time  │
// └───────────────────┘
// ```
//
// ## Concurrency
//
// One connection behind a mutex. rusqlite is blocking, so every operation
// runs on the blocking pool via `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use dnsperf_core::config::StoreConfig;
use dnsperf_core::stats::DomainStat;
use dnsperf_core::traits::{DurableStore, DurableStoreFactory, LatencySample};
use dnsperf_core::{BackendRegistry, Error, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS domain_summary (
    id                INTEGER PRIMARY KEY,
    domain_name       TEXT NOT NULL UNIQUE,
    record_count      INTEGER NOT NULL DEFAULT 0,
    mean_latency      REAL NOT NULL DEFAULT 0.0,
    std_dev           REAL NOT NULL DEFAULT 0.0,
    first_update_time TEXT,
    last_update_time  TEXT
);

CREATE TABLE IF NOT EXISTS latency_records (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    domain_id  INTEGER NOT NULL
               REFERENCES domain_summary(id) ON DELETE RESTRICT ON UPDATE CASCADE,
    latency    REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_latency_records_domain ON latency_records(domain_id);
";

const SUMMARY_COLUMNS: &str =
    "domain_name, record_count, mean_latency, std_dev, first_update_time, last_update_time";

/// SQLite-backed durable store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            Error::store(format!("Failed to open database {}: {}", path.display(), e))
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| Error::store(format!("Failed to configure database: {}", e)))?;

        info!("Opened SQLite store at {}", path.display());
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store(format!("Failed to open in-memory database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::store(format!("Failed to enable foreign keys: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::store("SQLite connection lock poisoned"))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| Error::store("SQLite store is closed"))?;
            f(conn).map_err(|e| Error::store(format!("{} failed: {}", op, e)))
        })
        .await
        .map_err(|e| Error::store(format!("task join: {}", e)))?
    }
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DomainStat> {
    let record_count: i64 = row.get(1)?;

    Ok(DomainStat {
        domain_name: row.get(0)?,
        record_count: u64::try_from(record_count)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(1, record_count))?,
        mean_latency: row.get(2)?,
        std_dev: row.get(3)?,
        first_update_time: row.get(4)?,
        last_update_time: row.get(5)?,
    })
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.with_conn("create tables", |conn| conn.execute_batch(SCHEMA))
            .await
    }

    async fn load_summaries(&self) -> Result<Vec<DomainStat>> {
        self.with_conn("select summaries", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM domain_summary ORDER BY id",
                SUMMARY_COLUMNS
            ))?;
            let rows = stmt.query_map([], summary_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn load_summary(&self, domain: &str) -> Result<Option<DomainStat>> {
        let domain = domain.to_string();
        self.with_conn("select summary", move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM domain_summary WHERE domain_name = ?1",
                    SUMMARY_COLUMNS
                ),
                [&domain],
                summary_from_row,
            )
            .optional()
        })
        .await
    }

    async fn insert_summary(&self, domain: &str) -> Result<DomainStat> {
        let name = domain.to_string();
        self.with_conn("insert summary", move |conn| {
            conn.execute("INSERT INTO domain_summary (domain_name) VALUES (?1)", [&name])
        })
        .await?;

        debug!("Inserted summary row for {}", domain);
        Ok(DomainStat::new(domain))
    }

    async fn update_summary(&self, stat: &DomainStat) -> Result<()> {
        let stat = stat.clone();
        let domain = stat.domain_name.clone();
        let record_count = i64::try_from(stat.record_count)
            .map_err(|_| Error::invalid_input(format!("record count overflow for {}", domain)))?;

        let updated = self
            .with_conn("update summary", move |conn| {
                conn.execute(
                    "UPDATE domain_summary
                     SET record_count = ?1, mean_latency = ?2, std_dev = ?3,
                         first_update_time = ?4, last_update_time = ?5
                     WHERE domain_name = ?6",
                    params![
                        record_count,
                        stat.mean_latency,
                        stat.std_dev,
                        stat.first_update_time,
                        stat.last_update_time,
                        stat.domain_name,
                    ],
                )
            })
            .await?;

        if updated == 0 {
            return Err(Error::not_found(domain));
        }
        Ok(())
    }

    async fn append_sample(&self, sample: &LatencySample) -> Result<()> {
        let domain = sample.domain_name.clone();
        let name = domain.clone();
        let latency = sample.latency_usec as f64;
        let created_at = Utc::now();

        let inserted = self
            .with_conn("insert sample", move |conn| {
                conn.execute(
                    "INSERT INTO latency_records (domain_id, latency, created_at)
                     SELECT id, ?2, ?3 FROM domain_summary WHERE domain_name = ?1",
                    params![name, latency, created_at],
                )
            })
            .await?;

        if inserted == 0 {
            return Err(Error::not_found(domain));
        }
        Ok(())
    }

    async fn list_samples(&self, domain: &str) -> Result<Vec<LatencySample>> {
        let name = domain.to_string();
        self.with_conn("select samples", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT r.latency, r.created_at
                 FROM latency_records r
                 JOIN domain_summary s ON s.id = r.domain_id
                 WHERE s.domain_name = ?1
                 ORDER BY r.id",
            )?;
            let rows = stmt.query_map([&name], |row| {
                let latency: f64 = row.get(0)?;
                let created_at: DateTime<Utc> = row.get(1)?;
                Ok(LatencySample {
                    domain_name: name.clone(),
                    latency_usec: latency as u64,
                    observed_at: Some(created_at),
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let taken = conn
                .lock()
                .map_err(|_| Error::store("SQLite connection lock poisoned"))?
                .take();

            match taken {
                Some(conn) => conn
                    .close()
                    .map_err(|(_, e)| Error::store(format!("Failed to close database: {}", e))),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| Error::store(format!("task join: {}", e)))?
    }

    fn store_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Factory for creating SQLite stores
pub struct SqliteFactory;

impl DurableStoreFactory for SqliteFactory {
    fn create(&self, config: &StoreConfig) -> Result<Box<dyn DurableStore>> {
        match config {
            StoreConfig::Sqlite { path } if path == ":memory:" => {
                Ok(Box::new(SqliteStore::open_in_memory()?))
            }
            StoreConfig::Sqlite { path } => Ok(Box::new(SqliteStore::open(path)?)),
            _ => Err(Error::config("Invalid config for SQLite store")),
        }
    }
}

/// Register the SQLite store with a registry
pub fn register(registry: &BackendRegistry) {
    registry.register_store("sqlite", Box::new(SqliteFactory));
}
