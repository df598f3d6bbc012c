// gridloom-core/src/infrastructure/duckdb.rs
//
// DuckDB adapter behind the Warehouse and DatasetResolver ports. The
// connection sits behind a mutex and every read-modify-write (conditional
// upsert, insert-if-absent, guarded status change) holds the guard across
// both statements, so the single-writer discipline is enforced here and not
// by caller convention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Config, Connection, params};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::domain::error::DomainError;
use crate::domain::snapshot::DatasetSnapshot;
use crate::domain::value::{Value, format_timestamp, parse_timestamp};
use crate::domain::warehouse::{
    DimensionKind, DimensionRecency, FactRow, LifecycleStatus, RegionCandidate, SourceCandidate,
    TimeSlot,
};
use crate::error::GridloomError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::dataset::DatasetResolver;
use crate::ports::warehouse::{UpsertOutcome, Warehouse};

const SCHEMA_DDL: &str = "
CREATE SEQUENCE IF NOT EXISTS seq_region_key START 1;
CREATE SEQUENCE IF NOT EXISTS seq_time_key START 1;
CREATE SEQUENCE IF NOT EXISTS seq_source_key START 1;

CREATE TABLE IF NOT EXISTS dim_region (
    region_key    BIGINT PRIMARY KEY,
    region_code   TEXT NOT NULL UNIQUE,
    region_name   TEXT,
    population    BIGINT,
    area_km2      DOUBLE,
    status        TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    last_seen_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_time (
    time_key   BIGINT PRIMARY KEY,
    instant    TEXT NOT NULL UNIQUE,
    year       INTEGER NOT NULL,
    month      INTEGER NOT NULL,
    day        INTEGER NOT NULL,
    hour       INTEGER NOT NULL,
    minute     INTEGER NOT NULL,
    weekday    INTEGER NOT NULL,
    is_weekend BOOLEAN NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_source (
    source_key    BIGINT PRIMARY KEY,
    source_name   TEXT NOT NULL UNIQUE,
    renewable     BOOLEAN NOT NULL,
    category      TEXT NOT NULL,
    status        TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    last_seen_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fact_energy_flow (
    time_key      BIGINT NOT NULL,
    region_key    BIGINT NOT NULL,
    source_key    BIGINT NOT NULL,
    measured_mw   DOUBLE NOT NULL,
    load_factor   DOUBLE,
    temperature_c DOUBLE,
    price_mwh     DOUBLE,
    batch_id      TEXT NOT NULL,
    loaded_at     TEXT NOT NULL,
    UNIQUE (time_key, region_key, source_key)
);
";

pub struct DuckDbWarehouse {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbWarehouse {
    pub fn new(db_path: &str) -> Result<Self, InfrastructureError> {
        let config = Config::default();
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            if let Some(parent) = std::path::Path::new(db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(db_path, config)?
        };
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, GridloomError> {
        self.conn
            .lock()
            .map_err(|_| GridloomError::InternalError("DuckDB Mutex Poisoned".into()))
    }

    fn scalar_key(
        conn: &Connection,
        sql: &str,
        natural_key: &str,
    ) -> Result<Option<i64>, GridloomError> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params![natural_key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Free-form read query for the CLI. Returns column names plus rows
    /// rendered as text.
    pub fn query_rows(&self, sql: &str) -> Result<(Vec<String>, Vec<Vec<String>>), GridloomError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let mut names: Vec<String> = Vec::new();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            if names.is_empty() {
                names = row.as_ref().column_names().iter().map(|s| s.to_string()).collect();
            }
            let mut rendered = Vec::with_capacity(names.len());
            for i in 0..names.len() {
                let value: duckdb::types::Value = row.get(i)?;
                rendered.push(from_engine(value).to_string());
            }
            out.push(rendered);
        }
        Ok((names, out))
    }
}

/// Map an engine value into the domain cell type. Timestamps are stored as
/// canonical RFC 3339 text, so they round-trip through the `Text` arm.
fn from_engine(value: duckdb::types::Value) -> Value {
    use duckdb::types::Value as Engine;
    match value {
        Engine::Null => Value::Null,
        Engine::Boolean(b) => Value::Bool(b),
        Engine::TinyInt(i) => Value::Int(i64::from(i)),
        Engine::SmallInt(i) => Value::Int(i64::from(i)),
        Engine::Int(i) => Value::Int(i64::from(i)),
        Engine::BigInt(i) => Value::Int(i),
        Engine::UTinyInt(i) => Value::Int(i64::from(i)),
        Engine::USmallInt(i) => Value::Int(i64::from(i)),
        Engine::UInt(i) => Value::Int(i64::from(i)),
        Engine::Float(f) => Value::Float(f64::from(f)),
        Engine::Double(f) => Value::Float(f),
        Engine::Text(s) => Value::Text(s),
        other => Value::Text(format!("{other:?}")),
    }
}

fn recency_row(
    natural_key: String,
    last_seen: String,
    status: String,
) -> Result<DimensionRecency, GridloomError> {
    let last_seen_at = parse_timestamp(&last_seen).ok_or_else(|| {
        GridloomError::InternalError(format!(
            "unparseable last_seen_at '{last_seen}' for '{natural_key}'"
        ))
    })?;
    let status = LifecycleStatus::parse(&status).ok_or_else(|| {
        GridloomError::InternalError(format!("unknown status '{status}' for '{natural_key}'"))
    })?;
    Ok(DimensionRecency {
        natural_key,
        last_seen_at,
        status,
    })
}

fn dimension_table(kind: DimensionKind) -> (&'static str, &'static str) {
    match kind {
        DimensionKind::Region => ("dim_region", "region_code"),
        DimensionKind::Source => ("dim_source", "source_name"),
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    async fn ensure_schema(&self) -> Result<(), GridloomError> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_DDL)?;
        debug!("Warehouse schema ensured");
        Ok(())
    }

    async fn upsert_region(
        &self,
        candidate: &RegionCandidate,
        seen_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, GridloomError> {
        let conn = self.lock()?;
        let seen = format_timestamp(seen_at);
        let existing = Self::scalar_key(
            &conn,
            "SELECT region_key FROM dim_region WHERE region_code = ?",
            &candidate.code,
        )?;
        if existing.is_some() {
            conn.execute(
                "UPDATE dim_region
                 SET last_seen_at = ?,
                     status = 'active',
                     region_name = COALESCE(?, region_name),
                     population = COALESCE(?, population),
                     area_km2 = COALESCE(?, area_km2)
                 WHERE region_code = ?",
                params![
                    seen,
                    candidate.name,
                    candidate.population,
                    candidate.area_km2,
                    candidate.code
                ],
            )?;
            Ok(UpsertOutcome::Refreshed)
        } else {
            conn.execute(
                "INSERT INTO dim_region
                 (region_key, region_code, region_name, population, area_km2,
                  status, first_seen_at, last_seen_at)
                 VALUES (nextval('seq_region_key'), ?, ?, ?, ?, 'active', ?, ?)",
                params![
                    candidate.code,
                    candidate.name,
                    candidate.population,
                    candidate.area_km2,
                    seen,
                    seen
                ],
            )?;
            Ok(UpsertOutcome::Inserted)
        }
    }

    async fn upsert_time_slot(&self, slot: &TimeSlot) -> Result<UpsertOutcome, GridloomError> {
        let conn = self.lock()?;
        let instant = format_timestamp(slot.instant);
        let existing = Self::scalar_key(
            &conn,
            "SELECT time_key FROM dim_time WHERE instant = ?",
            &instant,
        )?;
        if existing.is_some() {
            // The calendar decomposition of an instant never changes.
            return Ok(UpsertOutcome::Refreshed);
        }
        conn.execute(
            "INSERT INTO dim_time
             (time_key, instant, year, month, day, hour, minute, weekday, is_weekend)
             VALUES (nextval('seq_time_key'), ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                instant,
                slot.year,
                slot.month,
                slot.day,
                slot.hour,
                slot.minute,
                slot.weekday,
                slot.is_weekend
            ],
        )?;
        Ok(UpsertOutcome::Inserted)
    }

    async fn upsert_source(
        &self,
        candidate: &SourceCandidate,
        seen_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, GridloomError> {
        let conn = self.lock()?;
        let seen = format_timestamp(seen_at);
        let existing = Self::scalar_key(
            &conn,
            "SELECT source_key FROM dim_source WHERE source_name = ?",
            &candidate.name,
        )?;
        if existing.is_some() {
            conn.execute(
                "UPDATE dim_source
                 SET last_seen_at = ?, status = 'active', renewable = ?, category = ?
                 WHERE source_name = ?",
                params![seen, candidate.renewable, candidate.category, candidate.name],
            )?;
            Ok(UpsertOutcome::Refreshed)
        } else {
            conn.execute(
                "INSERT INTO dim_source
                 (source_key, source_name, renewable, category, status,
                  first_seen_at, last_seen_at)
                 VALUES (nextval('seq_source_key'), ?, ?, ?, 'active', ?, ?)",
                params![candidate.name, candidate.renewable, candidate.category, seen, seen],
            )?;
            Ok(UpsertOutcome::Inserted)
        }
    }

    async fn region_key(&self, code: &str) -> Result<Option<i64>, GridloomError> {
        let conn = self.lock()?;
        Self::scalar_key(
            &conn,
            "SELECT region_key FROM dim_region WHERE region_code = ?",
            code,
        )
    }

    async fn time_key(&self, instant: DateTime<Utc>) -> Result<Option<i64>, GridloomError> {
        let conn = self.lock()?;
        Self::scalar_key(
            &conn,
            "SELECT time_key FROM dim_time WHERE instant = ?",
            &format_timestamp(instant),
        )
    }

    async fn source_key(&self, name: &str) -> Result<Option<i64>, GridloomError> {
        let conn = self.lock()?;
        Self::scalar_key(
            &conn,
            "SELECT source_key FROM dim_source WHERE source_name = ?",
            name,
        )
    }

    async fn insert_fact_if_absent(&self, row: &FactRow) -> Result<bool, GridloomError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT count(*) FROM fact_energy_flow
             WHERE time_key = ? AND region_key = ? AND source_key = ?",
        )?;
        let existing: i64 = stmt.query_row(
            params![row.time_key, row.region_key, row.source_key],
            |r| r.get(0),
        )?;
        if existing > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO fact_energy_flow
             (time_key, region_key, source_key, measured_mw, load_factor,
              temperature_c, price_mwh, batch_id, loaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                row.time_key,
                row.region_key,
                row.source_key,
                row.measured_mw,
                row.load_factor,
                row.temperature_c,
                row.price_mwh,
                row.batch_id,
                format_timestamp(row.loaded_at)
            ],
        )?;
        Ok(true)
    }

    async fn overwrite_fact(&self, row: &FactRow) -> Result<(), GridloomError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM fact_energy_flow
             WHERE time_key = ? AND region_key = ? AND source_key = ?",
            params![row.time_key, row.region_key, row.source_key],
        )?;
        conn.execute(
            "INSERT INTO fact_energy_flow
             (time_key, region_key, source_key, measured_mw, load_factor,
              temperature_c, price_mwh, batch_id, loaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                row.time_key,
                row.region_key,
                row.source_key,
                row.measured_mw,
                row.load_factor,
                row.temperature_c,
                row.price_mwh,
                row.batch_id,
                format_timestamp(row.loaded_at)
            ],
        )?;
        Ok(())
    }

    async fn fact_count(&self) -> Result<u64, GridloomError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT count(*) FROM fact_energy_flow")?;
        let count: i64 = stmt.query_row([], |r| r.get(0))?;
        Ok(count as u64)
    }

    async fn dimension_recency(
        &self,
        kind: DimensionKind,
    ) -> Result<Vec<DimensionRecency>, GridloomError> {
        let conn = self.lock()?;
        let (table, key_column) = dimension_table(kind);
        let mut stmt = conn.prepare(&format!(
            "SELECT {key_column}, last_seen_at, status FROM {table} ORDER BY {key_column}"
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(recency_row(row.get(0)?, row.get(1)?, row.get(2)?)?);
        }
        Ok(out)
    }

    async fn advance_status(
        &self,
        kind: DimensionKind,
        natural_key: &str,
        from: LifecycleStatus,
        to: LifecycleStatus,
    ) -> Result<bool, GridloomError> {
        let conn = self.lock()?;
        let (table, key_column) = dimension_table(kind);
        let affected = conn.execute(
            &format!("UPDATE {table} SET status = ? WHERE {key_column} = ? AND status = ?"),
            params![to.as_str(), natural_key, from.as_str()],
        )?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl DatasetResolver for DuckDbWarehouse {
    /// Resolve a gold-layer table into a snapshot for gate evaluation. The
    /// name must be a plain identifier; anything else is treated as unknown.
    async fn resolve(&self, name: &str) -> Result<DatasetSnapshot, GridloomError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(DomainError::DatasetNotFound(name.to_string()).into());
        }

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM \"{name}\""))
            .map_err(|_| GridloomError::Domain(DomainError::DatasetNotFound(name.to_string())))?;
        let mut rows = stmt.query([])?;

        let mut names: Vec<String> = Vec::new();
        let mut out_rows: Vec<BTreeMap<String, Value>> = Vec::new();
        while let Some(row) = rows.next()? {
            if names.is_empty() {
                names = row.as_ref().column_names().iter().map(|s| s.to_string()).collect();
            }
            let mut cells = BTreeMap::new();
            for i in 0..names.len() {
                let value: duckdb::types::Value = row.get(i)?;
                cells.insert(names[i].clone(), from_engine(value));
            }
            out_rows.push(cells);
        }
        Ok(DatasetSnapshot::new(name, out_rows))
    }
}
