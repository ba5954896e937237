#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-store** – the append-only, range-partitioned event store.
//!
//! Grounded directly in the original indexer's relational event store: one
//! logical `events` table, physically partitioned by height into fixed-size
//! ranges, with `insert_all` guaranteeing all-or-nothing writes within the
//! caller's transaction. Every read decodes rows back into concrete events
//! via `indexer_event`'s registry.

use indexer_event::{decode_by_type, Event, RegistryError};
use indexer_rdb::{statement, RdbError, Tx};
use indexer_types::Height;

/// Number of block heights covered by one physical partition.
pub const PARTITION_SIZE: Height = 5000;

const DEFAULT_TABLE: &str = "events";

/// Errors raised by the event store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database rejected or failed the operation.
    #[error(transparent)]
    Rdb(#[from] RdbError),
    /// A row's `(name, version)` has no registered decoder.
    #[error(transparent)]
    UnknownType(#[from] RegistryError),
    /// An event's payload could not be turned into a storable JSON value.
    #[error("failed to encode event: {0}")]
    Encode(String),
    /// `insert` reported zero affected rows.
    #[error("insert affected no rows")]
    NoRowsInserted,
    /// `insert_all` affected a different number of rows than it was given;
    /// the caller's transaction should be rolled back.
    #[error("insert_all affected {affected} rows, expected {expected}")]
    PartialWrite {
        /// Rows the database reported as affected.
        affected: u64,
        /// Rows that should have been affected (the input length).
        expected: usize,
    },
}

/// The event store. Stateless beyond its table name; every operation takes
/// the caller's [`Tx`] so that a height's worth of writes commit or roll
/// back as one unit.
#[derive(Debug, Clone, Copy)]
pub struct EventStore {
    table: &'static str,
}

impl Default for EventStore {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE,
        }
    }
}

impl EventStore {
    /// Use the default `events` table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the partitioned parent table if it does not already exist.
    /// Idempotent; safe to call on every start-up.
    pub async fn ensure_schema(&self, tx: &mut Tx) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT NOT NULL,
                height BIGINT NOT NULL,
                seq BIGSERIAL,
                name TEXT NOT NULL,
                version INTEGER NOT NULL,
                payload JSONB NOT NULL,
                PRIMARY KEY (id, height)
            ) PARTITION BY RANGE (height)",
            table = self.table
        );
        sqlx::query(&sql).execute(tx.as_mut()).await?;
        Ok(())
    }

    /// The max height present across all stored events, `None` when empty.
    pub async fn latest_height(&self, tx: &mut Tx) -> Result<Option<Height>, StoreError> {
        let sql = format!("SELECT MAX(height) FROM {}", self.table);
        let row: (Option<Height>,) = sqlx::query_as(&sql).fetch_one(tx.as_mut()).await?;
        Ok(row.0)
    }

    /// All events at `height`, ordered by `seq` — the monotonic insertion
    /// order the parser/dispatcher assigned them, i.e. `(tx_index,
    /// msg_index)` order. `id` (a uuid) is never the ordering key; it only
    /// identifies a row, never orders it.
    pub async fn get_all_by_height(
        &self,
        tx: &mut Tx,
        height: Height,
    ) -> Result<Vec<Box<dyn Event>>, StoreError> {
        let mut qb = statement(&format!(
            "SELECT id, height, name, version, payload FROM {} WHERE height = ",
            self.table
        ));
        qb.push_bind(height);
        qb.push(" ORDER BY seq");

        let rows: Vec<EventRow> = qb
            .build_query_as::<EventRow>()
            .fetch_all(tx.as_mut())
            .await?;

        rows.into_iter()
            .map(|row| {
                let bytes = serde_json::to_vec(&row.payload)
                    .map_err(|e| StoreError::Encode(e.to_string()))?;
                Ok(decode_by_type(&row.name, row.version as u32, &bytes)?)
            })
            .collect()
    }

    /// Append one event. Fails with [`StoreError::NoRowsInserted`] if the
    /// backend reports zero affected rows (should never happen on a healthy
    /// connection, but the original source treats it as a distinct error
    /// rather than silently succeeding).
    pub async fn insert(&self, tx: &mut Tx, event: &dyn Event) -> Result<(), StoreError> {
        let value = event_json_value(event)?;
        let sql = format!(
            "INSERT INTO {} (id, height, name, version, payload) VALUES ($1, $2, $3, $4, $5)",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(event.id())
            .bind(event.height())
            .bind(event.name())
            .bind(event.version() as i32)
            .bind(sqlx::types::Json(value))
            .execute(tx.as_mut())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoRowsInserted);
        }
        Ok(())
    }

    /// Append every event in `events` in a single statement. All-or-nothing:
    /// if the affected-row count does not match the input length, returns
    /// [`StoreError::PartialWrite`] so the caller rolls back the whole
    /// height's transaction rather than leaving a partial write committed.
    pub async fn insert_all(
        &self,
        tx: &mut Tx,
        events: &[Box<dyn Event>],
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            let value = event_json_value(event.as_ref())?;
            rows.push((
                event.id().to_string(),
                event.height(),
                event.name(),
                event.version() as i32,
                value,
            ));
        }

        let mut qb = statement(&format!(
            "INSERT INTO {} (id, height, name, version, payload) ",
            self.table
        ));
        qb.push_values(rows.iter(), |mut b, (id, height, name, version, value)| {
            b.push_bind(id.clone())
                .push_bind(*height)
                .push_bind(name.clone())
                .push_bind(*version)
                .push_bind(sqlx::types::Json(value.clone()));
        });

        let result = qb.build().execute(tx.as_mut()).await?;
        if result.rows_affected() != events.len() as u64 {
            return Err(StoreError::PartialWrite {
                affected: result.rows_affected(),
                expected: events.len(),
            });
        }
        Ok(())
    }

    /// If `height` is the first height of a partition, create that
    /// partition idempotently. Callers must invoke this with monotonically
    /// non-decreasing heights; a no-op otherwise.
    pub async fn ensure_partition_table_exists(
        &self,
        tx: &mut Tx,
        height: Height,
    ) -> Result<(), StoreError> {
        let Some((idx, from, to)) = partition_bounds(height) else {
            return Ok(());
        };
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table}_{idx} PARTITION OF {table} FOR VALUES FROM ({from}) TO ({to})",
            table = self.table,
            idx = idx,
            from = from,
            to = to,
        );
        sqlx::query(&sql).execute(tx.as_mut()).await?;
        Ok(())
    }
}

/// Compute the `(partition_index, range_from, range_to)` for `height`, or
/// `None` if `height` does not land on a partition boundary.
fn partition_bounds(height: Height) -> Option<(Height, Height, Height)> {
    if height % PARTITION_SIZE != 0 {
        return None;
    }
    let idx = height / PARTITION_SIZE;
    Some((idx, idx * PARTITION_SIZE, (idx + 1) * PARTITION_SIZE))
}

fn event_json_value(event: &dyn Event) -> Result<serde_json::Value, StoreError> {
    let bytes = event.to_json().map_err(|e| StoreError::Encode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Encode(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct EventRow {
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    height: Height,
    name: String,
    version: i32,
    payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_bounds_only_at_boundary() {
        assert_eq!(partition_bounds(1), None);
        assert_eq!(partition_bounds(5000), Some((1, 5000, 10000)));
        assert_eq!(partition_bounds(0), Some((0, 0, 5000)));
        assert_eq!(partition_bounds(10000), Some((2, 10000, 15000)));
    }

    #[test]
    fn which_partition_contains_height() {
        // Every height h must land in partition floor(h / PARTITION_SIZE).
        for h in [0, 1, 4999, 5000, 5001, 12345] {
            let idx = h / PARTITION_SIZE;
            assert!(h >= idx * PARTITION_SIZE && h < (idx + 1) * PARTITION_SIZE);
        }
    }
}
