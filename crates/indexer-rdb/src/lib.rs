#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-rdb** – thin Postgres abstraction shared by the store and
//! projection layers.
//!
//! This crate owns exactly three concerns: a pool wrapper that opens
//! connections and hands out transactions, a `Tx` transaction handle that
//! every write in the system goes through, and a small set of helpers
//! (`StatementBuilder`, `Page`/`paginate`) so call sites never hand-assemble
//! SQL strings by concatenation. It has no opinion on what tables exist —
//! that schema knowledge lives in `indexer-store` and `indexer-projections`.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

/// A thin fluent wrapper around [`sqlx::QueryBuilder`], scoped to Postgres.
/// Named so call sites read as "build a statement" rather than reaching for
/// `sqlx::QueryBuilder` directly; the one exception is partition DDL, which
/// builds its `CREATE TABLE` string directly because the only dynamic part
/// is a validated, non-negative partition index (never user input).
pub type StatementBuilder<'a> = sqlx::QueryBuilder<'a, Postgres>;

/// Start a new [`StatementBuilder`] with the given fixed SQL prefix.
pub fn statement(init: &str) -> StatementBuilder<'_> {
    StatementBuilder::new(init)
}

//─────────────────────────────
//  Pool
//─────────────────────────────

/// Connection pool wrapper over [`sqlx::PgPool`].
#[derive(Debug, Clone)]
pub struct RdbPool {
    pool: PgPool,
}

impl RdbPool {
    /// Connect to the database at `database_url`, with a bounded pool size.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RdbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an already-constructed pool, e.g. one built by test fixtures.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Borrow the underlying pool for call sites that need to run a query
    /// outside an explicit transaction (read-only paths, mostly).
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a new transaction. Every store write and every projection
    /// batch goes through one of these.
    pub async fn begin(&self) -> Result<Tx, RdbError> {
        let inner = self.pool.begin().await?;
        Ok(Tx { inner })
    }

    /// Close the pool, waiting for in-flight connections to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

//─────────────────────────────
//  Transaction handle
//─────────────────────────────

/// A single database transaction. All store and projection writes borrow
/// one of these for the duration of one height's (or one batch's) work, and
/// either `commit` or `rollback` it explicitly — there is no implicit
/// commit-on-drop.
pub struct Tx {
    inner: sqlx::Transaction<'static, Postgres>,
}

impl Tx {
    /// Borrow the underlying connection to run a query against.
    pub fn as_mut(&mut self) -> &mut sqlx::PgConnection {
        &mut self.inner
    }

    /// Commit the transaction, making its writes visible to other readers.
    pub async fn commit(self) -> Result<(), RdbError> {
        self.inner.commit().await?;
        Ok(())
    }

    /// Roll back the transaction, discarding its writes.
    pub async fn rollback(self) -> Result<(), RdbError> {
        self.inner.rollback().await?;
        Ok(())
    }
}

//─────────────────────────────
//  Pagination
//─────────────────────────────

/// Default page size applied when a caller does not specify one.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Hard ceiling on page size, regardless of what a caller requests.
pub const MAX_PAGE_LIMIT: i64 = 500;

/// A validated `LIMIT`/`OFFSET` pair for read endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of rows to return, clamped to `[1, MAX_PAGE_LIMIT]`.
    pub limit: i64,
    /// Number of rows to skip, clamped to be non-negative.
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    /// Build a page from caller-supplied, untrusted values, clamping them
    /// into a safe range rather than rejecting the request.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        Self { limit, offset }
    }
}

/// Append a `LIMIT $n OFFSET $m` clause to `builder` using `page`.
pub fn paginate<'a>(builder: &mut StatementBuilder<'a>, page: Page) {
    builder.push(" LIMIT ").push_bind(page.limit);
    builder.push(" OFFSET ").push_bind(page.offset);
}

//─────────────────────────────
//  Errors
//─────────────────────────────

/// Errors raised by the RDB abstraction layer.
#[derive(Debug, thiserror::Error)]
pub enum RdbError {
    /// The query matched no rows; a normal outcome for lookup APIs, not a
    /// failure — see the error-handling design's not-found policy.
    #[error("no matching row")]
    NotFound,
    /// Any other database driver error.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RdbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RdbError::NotFound,
            other => RdbError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamps_oversized_limit() {
        let page = Page::new(Some(10_000), Some(-5));
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn page_defaults_when_unset() {
        let page = Page::new(None, None);
        assert_eq!(page.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn paginate_appends_limit_and_offset() {
        let mut builder = statement("SELECT * FROM view_blocks");
        paginate(&mut builder, Page::new(Some(25), Some(50)));
        let sql = builder.sql();
        assert!(sql.contains("LIMIT"));
        assert!(sql.contains("OFFSET"));
    }

    #[test]
    fn row_not_found_maps_to_sentinel() {
        let err: RdbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, RdbError::NotFound));
    }
}
