#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-api** – read-only HTTP facade over the projection views.
//!
//! Deliberately thin: every handler is a single query against a view table
//! through [`indexer_rdb`]'s pagination helper. No handler decides what a
//! block or transaction *is* — that decision was already made and committed
//! by the projection runtime. Modelled on the teacher's orchestration
//! service (`toka-orchestration-service`): an `axum::Router` wrapped in a
//! `TraceLayer`, served with `axum::serve`, stoppable by a shared shutdown
//! signal rather than by its own `Ctrl+C` handler.

use std::net::SocketAddr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use indexer_rdb::{paginate, statement, Page, RdbPool};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Errors surfaced at the HTTP boundary. Distinct from [`indexer_rdb::RdbError`]
/// so that a missing row renders as `404`, not `500`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No row matched the request.
    #[error("not found")]
    NotFound,
    /// The database rejected the read.
    #[error(transparent)]
    Rdb(#[from] indexer_rdb::RdbError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Rdb(indexer_rdb::RdbError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Rdb(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Clone)]
struct ApiState {
    pool: RdbPool,
}

/// Build the router. Exposed separately from [`serve`] so tests can drive
/// handlers directly without binding a socket.
pub fn router(pool: RdbPool) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/blocks", get(list_blocks))
        .route("/blocks/:height", get(get_block))
        .with_state(ApiState { pool })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Bind `addr` and serve until `shutdown` reports `true`.
pub async fn serve(pool: RdbPool, addr: SocketAddr, mut shutdown: watch::Receiver<bool>) -> Result<(), std::io::Error> {
    let app = router(pool);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "indexer-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct BlockView {
    height: i64,
    hash: String,
    time: DateTime<Utc>,
    app_hash: String,
    proposer_address: String,
    transaction_count: i32,
    committed_council_nodes: serde_json::Value,
}

async fn get_block(State(state): State<ApiState>, Path(height): Path<i64>) -> Result<Json<BlockView>, ApiError> {
    let row = sqlx::query_as::<_, BlockView>(
        "SELECT height, hash, time, app_hash, proposer_address, transaction_count, committed_council_nodes
         FROM view_blocks WHERE height = $1",
    )
    .bind(height)
    .fetch_optional(state.pool.inner())
    .await
    .map_err(indexer_rdb::RdbError::from)?;

    row.map(Json).ok_or(ApiError::NotFound)
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_blocks(State(state): State<ApiState>, Query(params): Query<PageParams>) -> Result<Json<Vec<BlockView>>, ApiError> {
    let page = Page::new(params.limit, params.offset);
    let mut builder = statement(
        "SELECT height, hash, time, app_hash, proposer_address, transaction_count, committed_council_nodes
         FROM view_blocks ORDER BY height DESC",
    );
    paginate(&mut builder, page);

    let rows = builder
        .build_query_as::<BlockView>()
        .fetch_all(state.pool.inner())
        .await
        .map_err(indexer_rdb::RdbError::from)?;

    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn database_error_maps_to_500() {
        let response = ApiError::Rdb(indexer_rdb::RdbError::Database(sqlx::Error::PoolClosed)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
