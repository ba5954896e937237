//! Projects `BlockCreated` into `view_blocks`, one row per height.
//!
//! Grounded in the original indexer's `Block` projection
//! (`appinterface/projection/block.go`): one insert per block, carrying the
//! commit signatures as a nested structure rather than a separate table,
//! since they are always read alongside their block.

use indexer_event::{BlockCreated, Event};
use indexer_rdb::Tx;
use indexer_types::Height;

use crate::ProjectionError;

const TABLE: &str = "view_blocks";

/// Materialises committed blocks into `view_blocks`.
pub struct BlockProjection;

impl BlockProjection {
    /// The only event this projection subscribes to.
    pub const EVENTS: &'static [&'static str] = &["BlockCreated"];
}

#[async_trait::async_trait]
impl crate::Projection for BlockProjection {
    fn id(&self) -> &'static str {
        "view_blocks"
    }

    fn events_to_listen(&self) -> &'static [&'static str] {
        Self::EVENTS
    }

    async fn on_init(&self, tx: &mut Tx) -> Result<(), ProjectionError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (
                height BIGINT PRIMARY KEY,
                hash TEXT NOT NULL,
                time TIMESTAMPTZ NOT NULL,
                app_hash TEXT NOT NULL,
                proposer_address TEXT NOT NULL,
                transaction_count INTEGER NOT NULL,
                committed_council_nodes JSONB NOT NULL
            )"
        );
        sqlx::query(&sql).execute(tx.as_mut()).await.map_err(indexer_rdb::RdbError::from)?;
        Ok(())
    }

    async fn handle_events(
        &self,
        tx: &mut Tx,
        height: Height,
        events: &[Box<dyn Event>],
    ) -> Result<(), ProjectionError> {
        for event in events {
            let name = event.name();
            let Some(created) = event.as_any().downcast_ref::<BlockCreated>() else {
                return Err(ProjectionError::UnexpectedEvent {
                    projection_id: self.id(),
                    event_name: name,
                    height,
                });
            };
            self.insert_block(tx, created).await?;
        }
        Ok(())
    }
}

impl BlockProjection {
    async fn insert_block(&self, tx: &mut Tx, event: &BlockCreated) -> Result<(), ProjectionError> {
        let block = &event.payload.block;
        let council_nodes: Vec<_> = block
            .signatures
            .iter()
            .map(|sig| {
                serde_json::json!({
                    "address": sig.validator_address,
                    "time": sig.timestamp,
                    "signature": sig.signature,
                    "isProposer": sig.is_proposer,
                })
            })
            .collect();

        let sql = format!(
            "INSERT INTO {TABLE}
                (height, hash, time, app_hash, proposer_address, transaction_count, committed_council_nodes)
             VALUES ($1, $2, $3, $4, $5, $6, $7)"
        );
        sqlx::query(&sql)
            .bind(block.height)
            .bind(&block.hash)
            .bind(block.time)
            .bind(&block.app_hash)
            .bind(&block.proposer_address)
            .bind(block.txs.len() as i32)
            .bind(sqlx::types::Json(council_nodes))
            .execute(tx.as_mut())
            .await
            .map_err(indexer_rdb::RdbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Projection as _;

    #[test]
    fn subscribes_only_to_block_created() {
        assert_eq!(BlockProjection.events_to_listen(), &["BlockCreated"]);
        assert_eq!(BlockProjection.id(), "view_blocks");
    }
}
