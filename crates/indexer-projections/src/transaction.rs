//! Projects `TransactionCreated`/`TransactionFailed` into `view_transactions`.
//!
//! Insert-only, mirroring the original indexer's account view style: each
//! transaction is written exactly once, keyed by `(height, tx_index)`.

use indexer_event::{Event, TransactionEvent};
use indexer_rdb::Tx;
use indexer_types::Height;

use crate::ProjectionError;

const TABLE: &str = "view_transactions";

/// Materialises transaction outcomes into `view_transactions`.
pub struct TransactionProjection;

impl TransactionProjection {
    /// Both outcome variants this projection subscribes to.
    pub const EVENTS: &'static [&'static str] = &["TransactionCreated", "TransactionFailed"];
}

#[async_trait::async_trait]
impl crate::Projection for TransactionProjection {
    fn id(&self) -> &'static str {
        "view_transactions"
    }

    fn events_to_listen(&self) -> &'static [&'static str] {
        Self::EVENTS
    }

    async fn on_init(&self, tx: &mut Tx) -> Result<(), ProjectionError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (
                height BIGINT NOT NULL,
                tx_index INTEGER NOT NULL,
                success BOOLEAN NOT NULL,
                log TEXT NOT NULL,
                message_count INTEGER NOT NULL,
                PRIMARY KEY (height, tx_index)
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
            let Some(transaction) = event.as_any().downcast_ref::<TransactionEvent>() else {
                return Err(ProjectionError::UnexpectedEvent {
                    projection_id: self.id(),
                    event_name: name,
                    height,
                });
            };
            self.insert_transaction(tx, height, transaction).await?;
        }
        Ok(())
    }
}

impl TransactionProjection {
    async fn insert_transaction(
        &self,
        tx: &mut Tx,
        height: Height,
        event: &TransactionEvent,
    ) -> Result<(), ProjectionError> {
        let payload = &event.payload;
        let sql = format!(
            "INSERT INTO {TABLE} (height, tx_index, success, log, message_count)
             VALUES ($1, $2, $3, $4, $5)"
        );
        sqlx::query(&sql)
            .bind(height)
            .bind(payload.tx_index as i32)
            .bind(payload.tx.success)
            .bind(&payload.tx.log)
            .bind(payload.tx.messages.len() as i32)
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
    fn subscribes_to_both_outcomes() {
        assert_eq!(
            TransactionProjection.events_to_listen(),
            &["TransactionCreated", "TransactionFailed"]
        );
    }
}
