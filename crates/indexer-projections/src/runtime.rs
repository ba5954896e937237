//! Drives one projection forward: read its cursor and the store's
//! watermark, replay the gap between them in bounded batches, and persist
//! progress one height at a time so a crash mid-batch only ever loses the
//! height that was in flight.

use indexer_rdb::RdbPool;
use indexer_store::EventStore;
use indexer_types::Height;

use crate::{cursor, Projection, ProjectionError};

/// Result of one call to [`run_projection_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// The height the projection's cursor now sits at, if anything was
    /// committed this call. `None` means the projection was already caught
    /// up to the store's watermark.
    pub advanced_to: Option<Height>,
}

/// Idempotent one-time setup for `projection`: create its view tables and
/// the shared cursor table. Call once before the first
/// [`run_projection_once`].
pub async fn init_projection(pool: &RdbPool, projection: &dyn Projection) -> Result<(), ProjectionError> {
    let mut tx = pool.begin().await?;
    cursor::ensure_cursor_table(&mut tx).await?;
    projection.on_init(&mut tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Advance `projection` by at most `batch_limit` heights towards the
/// store's current watermark. Each height commits its own transaction
/// (view writes plus the cursor advance) independently, so a failure partway
/// through the batch still leaves every height before it durably applied.
pub async fn run_projection_once(
    pool: &RdbPool,
    store: &EventStore,
    projection: &dyn Projection,
    batch_limit: Height,
) -> Result<RunOutcome, ProjectionError> {
    let mut scratch = pool.begin().await?;
    let cursor_height = cursor::get_cursor(&mut scratch, projection.id()).await?.unwrap_or(0);
    let watermark = store.latest_height(&mut scratch).await?.unwrap_or(0);
    scratch.rollback().await?;

    let Some(target) = next_target(cursor_height, watermark, batch_limit) else {
        return Ok(RunOutcome { advanced_to: None });
    };

    let mut last_committed = None;
    for height in (cursor_height + 1)..=target {
        let mut tx = pool.begin().await?;
        let events = store.get_all_by_height(&mut tx, height).await?;
        let subscribed: Vec<_> = events
            .into_iter()
            .filter(|event| {
                let name = event.name();
                projection.events_to_listen().iter().any(|&n| n == name)
            })
            .collect();

        projection.handle_events(&mut tx, height, &subscribed).await?;
        cursor::set_cursor(&mut tx, projection.id(), height).await?;
        tx.commit().await?;
        last_committed = Some(height);
    }

    Ok(RunOutcome {
        advanced_to: last_committed,
    })
}

/// The next height this projection should catch up to, or `None` if it is
/// already at (or past) the watermark.
fn next_target(cursor_height: Height, watermark: Height, batch_limit: Height) -> Option<Height> {
    if watermark <= cursor_height {
        return None;
    }
    Some((cursor_height + batch_limit).min(watermark))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caught_up_projection_has_no_target() {
        assert_eq!(next_target(100, 100, 50), None);
        assert_eq!(next_target(100, 80, 50), None);
    }

    #[test]
    fn batch_window_is_capped_by_limit() {
        assert_eq!(next_target(0, 10_000, 50), Some(50));
    }

    #[test]
    fn batch_window_stops_at_watermark_when_closer_than_limit() {
        assert_eq!(next_target(90, 100, 50), Some(100));
    }
}
