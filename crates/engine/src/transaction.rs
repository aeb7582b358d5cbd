//! Closing a store transaction once a unit of work is done.

use db::StoreTx;
use tracing::warn;

use crate::EngineError;

/// Commit on success, roll back on failure.  The caller's error wins over a
/// failed rollback.
pub(crate) async fn finish<T>(
    tx: Box<dyn StoreTx>,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            discard(tx).await;
            Err(e)
        }
    }
}

/// Roll back, logging (not propagating) a rollback failure.
pub(crate) async fn discard(tx: Box<dyn StoreTx>) {
    if let Err(e) = tx.rollback().await {
        warn!("rolling back store transaction failed: {}", e);
    }
}
