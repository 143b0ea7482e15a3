use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use hlb_core::{cursor::UpdateCursor, platform::PlatformApi, Result};

use crate::dispatcher::{DispatchOutcome, Dispatcher};

/// Fetch one batch with `getUpdates` and dispatch it in order.
///
/// Updates at or below the cursor (as read before the batch) were already
/// handled and are skipped. The cursor is advanced right after each update
/// is dispatched, whatever its outcome. Returns the fetched batch.
pub async fn poll_once(
    api: &dyn PlatformApi,
    dispatcher: &Arc<Dispatcher>,
    cursor: &UpdateCursor,
) -> Result<Vec<Value>> {
    let start = cursor.read()?;
    let offset = (start > 0).then(|| start + 1);
    let batch = api.get_updates(offset).await?;

    for update in &batch {
        let update_id = update.get("update_id").and_then(Value::as_i64);
        if update_id.is_some_and(|id| id <= start) {
            tracing::debug!(update_id, cursor = start, "skipping already processed update");
            continue;
        }

        let outcome = dispatcher.dispatch(update.clone()).await;
        match outcome {
            DispatchOutcome::Completed(_) | DispatchOutcome::SelfLoop => {
                tracing::trace!(update_id, ?outcome, "update done")
            }
            DispatchOutcome::Malformed | DispatchOutcome::Failed(_) => {
                tracing::warn!(update_id, ?outcome, "update not handled cleanly")
            }
        }

        if let Some(id) = update_id {
            cursor.advance(id)?;
        }
    }

    Ok(batch)
}

/// Long-running pull loop; returns once `shutdown` is cancelled.
pub async fn run_polling(
    dispatcher: Arc<Dispatcher>,
    cursor: Arc<UpdateCursor>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let ctx = dispatcher.context().clone();
    let api = ctx.api.clone();

    match api.call("getMe", serde_json::json!({})).await {
        Ok(me) => {
            let username = me.get("username").and_then(Value::as_str).unwrap_or("?");
            tracing::info!(username, "hlb started");
        }
        Err(e) => tracing::warn!("getMe failed: {e}"),
    }
    let start = cursor.read()?;
    tracing::info!(
        cursor = start,
        cursor_file = %cursor.path().display(),
        diagnostics = %dispatcher.recorder().dir().display(),
        "polling for updates"
    );

    loop {
        let idle = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = poll_once(api.as_ref(), &dispatcher, &cursor) => match result {
                Ok(batch) => batch.is_empty(),
                Err(e) => {
                    tracing::error!("polling failed: {e}");
                    true
                }
            },
        };

        if idle {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(ctx.cfg.poll_interval) => {}
            }
        }
    }

    tracing::info!("polling stopped");
    Ok(())
}
