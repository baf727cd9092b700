use std::sync::Arc;

use {async_trait::async_trait, parley_channels::Context, tracing::warn};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, histogram, labels};

use crate::{
    action::{self, ActionRef, Props},
    batch::Batch,
    error_sink::Lane,
};

/// Per-context middleware run before the handler.
#[async_trait]
pub trait Plugin<C>: Send + Sync {
    async fn apply(&self, context: &mut C) -> anyhow::Result<()>;
}

/// The registered event handler plus its optional error handler.
pub struct Handlers<C> {
    pub on_event: ActionRef<C>,
    pub on_error: Option<ActionRef<C>>,
}

impl<C: Context> Handlers<C> {
    /// Run the handler over `batch`, falling back to the error handler.
    ///
    /// Every context's `handler_did_end` runs only when the event handler
    /// itself succeeds, not after a recovery. An unrecovered error is
    /// recorded on every context before it is returned.
    pub async fn invoke(&self, batch: &mut Batch<C>, lane: Lane) -> anyhow::Result<()> {
        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::HANDLER_RUNS_TOTAL, labels::LANE => lane.as_str()).increment(1);

        let outcome = match action::run(Arc::clone(&self.on_event), batch, Props::default()).await
        {
            Ok(_) => end_handling(batch).await,
            Err(err) => match &self.on_error {
                Some(on_error) => {
                    warn!(
                        session_id = ?batch.last().session_id(),
                        lane = lane.as_str(),
                        error = %err,
                        "handler failed, running error handler"
                    );
                    action::run(Arc::clone(on_error), batch, Props::with_error(err))
                        .await
                        .map(|_| ())
                },
                None => Err(err),
            },
        };

        #[cfg(feature = "metrics")]
        histogram!(dispatch_metrics::HANDLER_DURATION_SECONDS, labels::LANE => lane.as_str())
            .record(start.elapsed().as_secs_f64());

        if let Err(err) = &outcome {
            #[cfg(feature = "metrics")]
            counter!(dispatch_metrics::HANDLER_ERRORS_TOTAL, labels::LANE => lane.as_str())
                .increment(1);

            for context in batch.iter_mut() {
                context.emit_error(err);
            }
        }
        outcome
    }
}

async fn end_handling<C: Context>(batch: &mut Batch<C>) -> anyhow::Result<()> {
    for context in batch.iter_mut() {
        context.handler_did_end().await?;
    }
    Ok(())
}
