use std::time::Duration;

use {futures::future::BoxFuture, tokio::task::AbortHandle};

/// Cancels a scheduled task. Dropping the handle leaves the task running.
#[derive(Debug)]
pub struct TimerHandle(AbortHandle);

impl TimerHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }
}

/// Runs futures after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle;
}

/// Schedules on the tokio runtime; follows a paused tokio clock in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });
        TimerHandle(handle.abort_handle())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        std::sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        TokioScheduler.schedule(
            Duration::from_secs(5),
            Box::pin(async move { flag.store(true, Ordering::SeqCst) }),
        );

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_runs() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = TokioScheduler.schedule(
            Duration::from_secs(1),
            Box::pin(async move { flag.store(true, Ordering::SeqCst) }),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
