//! Cancellable delayed and periodic tasks on the tokio clock.
//!
//! Everything runs on `tokio::time`, so tests drive it with a paused clock.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Cancellation handle for a scheduled task.  Cloning shares the token;
/// dropping does not cancel.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn `fut` bound to this handle: cancelling drops it at its next
    /// suspension point.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
    }
}

/// Run `fut` once after `delay` unless cancelled first.
pub fn after<F>(delay: Duration, fut: F) -> TaskHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = TaskHandle::new();
    handle.spawn(async move {
        tokio::time::sleep(delay).await;
        fut.await;
    });
    handle
}

/// Call `tick` every `period`, first call one period from now, until cancelled.
pub fn every<F, Fut>(period: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handle = TaskHandle::new();
    handle.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tick().await;
        }
    });
    handle
}
