//! Track-end monitor: confirms that a specific item stopped being active.
//!
//! ```text
//!   arm ──► Armed ──(coarse timer)──► Confirming ──(poll sees stop)──► Resolved
//!             │                           │
//!             └────────── cancel ─────────┴──────────────────────────► Cancelled
//! ```
//!
//! The coarse timer fires shortly before the expected end; confirmation then
//! polls the engine until the item is no longer the active one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use encore_proto::protocol::{Item, SessionKey};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::controller::Controller;
use crate::scheduler::TaskHandle;

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Armed,
    Confirming,
    Resolved,
    Cancelled,
}

/// Owns the coarse timer and the confirmation poll of one (session, item)
/// pair.  Clones share state.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    id: u64,
    item_id: String,
    task: TaskHandle,
    phase: Arc<Mutex<MonitorPhase>>,
}

impl MonitorHandle {
    fn new(item_id: String) -> Self {
        Self {
            id: NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed),
            item_id,
            task: TaskHandle::new(),
            phase: Arc::new(Mutex::new(MonitorPhase::Armed)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn phase(&self) -> MonitorPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase(), MonitorPhase::Armed | MonitorPhase::Confirming)
    }

    /// Stop the timer and poll loop.  No-op once resolved or cancelled.
    pub fn cancel(&self) {
        if self.transition(&[MonitorPhase::Armed, MonitorPhase::Confirming], MonitorPhase::Cancelled) {
            debug!("monitor {}: cancelled ({})", self.id, self.item_id);
        }
        self.task.cancel();
    }

    fn transition(&self, from: &[MonitorPhase], to: MonitorPhase) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if from.contains(&phase) {
            *phase = to;
            true
        } else {
            false
        }
    }
}

/// Cancel the session's current monitor and, if `item` has an identifier,
/// install a new one for it.
pub(crate) fn arm(ctrl: &Controller, key: &SessionKey, item: &Item) -> Option<MonitorHandle> {
    let Some(item_id) = item.id() else {
        ctrl.store().cancel_monitor(key);
        debug!("monitor: [{}] '{}' has no identifier, not monitored", key, item.title);
        return None;
    };

    let handle = MonitorHandle::new(item_id.to_owned());
    ctrl.store().install_monitor(key, handle.clone());

    let delay = ctrl.config().monitor_delay(item.duration_ms);
    debug!(
        "monitor {}: [{}] armed for '{}', confirming in {:?}",
        handle.id, key, item.title, delay
    );

    handle.task.spawn(watch(ctrl.clone(), key.clone(), item.clone(), handle.clone(), delay));
    Some(handle)
}

async fn watch(
    ctrl: Controller,
    key: SessionKey,
    item: Item,
    handle: MonitorHandle,
    delay: std::time::Duration,
) {
    tokio::time::sleep(delay).await;
    if !handle.transition(&[MonitorPhase::Armed], MonitorPhase::Confirming) {
        return;
    }
    debug!("monitor {}: [{}] confirming '{}'", handle.id, key, item.title);

    let period = ctrl.config().confirm_poll();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;

        let Some(state) = ctrl.engine().state(&key).await else {
            debug!("monitor {}: [{}] session gone", handle.id, key);
            handle.transition(&[MonitorPhase::Confirming], MonitorPhase::Resolved);
            ctrl.store().release_monitor(&key, handle.id);
            return;
        };

        if state.playing && state.current_id() == Some(handle.item_id()) {
            continue;
        }

        if !handle.transition(&[MonitorPhase::Confirming], MonitorPhase::Resolved) {
            return;
        }
        ctrl.store().release_monitor(&key, handle.id);
        info!("monitor {}: [{}] '{}' is no longer active", handle.id, key, item.title);

        if state.queue_len == 0 && ctrl.store().autoplay(&key) {
            // Detached: the autoplay attempt re-arms a monitor for its own
            // item, which must not abort this attempt halfway.
            ctrl.spawn_inferred_stop(key, item);
        }
        return;
    }
}
