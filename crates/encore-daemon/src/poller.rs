//! Global session poller: the safety net for stops no monitor saw.

use tracing::debug;

use crate::controller::Controller;
use crate::scheduler::{self, TaskHandle};
use crate::store::Snapshot;

/// Start polling every live session on the configured period.
pub(crate) fn spawn(ctrl: Controller) -> TaskHandle {
    let period = ctrl.config().global_poll();
    debug!("poller: every {:?}", period);
    scheduler::every(period, move || {
        let ctrl = ctrl.clone();
        async move { tick(&ctrl).await }
    })
}

/// One pass over every session the engine knows.
pub async fn tick(ctrl: &Controller) {
    for key in ctrl.engine().sessions().await {
        let Some(state) = ctrl.engine().state(&key).await else {
            continue;
        };

        let previous = ctrl.store().replace_snapshot(&key, Snapshot::observe(&state));
        let was_playing = previous.as_ref().is_some_and(|s| s.playing);
        if !was_playing || state.playing || state.queue_len > 0 {
            continue;
        }
        if !ctrl.store().autoplay(&key) {
            continue;
        }

        match state.previous.or(state.current) {
            Some(seed) => {
                debug!("poller: [{}] playback stopped, seeding from '{}'", key, seed.title);
                ctrl.spawn_inferred_stop(key, seed);
            }
            None => debug!("poller: [{}] playback stopped with no known item", key),
        }
    }
}
