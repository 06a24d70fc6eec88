//! Autoplay: pick a follow-up item for a session whose queue ran dry.
//!
//! One attempt per guard window.  The guard is taken before the first
//! provider call and released only after the cooldown, whatever the outcome.

use encore_proto::protocol::{Item, SessionKey};
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::error::{ControllerError, Result};
use crate::monitor;
use crate::scheduler;

#[derive(Debug)]
pub enum AutoplayOutcome {
    Enqueued(Item),
    /// Another attempt holds the guard; nothing was done.
    Busy,
    /// The seed has no identifier; nothing was done.
    NoSeed,
    /// The attempt ran and gave up.  The guard is still released on cooldown.
    Abandoned(ControllerError),
}

impl AutoplayOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, AutoplayOutcome::Enqueued(_))
    }
}

pub(crate) async fn trigger(ctrl: &Controller, key: &SessionKey, seed: &Item) -> AutoplayOutcome {
    let Some(seed_id) = seed.id() else {
        debug!("autoplay: [{}] seed '{}' has no identifier", key, seed.title);
        return AutoplayOutcome::NoSeed;
    };
    if !ctrl.store().try_begin_autoplay(key) {
        debug!("autoplay: [{}] {}", key, ControllerError::GuardBusy);
        return AutoplayOutcome::Busy;
    }

    info!("autoplay: [{}] seeding from '{}' ({})", key, seed.title, seed_id);
    let outcome = match attempt(ctrl, key, seed_id).await {
        Ok(item) => AutoplayOutcome::Enqueued(item),
        Err(ControllerError::StaleSession(_)) => {
            debug!("autoplay: [{}] session went away mid-attempt", key);
            AutoplayOutcome::Abandoned(ControllerError::StaleSession(key.clone()))
        }
        Err(e) => {
            warn!("autoplay: [{}] {}", key, e);
            AutoplayOutcome::Abandoned(e)
        }
    };

    let store = ctrl.store().clone();
    let release_key = key.clone();
    scheduler::after(ctrl.config().autoplay_cooldown(), async move {
        store.end_autoplay(&release_key);
        debug!("autoplay: [{}] guard released", release_key);
    });

    outcome
}

async fn attempt(ctrl: &Controller, key: &SessionKey, seed_id: &str) -> Result<Item> {
    let candidates = ctrl
        .recommender()
        .recommend(seed_id, ctrl.config().recommendation_cap)
        .await?;
    if candidates.is_empty() {
        return Err(ControllerError::NoCandidates);
    }

    let mut chosen = None;
    for candidate in &candidates {
        match ctrl.resolver().resolve(&candidate.locator).await {
            Ok(items) => {
                if let Some(item) = items.into_iter().next() {
                    chosen = Some(item);
                    break;
                }
                debug!("autoplay: [{}] '{}' resolved to nothing", key, candidate.title);
            }
            Err(e) => warn!("autoplay: [{}] could not resolve '{}': {}", key, candidate.title, e),
        }
    }
    let item = chosen.ok_or(ControllerError::NoPlayableResult)?;

    let engine = ctrl.engine();
    engine.enqueue(key, item.clone(), false).await?;
    let state = engine
        .state(key)
        .await
        .ok_or_else(|| ControllerError::StaleSession(key.clone()))?;
    if !state.playing {
        engine.play(key).await?;
    }

    monitor::arm(ctrl, key, &item);
    if let Some(id) = item.id() {
        ctrl.store().record_autoplay(key, id.to_owned());
    }
    info!("autoplay: [{}] enqueued '{}'", key, item.title);
    ctrl.notify(key, &format!("Now autoplaying: {}", item.title)).await;

    Ok(item)
}
