//! Loop mode decisions.
//!
//! `decide` is pure; `apply` carries the decision out against the engine.

use encore_proto::protocol::{Item, LoopMode, SessionKey, StopReason};
use tracing::debug;

use crate::error::Result;
use crate::ports::AudioEngine;

/// What to do with the queue after an item stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Put the finished item back at the front and play it again.
    ReplayTrack,
    /// Re-append the whole pending queue in its current order and resume.
    RequeueAll,
    /// No loop action; the caller advances or autoplays.
    PassThrough,
    /// Not a natural finish.
    Ignore,
}

pub fn decide(mode: LoopMode, reason: StopReason, queue_len: usize) -> LoopAction {
    if reason != StopReason::Finished {
        return LoopAction::Ignore;
    }
    match mode {
        LoopMode::Track => LoopAction::ReplayTrack,
        LoopMode::Queue if queue_len > 0 => LoopAction::RequeueAll,
        LoopMode::Queue | LoopMode::Off => LoopAction::PassThrough,
    }
}

/// Carry out a requeue action.  Returns false for `PassThrough`/`Ignore`,
/// which leave the queue untouched.
pub(crate) async fn apply(
    engine: &dyn AudioEngine,
    key: &SessionKey,
    action: LoopAction,
    finished: &Item,
) -> Result<bool> {
    match action {
        LoopAction::ReplayTrack => {
            debug!("loop: [{}] replaying '{}'", key, finished.title);
            engine.enqueue(key, finished.clone(), true).await?;
            engine.play(key).await?;
            Ok(true)
        }
        LoopAction::RequeueAll => {
            let pending = engine.queue(key).await.unwrap_or_default();
            debug!("loop: [{}] requeueing {} items", key, pending.len());
            engine.clear_queue(key).await?;
            for item in pending {
                engine.enqueue(key, item, false).await?;
            }
            engine.play(key).await?;
            Ok(true)
        }
        LoopAction::PassThrough | LoopAction::Ignore => Ok(false),
    }
}
