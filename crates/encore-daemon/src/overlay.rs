//! Speech overlay: duck the current track, play a synthesized clip in front
//! of the queue, bring the track back once the clip should be over.

use std::time::Duration;

use encore_proto::config::TtsConfig;
use encore_proto::protocol::{ItemKind, SessionKey};
use tracing::{debug, info};

use crate::controller::Controller;
use crate::error::{ControllerError, Result};
use crate::ports::SpeechOptions;
use crate::scheduler;

/// How long `text` takes to say, by word count.  Not derived from the
/// synthesized audio.
pub fn estimate_duration(text: &str, tts: &TtsConfig) -> Duration {
    let words = text.split_whitespace().count() as u64;
    Duration::from_millis(tts.min_duration_ms.max(words * tts.ms_per_word))
}

/// Returns the scheduled resume delay, or `None` when the session is gone.
pub(crate) async fn speak(ctrl: &Controller, key: &SessionKey, text: &str) -> Result<Option<Duration>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ControllerError::EmptyText);
    }
    if !ctrl.store().tts(key) {
        return Err(ControllerError::TtsDisabled);
    }

    let options = SpeechOptions {
        lang: ctrl.tts_config().lang.clone(),
        slow: ctrl.tts_config().slow,
    };
    let locator = ctrl.synthesizer().synthesize(text, &options).await?;
    let mut item = ctrl
        .resolver()
        .resolve(&locator)
        .await?
        .into_iter()
        .next()
        .ok_or(ControllerError::NoPlayableResult)?;
    item.kind = ItemKind::Speech;

    let engine = ctrl.engine();
    let Some(state) = engine.state(key).await else {
        debug!("overlay: [{}] session gone before playback", key);
        return Ok(None);
    };

    // A paused track counts as playing: the clip displaces it either way
    // and only the resume brings it back.
    let was_playing = state.playing;
    if state.audible() {
        engine.pause(key).await?;
    }
    engine.enqueue(key, item, true).await?;
    engine.play(key).await?;

    let estimate = estimate_duration(text, ctrl.tts_config());
    info!("overlay: [{}] speaking for ~{:?} (resume: {})", key, estimate, was_playing);

    if was_playing {
        let engine = engine.clone();
        let resume_key = key.clone();
        scheduler::after(estimate, async move {
            if let Err(e) = engine.resume(&resume_key).await {
                debug!("overlay: [{}] resume skipped: {}", resume_key, e);
            }
        });
    }
    Ok(Some(estimate))
}
