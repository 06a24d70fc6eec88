//! Session state controller: the surface the dispatcher and the daemon loop
//! talk to, and the single Stop Resolution path both stop detectors feed.

use std::sync::Arc;
use std::time::Duration;

use encore_proto::config::{ControllerConfig, TtsConfig};
use encore_proto::protocol::{FilterSet, Item, LoopMode, SessionKey, StopReason};
use tracing::{debug, info, warn};

use crate::autoplay::{self, AutoplayOutcome};
use crate::error::Result;
use crate::looping::{self, LoopAction};
use crate::monitor::{self, MonitorHandle};
use crate::overlay;
use crate::poller;
use crate::ports::{AudioEngine, Notifier, RecommendationProvider, SearchResolveProvider, SynthesisProvider};
use crate::scheduler::TaskHandle;
use crate::store::SessionStore;

/// The external collaborators a controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn AudioEngine>,
    pub recommender: Arc<dyn RecommendationProvider>,
    pub resolver: Arc<dyn SearchResolveProvider>,
    pub synthesizer: Arc<dyn SynthesisProvider>,
    pub notifier: Arc<dyn Notifier>,
}

struct Inner {
    store: Arc<SessionStore>,
    collab: Collaborators,
    config: ControllerConfig,
    tts: TtsConfig,
}

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(collab: Collaborators, config: ControllerConfig, tts: TtsConfig) -> Self {
        let store = Arc::new(SessionStore::new(config.history_capacity));
        Self {
            inner: Arc::new(Inner {
                store,
                collab,
                config,
                tts,
            }),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.inner.store
    }

    pub fn engine(&self) -> &Arc<dyn AudioEngine> {
        &self.inner.collab.engine
    }

    pub fn recommender(&self) -> &Arc<dyn RecommendationProvider> {
        &self.inner.collab.recommender
    }

    pub fn resolver(&self) -> &Arc<dyn SearchResolveProvider> {
        &self.inner.collab.resolver
    }

    pub fn synthesizer(&self) -> &Arc<dyn SynthesisProvider> {
        &self.inner.collab.synthesizer
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn tts_config(&self) -> &TtsConfig {
        &self.inner.tts
    }

    // ── flags ─────────────────────────────────────────────────────────────────

    pub fn set_loop_mode(&self, key: &SessionKey, mode: LoopMode) {
        info!("[{}] loop mode -> {}", key, mode);
        self.store().set_loop_mode(key, mode);
    }

    pub fn loop_mode(&self, key: &SessionKey) -> LoopMode {
        self.store().loop_mode(key)
    }

    pub fn set_autoplay(&self, key: &SessionKey, enabled: bool) {
        info!("[{}] autoplay -> {}", key, enabled);
        self.store().set_autoplay(key, enabled);
    }

    pub fn autoplay(&self, key: &SessionKey) -> bool {
        self.store().autoplay(key)
    }

    /// Flip autoplay and return the new value.
    pub fn toggle_autoplay(&self, key: &SessionKey) -> bool {
        let enabled = !self.autoplay(key);
        self.set_autoplay(key, enabled);
        enabled
    }

    pub fn set_tts(&self, key: &SessionKey, enabled: bool) {
        info!("[{}] tts -> {}", key, enabled);
        self.store().set_tts(key, enabled);
    }

    pub fn tts(&self, key: &SessionKey) -> bool {
        self.store().tts(key)
    }

    pub async fn set_lofi(&self, key: &SessionKey, enabled: bool) -> Result<()> {
        let filters = if enabled { FilterSet::lofi() } else { FilterSet::default() };
        self.engine().set_filters(key, &filters).await?;
        self.store().set_lofi(key, enabled);
        info!("[{}] lofi -> {}", key, enabled);
        Ok(())
    }

    pub fn lofi(&self, key: &SessionKey) -> bool {
        self.store().lofi(key)
    }

    /// Play `text` as an overlay.  Returns how long until the ducked track
    /// resumes, or `None` when the session disappeared.
    pub async fn speak(&self, key: &SessionKey, text: &str) -> Result<Option<Duration>> {
        overlay::speak(self, key, text).await
    }

    // ── playback notifications ────────────────────────────────────────────────

    /// An item became active: watch it.  Speech overlays are not watched.
    pub fn on_track_started(&self, key: &SessionKey, item: &Item) -> Option<MonitorHandle> {
        if item.is_speech() {
            self.store().cancel_monitor(key);
            return None;
        }
        monitor::arm(self, key, item)
    }

    pub fn on_explicit_stop(&self, key: &SessionKey) {
        if self.store().cancel_monitor(key) {
            debug!("[{}] monitor cancelled by stop", key);
        }
    }

    pub fn on_explicit_skip(&self, key: &SessionKey) {
        if self.store().cancel_monitor(key) {
            debug!("[{}] monitor cancelled by skip", key);
        }
    }

    /// The engine tore the session down.
    pub fn session_closed(&self, key: &SessionKey) {
        info!("[{}] session closed", key);
        self.store().reset(key);
    }

    // ── stop resolution ───────────────────────────────────────────────────────

    /// Stop reported by the engine.
    pub async fn on_track_ended(&self, key: &SessionKey, item: &Item, reason: StopReason) {
        if let Some(id) = item.id() {
            self.store().cancel_monitor_for(key, id);
        }
        if reason != StopReason::Finished {
            debug!("[{}] '{}' ended ({:?}), no continuation", key, item.title, reason);
            return;
        }

        let engine = self.engine();
        let Some(state) = engine.state(key).await else {
            debug!("[{}] stop for a session that is gone", key);
            return;
        };

        if item.is_speech() {
            if !state.suspended && state.queue_len > 0 {
                self.advance(key).await;
            }
            return;
        }

        let action = looping::decide(self.loop_mode(key), reason, state.queue_len);
        match looping::apply(engine.as_ref(), key, action, item).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!("[{}] loop action {:?} failed: {}", key, action, e);
                return;
            }
        }

        if state.queue_len > 0 {
            self.advance(key).await;
        } else if self.autoplay(key) {
            self.trigger_autoplay(key, item).await;
        }
    }

    /// Stop inferred by a monitor or the poller.  Only a pass-through loop
    /// decision with an empty queue continues, and only into autoplay.
    pub async fn resolve_inferred_stop(&self, key: &SessionKey, seed: &Item) {
        if seed.is_speech() {
            return;
        }
        let Some(state) = self.engine().state(key).await else {
            debug!("[{}] inferred stop for a session that is gone", key);
            return;
        };
        let action = looping::decide(self.loop_mode(key), StopReason::Finished, state.queue_len);
        if action != LoopAction::PassThrough || state.queue_len > 0 || !self.autoplay(key) {
            return;
        }
        self.trigger_autoplay(key, seed).await;
    }

    pub(crate) fn spawn_inferred_stop(&self, key: SessionKey, seed: Item) {
        let ctrl = self.clone();
        tokio::spawn(async move { ctrl.resolve_inferred_stop(&key, &seed).await });
    }

    pub async fn trigger_autoplay(&self, key: &SessionKey, seed: &Item) -> AutoplayOutcome {
        autoplay::trigger(self, key, seed).await
    }

    async fn advance(&self, key: &SessionKey) {
        if let Err(e) = self.engine().play(key).await {
            warn!("[{}] could not advance the queue: {}", key, e);
        }
    }

    // ── misc ──────────────────────────────────────────────────────────────────

    pub fn start_poller(&self) -> TaskHandle {
        poller::spawn(self.clone())
    }

    /// Fire-and-forget session message.
    pub async fn notify(&self, key: &SessionKey, message: &str) {
        if let Err(e) = self.inner.collab.notifier.send(key, message).await {
            warn!("[{}] notification failed: {}", key, e);
        }
    }
}
