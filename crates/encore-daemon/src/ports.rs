//! Collaborator interfaces the controller consumes.
//!
//! The controller never talks to mpv, yt-dlp or the network directly; it goes
//! through these traits so it can run against fakes in tests.

use async_trait::async_trait;
use encore_proto::protocol::{Candidate, FilterSet, Item, SessionKey, StopReason};

use crate::error::{EngineError, ProviderError};

/// Point-in-time view of one engine session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerState {
    pub current: Option<Item>,
    /// The item that was active before `current`.
    pub previous: Option<Item>,
    /// An item is loaded and active (paused or not).
    pub playing: bool,
    pub paused: bool,
    /// An item was displaced by an overlay and waits for `resume`.
    pub suspended: bool,
    pub queue_len: usize,
    pub position_ms: u64,
    pub volume: u32,
}

impl PlayerState {
    /// Audible right now: active and not paused.
    pub fn audible(&self) -> bool {
        self.playing && !self.paused
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().and_then(Item::id)
    }
}

/// Unsolicited notifications from the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TrackStarted {
        session: SessionKey,
        item: Item,
    },
    TrackEnded {
        session: SessionKey,
        item: Item,
        reason: StopReason,
    },
    /// The session's backend died.  Not sent for `destroy`, nor by a backend
    /// that was already replaced under the same key.
    SessionClosed { session: SessionKey },
}

/// Queue storage and playback.  The engine never advances the queue on its
/// own when an item ends; that decision belongs to stop resolution.
///
/// Every method addressing a session returns `None` /
/// [`EngineError::StaleSession`] once the engine no longer knows it.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    async fn create_session(&self, key: &SessionKey, voice_target: &str)
        -> Result<(), EngineError>;

    /// Keys of every live session, whether or not the controller has seen it.
    async fn sessions(&self) -> Vec<SessionKey>;

    async fn state(&self, key: &SessionKey) -> Option<PlayerState>;

    /// Items waiting behind the current one, front first.
    async fn queue(&self, key: &SessionKey) -> Option<Vec<Item>>;

    async fn enqueue(&self, key: &SessionKey, item: Item, at_front: bool)
        -> Result<(), EngineError>;

    async fn clear_queue(&self, key: &SessionKey) -> Result<(), EngineError>;

    /// Start the item at the front of the queue, replacing the current one.
    /// A paused current item is kept aside for `resume`.  No-op when the
    /// queue is empty.
    async fn play(&self, key: &SessionKey) -> Result<(), EngineError>;

    async fn pause(&self, key: &SessionKey) -> Result<(), EngineError>;

    /// Unpause.  An item displaced while paused comes back at the position
    /// it was left at: right away when nothing else is active, otherwise as
    /// the front of the queue.
    async fn resume(&self, key: &SessionKey) -> Result<(), EngineError>;

    /// End the current item and start the next queued one, if any.
    /// Returns the item that was started.
    async fn skip(&self, key: &SessionKey) -> Result<Option<Item>, EngineError>;

    async fn destroy(&self, key: &SessionKey) -> Result<(), EngineError>;

    async fn set_volume(&self, key: &SessionKey, percent: u32) -> Result<(), EngineError>;

    async fn set_filters(&self, key: &SessionKey, filters: &FilterSet)
        -> Result<(), EngineError>;
}

/// Ranked follow-up candidates for a seed.  "No results" is `Ok(vec![])`.
#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    async fn recommend(&self, seed_identifier: &str, cap: usize)
        -> Result<Vec<Candidate>, ProviderError>;
}

#[async_trait]
pub trait SearchResolveProvider: Send + Sync {
    /// Turn a URL or free-text query into playable items (possibly none).
    async fn resolve(&self, locator_or_query: &str) -> Result<Vec<Item>, ProviderError>;

    /// Plain text search returning candidates to be resolved separately.
    async fn search_text(&self, _query: &str) -> Result<Vec<Candidate>, ProviderError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechOptions {
    pub lang: String,
    pub slow: bool,
}

#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Locator of a playable rendering of `text`.
    async fn synthesize(&self, text: &str, options: &SpeechOptions)
        -> Result<String, ProviderError>;
}

/// Fire-and-forget session messages; callers only log failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, key: &SessionKey, message: &str) -> Result<(), ProviderError>;
}
