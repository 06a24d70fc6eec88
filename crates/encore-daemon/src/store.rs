//! Per-session controller state.
//!
//! One entry per session key, created lazily on first reference.  All
//! accessors are synchronous and take the map lock only for the duration of
//! the access, never across an await.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use encore_proto::protocol::{LoopMode, SessionKey};
use tokio::time::Instant;

use crate::monitor::MonitorHandle;
use crate::ports::PlayerState;

/// What the global poller saw the last time it looked at a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub current_id: Option<String>,
    pub playing: bool,
    pub queue_len: usize,
    pub position_ms: u64,
    pub observed_at: Instant,
}

impl Snapshot {
    pub fn observe(state: &PlayerState) -> Self {
        Self {
            current_id: state.current_id().map(str::to_owned),
            playing: state.playing,
            queue_len: state.queue_len,
            position_ms: state.position_ms,
            observed_at: Instant::now(),
        }
    }
}

/// Bounded FIFO of autoplayed item ids.  Oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct AutoplayHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl AutoplayHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, id: String) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub loop_mode: LoopMode,
    pub autoplay: bool,
    pub tts: bool,
    pub lofi: bool,
    /// Held for the whole autoplay attempt plus its cooldown.
    pub autoplay_in_progress: bool,
    pub last_snapshot: Option<Snapshot>,
    pub history: AutoplayHistory,
    pub monitor: Option<MonitorHandle>,
}

impl Session {
    fn new(history_capacity: usize) -> Self {
        Self {
            loop_mode: LoopMode::Off,
            autoplay: false,
            tts: false,
            lofi: false,
            autoplay_in_progress: false,
            last_snapshot: None,
            history: AutoplayHistory::with_capacity(history_capacity),
            monitor: None,
        }
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<SessionKey, Session>>,
    history_capacity: usize,
}

impl SessionStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with<R>(&self, key: &SessionKey, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut map = self.lock();
        let session = map
            .entry(key.clone())
            .or_insert_with(|| Session::new(self.history_capacity));
        f(session)
    }

    /// Copy of the session, creating a default entry if absent.
    pub fn get(&self, key: &SessionKey) -> Session {
        self.with(key, |s| s.clone())
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.lock().keys().cloned().collect()
    }

    pub fn loop_mode(&self, key: &SessionKey) -> LoopMode {
        self.with(key, |s| s.loop_mode)
    }

    pub fn set_loop_mode(&self, key: &SessionKey, mode: LoopMode) {
        self.with(key, |s| s.loop_mode = mode);
    }

    pub fn autoplay(&self, key: &SessionKey) -> bool {
        self.with(key, |s| s.autoplay)
    }

    pub fn set_autoplay(&self, key: &SessionKey, enabled: bool) {
        self.with(key, |s| s.autoplay = enabled);
    }

    pub fn tts(&self, key: &SessionKey) -> bool {
        self.with(key, |s| s.tts)
    }

    pub fn set_tts(&self, key: &SessionKey, enabled: bool) {
        self.with(key, |s| s.tts = enabled);
    }

    pub fn lofi(&self, key: &SessionKey) -> bool {
        self.with(key, |s| s.lofi)
    }

    pub fn set_lofi(&self, key: &SessionKey, enabled: bool) {
        self.with(key, |s| s.lofi = enabled);
    }

    // ── autoplay guard ────────────────────────────────────────────────────────

    /// Check-and-set of the autoplay guard under a single lock acquisition.
    /// Returns false when an attempt is already in progress.
    pub fn try_begin_autoplay(&self, key: &SessionKey) -> bool {
        self.with(key, |s| {
            if s.autoplay_in_progress {
                false
            } else {
                s.autoplay_in_progress = true;
                true
            }
        })
    }

    pub fn end_autoplay(&self, key: &SessionKey) {
        self.with(key, |s| s.autoplay_in_progress = false);
    }

    pub fn autoplay_in_progress(&self, key: &SessionKey) -> bool {
        self.with(key, |s| s.autoplay_in_progress)
    }

    pub fn record_autoplay(&self, key: &SessionKey, id: String) {
        self.with(key, |s| s.history.push(id));
    }

    pub fn history(&self, key: &SessionKey) -> Vec<String> {
        self.with(key, |s| s.history.iter().cloned().collect())
    }

    // ── poller snapshot ───────────────────────────────────────────────────────

    /// Store `snapshot` and return the one it replaced.
    pub fn replace_snapshot(&self, key: &SessionKey, snapshot: Snapshot) -> Option<Snapshot> {
        self.with(key, |s| s.last_snapshot.replace(snapshot))
    }

    // ── monitor slot ──────────────────────────────────────────────────────────

    /// Install `handle` as the session's monitor, cancelling any previous one
    /// first.  This is the only way a monitor enters the store.
    pub fn install_monitor(&self, key: &SessionKey, handle: MonitorHandle) {
        self.with(key, |s| {
            if let Some(old) = s.monitor.take() {
                old.cancel();
            }
            s.monitor = Some(handle);
        });
    }

    /// Cancel and drop the session's monitor.  Returns whether one was armed.
    pub fn cancel_monitor(&self, key: &SessionKey) -> bool {
        self.with(key, |s| match s.monitor.take() {
            Some(old) => {
                old.cancel();
                true
            }
            None => false,
        })
    }

    /// Cancel the session's monitor only if it watches `item_id`.
    pub fn cancel_monitor_for(&self, key: &SessionKey, item_id: &str) -> bool {
        self.with(key, |s| {
            if s.monitor.as_ref().map(MonitorHandle::item_id) != Some(item_id) {
                return false;
            }
            if let Some(old) = s.monitor.take() {
                old.cancel();
            }
            true
        })
    }

    /// Drop the monitor slot if it still holds the handle with `monitor_id`.
    pub fn release_monitor(&self, key: &SessionKey, monitor_id: u64) {
        self.with(key, |s| {
            if s.monitor.as_ref().map(MonitorHandle::id) == Some(monitor_id) {
                s.monitor = None;
            }
        });
    }

    pub fn monitor(&self, key: &SessionKey) -> Option<MonitorHandle> {
        self.with(key, |s| s.monitor.clone())
    }

    /// Back to defaults after the engine tore the session down.
    pub fn reset(&self, key: &SessionKey) {
        self.with(key, |s| {
            if let Some(old) = s.monitor.take() {
                old.cancel();
            }
            *s = Session::new(self.history_capacity);
        });
    }
}
