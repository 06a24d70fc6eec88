//! In-memory collaborators for driving the controller under a paused clock.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use encore_daemon::controller::{Collaborators, Controller};
use encore_daemon::error::{EngineError, ProviderError};
use encore_daemon::ports::{
    AudioEngine, Notifier, PlayerState, RecommendationProvider, SearchResolveProvider,
    SpeechOptions, SynthesisProvider,
};
use encore_proto::config::{ControllerConfig, TtsConfig};
use encore_proto::protocol::{Candidate, FilterSet, Item, ItemKind, SessionKey};
use tokio::time::Instant;

pub fn key(s: &str) -> SessionKey {
    s.to_string()
}

pub fn track(id: &str, duration_ms: u64) -> Item {
    Item {
        identifier: Some(id.to_string()),
        title: id.to_uppercase(),
        locator: format!("fake://{id}"),
        duration_ms: Some(duration_ms),
        kind: ItemKind::Track,
    }
}

pub fn candidate(id: &str) -> Candidate {
    Candidate {
        title: id.to_uppercase(),
        identifier: id.to_string(),
        locator: format!("fake://{id}"),
    }
}

/// Let spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock by `ms` and let woken tasks run.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}

// ── engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct FakeSession {
    pub current: Option<Item>,
    pub previous: Option<Item>,
    pub queue: VecDeque<Item>,
    pub playing: bool,
    pub paused: bool,
    pub suspended: Option<Item>,
    pub position_ms: u64,
    pub volume: u32,
    pub filters: FilterSet,
}

/// Queue engine that never advances by itself.  Every mutating call is
/// logged with the (paused) time it happened at.
#[derive(Default)]
pub struct FakeEngine {
    sessions: Mutex<HashMap<SessionKey, FakeSession>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeEngine {
    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push((call.into(), Instant::now()));
    }

    pub fn add_session(&self, key: &SessionKey) {
        self.sessions.lock().unwrap().insert(
            key.clone(),
            FakeSession {
                volume: 100,
                ..Default::default()
            },
        );
    }

    /// Session with `current` playing and `queue` behind it.
    pub fn add_playing(&self, key: &SessionKey, current: Item, queue: &[Item]) {
        self.add_session(key);
        self.with_session(key, |s| {
            s.current = Some(current);
            s.playing = true;
            s.queue = queue.iter().cloned().collect();
        });
    }

    pub fn remove_session(&self, key: &SessionKey) {
        self.sessions.lock().unwrap().remove(key);
    }

    pub fn with_session<R>(&self, key: &SessionKey, f: impl FnOnce(&mut FakeSession) -> R) -> R {
        let mut map = self.sessions.lock().unwrap();
        f(map.get_mut(key).expect("no such fake session"))
    }

    pub fn session(&self, key: &SessionKey) -> Option<FakeSession> {
        self.sessions.lock().unwrap().get(key).cloned()
    }

    /// The current item plays to its end.
    pub fn finish(&self, key: &SessionKey) {
        self.with_session(key, |s| {
            s.previous = s.current.take();
            s.playing = false;
            s.paused = false;
        });
    }

    pub fn current_id(&self, key: &SessionKey) -> Option<String> {
        self.session(key)?.current?.identifier
    }

    pub fn queue_ids(&self, key: &SessionKey) -> Vec<String> {
        self.session(key)
            .map(|s| s.queue.iter().filter_map(|i| i.identifier.clone()).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn call_times(&self, name: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == name)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.call_times(name).len()
    }

    fn mutate<R>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut FakeSession) -> R,
    ) -> Result<R, EngineError> {
        let mut map = self.sessions.lock().unwrap();
        let session = map
            .get_mut(key)
            .ok_or_else(|| EngineError::StaleSession(key.clone()))?;
        Ok(f(session))
    }
}

fn label(item: &Item) -> String {
    item.identifier.clone().unwrap_or_else(|| item.title.clone())
}

#[async_trait]
impl AudioEngine for FakeEngine {
    async fn create_session(&self, key: &SessionKey, _voice_target: &str) -> Result<(), EngineError> {
        self.log("create");
        if self.session(key).is_none() {
            self.add_session(key);
        }
        Ok(())
    }

    async fn sessions(&self) -> Vec<SessionKey> {
        let mut keys: Vec<_> = self.sessions.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn state(&self, key: &SessionKey) -> Option<PlayerState> {
        let s = self.session(key)?;
        Some(PlayerState {
            current: s.current,
            previous: s.previous,
            playing: s.playing,
            paused: s.paused,
            suspended: s.suspended.is_some(),
            queue_len: s.queue.len(),
            position_ms: s.position_ms,
            volume: s.volume,
        })
    }

    async fn queue(&self, key: &SessionKey) -> Option<Vec<Item>> {
        Some(self.session(key)?.queue.into_iter().collect())
    }

    async fn enqueue(&self, key: &SessionKey, item: Item, at_front: bool) -> Result<(), EngineError> {
        let name = format!("enqueue{}:{}", if at_front { "_front" } else { "" }, label(&item));
        self.mutate(key, |s| {
            if at_front {
                s.queue.push_front(item);
            } else {
                s.queue.push_back(item);
            }
        })?;
        self.log(name);
        Ok(())
    }

    async fn clear_queue(&self, key: &SessionKey) -> Result<(), EngineError> {
        self.mutate(key, |s| s.queue.clear())?;
        self.log("clear");
        Ok(())
    }

    async fn play(&self, key: &SessionKey) -> Result<(), EngineError> {
        self.mutate(key, |s| {
            let Some(next) = s.queue.pop_front() else {
                return;
            };
            if let Some(active) = s.current.take() {
                if s.paused && s.suspended.is_none() {
                    s.suspended = Some(active.clone());
                }
                s.previous = Some(active);
            }
            s.current = Some(next);
            s.playing = true;
            s.paused = false;
            s.position_ms = 0;
        })?;
        self.log("play");
        Ok(())
    }

    async fn pause(&self, key: &SessionKey) -> Result<(), EngineError> {
        self.mutate(key, |s| s.paused = true)?;
        self.log("pause");
        Ok(())
    }

    async fn resume(&self, key: &SessionKey) -> Result<(), EngineError> {
        self.mutate(key, |s| {
            s.paused = false;
            if let Some(item) = s.suspended.take() {
                if s.current.is_none() {
                    s.current = Some(item);
                    s.playing = true;
                } else {
                    s.queue.push_front(item);
                }
            }
        })?;
        self.log("resume");
        Ok(())
    }

    async fn skip(&self, key: &SessionKey) -> Result<Option<Item>, EngineError> {
        let loaded = self.mutate(key, |s| {
            s.previous = s.current.take();
            s.paused = false;
            s.current = s.queue.pop_front();
            s.playing = s.current.is_some();
            s.current.clone()
        })?;
        self.log("skip");
        Ok(loaded)
    }

    async fn destroy(&self, key: &SessionKey) -> Result<(), EngineError> {
        self.sessions
            .lock()
            .unwrap()
            .remove(key)
            .ok_or_else(|| EngineError::StaleSession(key.clone()))?;
        self.log("destroy");
        Ok(())
    }

    async fn set_volume(&self, key: &SessionKey, percent: u32) -> Result<(), EngineError> {
        self.mutate(key, |s| s.volume = percent)?;
        self.log(format!("volume:{percent}"));
        Ok(())
    }

    async fn set_filters(&self, key: &SessionKey, filters: &FilterSet) -> Result<(), EngineError> {
        let filters = filters.clone();
        self.mutate(key, |s| s.filters = filters)?;
        self.log("filters");
        Ok(())
    }
}

// ── providers ─────────────────────────────────────────────────────────────────

/// Returns a fixed candidate list, or a fresh `auto-<n>` candidate per call
/// when none is set.
#[derive(Default)]
pub struct FakeRecommender {
    candidates: Mutex<Option<Vec<Candidate>>>,
    fail: Mutex<bool>,
    seeds: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeRecommender {
    pub fn set(&self, candidates: Vec<Candidate>) {
        *self.candidates.lock().unwrap() = Some(candidates);
    }

    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seeds(&self) -> Vec<String> {
        self.seeds.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecommendationProvider for FakeRecommender {
    async fn recommend(&self, seed: &str, cap: usize) -> Result<Vec<Candidate>, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seeds.lock().unwrap().push(seed.to_string());
        if *self.fail.lock().unwrap() {
            return Err(ProviderError::Unavailable("recommendations offline".into()));
        }
        let list = self
            .candidates
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| vec![candidate(&format!("auto-{n}"))]);
        Ok(list.into_iter().take(cap).collect())
    }
}

/// Resolves `fake://<id>` to a track with that id unless overridden.
#[derive(Default)]
pub struct FakeResolver {
    overrides: Mutex<HashMap<String, Vec<Item>>>,
    failing: Mutex<HashSet<String>>,
    searches: Mutex<HashMap<String, Vec<Candidate>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn set(&self, query: &str, items: Vec<Item>) {
        self.overrides.lock().unwrap().insert(query.to_string(), items);
    }

    pub fn fail_on(&self, query: &str) {
        self.failing.lock().unwrap().insert(query.to_string());
    }

    pub fn set_search(&self, query: &str, hits: Vec<Candidate>) {
        self.searches.lock().unwrap().insert(query.to_string(), hits);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchResolveProvider for FakeResolver {
    async fn resolve(&self, query: &str) -> Result<Vec<Item>, ProviderError> {
        self.calls.lock().unwrap().push(format!("resolve:{query}"));
        if self.failing.lock().unwrap().contains(query) {
            return Err(ProviderError::Unavailable(format!("cannot resolve {query}")));
        }
        if let Some(items) = self.overrides.lock().unwrap().get(query) {
            return Ok(items.clone());
        }
        Ok(query
            .strip_prefix("fake://")
            .map(|id| vec![track(id, 180_000)])
            .unwrap_or_default())
    }

    async fn search_text(&self, query: &str) -> Result<Vec<Candidate>, ProviderError> {
        self.calls.lock().unwrap().push(format!("search:{query}"));
        Ok(self.searches.lock().unwrap().get(query).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeSynth {
    texts: Mutex<Vec<String>>,
}

impl FakeSynth {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisProvider for FakeSynth {
    async fn synthesize(&self, text: &str, _options: &SpeechOptions) -> Result<String, ProviderError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok("fake://speech".to_string())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(SessionKey, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(SessionKey, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, key: &SessionKey, message: &str) -> Result<(), ProviderError> {
        self.messages
            .lock()
            .unwrap()
            .push((key.clone(), message.to_string()));
        Ok(())
    }
}

// ── harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub ctrl: Controller,
    pub engine: Arc<FakeEngine>,
    pub recommender: Arc<FakeRecommender>,
    pub resolver: Arc<FakeResolver>,
    pub synth: Arc<FakeSynth>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let engine = Arc::new(FakeEngine::default());
        let recommender = Arc::new(FakeRecommender::default());
        let resolver = Arc::new(FakeResolver::default());
        let synth = Arc::new(FakeSynth::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let collab = Collaborators {
            engine: engine.clone(),
            recommender: recommender.clone(),
            resolver: resolver.clone(),
            synthesizer: synth.clone(),
            notifier: notifier.clone(),
        };
        let ctrl = Controller::new(collab, config, TtsConfig::default());
        Self {
            ctrl,
            engine,
            recommender,
            resolver,
            synth,
            notifier,
        }
    }
}
