//! mpv-backed audio engine: one mpv process per session, queue kept here.
//!
//! mpv only ever holds the current file.  The queue, the previous item and
//! the stop reason bookkeeping live in [`Playback`], which is updated from
//! mpv events by a per-session forwarder task and read by the controller
//! through [`AudioEngine::state`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use encore_proto::config::EngineConfig;
use encore_proto::protocol::{FilterSet, Item, SessionKey, StopReason};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::mpv::{self, MpvDriver, MpvEvent, MpvHandle};
use crate::ports::{AudioEngine, EngineEvent, PlayerState};

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// A queued item.  Items pushed back by `resume` remember where they left off.
#[derive(Debug, Clone)]
struct Queued {
    item: Item,
    start_ms: Option<u64>,
}

impl From<Item> for Queued {
    fn from(item: Item) -> Self {
        Self {
            item,
            start_ms: None,
        }
    }
}

/// Queue and playback bookkeeping for one session.
#[derive(Debug, Default)]
pub struct Playback {
    current: Option<Item>,
    previous: Option<Item>,
    /// Sent to mpv, `start-file` not seen yet.
    loading: Option<Item>,
    queue: VecDeque<Queued>,
    /// Item displaced while paused, with the position it was at.
    suspended: Option<(Item, u64)>,
    paused: bool,
    position_ms: u64,
    volume: u32,
    /// Why the next `end-file` with reason "stop" happens.
    pending_end: Option<StopReason>,
}

impl Playback {
    fn new(volume: u32) -> Self {
        Self {
            volume,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> PlayerState {
        let active = self.current.clone().or_else(|| self.loading.clone());
        PlayerState {
            playing: active.is_some(),
            current: active,
            previous: self.previous.clone(),
            paused: self.paused,
            suspended: self.suspended.is_some(),
            queue_len: self.queue.len(),
            position_ms: self.position_ms,
            volume: self.volume,
        }
    }

    /// Pop the next queued item and mark it loading.  The active item, if
    /// any, is about to be replaced; a paused one is kept aside.
    fn begin_next(&mut self) -> Option<Queued> {
        let next = self.queue.pop_front()?;
        if let Some(active) = self.current.as_ref() {
            if self.paused && self.suspended.is_none() {
                self.suspended = Some((active.clone(), self.position_ms));
            }
            self.pending_end = self.pending_end.or(Some(StopReason::Replaced));
        }
        self.loading = Some(next.item.clone());
        self.paused = false;
        Some(next)
    }

    /// Unpause and bring back the suspended item, if any.  Returns it with
    /// its position when it can be loaded right away; while something else
    /// is still active it goes to the front of the queue instead.
    fn resume_suspended(&mut self) -> Option<(Item, u64)> {
        self.paused = false;
        let (item, pos) = self.suspended.take()?;
        if self.current.is_none() && self.loading.is_none() {
            self.loading = Some(item.clone());
            Some((item, pos))
        } else {
            self.queue.push_front(Queued {
                item,
                start_ms: Some(pos),
            });
            None
        }
    }

    /// Apply one mpv event.  Returns the engine event it amounts to, if any.
    pub fn on_event(&mut self, key: &SessionKey, ev: &MpvEvent) -> Option<EngineEvent> {
        if let Some((id, data)) = ev.as_property_change() {
            match id {
                mpv::OBS_PAUSE => self.paused = data.as_bool().unwrap_or(false),
                mpv::OBS_TIME_POS => {
                    self.position_ms = data.as_f64().map(|s| (s * 1000.0) as u64).unwrap_or(0);
                }
                mpv::OBS_DURATION => {
                    if let (Some(item), Some(secs)) = (self.current.as_mut(), data.as_f64()) {
                        if item.duration_ms.is_none() {
                            item.duration_ms = Some((secs * 1000.0) as u64);
                        }
                    }
                }
                _ => {}
            }
            return None;
        }

        match ev.event_name()? {
            "start-file" => {
                let item = self.loading.take()?;
                self.current = Some(item.clone());
                self.position_ms = 0;
                Some(EngineEvent::TrackStarted {
                    session: key.clone(),
                    item,
                })
            }
            "end-file" => {
                let pending = self.pending_end.take();
                let item = self.current.take()?;
                let reason = match ev.end_reason() {
                    Some("eof") => StopReason::Finished,
                    Some("stop") => pending.unwrap_or(StopReason::Replaced),
                    _ => StopReason::Stopped,
                };
                self.previous = Some(item.clone());
                self.position_ms = 0;
                Some(EngineEvent::TrackEnded {
                    session: key.clone(),
                    item,
                    reason,
                })
            }
            _ => None,
        }
    }
}

/// Lavfi graph for a filter set, `None` when there is nothing to apply.
pub fn lavfi_graph(filters: &FilterSet) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let mut stages = Vec::new();
    if let Some(lp) = filters.low_pass {
        let cutoff = 20_000.0 / lp.smoothing.max(1.0);
        stages.push(format!("lowpass=f={:.0}", cutoff));
    }
    if let Some(k) = filters.karaoke {
        stages.push(format!(
            "bandreject=f={:.0}:width_type=h:w={:.0}",
            k.filter_band, k.filter_width
        ));
    }
    if let Some(ts) = filters.timescale {
        let tempo = (ts.speed * ts.rate).clamp(0.5, 2.0);
        stages.push(format!("atempo={}", tempo));
    }
    if stages.is_empty() {
        None
    } else {
        Some(stages.join(","))
    }
}

struct SessionSlot {
    id: u64,
    handle: MpvHandle,
    driver: tokio::sync::Mutex<MpvDriver>,
    playback: Mutex<Playback>,
}

impl SessionSlot {
    fn playback(&self) -> MutexGuard<'_, Playback> {
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type SlotMap = Arc<Mutex<HashMap<SessionKey, Arc<SessionSlot>>>>;

pub struct MpvEngine {
    slots: SlotMap,
    events: mpsc::Sender<EngineEvent>,
    config: EngineConfig,
}

impl MpvEngine {
    pub fn new(config: EngineConfig, events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            events,
            config,
        }
    }

    fn slot(&self, key: &SessionKey) -> Result<Arc<SessionSlot>, EngineError> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::StaleSession(key.clone()))
    }

    /// Load the front of the queue.  Returns the item loaded.
    async fn load_next(&self, slot: &SessionSlot) -> Result<Option<Item>, EngineError> {
        let Some(next) = slot.playback().begin_next() else {
            return Ok(None);
        };
        debug!("engine: loading '{}' from {:?} ms", next.item.title, next.start_ms);
        let start_secs = next.start_ms.map(|ms| ms as f64 / 1000.0);
        slot.handle.load(&next.item.locator, start_secs).await?;
        slot.handle.set_pause(false).await?;
        Ok(Some(next.item))
    }
}

async fn forward_events(
    key: SessionKey,
    slot: Arc<SessionSlot>,
    slots: SlotMap,
    mut rx: mpsc::Receiver<MpvEvent>,
    events: mpsc::Sender<EngineEvent>,
) {
    while let Some(ev) = rx.recv().await {
        let out = slot.playback().on_event(&key, &ev);
        if let Some(out) = out {
            if events.send(out).await.is_err() {
                break;
            }
        }
    }

    let live = {
        let mut map = slots.lock().unwrap_or_else(PoisonError::into_inner);
        let live = map.get(&key).is_some_and(|s| s.id == slot.id);
        if live {
            map.remove(&key);
        }
        live
    };
    slot.driver.lock().await.kill().await;
    if live {
        info!("engine: [{}] mpv session closed", key);
        let _ = events.send(EngineEvent::SessionClosed { session: key }).await;
    } else {
        // Destroyed or already replaced: the key may belong to a new session.
        debug!("engine: [{}] mpv instance {} exited", key, slot.id);
    }
}

#[async_trait]
impl AudioEngine for MpvEngine {
    async fn create_session(&self, key: &SessionKey, voice_target: &str) -> Result<(), EngineError> {
        if self.slot(key).is_ok() {
            return Ok(());
        }

        let device = if voice_target.is_empty() {
            self.config.audio_device.clone()
        } else {
            Some(voice_target.to_string())
        };
        let volume = self.config.default_volume;
        let mut driver = MpvDriver::new(key, device, volume);
        let (event_tx, event_rx) = mpsc::channel(256);
        let handle = driver.spawn_and_connect(event_tx).await?;
        handle.observe_all_properties().await;

        let slot = Arc::new(SessionSlot {
            id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            handle,
            driver: tokio::sync::Mutex::new(driver),
            playback: Mutex::new(Playback::new(volume)),
        });
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), slot.clone());

        tokio::spawn(forward_events(
            key.clone(),
            slot,
            self.slots.clone(),
            event_rx,
            self.events.clone(),
        ));
        info!("engine: [{}] session created", key);
        Ok(())
    }

    async fn sessions(&self) -> Vec<SessionKey> {
        let slots: Vec<(SessionKey, Arc<SessionSlot>)> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();

        let mut live = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            if slot.driver.lock().await.process_alive() {
                live.push(key);
            } else {
                debug!("engine: [{}] mpv process is gone", key);
            }
        }
        live
    }

    async fn state(&self, key: &SessionKey) -> Option<PlayerState> {
        let slot = self.slot(key).ok()?;
        let state = slot.playback().snapshot();
        Some(state)
    }

    async fn queue(&self, key: &SessionKey) -> Option<Vec<Item>> {
        let slot = self.slot(key).ok()?;
        let items = slot.playback().queue.iter().map(|q| q.item.clone()).collect();
        Some(items)
    }

    async fn enqueue(&self, key: &SessionKey, item: Item, at_front: bool) -> Result<(), EngineError> {
        let slot = self.slot(key)?;
        let mut playback = slot.playback();
        if at_front {
            playback.queue.push_front(item.into());
        } else {
            playback.queue.push_back(item.into());
        }
        Ok(())
    }

    async fn clear_queue(&self, key: &SessionKey) -> Result<(), EngineError> {
        self.slot(key)?.playback().queue.clear();
        Ok(())
    }

    async fn play(&self, key: &SessionKey) -> Result<(), EngineError> {
        let slot = self.slot(key)?;
        self.load_next(&slot).await?;
        Ok(())
    }

    async fn pause(&self, key: &SessionKey) -> Result<(), EngineError> {
        let slot = self.slot(key)?;
        slot.playback().paused = true;
        slot.handle.set_pause(true).await?;
        Ok(())
    }

    async fn resume(&self, key: &SessionKey) -> Result<(), EngineError> {
        let slot = self.slot(key)?;
        let restore = slot.playback().resume_suspended();
        if let Some((item, pos)) = restore {
            debug!("engine: [{}] restoring '{}' at {} ms", key, item.title, pos);
            slot.handle.load(&item.locator, Some(pos as f64 / 1000.0)).await?;
        }
        slot.handle.set_pause(false).await?;
        Ok(())
    }

    async fn skip(&self, key: &SessionKey) -> Result<Option<Item>, EngineError> {
        let slot = self.slot(key)?;
        let has_next = {
            let mut playback = slot.playback();
            if playback.current.is_some() || playback.loading.is_some() {
                playback.pending_end = Some(StopReason::Skipped);
            }
            !playback.queue.is_empty()
        };
        if has_next {
            self.load_next(&slot).await
        } else {
            slot.handle.stop().await?;
            Ok(None)
        }
    }

    async fn destroy(&self, key: &SessionKey) -> Result<(), EngineError> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .ok_or_else(|| EngineError::StaleSession(key.clone()))?;
        {
            let mut playback = slot.playback();
            playback.pending_end = Some(StopReason::Stopped);
            playback.queue.clear();
            playback.suspended = None;
        }
        if let Err(e) = slot.handle.stop().await {
            debug!("engine: [{}] stop before quit failed: {}", key, e);
        }
        slot.handle.quit().await?;
        slot.driver.lock().await.kill().await;
        info!("engine: [{}] session destroyed", key);
        Ok(())
    }

    async fn set_volume(&self, key: &SessionKey, percent: u32) -> Result<(), EngineError> {
        let slot = self.slot(key)?;
        if percent > mpv::MPV_MAX_VOLUME {
            warn!(
                "engine: [{}] volume {}% above mpv's ceiling, playing at {}%",
                key,
                percent,
                mpv::MPV_MAX_VOLUME
            );
        }
        slot.handle.set_volume(percent).await?;
        slot.playback().volume = percent;
        Ok(())
    }

    async fn set_filters(&self, key: &SessionKey, filters: &FilterSet) -> Result<(), EngineError> {
        let slot = self.slot(key)?;
        let graph = lavfi_graph(filters);
        debug!("engine: [{}] filters -> {:?}", key, graph);
        slot.handle.set_lavfi(graph.as_deref()).await?;
        Ok(())
    }
}
