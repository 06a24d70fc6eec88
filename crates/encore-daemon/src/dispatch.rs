//! Maps client commands onto the controller and the engine.  Every command
//! yields one line of reply text.

use encore_proto::protocol::{Command, Item, LoopMode, SessionKey};
use tracing::{debug, warn};

use crate::controller::Controller;
use crate::error::{ControllerError, Result};
use crate::scheduler;

const NOTHING_PLAYING: &str = "No music playing!";
const PROGRESS_WIDTH: usize = 20;

/// `mm:ss`, minutes not wrapped at the hour.
pub fn format_time(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn progress_bar(position_ms: u64, duration_ms: u64) -> String {
    let filled = if duration_ms == 0 {
        0
    } else {
        ((position_ms.min(duration_ms) * PROGRESS_WIDTH as u64) / duration_ms) as usize
    };
    format!("{}{}", "▬".repeat(filled), "─".repeat(PROGRESS_WIDTH - filled))
}

#[derive(Clone)]
pub struct Dispatcher {
    ctrl: Controller,
    max_volume: u32,
}

impl Dispatcher {
    pub fn new(ctrl: Controller, max_volume: u32) -> Self {
        Self { ctrl, max_volume }
    }

    pub async fn handle(&self, cmd: Command) -> String {
        let key = cmd.session().clone();
        let result = match cmd {
            Command::Play {
                session,
                voice_target,
                query,
            } => self.play(&session, &voice_target, &query).await,
            Command::Pause { session } => self.pause(&session).await,
            Command::Skip { session } => self.skip(&session).await,
            Command::Stop { session } => self.stop(&session).await,
            Command::NowPlaying { session } => self.now_playing(&session).await,
            Command::Queue { session } => self.queue(&session).await,
            Command::Loop { session, mode } => Ok(self.looping(&session, mode)),
            Command::Autoplay { session, enabled } => Ok(self.autoplay(&session, enabled)),
            Command::Tts {
                session,
                enabled,
                voice_target,
            } => self.tts(&session, enabled, voice_target.as_deref()).await,
            Command::Speak { session, text } => self.speak(&session, &text).await,
            Command::Lofi { session, enabled } => self.lofi(&session, enabled).await,
            Command::Volume { session, percent } => self.volume(&session, percent).await,
        };

        match result {
            Ok(reply) => reply,
            Err(ControllerError::StaleSession(_)) => NOTHING_PLAYING.to_string(),
            Err(e) => {
                warn!("[{}] command failed: {}", key, e);
                format!("Error: {}", e)
            }
        }
    }

    /// Direct resolve, then text search, then resolve of the first hit.
    /// The first step that yields anything wins.
    pub async fn search_chain(&self, query: &str) -> Result<Vec<Item>> {
        let resolver = self.ctrl.resolver();
        match resolver.resolve(query).await {
            Ok(items) if !items.is_empty() => return Ok(items),
            Ok(_) => debug!("search: direct resolve of '{}' found nothing", query),
            Err(e) => warn!("search: direct resolve of '{}' failed: {}", query, e),
        }

        let hits = match resolver.search_text(query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("search: text search for '{}' failed: {}", query, e);
                Vec::new()
            }
        };
        let Some(first) = hits.first() else {
            return Ok(Vec::new());
        };
        debug!("search: resolving first hit '{}'", first.title);
        Ok(resolver.resolve(&first.locator).await?)
    }

    async fn play(&self, key: &SessionKey, voice_target: &str, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Ok("Please provide a song!".to_string());
        }
        let engine = self.ctrl.engine();
        if engine.state(key).await.is_none() {
            engine.create_session(key, voice_target).await?;
        }

        let items = self.search_chain(query).await?;
        let Some(first) = items.first().cloned() else {
            return Ok("No results found!".to_string());
        };
        let count = items.len();
        for item in items {
            engine.enqueue(key, item, false).await?;
        }

        let state = engine
            .state(key)
            .await
            .ok_or_else(|| ControllerError::StaleSession(key.clone()))?;
        if !state.playing {
            engine.play(key).await?;
        }

        Ok(if count > 1 {
            format!("Added {} tracks to queue", count)
        } else {
            format!("Added to queue: {}", first.title)
        })
    }

    async fn pause(&self, key: &SessionKey) -> Result<String> {
        let engine = self.ctrl.engine();
        let Some(state) = engine.state(key).await else {
            return Ok(NOTHING_PLAYING.to_string());
        };
        if state.paused {
            engine.resume(key).await?;
            Ok("Resumed playback!".to_string())
        } else {
            engine.pause(key).await?;
            Ok("Playback paused!".to_string())
        }
    }

    async fn skip(&self, key: &SessionKey) -> Result<String> {
        let engine = self.ctrl.engine();
        let Some(before) = engine.state(key).await else {
            return Ok(NOTHING_PLAYING.to_string());
        };
        let skipped = before.current;
        let title = skipped
            .as_ref()
            .map(|i| i.title.clone())
            .unwrap_or_else(|| "current song".to_string());

        self.ctrl.on_explicit_skip(key);
        let loaded = engine.skip(key).await?;
        if let Some(item) = &loaded {
            self.ctrl.on_track_started(key, item);
        }

        let queue_len = engine
            .state(key)
            .await
            .ok_or_else(|| ControllerError::StaleSession(key.clone()))?
            .queue_len;
        if self.ctrl.autoplay(key) && queue_len == 0 {
            if let Some(seed) = loaded.or(skipped) {
                let ctrl = self.ctrl.clone();
                let key = key.clone();
                scheduler::after(self.ctrl.config().skip_autoplay_delay(), async move {
                    ctrl.trigger_autoplay(&key, &seed).await;
                });
            }
        }

        Ok(format!("Skipped {}", title))
    }

    async fn stop(&self, key: &SessionKey) -> Result<String> {
        if self.ctrl.engine().state(key).await.is_none() {
            return Ok(NOTHING_PLAYING.to_string());
        }
        self.ctrl.on_explicit_stop(key);
        self.ctrl.engine().destroy(key).await?;
        self.ctrl.session_closed(key);
        Ok("Stopped player".to_string())
    }

    async fn now_playing(&self, key: &SessionKey) -> Result<String> {
        let Some(state) = self.ctrl.engine().state(key).await else {
            return Ok(NOTHING_PLAYING.to_string());
        };
        let Some(item) = state.current else {
            return Ok(NOTHING_PLAYING.to_string());
        };
        let duration = item.duration_ms.unwrap_or(0);
        let position = if duration > 0 {
            state.position_ms.min(duration)
        } else {
            state.position_ms
        };
        let mut reply = format!(
            "Now playing: {} [{}] {}",
            item.title,
            progress_bar(position, duration),
            format_time(position)
        );
        if duration > 0 {
            reply.push_str(&format!(" / {}", format_time(duration)));
        }
        Ok(reply)
    }

    async fn queue(&self, key: &SessionKey) -> Result<String> {
        let engine = self.ctrl.engine();
        let (Some(state), Some(items)) = (engine.state(key).await, engine.queue(key).await) else {
            return Ok(NOTHING_PLAYING.to_string());
        };
        let mut lines = vec![format!("Queue ({})", items.len())];
        if let Some(current) = state.current {
            lines.push(format!("Now: {}", current.title));
        }
        if items.is_empty() {
            lines.push("Queue is empty".to_string());
        }
        for (i, item) in items.iter().enumerate() {
            lines.push(format!(
                "{}. {} [{}]",
                i + 1,
                item.title,
                format_time(item.duration_ms.unwrap_or(0))
            ));
        }
        Ok(lines.join("\n"))
    }

    fn looping(&self, key: &SessionKey, mode: Option<LoopMode>) -> String {
        match mode {
            Some(LoopMode::Off) => {
                self.ctrl.set_loop_mode(key, LoopMode::Off);
                "Loop disabled".to_string()
            }
            Some(mode) => {
                self.ctrl.set_loop_mode(key, mode);
                format!("Loop set to {}", mode.to_string().to_uppercase())
            }
            None => format!(
                "Current loop: {}",
                self.ctrl.loop_mode(key).to_string().to_uppercase()
            ),
        }
    }

    fn autoplay(&self, key: &SessionKey, enabled: Option<bool>) -> String {
        let enabled = match enabled {
            Some(enabled) => {
                self.ctrl.set_autoplay(key, enabled);
                enabled
            }
            None => self.ctrl.toggle_autoplay(key),
        };
        format!("Autoplay {}", if enabled { "enabled" } else { "disabled" })
    }

    async fn tts(&self, key: &SessionKey, enabled: bool, voice_target: Option<&str>) -> Result<String> {
        if !enabled {
            self.ctrl.set_tts(key, false);
            return Ok("TTS disabled".to_string());
        }
        let engine = self.ctrl.engine();
        if engine.state(key).await.is_none() {
            let Some(target) = voice_target else {
                return Ok("Join a voice target before enabling TTS".to_string());
            };
            engine.create_session(key, target).await?;
        }
        self.ctrl.set_tts(key, true);
        Ok("TTS enabled".to_string())
    }

    async fn speak(&self, key: &SessionKey, text: &str) -> Result<String> {
        match self.ctrl.speak(key, text).await {
            Ok(Some(_)) => Ok(format!("Speaking: {}", text.trim())),
            Ok(None) => Ok("No voice connection!".to_string()),
            Err(ControllerError::TtsDisabled) => Ok("TTS is not enabled! Turn it on first.".to_string()),
            Err(ControllerError::EmptyText) => Ok("Please provide a message to speak!".to_string()),
            Err(e) => {
                warn!("[{}] speech failed: {}", key, e);
                Ok("Failed to generate TTS!".to_string())
            }
        }
    }

    async fn lofi(&self, key: &SessionKey, enabled: bool) -> Result<String> {
        if self.ctrl.engine().state(key).await.is_none() {
            return Ok(NOTHING_PLAYING.to_string());
        }
        self.ctrl.set_lofi(key, enabled).await?;
        Ok(format!("Lofi filter {}", if enabled { "enabled" } else { "disabled" }))
    }

    async fn volume(&self, key: &SessionKey, percent: Option<u32>) -> Result<String> {
        let engine = self.ctrl.engine();
        let Some(state) = engine.state(key).await else {
            return Ok(NOTHING_PLAYING.to_string());
        };
        let Some(percent) = percent else {
            return Ok(format!("Current volume: {}%", state.volume));
        };
        let percent = percent.clamp(1, self.max_volume.max(1));
        engine.set_volume(key, percent).await?;
        Ok(format!("Volume set to: {}% (max: {}%)", percent, self.max_volume))
    }
}
