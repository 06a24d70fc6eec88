use serde::{Deserialize, Serialize};
use std::fmt;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to an
/// incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// Opaque key of one playback session (one queue, one set of mode flags).
pub type SessionKey = String;

/// What an item is, as far as continuation logic cares.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Track,
    /// Synthesized speech inserted as an overlay.  Never looped or used as an
    /// autoplay seed.
    Speech,
}

/// A playable item as handed to the audio engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Item {
    /// Stable source identifier (e.g. a video id).  Items without one can be
    /// played but cannot be monitored or seed autoplay.
    #[serde(default)]
    pub identifier: Option<String>,
    pub title: String,
    /// URL or path the engine loads.
    pub locator: String,
    /// Length in milliseconds, when the source reports one.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub kind: ItemKind,
}

impl Item {
    pub fn id(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn is_speech(&self) -> bool {
        self.kind == ItemKind::Speech
    }
}

/// A recommendation candidate: not yet playable, must go through a resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub identifier: String,
    pub locator: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoopMode::Off => "off",
            LoopMode::Track => "track",
            LoopMode::Queue => "queue",
        };
        f.write_str(label)
    }
}

/// Why the previously active item stopped being active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// Played to completion.
    Finished,
    Skipped,
    Stopped,
    /// Another item was loaded over it.
    Replaced,
}

// ── audio filters ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LowPass {
    pub smoothing: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Karaoke {
    pub level: f32,
    pub mono_level: f32,
    pub filter_band: f32,
    pub filter_width: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Timescale {
    pub speed: f32,
    pub pitch: f32,
    pub rate: f32,
}

/// Filter chain applied to a session's output.  Empty means "no filters".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FilterSet {
    #[serde(default)]
    pub low_pass: Option<LowPass>,
    #[serde(default)]
    pub karaoke: Option<Karaoke>,
    #[serde(default)]
    pub timescale: Option<Timescale>,
}

impl FilterSet {
    /// The "lofi" preset: heavy low-pass, vocal band cut, slowed down.
    pub fn lofi() -> Self {
        Self {
            low_pass: Some(LowPass { smoothing: 20.0 }),
            karaoke: Some(Karaoke {
                level: 1.0,
                mono_level: 1.0,
                filter_band: 220.0,
                filter_width: 100.0,
            }),
            timescale: Some(Timescale {
                speed: 0.8,
                pitch: 1.0,
                rate: 1.0,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low_pass.is_none() && self.karaoke.is_none() && self.timescale.is_none()
    }
}

// ── commands / broadcasts ─────────────────────────────────────────────────────

/// Messages sent from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    Play {
        session: SessionKey,
        voice_target: String,
        query: String,
    },
    /// Toggle pause/resume.
    Pause { session: SessionKey },
    Skip { session: SessionKey },
    Stop { session: SessionKey },
    NowPlaying { session: SessionKey },
    Queue { session: SessionKey },
    /// `None` queries the current mode.
    Loop {
        session: SessionKey,
        #[serde(default)]
        mode: Option<LoopMode>,
    },
    /// `None` toggles.
    Autoplay {
        session: SessionKey,
        #[serde(default)]
        enabled: Option<bool>,
    },
    Tts {
        session: SessionKey,
        enabled: bool,
        #[serde(default)]
        voice_target: Option<String>,
    },
    Speak { session: SessionKey, text: String },
    Lofi { session: SessionKey, enabled: bool },
    /// `None` queries the current volume.
    Volume {
        session: SessionKey,
        #[serde(default)]
        percent: Option<u32>,
    },
}

impl Command {
    pub fn session(&self) -> &SessionKey {
        match self {
            Command::Play { session, .. }
            | Command::Pause { session }
            | Command::Skip { session }
            | Command::Stop { session }
            | Command::NowPlaying { session }
            | Command::Queue { session }
            | Command::Loop { session, .. }
            | Command::Autoplay { session, .. }
            | Command::Tts { session, .. }
            | Command::Speak { session, .. }
            | Command::Lofi { session, .. }
            | Command::Volume { session, .. } => session,
        }
    }
}

/// Messages sent from the daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect.
    Hello { protocol_version: u32 },
    /// Direct answer to a command from this client.
    Reply { session: SessionKey, message: String },
    /// Unsolicited session notice (e.g. "now autoplaying").
    Notice { session: SessionKey, message: String },
    Log { message: String },
    Error { message: String },
}

/// Largest JSON body a frame may carry.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    /// Length of the complete frame at the start of `data`, or `None` while
    /// the header or body is still arriving.  Errors on a header announcing
    /// more than [`MAX_FRAME_LEN`] bytes.
    pub fn frame_len(data: &[u8]) -> anyhow::Result<Option<usize>> {
        if data.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN);
        }
        Ok((data.len() >= 4 + len).then_some(4 + len))
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        let Some(frame) = Self::frame_len(data)? else {
            anyhow::bail!("Insufficient data for message");
        };
        let msg: Self = serde_json::from_slice(&data[4..frame])?;
        Ok((msg, frame))
    }
}
