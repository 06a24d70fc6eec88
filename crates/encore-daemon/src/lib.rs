//! Per-session playback continuation: decides what plays after the current
//! item stops (track loop, queue loop or autoplay) and inserts speech
//! overlays, on top of an mpv-backed queue engine.

pub mod autoplay;
pub mod controller;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod looping;
pub mod monitor;
pub mod mpv;
pub mod overlay;
pub mod poller;
pub mod ports;
pub mod recommend;
pub mod resolve;
pub mod scheduler;
pub mod speech;
pub mod store;
