//! Daemon event loop.
//!
//! Two inputs: `DaemonEvent`s from the socket server and signal handler, and
//! `EngineEvent`s from the mpv sessions.  Commands and stop resolution run on
//! their own tasks so a slow provider never stalls the loop.
use std::sync::Arc;

use async_trait::async_trait;
use encore_daemon::controller::{Collaborators, Controller};
use encore_daemon::dispatch::Dispatcher;
use encore_daemon::engine::MpvEngine;
use encore_daemon::error::ProviderError;
use encore_daemon::ports::{EngineEvent, Notifier};
use encore_daemon::recommend::MixRecommender;
use encore_daemon::resolve::YtDlpResolver;
use encore_daemon::speech::GoogleTts;
use encore_proto::config::Config;
use encore_proto::protocol::{Command, SessionKey};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::BroadcastMessage;

#[derive(Debug)]
pub enum DaemonEvent {
    ClientCommand {
        cmd: Command,
        reply: oneshot::Sender<String>,
    },
    Shutdown,
}

/// Sends session notices to every connected client.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<BroadcastMessage>,
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn send(&self, key: &SessionKey, message: &str) -> Result<(), ProviderError> {
        info!("[{}] {}", key, message);
        // No connected clients is not a failure
        let _ = self.sender.send(BroadcastMessage::Notice {
            session: key.clone(),
            message: message.to_string(),
        });
        Ok(())
    }
}

pub struct DaemonCore {
    ctrl: Controller,
    dispatcher: Dispatcher,
    engine_rx: mpsc::Receiver<EngineEvent>,
}

impl DaemonCore {
    pub fn new(
        config: &Config,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> anyhow::Result<Self> {
        let (engine_tx, engine_rx) = mpsc::channel::<EngineEvent>(256);

        let resolver = YtDlpResolver::discover()
            .ok_or_else(|| anyhow::anyhow!("yt-dlp binary not found"))?;
        let collab = Collaborators {
            engine: Arc::new(MpvEngine::new(config.engine.clone(), engine_tx)),
            recommender: Arc::new(MixRecommender::new(&config.recommend)?),
            resolver: Arc::new(resolver),
            synthesizer: Arc::new(GoogleTts),
            notifier: Arc::new(BroadcastNotifier {
                sender: broadcast_tx,
            }),
        };

        let ctrl = Controller::new(collab, config.controller.clone(), config.tts.clone());
        let dispatcher = Dispatcher::new(ctrl.clone(), config.engine.max_volume);
        Ok(Self {
            ctrl,
            dispatcher,
            engine_rx,
        })
    }

    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        let poller = self.ctrl.start_poller();

        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(DaemonEvent::ClientCommand { cmd, reply }) => {
                        let dispatcher = self.dispatcher.clone();
                        tokio::spawn(async move {
                            let message = dispatcher.handle(cmd).await;
                            let _ = reply.send(message);
                        });
                    }
                    Some(DaemonEvent::Shutdown) | None => break,
                },
                Some(event) = self.engine_rx.recv() => self.on_engine_event(event),
            }
        }

        poller.cancel();
        for key in self.ctrl.engine().sessions().await {
            self.ctrl.on_explicit_stop(&key);
            if let Err(e) = self.ctrl.engine().destroy(&key).await {
                warn!("[{}] teardown failed: {}", key, e);
            }
        }
        info!("Event loop stopped");
        Ok(())
    }

    fn on_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::TrackStarted { session, item } => {
                debug!("[{}] started '{}'", session, item.title);
                self.ctrl.on_track_started(&session, &item);
            }
            EngineEvent::TrackEnded {
                session,
                item,
                reason,
            } => {
                debug!("[{}] ended '{}' ({:?})", session, item.title, reason);
                let ctrl = self.ctrl.clone();
                tokio::spawn(async move { ctrl.on_track_ended(&session, &item, reason).await });
            }
            EngineEvent::SessionClosed { session } => self.ctrl.session_closed(&session),
        }
    }
}
