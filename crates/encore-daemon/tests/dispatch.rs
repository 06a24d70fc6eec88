mod common;

use common::*;
use encore_daemon::dispatch::Dispatcher;
use encore_proto::protocol::{Command, LoopMode};

fn dispatcher(h: &Harness) -> Dispatcher {
    Dispatcher::new(h.ctrl.clone(), 5_000)
}

fn play(session: &str, query: &str) -> Command {
    Command::Play {
        session: key(session),
        voice_target: "voice-1".to_string(),
        query: query.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_search_chain_falls_back_to_text_search() {
    let h = Harness::new();
    h.resolver.set_search("lofi beats", vec![candidate("hit1"), candidate("hit2")]);

    let items = dispatcher(&h).search_chain("lofi beats").await.unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id(), Some("hit1"));
    assert_eq!(
        h.resolver.calls(),
        ["resolve:lofi beats", "search:lofi beats", "resolve:fake://hit1"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_search_chain_prefers_a_direct_hit() {
    let h = Harness::new();
    h.resolver.set_search("fake://x", vec![candidate("other")]);

    let items = dispatcher(&h).search_chain("fake://x").await.unwrap();

    assert_eq!(items[0].id(), Some("x"));
    assert_eq!(h.resolver.calls(), ["resolve:fake://x"]);
}

#[tokio::test(start_paused = true)]
async fn test_search_chain_survives_a_failed_direct_resolve() {
    let h = Harness::new();
    h.resolver.fail_on("broken");
    h.resolver.set_search("broken", vec![candidate("hit1")]);

    let items = dispatcher(&h).search_chain("broken").await.unwrap();
    assert_eq!(items[0].id(), Some("hit1"));
}

#[tokio::test(start_paused = true)]
async fn test_play_creates_the_session_and_starts() {
    let h = Harness::new();
    let d = dispatcher(&h);

    let reply = d.handle(play("g1", "fake://x")).await;

    assert_eq!(reply, "Added to queue: X");
    assert_eq!(h.engine.calls(), ["create", "enqueue:x", "play"]);
    assert_eq!(h.engine.current_id(&key("g1")).as_deref(), Some("x"));

    let reply = d.handle(play("g1", "fake://y")).await;
    assert_eq!(reply, "Added to queue: Y");
    assert_eq!(h.engine.queue_ids(&key("g1")), ["y"]);
    assert_eq!(h.engine.count("play"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_play_reports_playlists_and_misses() {
    let h = Harness::new();
    let d = dispatcher(&h);
    h.resolver.set("mix", vec![track("a", 1_000), track("b", 1_000), track("c", 1_000)]);

    assert_eq!(d.handle(play("g1", "mix")).await, "Added 3 tracks to queue");
    assert_eq!(d.handle(play("g1", "nothing at all")).await, "No results found!");
    assert_eq!(d.handle(play("g1", "   ")).await, "Please provide a song!");
}

#[tokio::test(start_paused = true)]
async fn test_volume_is_clamped() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);
    let d = Dispatcher::new(h.ctrl.clone(), 150);

    let volume = |percent| Command::Volume {
        session: k.clone(),
        percent: Some(percent),
    };
    assert_eq!(d.handle(volume(0)).await, "Volume set to: 1% (max: 150%)");
    assert_eq!(d.handle(volume(900)).await, "Volume set to: 150% (max: 150%)");
    assert_eq!(d.handle(volume(80)).await, "Volume set to: 80% (max: 150%)");
    assert_eq!(h.engine.calls(), ["volume:1", "volume:150", "volume:80"]);

    let query = Command::Volume {
        session: k.clone(),
        percent: None,
    };
    assert_eq!(d.handle(query).await, "Current volume: 80%");
}

#[tokio::test(start_paused = true)]
async fn test_skip_into_empty_queue_autoplays_after_a_delay() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);
    h.ctrl.set_autoplay(&k, true);
    let d = dispatcher(&h);

    let reply = d.handle(Command::Skip { session: k.clone() }).await;
    assert_eq!(reply, "Skipped X");

    advance(999).await;
    assert_eq!(h.recommender.calls(), 0);

    advance(1).await;
    assert_eq!(h.recommender.seeds(), ["x"]);
    assert_eq!(h.engine.current_id(&k).as_deref(), Some("auto-0"));
}

#[tokio::test(start_paused = true)]
async fn test_skip_to_next_item_rearms_the_monitor() {
    let h = Harness::new();
    let k = key("g1");
    let x = track("x", 180_000);
    h.engine.add_playing(&k, x.clone(), &[track("a", 180_000)]);
    let old = h.ctrl.on_track_started(&k, &x).unwrap();

    dispatcher(&h).handle(Command::Skip { session: k.clone() }).await;

    assert!(!old.is_active());
    let armed = h.ctrl.store().monitor(&k).unwrap();
    assert_eq!(armed.item_id(), "a");
}

#[tokio::test(start_paused = true)]
async fn test_skip_onto_the_last_item_monitors_and_seeds_from_it() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[track("a", 180_000)]);
    h.ctrl.set_autoplay(&k, true);

    let reply = dispatcher(&h).handle(Command::Skip { session: k.clone() }).await;
    assert_eq!(reply, "Skipped X");

    let armed = h.ctrl.store().monitor(&k).unwrap();
    assert_eq!(armed.item_id(), "a");
    assert!(armed.is_active());

    advance(1_000).await;
    assert_eq!(h.recommender.seeds(), ["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_loop_command_sets_and_reports() {
    let h = Harness::new();
    let k = key("g1");
    let d = dispatcher(&h);

    let set = |mode| Command::Loop {
        session: k.clone(),
        mode: Some(mode),
    };
    assert_eq!(d.handle(set(LoopMode::Queue)).await, "Loop set to QUEUE");
    assert_eq!(
        d.handle(Command::Loop { session: k.clone(), mode: None }).await,
        "Current loop: QUEUE"
    );
    assert_eq!(d.handle(set(LoopMode::Off)).await, "Loop disabled");
    assert_eq!(h.ctrl.loop_mode(&k), LoopMode::Off);
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_command_toggles() {
    let h = Harness::new();
    let k = key("g1");
    let d = dispatcher(&h);
    let toggle = || Command::Autoplay {
        session: k.clone(),
        enabled: None,
    };

    assert_eq!(d.handle(toggle()).await, "Autoplay enabled");
    assert_eq!(d.handle(toggle()).await, "Autoplay disabled");
    assert!(!h.ctrl.autoplay(&k));
}

#[tokio::test(start_paused = true)]
async fn test_stop_destroys_and_resets() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);
    h.ctrl.set_autoplay(&k, true);
    h.ctrl.set_loop_mode(&k, LoopMode::Track);
    let d = dispatcher(&h);

    assert_eq!(d.handle(Command::Stop { session: k.clone() }).await, "Stopped player");
    assert!(h.engine.session(&k).is_none());
    assert!(!h.ctrl.autoplay(&k));
    assert_eq!(h.ctrl.loop_mode(&k), LoopMode::Off);

    assert_eq!(d.handle(Command::Stop { session: k.clone() }).await, "No music playing!");
}

#[tokio::test(start_paused = true)]
async fn test_pause_toggles() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);
    let d = dispatcher(&h);

    assert_eq!(d.handle(Command::Pause { session: k.clone() }).await, "Playback paused!");
    assert_eq!(d.handle(Command::Pause { session: k.clone() }).await, "Resumed playback!");
    assert_eq!(h.engine.calls(), ["pause", "resume"]);
}

#[tokio::test(start_paused = true)]
async fn test_speak_replies() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);
    let d = dispatcher(&h);
    let speak = |text: &str| Command::Speak {
        session: k.clone(),
        text: text.to_string(),
    };

    assert_eq!(d.handle(speak("hello")).await, "TTS is not enabled! Turn it on first.");

    let enable = Command::Tts {
        session: k.clone(),
        enabled: true,
        voice_target: None,
    };
    assert_eq!(d.handle(enable).await, "TTS enabled");
    assert_eq!(d.handle(speak("  ")).await, "Please provide a message to speak!");
    assert_eq!(d.handle(speak(" hello ")).await, "Speaking: hello");
}

#[tokio::test(start_paused = true)]
async fn test_lofi_applies_filters() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);
    let d = dispatcher(&h);

    let reply = d.handle(Command::Lofi { session: k.clone(), enabled: true }).await;
    assert_eq!(reply, "Lofi filter enabled");
    assert!(h.ctrl.lofi(&k));
    assert!(!h.engine.session(&k).unwrap().filters.is_empty());

    d.handle(Command::Lofi { session: k.clone(), enabled: false }).await;
    assert!(h.engine.session(&k).unwrap().filters.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_commands_without_a_session() {
    let h = Harness::new();
    let d = dispatcher(&h);
    let k = key("nobody");

    assert_eq!(d.handle(Command::NowPlaying { session: k.clone() }).await, "No music playing!");
    assert_eq!(d.handle(Command::Queue { session: k.clone() }).await, "No music playing!");
    assert_eq!(d.handle(Command::Skip { session: k.clone() }).await, "No music playing!");
}

#[tokio::test(start_paused = true)]
async fn test_now_playing_shows_progress() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 120_000), &[]);
    h.engine.with_session(&k, |s| s.position_ms = 60_000);

    let reply = dispatcher(&h).handle(Command::NowPlaying { session: k.clone() }).await;
    assert_eq!(
        reply,
        format!("Now playing: X [{}{}] 01:00 / 02:00", "▬".repeat(10), "─".repeat(10))
    );
}
