mod common;

use std::time::Duration;

use common::*;
use encore_daemon::error::ControllerError;
use encore_proto::protocol::{ItemKind, StopReason};

const TEN_WORDS: &str = "one two three four five six seven eight nine ten";

#[tokio::test(start_paused = true)]
async fn test_ducks_and_resumes_after_the_estimate() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[track("a", 1_000)]);
    h.ctrl.set_tts(&k, true);

    let resume_in = h.ctrl.speak(&k, TEN_WORDS).await.unwrap();
    assert_eq!(resume_in, Some(Duration::from_millis(4_000)));

    assert_eq!(h.engine.calls(), ["pause", "enqueue_front:speech", "play"]);
    let session = h.engine.session(&k).unwrap();
    assert_eq!(session.current.as_ref().map(|i| i.kind), Some(ItemKind::Speech));
    assert_eq!(session.suspended.and_then(|i| i.identifier).as_deref(), Some("x"));
    assert_eq!(h.engine.queue_ids(&k), ["a"]);
    assert_eq!(h.synth.texts(), [TEN_WORDS]);

    // The clip ends before the estimate; the displaced track holds the queue.
    advance(2_500).await;
    let speech = h.engine.session(&k).unwrap().current.unwrap();
    h.engine.finish(&k);
    h.ctrl.on_track_ended(&k, &speech, StopReason::Finished).await;
    assert_eq!(h.engine.count("play"), 1);

    advance(1_499).await;
    assert_eq!(h.engine.count("resume"), 0);

    advance(1).await;
    assert_eq!(h.engine.count("resume"), 1);
    assert_eq!(h.engine.current_id(&k).as_deref(), Some("x"));
    assert_eq!(h.engine.queue_ids(&k), ["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_resume_during_a_long_clip_queues_the_track_next() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[track("a", 1_000)]);
    h.ctrl.set_tts(&k, true);

    h.ctrl.speak(&k, "hello").await.unwrap();
    advance(2_000).await;

    assert_eq!(h.engine.count("resume"), 1);
    let session = h.engine.session(&k).unwrap();
    assert_eq!(session.current.map(|i| i.kind), Some(ItemKind::Speech));
    assert!(session.suspended.is_none());
    assert_eq!(h.engine.queue_ids(&k), ["x", "a"]);
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_plays_without_resume() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_session(&k);
    h.ctrl.set_tts(&k, true);

    let resume_in = h.ctrl.speak(&k, "hello").await.unwrap();
    assert_eq!(resume_in, Some(Duration::from_millis(2_000)));

    advance(10_000).await;
    assert_eq!(h.engine.calls(), ["enqueue_front:speech", "play"]);
}

#[tokio::test(start_paused = true)]
async fn test_paused_track_comes_back_after_the_clip() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[track("a", 1_000)]);
    h.engine.with_session(&k, |s| s.paused = true);
    h.ctrl.set_tts(&k, true);

    h.ctrl.speak(&k, "hello").await.unwrap();
    assert_eq!(h.engine.count("pause"), 0);
    assert_eq!(
        h.engine.session(&k).unwrap().suspended.and_then(|i| i.identifier).as_deref(),
        Some("x")
    );

    let speech = h.engine.session(&k).unwrap().current.unwrap();
    h.engine.finish(&k);
    h.ctrl.on_track_ended(&k, &speech, StopReason::Finished).await;
    advance(60_000).await;

    assert_eq!(h.engine.count("resume"), 1);
    assert_eq!(h.engine.current_id(&k).as_deref(), Some("x"));
    assert!(h.engine.session(&k).unwrap().suspended.is_none());
    assert_eq!(h.engine.queue_ids(&k), ["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_tts_is_rejected() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);

    let err = h.ctrl.speak(&k, "hello").await.unwrap_err();
    assert!(matches!(err, ControllerError::TtsDisabled));
    assert!(h.synth.texts().is_empty());
    assert!(h.engine.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_blank_text_is_rejected() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);
    h.ctrl.set_tts(&k, true);

    let err = h.ctrl.speak(&k, "   ").await.unwrap_err();
    assert!(matches!(err, ControllerError::EmptyText));
    assert!(h.engine.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_clip_is_reported() {
    let h = Harness::new();
    let k = key("g1");
    h.engine.add_playing(&k, track("x", 180_000), &[]);
    h.ctrl.set_tts(&k, true);
    h.resolver.set("fake://speech", vec![]);

    let err = h.ctrl.speak(&k, "hello").await.unwrap_err();
    assert!(matches!(err, ControllerError::NoPlayableResult));
    assert!(h.engine.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_vanished_session_is_not_an_error() {
    let h = Harness::new();
    let k = key("gone");
    h.ctrl.set_tts(&k, true);

    assert_eq!(h.ctrl.speak(&k, "hello").await.unwrap(), None);
    assert!(h.engine.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_speech_item_gets_no_monitor() {
    let h = Harness::new();
    let k = key("g1");
    let x = track("x", 180_000);
    h.engine.add_playing(&k, x.clone(), &[]);
    h.ctrl.set_tts(&k, true);
    let monitor = h.ctrl.on_track_started(&k, &x).unwrap();

    h.ctrl.speak(&k, "hello").await.unwrap();
    let speech = h.engine.session(&k).unwrap().current.unwrap();
    assert!(h.ctrl.on_track_started(&k, &speech).is_none());

    assert!(!monitor.is_active());
    assert!(h.ctrl.store().monitor(&k).is_none());
}
