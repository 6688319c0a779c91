//! End-to-end tests for `ConversationEngine`.
//!
//! The backend is the scripted `SessionApi` fake and audio goes through the
//! recording media backend, so every network call and every media call can
//! be asserted on.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use flashtalk_core::testing::ScriptedSessionApi;
use flashtalk_core::{
    ContextMode, Message, MessageId, MessageRole, SessionId, SessionStatus, StreamKind,
    TransportError,
};
use flashtalk_engine::{ConversationEngine, EngineError};
use flashtalk_voice::testing::{MediaCall, MediaLog, RecordingMedia};
use flashtalk_voice::{ControlMessage, Expression, PlaybackPhase, VoiceSignal};
use tokio::time::timeout;

// ── Helpers ────────────────────────────────────────────────────────

fn voice_engine(
    voice: bool,
    media: RecordingMedia,
) -> (ConversationEngine, Arc<ScriptedSessionApi>, MediaLog) {
    let api = Arc::new(ScriptedSessionApi::new());
    let log = media.log();
    let engine = ConversationEngine::new("card-42", api.clone(), Box::new(media), voice);
    (engine, api, log)
}

fn text_only() -> (ConversationEngine, Arc<ScriptedSessionApi>) {
    let (engine, api, _) = voice_engine(false, RecordingMedia::new());
    (engine, api)
}

async fn wait_closed(engine: &ConversationEngine, session_id: &SessionId) {
    let token = engine.text_closed(session_id).expect("text stream registered");
    timeout(Duration::from_secs(2), token.cancelled())
        .await
        .expect("text stream did not close");
}

async fn wait_for_content(engine: &ConversationEngine, session_id: &SessionId, content: &str) {
    let mut rx = engine.messages();
    timeout(Duration::from_secs(2), async {
        loop {
            let done = rx
                .borrow_and_update()
                .iter()
                .any(|m| m.session_id.as_ref() == Some(session_id) && m.content == content);
            if done {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("content not reached in time");
}

fn audio(len: usize) -> VoiceSignal {
    VoiceSignal::from_binary(Bytes::from(vec![1u8; len]))
}

fn control(message: ControlMessage) -> VoiceSignal {
    VoiceSignal::Control(message)
}

// ── Sending ────────────────────────────────────────────────────────

#[tokio::test]
async fn explain_card_streams_answer_into_pending_message() {
    let (engine, api) = text_only();

    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    let messages = engine.registry().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "Explain card");
    assert!(messages[1].pending);

    let feed = api.feed(&session_id);
    feed.frame(r#"{"event":"message","data":"Hel"}"#);
    feed.frame(r#"{"event":"message","data":"lo"}"#);
    feed.frame(r#"{"event":"complete","data":"Hello"}"#);
    wait_closed(&engine, &session_id).await;

    let answer = engine.registry().message_for(&session_id).unwrap();
    assert_eq!(answer.content, "Hello");
    assert!(!answer.pending);

    let request = &api.init_requests()[0];
    assert_eq!(request.context_id, "card-42");
    assert_eq!(request.prompt, "Explain card");
    assert!(!request.voice);
    assert_eq!(api.opened(), vec![(session_id, StreamKind::Live)]);
}

#[tokio::test]
async fn chunk_mode_sends_chunk_id() {
    let (engine, api) = text_only();
    let session_id = engine
        .send(
            "What does this paragraph mean?",
            ContextMode::Chunk {
                chunk_id: "chunk-9".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(api.init_requests()[0].chunk_id.as_deref(), Some("chunk-9"));
    let session = engine.registry().get(&session_id).unwrap();
    assert_eq!(session.chunk_id.as_deref(), Some("chunk-9"));
}

#[tokio::test]
async fn init_failure_marks_assistant_message_errored() {
    let (engine, api) = text_only();
    api.fail_init_with(TransportError::Status {
        status: 503,
        url: "http://test/session/init".into(),
    });

    let err = engine.send("Explain card", ContextMode::Card).await.unwrap_err();
    assert!(matches!(err, EngineError::Init(_)));

    let messages = engine.registry().messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].error);
    assert!(!messages[1].pending);
    assert!(api.opened().is_empty());
}

#[tokio::test]
async fn empty_prompt_is_rejected_before_any_call() {
    let (engine, api) = text_only();
    assert!(matches!(
        engine.send("   ", ContextMode::Card).await,
        Err(EngineError::EmptyPrompt)
    ));
    assert!(engine.registry().messages().is_empty());
    assert!(api.init_requests().is_empty());
}

// ── Interrupting ───────────────────────────────────────────────────

#[tokio::test]
async fn interrupt_active_freezes_message() {
    let (engine, api) = text_only();
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    let feed = api.feed(&session_id);
    feed.frame(r#"{"event":"message","data":"partial"}"#);
    wait_for_content(&engine, &session_id, "partial").await;

    assert_eq!(engine.interrupt_active().await, Some(session_id.clone()));
    assert_eq!(api.interrupts(), vec![session_id.clone()]);

    let frozen = engine.registry().message_for(&session_id).unwrap();
    feed.frame(r#"{"event":"message","data":" more"}"#);
    feed.frame(r#"{"event":"complete","data":"partial more"}"#);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(engine.registry().message_for(&session_id).unwrap(), frozen);
    assert!(!frozen.pending);
    assert_eq!(
        engine.registry().get(&session_id).unwrap().status,
        SessionStatus::Interrupted
    );
    assert_eq!(engine.interrupt_active().await, None);
}

#[tokio::test]
async fn failed_remote_interrupt_still_cleans_up_locally() {
    let (engine, api) = text_only();
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    api.fail_interrupt_with(TransportError::Network("offline".into()));
    let closed = engine.text_closed(&session_id).unwrap();

    engine.interrupt_active().await;
    timeout(Duration::from_secs(2), closed.cancelled())
        .await
        .expect("text stream did not close");
    assert!(engine.text_closed(&session_id).is_none());
    assert_eq!(
        engine.registry().get(&session_id).unwrap().status,
        SessionStatus::Interrupted
    );
    assert!(!engine.registry().is_processing(&session_id));
}

// ── Audio ──────────────────────────────────────────────────────────

#[tokio::test]
async fn audio_frames_coalesce_while_append_in_flight() {
    let (engine, _api, log) = voice_engine(true, RecordingMedia::deferred());
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    assert_eq!(engine.playback_state().session_id, Some(session_id));

    engine.handle_voice_signal(audio(10));
    for len in [100, 50, 200] {
        engine.handle_voice_signal(audio(len));
    }
    engine.handle_media_event(log.settle_append().unwrap());

    assert_eq!(log.appended_sizes(), [10, 350]);
    assert_eq!(engine.playback_state().phase, PlaybackPhase::Playing);
    assert_eq!(log.overlapping_appends(), 0);
}

#[tokio::test]
async fn new_send_during_synthesis_interrupts_previous_remotely() {
    let (engine, api, log) = voice_engine(true, RecordingMedia::deferred());
    let first = engine.send("Explain card", ContextMode::Card).await.unwrap();
    engine.handle_voice_signal(audio(64));
    assert_eq!(engine.playback_state().phase, PlaybackPhase::Buffering);

    let second = engine.send("And in simpler words?", ContextMode::Card).await.unwrap();

    assert_eq!(api.interrupts(), vec![first.clone()]);
    assert_eq!(
        engine.registry().get(&first).unwrap().status,
        SessionStatus::Interrupted
    );
    let state = engine.playback_state();
    assert_eq!(state.session_id, Some(second));
    assert_eq!(state.phase, PlaybackPhase::Connecting);
    assert_eq!(state.bytes_received, 0);
    assert_eq!(log.count(&MediaCall::Abort), 1);
    assert_eq!(log.max_open_sets(), 1);
}

#[tokio::test]
async fn new_send_after_synthesis_clears_locally_only() {
    let (engine, api, log) = voice_engine(true, RecordingMedia::new());
    let first = engine.send("Explain card", ContextMode::Card).await.unwrap();
    engine.handle_voice_signal(audio(32));
    engine.handle_voice_signal(control(ControlMessage::SynthesisFinished {
        session_id: first.clone(),
    }));
    assert_eq!(log.count(&MediaCall::EndOfStream), 1);

    engine.send("Next question", ContextMode::Card).await.unwrap();

    assert!(api.interrupts().is_empty());
    assert_ne!(
        engine.registry().get(&first).unwrap().status,
        SessionStatus::Interrupted
    );
    assert_eq!(log.count(&MediaCall::Open), 2);
}

#[tokio::test]
async fn unsupported_audio_falls_back_to_text() {
    let media = RecordingMedia::unsupported();
    let (engine, api, _log) = voice_engine(true, media);

    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    assert!(!engine.registry().get(&session_id).unwrap().has_audio);
    assert_eq!(engine.playback_state().phase, PlaybackPhase::Error);

    let feed = api.feed(&session_id);
    feed.frame(r#"{"event":"complete","data":"text still works"}"#);
    wait_closed(&engine, &session_id).await;
    assert_eq!(
        engine.registry().message_for(&session_id).unwrap().content,
        "text still works"
    );
}

#[tokio::test]
async fn audio_after_interrupt_is_dropped() {
    let (engine, _api, log) = voice_engine(true, RecordingMedia::new());
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    engine.handle_voice_signal(audio(16));

    engine.interrupt_active().await;
    assert_eq!(engine.playback_state().phase, PlaybackPhase::Interrupted);
    assert!(
        !engine
            .coordinator()
            .should_accept(flashtalk_engine::Channel::Audio, &session_id)
    );

    engine.handle_voice_signal(audio(500));
    assert_eq!(log.appended_sizes(), [16]);
}

#[tokio::test]
async fn toggle_pause_resume_respects_synthesis_state() {
    let (engine, _api, _log) = voice_engine(true, RecordingMedia::new());
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    engine.handle_voice_signal(audio(8));

    assert_eq!(engine.toggle_pause_resume(), PlaybackPhase::Playing);

    engine.handle_voice_signal(control(ControlMessage::SynthesisFinished { session_id }));
    assert_eq!(engine.toggle_pause_resume(), PlaybackPhase::Paused);
    assert_eq!(engine.toggle_pause_resume(), PlaybackPhase::Playing);
}

#[tokio::test]
async fn synthesis_failure_keeps_text_streaming() {
    let (engine, api, _log) = voice_engine(true, RecordingMedia::deferred());
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    engine.handle_voice_signal(audio(8));

    engine.handle_voice_signal(control(ControlMessage::SynthesisFailed {
        session_id: session_id.clone(),
        reason: Some("voice model crashed".into()),
    }));
    assert_eq!(engine.playback_state().phase, PlaybackPhase::Error);
    assert!(!engine.registry().get(&session_id).unwrap().has_audio);

    api.feed(&session_id)
        .frame(r#"{"event":"message","data":"still here"}"#);
    wait_for_content(&engine, &session_id, "still here").await;
}

#[tokio::test]
async fn server_interrupt_signal_fences_session() {
    let (engine, api, _log) = voice_engine(true, RecordingMedia::new());
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();

    engine.handle_voice_signal(control(ControlMessage::Interrupted {
        session_id: session_id.clone(),
    }));

    assert_eq!(
        engine.registry().get(&session_id).unwrap().status,
        SessionStatus::Interrupted
    );
    assert_eq!(engine.playback_state().phase, PlaybackPhase::Interrupted);
    assert!(api.interrupts().is_empty(), "no call back to the server");
}

// ── Expressions ────────────────────────────────────────────────────

#[tokio::test]
async fn emotion_tokens_drive_expression() {
    let (engine, _api) = text_only();
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    let mut rx = engine.expression();

    let emotion = |text: &str| {
        control(ControlMessage::Emotion {
            session_id: Some(session_id.clone()),
            text: text.into(),
        })
    };

    engine.handle_voice_signal(emotion("Happy"));
    assert_eq!(*rx.borrow_and_update(), Expression::Happy);

    engine.handle_voice_signal(emotion("very happy"));
    assert!(!rx.has_changed().unwrap());

    engine.interrupt_active().await;
    assert_eq!(*rx.borrow_and_update(), Expression::Neutral);

    engine.handle_voice_signal(emotion("angry"));
    assert_eq!(*rx.borrow(), Expression::Neutral, "finished session is ignored");
}

// ── History and teardown ───────────────────────────────────────────

fn persisted_history() -> Vec<Message> {
    let question = Message::user(MessageId(1), "Explain card");
    let mut answer = Message::pending_assistant(MessageId(2));
    answer.content = "Hello wo".into();
    answer.session_id = Some(SessionId::new("open-1"));

    let mut finished = Message::pending_assistant(MessageId(3));
    finished.pending = false;
    finished.content = "Old answer".into();
    finished.session_id = Some(SessionId::new("done-0"));

    vec![question, answer, finished]
}

#[tokio::test]
async fn recover_history_is_idempotent() {
    let (engine, api) = text_only();
    let open = SessionId::new("open-1");

    let first = engine.recover_history(persisted_history()).await;
    let second = engine.recover_history(persisted_history()).await;

    assert_eq!(first, vec![open.clone()]);
    assert!(second.is_empty());
    assert_eq!(api.open_count(&open), 1);
    assert_eq!(api.open_count(&SessionId::new("done-0")), 0);
    assert_eq!(api.opened(), vec![(open.clone(), StreamKind::Recovery)]);
    assert_eq!(engine.registry().messages().len(), 3);
    assert_eq!(
        engine.registry().message_for(&open).unwrap().content,
        "Hello wo",
        "persisted text stands until the stream replays"
    );

    let feed = api.feed(&open);
    feed.frame(r#"{"event":"existing_content","data":"Hello wor"}"#);
    feed.frame(r#"{"event":"message","data":"ld"}"#);
    feed.frame(r#"{"event":"complete"}"#);
    wait_closed(&engine, &open).await;
    assert_eq!(
        engine.registry().message_for(&open).unwrap().content,
        "Hello world"
    );
}

#[tokio::test]
async fn recover_after_teardown_reopens_live_sessions() {
    let (engine, api) = text_only();
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    api.feed(&session_id)
        .frame(r#"{"event":"message","data":"Hel"}"#);
    wait_for_content(&engine, &session_id, "Hel").await;
    let closed = engine.text_closed(&session_id).unwrap();

    engine.teardown();
    timeout(Duration::from_secs(2), closed.cancelled())
        .await
        .expect("text stream should close");
    assert!(!engine.registry().is_processing(&session_id));

    let history = engine.registry().messages();
    let recovered = engine.recover_history(history.clone()).await;
    assert_eq!(recovered, vec![session_id.clone()]);
    assert_eq!(
        api.opened(),
        vec![
            (session_id.clone(), StreamKind::Live),
            (session_id.clone(), StreamKind::Recovery),
        ]
    );
    assert!(engine.registry().is_processing(&session_id));

    // Mounting again while the recovery stream runs opens nothing.
    assert!(engine.recover_history(history).await.is_empty());
    assert_eq!(api.open_count(&session_id), 2);

    let feed = api.feed(&session_id);
    feed.frame(r#"{"event":"existing_content","data":"Hello"}"#);
    feed.frame(r#"{"event":"message","data":" there"}"#);
    feed.frame(r#"{"event":"complete"}"#);
    wait_closed(&engine, &session_id).await;

    let answer = engine.registry().message_for(&session_id).unwrap();
    assert_eq!(answer.content, "Hello there");
    assert!(!answer.pending);
    assert_eq!(
        engine.registry().get(&session_id).unwrap().status,
        SessionStatus::Complete
    );
}

#[tokio::test]
async fn stream_open_failure_releases_audio() {
    let (engine, api, log) = voice_engine(true, RecordingMedia::new());
    api.fail_open_with(TransportError::Network("refused".into()));

    let err = engine.send("Explain card", ContextMode::Card).await.unwrap_err();
    assert!(matches!(err, EngineError::Stream(_)));

    let messages = engine.registry().messages();
    assert!(messages[1].error);
    let session_id = messages[1].session_id.clone().unwrap();
    assert_eq!(engine.coordinator().attached(&session_id), 0);
    assert_eq!(engine.playback_state().phase, PlaybackPhase::Interrupted);
    assert_eq!(log.count(&MediaCall::Open), 1);
    assert_eq!(log.count(&MediaCall::ReleaseElement), 1);
    assert_eq!(log.max_open_sets(), 1);
}

#[tokio::test]
async fn teardown_closes_everything_locally() {
    let (engine, api, log) = voice_engine(true, RecordingMedia::new());
    let session_id = engine.send("Explain card", ContextMode::Card).await.unwrap();
    engine.handle_voice_signal(audio(4));
    engine.handle_voice_signal(control(ControlMessage::Emotion {
        session_id: None,
        text: "thinking".into(),
    }));
    let closed = engine.text_closed(&session_id).unwrap();

    engine.teardown();

    timeout(Duration::from_secs(2), closed.cancelled())
        .await
        .expect("text stream should close");
    assert!(api.interrupts().is_empty());
    assert!(!engine.registry().is_processing(&session_id));
    assert_eq!(engine.playback_state().phase, PlaybackPhase::Interrupted);
    assert_eq!(*engine.expression().borrow(), Expression::Neutral);
    assert_eq!(log.count(&MediaCall::ReleaseElement), 1);

    let message = engine.registry().message_for(&session_id).unwrap();
    assert!(message.pending, "generation continues server-side");
}
