//! Command handlers.
//!
//! Handlers follow one pattern:
//! - Signature: `pub async fn execute(settings: &EngineSettings, ...) -> Result<()>`
//! - Build the engine (or the bare API for `interrupt`), run the command,
//!   render to the terminal.
//!
//! Interrupt and recovery logic stays in the engine; handlers only drive it.

pub mod ask;
pub mod interrupt;
pub mod resume;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use flashtalk_core::{EngineSettings, Message, SessionId, SessionStatus};
use flashtalk_engine::ConversationEngine;
use flashtalk_stream::HttpSessionApi;
use flashtalk_voice::UnsupportedMediaBackend;
use tracing::debug;

use crate::error::CliError;
use crate::presentation::TranscriptPrinter;

/// Compose an engine talking to the configured backend.
///
/// The terminal has no streaming media pipeline, so audio always falls back
/// to text for the session.
pub(crate) fn build_engine(
    card: String,
    settings: &EngineSettings,
) -> Result<ConversationEngine> {
    let api = HttpSessionApi::new(settings).map_err(CliError::from)?;
    let media = UnsupportedMediaBackend::new("the terminal client has no audio output");
    Ok(ConversationEngine::from_settings(
        card,
        Arc::new(api),
        Box::new(media),
        settings,
    ))
}

/// Print a session's answer as it streams, until its text stream stops.
///
/// Ctrl-C interrupts the session instead of killing the process, so the
/// backend stops generating too.
pub(crate) async fn follow(
    engine: &ConversationEngine,
    session_id: &SessionId,
) -> Result<Message> {
    let closed = engine
        .text_closed(session_id)
        .with_context(|| format!("no text stream for session {session_id}"))?;
    let mut messages = engine.messages();
    let mut printer = TranscriptPrinter::new();
    let mut stdout = io::stdout();

    loop {
        let content = messages
            .borrow_and_update()
            .iter()
            .find(|m| m.session_id.as_ref() == Some(session_id))
            .map(|m| m.content.clone())
            .unwrap_or_default();
        printer.update(&mut stdout, &content)?;

        tokio::select! {
            () = closed.cancelled() => break,
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!(%session_id, "Ctrl-C received");
                engine.interrupt_active().await;
                break;
            }
        }
    }

    let message = engine
        .registry()
        .message_for(session_id)
        .with_context(|| format!("session {session_id} is not tracked"))?;
    printer.update(&mut stdout, &message.content)?;
    printer.finish(&mut stdout)?;
    Ok(message)
}

/// Turn the session's final state into the command result.
pub(crate) fn report(
    engine: &ConversationEngine,
    session_id: &SessionId,
    message: &Message,
) -> Result<()> {
    let status = engine.registry().get(session_id).map(|s| s.status);
    if message.error || status == Some(SessionStatus::Error) {
        return Err(CliError::Generation(format!("session {session_id} ended with an error")).into());
    }
    match status {
        Some(SessionStatus::Complete) => {}
        Some(SessionStatus::Interrupted) => eprintln!("[interrupted]"),
        _ => eprintln!(
            "[stream closed before completion; continue with `flashtalk resume --card <card> {session_id}`]"
        ),
    }
    Ok(())
}
