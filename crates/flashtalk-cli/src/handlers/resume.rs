//! Resume command handler.
//!
//! Rebuilds the minimal history a view would have persisted (one pending
//! assistant message bound to the session) and lets the engine recover it
//! through the status stream.

use anyhow::{Result, bail};
use flashtalk_core::{EngineSettings, Message, MessageId, SessionId};

use super::{build_engine, follow, report};

pub async fn execute(
    settings: &EngineSettings,
    card: String,
    session_id: String,
    partial: String,
) -> Result<()> {
    let engine = build_engine(card, settings)?;
    let session_id = SessionId::new(session_id);

    let mut message = Message::pending_assistant(MessageId(1));
    message.content = partial;
    message.session_id = Some(session_id.clone());

    let recovered = engine.recover_history(vec![message]).await;
    if !recovered.contains(&session_id) {
        bail!("could not re-attach to session {session_id}");
    }

    let followed = follow(&engine, &session_id).await;
    engine.teardown();
    report(&engine, &session_id, &followed?)
}
