//! Ask command handler.

use anyhow::Result;
use flashtalk_core::{ContextMode, EngineSettings};
use tracing::info;

use super::{build_engine, follow, report};
use crate::error::CliError;

/// Ask about a card (or one chunk of it) and stream the answer to stdout.
pub async fn execute(
    settings: &EngineSettings,
    card: String,
    chunk: Option<String>,
    prompt: &str,
) -> Result<()> {
    let engine = build_engine(card, settings)?;
    let context_mode = chunk.map_or(ContextMode::Card, |chunk_id| ContextMode::Chunk { chunk_id });

    let session_id = engine
        .send(prompt, context_mode)
        .await
        .map_err(CliError::from)?;
    info!(%session_id, "Streaming answer");

    let followed = follow(&engine, &session_id).await;
    engine.teardown();
    report(&engine, &session_id, &followed?)
}
