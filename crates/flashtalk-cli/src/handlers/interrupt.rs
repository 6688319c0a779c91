//! Interrupt command handler.

use anyhow::Result;
use flashtalk_core::{EngineSettings, SessionApi, SessionId};
use flashtalk_stream::HttpSessionApi;

use crate::error::CliError;

/// Ask the backend to stop generating for a session.
///
/// Unlike the in-process interrupt, there is no local state to fence here:
/// another client owns the stream.
pub async fn execute(settings: &EngineSettings, session_id: String) -> Result<()> {
    let api = HttpSessionApi::new(settings).map_err(CliError::from)?;
    let session_id = SessionId::new(session_id);
    api.interrupt(&session_id).await.map_err(CliError::from)?;
    println!("Interrupted session {session_id}");
    Ok(())
}
