//! Decoding of socket transport messages.
//!
//! Binary messages are raw audio frames for whichever session currently
//! carries audio. Text messages are JSON control messages tagged by `type`.

use bytes::Bytes;
use flashtalk_core::SessionId;
use serde::Deserialize;

use crate::error::VoiceError;

/// JSON control messages of the voice channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    SynthesisStarted {
        #[serde(rename = "sessionId", alias = "session_id")]
        session_id: SessionId,
    },
    SynthesisFinished {
        #[serde(rename = "sessionId", alias = "session_id")]
        session_id: SessionId,
    },
    SynthesisFailed {
        #[serde(rename = "sessionId", alias = "session_id")]
        session_id: SessionId,
        #[serde(default)]
        reason: Option<String>,
    },
    Interrupted {
        #[serde(rename = "sessionId", alias = "session_id")]
        session_id: SessionId,
    },
    Emotion {
        #[serde(default, rename = "sessionId", alias = "session_id")]
        session_id: Option<SessionId>,
        text: String,
    },
}

impl ControlMessage {
    /// Session the message refers to, if it names one.
    pub const fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::SynthesisStarted { session_id }
            | Self::SynthesisFinished { session_id }
            | Self::SynthesisFailed { session_id, .. }
            | Self::Interrupted { session_id } => Some(session_id),
            Self::Emotion { session_id, .. } => session_id.as_ref(),
        }
    }
}

/// One inbound message of the socket transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceSignal {
    /// Encoded audio bytes.
    AudioFrame(Bytes),
    Control(ControlMessage),
}

impl VoiceSignal {
    /// Decode a text (JSON) socket message.
    pub fn from_text(text: &str) -> Result<Self, VoiceError> {
        serde_json::from_str(text)
            .map(Self::Control)
            .map_err(|e| VoiceError::InvalidSignal(e.to_string()))
    }

    pub const fn from_binary(data: Bytes) -> Self {
        Self::AudioFrame(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_control_messages() {
        let signal =
            VoiceSignal::from_text(r#"{"type":"synthesis_finished","sessionId":"s-1"}"#).unwrap();
        assert_eq!(
            signal,
            VoiceSignal::Control(ControlMessage::SynthesisFinished {
                session_id: SessionId::new("s-1")
            })
        );

        let failed =
            VoiceSignal::from_text(r#"{"type":"synthesis_failed","session_id":"s-2"}"#).unwrap();
        assert!(matches!(
            failed,
            VoiceSignal::Control(ControlMessage::SynthesisFailed { reason: None, .. })
        ));
    }

    #[test]
    fn emotion_session_is_optional() {
        let VoiceSignal::Control(message) =
            VoiceSignal::from_text(r#"{"type":"emotion","text":"happy"}"#).unwrap()
        else {
            panic!("expected control message");
        };
        assert_eq!(message.session_id(), None);
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            VoiceSignal::from_text(r#"{"type":"dance"}"#),
            Err(VoiceError::InvalidSignal(_))
        ));
    }
}
