//! Subcommand definitions.

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question about a card and stream the answer
    Ask {
        /// Card the question is about
        #[arg(long, env = "FLASHTALK_CARD")]
        card: String,

        /// Scope the question to one chunk of the card
        #[arg(long)]
        chunk: Option<String>,

        /// Request synthesized speech as well
        #[arg(long)]
        voice: bool,

        /// The question
        prompt: String,
    },

    /// Re-attach to a generation that is still running
    Resume {
        /// Card the session belongs to
        #[arg(long, env = "FLASHTALK_CARD")]
        card: String,

        /// Session to recover
        session_id: String,

        /// Text already shown for this session, if any
        #[arg(long, default_value = "")]
        partial: String,
    },

    /// Ask the backend to stop a session
    Interrupt {
        /// Session to stop
        session_id: String,
    },
}

impl Commands {
    /// `Some(true)` when the command explicitly asks for speech.
    pub const fn voice_override(&self) -> Option<bool> {
        match self {
            Self::Ask { voice: true, .. } => Some(true),
            _ => None,
        }
    }
}
