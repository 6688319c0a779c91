//! Character expression sync.
//!
//! The synthesis stream carries free-text emotion tokens ("a little
//! embarrassed", "HAPPY!"). They are mapped onto a closed set of
//! expressions and published only when the expression actually changes.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Character expression states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Thinking,
    Embarrassed,
}

impl Expression {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Thinking => "thinking",
            Self::Embarrassed => "embarrassed",
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword table, scanned in order; first substring match wins.
///
/// Negated forms come before the words they contain.
const KEYWORDS: &[(&str, Expression)] = &[
    ("unhappy", Expression::Sad),
    ("happy", Expression::Happy),
    ("joy", Expression::Happy),
    ("excited", Expression::Happy),
    ("cheerful", Expression::Happy),
    ("smil", Expression::Happy),
    ("sad", Expression::Sad),
    ("sorry", Expression::Sad),
    ("disappoint", Expression::Sad),
    ("angry", Expression::Angry),
    ("annoyed", Expression::Angry),
    ("frustrat", Expression::Angry),
    ("surpris", Expression::Surprised),
    ("shock", Expression::Surprised),
    ("amazed", Expression::Surprised),
    ("think", Expression::Thinking),
    ("ponder", Expression::Thinking),
    ("curious", Expression::Thinking),
    ("embarrass", Expression::Embarrassed),
    ("shy", Expression::Embarrassed),
    ("blush", Expression::Embarrassed),
    ("neutral", Expression::Neutral),
    ("calm", Expression::Neutral),
];

/// Map free text to an expression, if any keyword matches.
pub fn classify(text: &str) -> Option<Expression> {
    let lowered = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|&(_, expression)| expression)
}

/// Distinct-until-changed expression state.
#[derive(Debug)]
pub struct EmotionSync {
    tx: watch::Sender<Expression>,
}

impl Default for EmotionSync {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionSync {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Expression::Neutral);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Expression> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Expression {
        *self.tx.borrow()
    }

    /// Apply one emotion token. Returns the new expression if it changed.
    pub fn on_emotion_token(&self, text: &str) -> Option<Expression> {
        let Some(next) = classify(text) else {
            tracing::trace!(token = text, "Unrecognised emotion token");
            return None;
        };
        self.set(next).then_some(next)
    }

    /// Return to neutral.
    pub fn reset(&self) {
        self.set(Expression::Neutral);
    }

    fn set(&self, next: Expression) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::debug!(expression = %next, "Expression changed");
        }
        changed
    }
}
