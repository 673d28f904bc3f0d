//! Continue/terminate routing
//!
//! The router looks only at the last message. A reply containing
//! [`FINAL_ANSWER_MARKER`] anywhere in its text (case-sensitive) ends the run.

use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::state::{ConversationState, Message};

/// Marker an agent puts in front of its final deliverable.
pub const FINAL_ANSWER_MARKER: &str = "FINAL ANSWER";

/// Routing decision, recomputed on every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    Continue,
    Terminate,
}

impl RouteDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteDecision::Continue => "continue",
            RouteDecision::Terminate => "terminate",
        }
    }
}

impl std::fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn contains_final_answer(text: &str) -> bool {
    text.contains(FINAL_ANSWER_MARKER)
}

/// Decide whether the collaboration continues.
pub fn route(state: &ConversationState) -> Result<RouteDecision, RouteError> {
    let last = state.last().ok_or(RouteError::EmptyState)?;
    if contains_final_answer(&last.text()) {
        Ok(RouteDecision::Terminate)
    } else {
        Ok(RouteDecision::Continue)
    }
}

/// Completion flag attached to every step record.
///
/// Consumers read this instead of searching message text themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "answer", rename_all = "snake_case")]
pub enum Completion {
    Continue,
    Final(String),
}

impl Completion {
    pub fn from_message(message: &Message) -> Self {
        Self::from_text(&message.text())
    }

    /// `Final` carries the text after the first marker, or the whole text
    /// when nothing follows it.
    pub fn from_text(text: &str) -> Self {
        match text.find(FINAL_ANSWER_MARKER) {
            Some(index) => {
                let answer = text[index + FINAL_ANSWER_MARKER.len()..]
                    .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
                    .trim_end();
                if answer.is_empty() {
                    Completion::Final(text.trim().to_string())
                } else {
                    Completion::Final(answer.to_string())
                }
            }
            None => Completion::Continue,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Completion::Final(_))
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Completion::Final(answer) => Some(answer),
            Completion::Continue => None,
        }
    }

    pub fn decision(&self) -> RouteDecision {
        match self {
            Completion::Continue => RouteDecision::Continue,
            Completion::Final(_) => RouteDecision::Terminate,
        }
    }
}
