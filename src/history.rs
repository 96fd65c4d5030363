//! Bounded conversation history.
//!
//! The window keeps the most recent turns in insertion order and evicts the
//! oldest once the bound is exceeded. It is owned by a single session and
//! mutated only between turns, so it needs no locking.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Default number of turns kept in the window.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person talking to the assistant.
    User,
    /// The assistant.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create an assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    /// The turn's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The turn's text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Ordered, size-bounded sequence of turns.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    /// Turns in insertion order (oldest first).
    turns: VecDeque<Turn>,
    /// Maximum number of turns to retain.
    max_turns: usize,
}

impl HistoryWindow {
    /// Create an empty window holding at most `max_turns` turns.
    ///
    /// A bound of zero is raised to one so the latest turn is always kept.
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Append a turn, evicting the oldest ones if over the bound.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Remove the newest turn if it is an unanswered user turn.
    ///
    /// Returns the retracted turn. Assistant turns are never retracted.
    pub fn retract_last_user(&mut self) -> Option<Turn> {
        match self.turns.back() {
            Some(turn) if turn.role == Role::User => self.turns.pop_back(),
            _ => None,
        }
    }

    /// Replace the contents with `turns`, keeping only the most recent ones.
    pub fn replace(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.clear();
        for turn in turns {
            self.push(turn);
        }
    }

    /// Drop every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Iterate turns oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Snapshot of the turns, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// The newest turn, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    /// Number of turns held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The configured bound.
    #[must_use]
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}
