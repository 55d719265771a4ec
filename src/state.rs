//! UI-agnostic chat state types
//!
//! The transcript, its messages and the transient pending indicator. These
//! don't depend on ratatui so the pipeline can run against any view.

use serde::{Deserialize, Serialize};

/// Position of a message in the transcript
pub type MessageId = usize;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    User,
    Bot,
}

/// Lifecycle of a message on screen.
///
/// `Pending` messages are hidden entirely; the welcome message sits here
/// until its reveal starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderState {
    Pending,
    Animating,
    Complete,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: Author,
    /// Plain text while animating, link markup once complete
    pub content: String,
    pub render_state: RenderState,
}

impl Message {
    pub fn is_visible(&self) -> bool {
        self.render_state != RenderState::Pending
    }
}

/// Transient marker shown while waiting on something external
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingIndicator {
    /// Voice recognizer session is open
    Listening,
    /// Image submitted, waiting on the backend
    Analyzing,
    /// Text submitted, waiting on the backend
    Typing,
}

impl PendingIndicator {
    /// Label rendered with the animated dots
    pub fn label(&self) -> &'static str {
        match self {
            PendingIndicator::Listening => "Listening",
            PendingIndicator::Analyzing => "Analyzing image",
            PendingIndicator::Typing => "Typing",
        }
    }
}

/// Append-only, ordered list of messages
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, author: Author, content: String, render_state: RenderState) -> MessageId {
        let id = self.messages.len();
        self.messages.push(Message {
            id,
            author,
            content,
            render_state,
        });
        id
    }

    /// Replace content and state of an existing message. Returns `false`
    /// when the id is unknown, leaving the transcript untouched.
    pub fn update(&mut self, id: MessageId, content: String, render_state: RenderState) -> bool {
        match self.messages.get_mut(id) {
            Some(msg) => {
                msg.content = content;
                msg.render_state = render_state;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Messages that should be drawn (hidden ones skipped)
    pub fn visible(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_visible())
    }

    /// Most recent completed bot message, if any
    pub fn last_complete_bot(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.author == Author::Bot && m.render_state == RenderState::Complete)
    }

    /// Number of bot messages not yet complete
    pub fn in_flight_bot_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.author == Author::Bot && m.render_state != RenderState::Complete)
            .count()
    }
}
