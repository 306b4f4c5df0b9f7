//! Realtime wire protocol
//!
//! Frames are JSON text messages of the form `{"type": ..., "data": {...}}`.

use crate::model::Message;
use serde::{Deserialize, Serialize};

/// Frames sent FROM the client TO the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe to events of one conversation
    Join { conversation_id: String },
    /// Drop the subscription of one conversation
    Leave { conversation_id: String },
    /// The local user is typing
    Typing { conversation_id: String },
    /// The local user stopped typing
    StopTyping { conversation_id: String },
}

/// Events pushed FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new message was stored
    NewMessage { message: Message },
    /// A participant started typing
    Typing {
        conversation_id: String,
        user_id: String,
        username: String,
    },
    /// A participant stopped typing
    StopTyping {
        conversation_id: String,
        user_id: String,
    },
    /// The counterpart read some messages
    MessagesRead {
        conversation_id: String,
        message_ids: Vec<String>,
    },
    /// A reaction was added
    ReactionAdded {
        conversation_id: String,
        message_id: String,
        emoji: String,
        user_id: String,
        username: String,
    },
    /// A reaction was removed
    ReactionRemoved {
        conversation_id: String,
        message_id: String,
        emoji: String,
        user_id: String,
        username: String,
    },
    /// The server rejected a frame
    Error { message: String },
}

impl ServerEvent {
    /// Returns the conversation this event is scoped to.
    /// Events that return `None` are connection-wide.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::NewMessage { message } => Some(&message.conversation_id),
            Self::Typing { conversation_id, .. }
            | Self::StopTyping { conversation_id, .. }
            | Self::MessagesRead { conversation_id, .. }
            | Self::ReactionAdded { conversation_id, .. }
            | Self::ReactionRemoved { conversation_id, .. } => Some(conversation_id),
            Self::Error { .. } => None,
        }
    }
}

/// Direction of a reaction event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionChange {
    /// The reaction was added
    Added,
    /// The reaction was removed
    Removed,
}

impl ReactionChange {
    /// Whether this change adds a reaction
    pub fn is_add(self) -> bool {
        matches!(self, Self::Added)
    }

    /// The change that undoes this one
    pub fn inverse(self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
        }
    }
}
