//! Message structures, reactions and delivery status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery status of a message as shown to the local user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Optimistic placeholder, not yet acknowledged by the server
    Pending,
    /// Acknowledged by the server
    Sent,
    /// Read by the counterpart
    Read,
    /// The send call failed; the user has to resend manually
    Failed,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self::Sent
    }
}

impl DeliveryStatus {
    /// Get human-readable delivery status indicator
    pub fn status_indicator(&self) -> &str {
        match self {
            DeliveryStatus::Pending => "◷",
            DeliveryStatus::Sent => "✓",
            DeliveryStatus::Read => "✓✓",
            DeliveryStatus::Failed => "✗",
        }
    }

    /// Get short status text
    pub fn status_text(&self) -> &str {
        match self {
            DeliveryStatus::Pending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// An emoji reaction left by a user on a message
///
/// Reactions have no identifier of their own; at most one exists per
/// (message, user, emoji).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// The emoji
    pub emoji: String,
    /// Reacting user id
    pub user_id: String,
    /// Reacting user name
    pub username: String,
}

/// A confirmed message as stored by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned message ID
    pub id: String,
    /// Conversation the message belongs to
    pub conversation_id: String,
    /// Sender user ID
    pub sender_id: String,
    /// Message text
    pub content: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the recipient read the message, if they did
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    /// Reactions on this message
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Message this one replies to
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl Message {
    /// Create a new message without reactions or read receipt
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            created_at,
            read_at: None,
            reactions: Vec::new(),
            reply_to: None,
        }
    }

    /// Whether `user_id` already reacted with `emoji`
    pub fn has_reaction(&self, user_id: &str, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.user_id == user_id && r.emoji == emoji)
    }

    /// Add a reaction, returning false if the (user, emoji) pair was already present
    pub fn add_reaction(&mut self, emoji: &str, user_id: &str, username: &str) -> bool {
        if self.has_reaction(user_id, emoji) {
            return false;
        }
        self.reactions.push(Reaction {
            emoji: emoji.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
        });
        true
    }

    /// Remove a reaction, returning false if it was absent
    pub fn remove_reaction(&mut self, emoji: &str, user_id: &str) -> bool {
        let before = self.reactions.len();
        self.reactions
            .retain(|r| !(r.user_id == user_id && r.emoji == emoji));
        self.reactions.len() != before
    }

    /// Whether the message is unread from the point of view of `reader_id`
    pub fn is_unread_for(&self, reader_id: &str) -> bool {
        self.sender_id != reader_id && self.read_at.is_none()
    }
}

/// One page of conversation history, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Messages in the page (newest last)
    pub messages: Vec<Message>,
    /// Whether older messages exist before this page
    #[serde(default)]
    pub has_more: bool,
}
