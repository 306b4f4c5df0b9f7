//! Conversation management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The participant on the other side of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherUser {
    /// User ID
    pub id: String,
    /// Login name
    pub username: String,
    /// Display name, if the user set one
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Whether the user has signed up for chat yet
    #[serde(default = "default_has_account")]
    pub has_account: bool,
}

fn default_has_account() -> bool {
    true
}

impl OtherUser {
    /// Name to show in headers and list rows
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }

    /// Avatar URL, falling back to the profile picture of the username
    pub fn avatar(&self) -> String {
        self.avatar_url
            .clone()
            .unwrap_or_else(|| format!("https://github.com/{}.png", self.username))
    }
}

/// A one-to-one conversation as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID
    pub id: String,
    /// The counterpart (self is implicit)
    pub other_user: OtherUser,
    /// Preview of the newest message
    #[serde(default)]
    pub last_message: Option<String>,
    /// Time of the newest message
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
    /// Last update of the conversation record
    pub updated_at: DateTime<Utc>,
    /// Number of messages the local user has not read
    #[serde(default)]
    pub unread_count: u32,
}

/// Summary row of the conversation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPreview {
    /// Conversation ID
    pub conversation_id: String,
    /// Counterpart user ID
    pub user_id: String,
    /// Counterpart login name
    pub username: String,
    /// Counterpart display name
    pub display_name: String,
    /// Counterpart avatar URL
    pub avatar: String,
    /// Text of the newest message
    pub last_message: String,
    /// Time of the newest message (Unix milliseconds)
    pub last_message_time: i64,
    /// Whether there is anything unread
    pub unread: bool,
    /// Number of unread messages
    pub unread_count: u32,
    /// Whether the counterpart has signed up yet
    pub has_account: bool,
}

impl From<&Conversation> for ChatPreview {
    fn from(conv: &Conversation) -> Self {
        let last_message_time = conv
            .last_message_time
            .unwrap_or(conv.updated_at)
            .timestamp_millis();

        Self {
            conversation_id: conv.id.clone(),
            user_id: conv.other_user.id.clone(),
            username: conv.other_user.username.clone(),
            display_name: conv.other_user.label().to_string(),
            avatar: conv.other_user.avatar(),
            last_message: conv.last_message.clone().unwrap_or_default(),
            last_message_time,
            unread: conv.unread_count > 0,
            unread_count: conv.unread_count,
            has_account: conv.other_user.has_account,
        }
    }
}

impl ChatPreview {
    /// Record a new inbound message on this row
    pub fn record_incoming(&mut self, content: &str, at: DateTime<Utc>) {
        self.last_message = content.to_string();
        self.last_message_time = at.timestamp_millis();
        self.unread = true;
        self.unread_count += 1;
    }

    /// Record a message sent by the local user (from another device)
    pub fn record_outgoing(&mut self, content: &str, at: DateTime<Utc>) {
        self.last_message = content.to_string();
        self.last_message_time = at.timestamp_millis();
    }

    /// Mark every message as read
    pub fn mark_read(&mut self) {
        self.unread = false;
        self.unread_count = 0;
    }
}
