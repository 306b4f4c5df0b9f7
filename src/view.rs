//! Renderer-agnostic view model of the open conversation
//!
//! The controllers mutate a [`ConversationView`] the way a browser UI would
//! mutate its DOM; any renderer takes a snapshot and draws it.

use crate::model::{DeliveryStatus, Message, OtherUser};
use chrono::{DateTime, Utc};

/// Emojis offered by the reaction picker
pub const QUICK_EMOJIS: [&str; 13] = [
    "👍", "❤️", "😂", "😮", "😢", "😡", "🎉", "🔥", "👀", "🚀", "💯", "✅", "👎",
];

/// Prefix of local placeholder ids
pub const PENDING_PREFIX: &str = "pending-";

/// Lifecycle of the conversation view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewPhase {
    /// Nothing opened yet
    #[default]
    Idle,
    /// Resolving the conversation or fetching its first page
    Loading,
    /// Messages are shown
    Ready,
    /// The conversation could not be bootstrapped; terminal until reopened
    Error,
    /// Torn down
    Closed,
}

/// One user behind a reaction badge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reactor {
    /// User id
    pub user_id: String,
    /// User name
    pub username: String,
}

/// Aggregated reactions of one emoji on one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionBadge {
    /// The emoji
    pub emoji: String,
    /// Who reacted, in arrival order
    pub reactors: Vec<Reactor>,
    /// Whether the local user is among the reactors
    pub user_reacted: bool,
}

impl ReactionBadge {
    /// Number of reactions
    pub fn count(&self) -> usize {
        self.reactors.len()
    }
}

/// A message as drawn by a renderer
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    /// Server id, or a `pending-N` placeholder
    pub id: String,
    /// Sender user id
    pub sender_id: String,
    /// Text
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Sent by the local user
    pub outgoing: bool,
    /// Delivery indicator; only outgoing messages carry one
    pub status: Option<DeliveryStatus>,
    /// Reaction badges, in first-reaction order
    pub reactions: Vec<ReactionBadge>,
    /// Id of the quoted message
    pub reply_to: Option<String>,
}

impl RenderedMessage {
    /// Render a confirmed message
    pub fn from_message(message: &Message, outgoing: bool, self_id: Option<&str>) -> Self {
        let mut rendered = Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
            outgoing,
            status: outgoing.then(|| {
                if message.read_at.is_some() {
                    DeliveryStatus::Read
                } else {
                    DeliveryStatus::Sent
                }
            }),
            reactions: Vec::new(),
            reply_to: message.reply_to.clone(),
        };
        for reaction in &message.reactions {
            let is_self = self_id == Some(reaction.user_id.as_str());
            rendered.add_reaction(&reaction.emoji, &reaction.user_id, &reaction.username, is_self);
        }
        rendered
    }

    /// Render a local placeholder for a message being sent
    pub fn pending(id: String, sender_id: String, content: String, reply_to: Option<String>) -> Self {
        Self {
            id,
            sender_id,
            content,
            created_at: Utc::now(),
            outgoing: true,
            status: Some(DeliveryStatus::Pending),
            reactions: Vec::new(),
            reply_to,
        }
    }

    /// Whether this is an unacknowledged or failed local placeholder
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PENDING_PREFIX)
    }

    /// Whether `user_id` is on the badge of `emoji`
    pub fn has_reaction(&self, user_id: &str, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|b| b.emoji == emoji && b.reactors.iter().any(|r| r.user_id == user_id))
    }

    /// Add one reactor to a badge; false if already there
    pub fn add_reaction(&mut self, emoji: &str, user_id: &str, username: &str, is_self: bool) -> bool {
        if self.has_reaction(user_id, emoji) {
            return false;
        }
        let reactor = Reactor {
            user_id: user_id.to_string(),
            username: username.to_string(),
        };
        match self.reactions.iter_mut().find(|b| b.emoji == emoji) {
            Some(badge) => {
                badge.reactors.push(reactor);
                badge.user_reacted |= is_self;
            }
            None => self.reactions.push(ReactionBadge {
                emoji: emoji.to_string(),
                reactors: vec![reactor],
                user_reacted: is_self,
            }),
        }
        true
    }

    /// Remove one reactor from a badge, dropping the badge when empty; false if absent
    pub fn remove_reaction(&mut self, emoji: &str, user_id: &str, is_self: bool) -> bool {
        let Some(index) = self.reactions.iter().position(|b| b.emoji == emoji) else {
            return false;
        };
        let badge = &mut self.reactions[index];
        let before = badge.reactors.len();
        badge.reactors.retain(|r| r.user_id != user_id);
        if badge.reactors.len() == before {
            return false;
        }
        if is_self {
            badge.user_reacted = false;
        }
        if badge.reactors.is_empty() {
            self.reactions.remove(index);
        }
        true
    }

    /// Badge of one emoji
    pub fn badge(&self, emoji: &str) -> Option<&ReactionBadge> {
        self.reactions.iter().find(|b| b.emoji == emoji)
    }
}

/// A message quoted by the next send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Quoted message id
    pub message_id: String,
    /// Quoted text
    pub content: String,
    /// "You" or the counterpart's username
    pub sender_label: String,
}

/// The one popover that may be open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popover {
    /// Quick emoji picker for a message
    EmojiPicker(String),
    /// Options menu (react, reply) for a message
    Options(String),
}

impl Popover {
    /// Message the popover is anchored to
    pub fn message_id(&self) -> &str {
        match self {
            Popover::EmojiPicker(id) | Popover::Options(id) => id,
        }
    }
}

/// Render target of the Conversation View Controller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationView {
    /// Lifecycle phase
    pub phase: ViewPhase,
    /// Username the view was opened with
    pub username: String,
    /// Resolved conversation id
    pub conversation_id: Option<String>,
    /// Counterpart, once resolved
    pub counterpart: Option<OtherUser>,
    /// Whether the composer is enabled
    pub interactive: bool,
    /// Messages, oldest first
    pub messages: Vec<RenderedMessage>,
    /// Counterpart username while they are typing
    pub typing: Option<String>,
    /// Whether older pages exist
    pub has_more: bool,
    /// An older page is being fetched
    pub loading_older: bool,
    /// Terminal bootstrap error
    pub error: Option<String>,
    /// Inline error of the last read operation
    pub load_error: Option<String>,
    /// Number of messages inserted on top by the last older page
    pub scroll_anchor: usize,
    /// Composer text
    pub draft: String,
}

impl ConversationView {
    /// A view that is resolving `username`
    pub fn loading(username: &str) -> Self {
        Self {
            phase: ViewPhase::Loading,
            username: username.to_string(),
            ..Self::default()
        }
    }

    /// A torn-down view
    pub fn closed() -> Self {
        Self {
            phase: ViewPhase::Closed,
            ..Self::default()
        }
    }

    /// Whether the view currently shows a conversation
    pub fn is_open(&self) -> bool {
        matches!(self.phase, ViewPhase::Loading | ViewPhase::Ready)
    }

    /// Hint shown when the conversation is empty
    pub fn empty_hint(&self) -> Option<String> {
        if self.phase != ViewPhase::Ready || !self.messages.is_empty() || self.load_error.is_some() {
            return None;
        }
        let name = self
            .counterpart
            .as_ref()
            .map(|u| u.username.as_str())
            .unwrap_or(&self.username);
        Some(match self.counterpart.as_ref().map(|u| u.has_account) {
            Some(false) => format!(
                "{} is not on GH Chat yet. Your message will be waiting when they join.",
                name
            ),
            _ => format!("No messages yet. Say hi to {}!", name),
        })
    }

    /// Whether a message with this id is shown
    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    /// Look up a shown message
    pub fn message(&self, message_id: &str) -> Option<&RenderedMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Mutable lookup
    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut RenderedMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Oldest confirmed message id
    pub fn oldest_confirmed_id(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| !m.is_placeholder())
            .map(|m| m.id.as_str())
    }

    /// Replace confirmed messages, keeping local placeholders at the bottom
    pub fn render_messages(&mut self, messages: Vec<RenderedMessage>) {
        let placeholders: Vec<RenderedMessage> = self
            .messages
            .drain(..)
            .filter(RenderedMessage::is_placeholder)
            .collect();
        self.messages = messages;
        self.messages.extend(placeholders);
    }

    /// Add a confirmed message after the last one not newer than it
    ///
    /// Returns false when the id is already shown.
    pub fn insert(&mut self, message: RenderedMessage) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        let position = self
            .messages
            .iter()
            .rposition(|m| !m.is_placeholder() && m.created_at <= message.created_at)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.messages.insert(position, message);
        true
    }

    /// Put an older page on top, returning how many were inserted
    pub fn prepend(&mut self, older: Vec<RenderedMessage>) -> usize {
        let fresh: Vec<RenderedMessage> = older
            .into_iter()
            .filter(|m| !self.contains(&m.id))
            .collect();
        let inserted = fresh.len();
        self.messages.splice(0..0, fresh);
        self.scroll_anchor = inserted;
        inserted
    }

    /// Flip a sent message to read; false if it is not an outgoing sent message
    pub fn mark_read(&mut self, message_id: &str) -> bool {
        match self.message_mut(message_id) {
            Some(m) if m.outgoing && m.status == Some(DeliveryStatus::Sent) => {
                m.status = Some(DeliveryStatus::Read);
                true
            }
            _ => false,
        }
    }
}
