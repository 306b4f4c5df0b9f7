//! External collaborator contracts
//!
//! The engine talks to the backend only through these traits, so any
//! transport (the bundled [`HttpApi`], a test double, an extension
//! background bridge) can stand behind it.
//!
//! Server guarantee relied upon by the engine: the realtime channel never
//! echoes a sender's own `new_message` back to that sender. Messages sent
//! by the local user reach the cache through the `send_message`
//! acknowledgement only. The client still de-duplicates by id and ignores
//! self-sent messages on the stream, so a server that breaks the guarantee
//! produces no duplicates.

pub(crate) mod http;

pub use http::HttpApi;

use crate::{
    model::{Conversation, CurrentUser, Message, MessagePage},
    Result,
};
use async_trait::async_trait;

/// REST operations consumed by the conversation engine
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Resolve the conversation with `username`, creating it if needed
    ///
    /// Idempotent; safe to call every time a conversation view opens.
    async fn get_or_create_conversation(&self, username: &str) -> Result<Conversation>;

    /// Fetch a page of messages, newest last
    ///
    /// With `before`, returns the page immediately older than that message.
    async fn get_messages(
        &self,
        conversation_id: &str,
        before: Option<&str>,
    ) -> Result<MessagePage>;

    /// Send a text message; an `Err` means nothing was stored
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<Message>;

    /// Add a reaction; `Ok(false)` means the server refused it
    async fn add_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<bool>;

    /// Remove a reaction; `Ok(false)` means the server refused it
    async fn remove_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<bool>;

    /// Mark individual messages as read
    async fn mark_messages_as_read(&self, message_ids: &[String]) -> Result<()>;

    /// Mark a whole conversation as read
    async fn mark_conversation_as_read(&self, conversation_id: &str) -> Result<()>;

    /// Conversation summaries for the list view, most recent first
    async fn get_conversations(&self) -> Result<Vec<Conversation>>;
}

/// Identity resolution, owned by the auth collaborator
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` when signed out
    async fn current_user(&self) -> Result<Option<CurrentUser>>;
}
