// Shared test doubles and fixtures

use crate::api::{ChatApi, IdentityProvider};
use crate::cache::{ListCache, MessageCache, SharedListCache, SharedMessageCache};
use crate::channel::{ChannelClient, ChannelConfig};
use crate::config::Settings;
use crate::conversation::{ConversationController, ConversationState};
use crate::model::{Conversation, CurrentUser, Message, MessagePage, OtherUser};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const ME_ID: &str = "u-alice";
pub const OTHER_ID: &str = "u-bob";
pub const CONV_ID: &str = "C123";

/// A call recorded by [`MockApi`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetOrCreate(String),
    GetMessages(String, Option<String>),
    Send(String, String, Option<String>),
    AddReaction(String, String, String),
    RemoveReaction(String, String, String),
    MarkMessagesRead(Vec<String>),
    MarkConversationRead(String),
    GetConversations,
}

/// In-memory backend with call recording and failure injection
#[derive(Default)]
pub struct MockApi {
    pub calls: Mutex<Vec<Call>>,
    pub conversation: Mutex<Option<Conversation>>,
    pub pages: Mutex<HashMap<(String, Option<String>), MessagePage>>,
    pub conversations: Mutex<Vec<Conversation>>,
    pub fail_send: AtomicBool,
    pub fail_messages: AtomicBool,
    pub fail_conversations: AtomicBool,
    pub fail_reactions: AtomicBool,
    pub refuse_reactions: AtomicBool,
    pub older_gate: Mutex<Option<Arc<Notify>>>,
    pub newest_gate: Mutex<Option<Arc<Notify>>>,
    next_id: AtomicU64,
}

impl MockApi {
    /// Backend knowing the conversation with bob
    pub fn new() -> Self {
        let api = Self::default();
        *api.conversation.lock() = Some(create_test_conversation(CONV_ID, "bob", 0));
        api
    }

    pub fn with_page(self, conversation_id: &str, before: Option<&str>, page: MessagePage) -> Self {
        self.pages.lock().insert(
            (conversation_id.to_string(), before.map(str::to_string)),
            page,
        );
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn mark_read_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::MarkMessagesRead(_) | Call::MarkConversationRead(_)))
    }

    /// Make older-page fetches wait until the returned notify fires
    pub fn gate_older_pages(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.older_gate.lock() = Some(gate.clone());
        gate
    }

    /// Make newest-page fetches wait until the returned notify fires
    pub fn gate_newest_page(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.newest_gate.lock() = Some(gate.clone());
        gate
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn get_or_create_conversation(&self, username: &str) -> Result<Conversation> {
        self.record(Call::GetOrCreate(username.to_string()));
        let conversation = self.conversation.lock().clone();
        conversation.ok_or_else(|| Error::Bootstrap(format!("user {} not found", username)))
    }

    async fn get_messages(&self, conversation_id: &str, before: Option<&str>) -> Result<MessagePage> {
        self.record(Call::GetMessages(
            conversation_id.to_string(),
            before.map(str::to_string),
        ));
        let gate = match before {
            Some(_) => self.older_gate.lock().clone(),
            None => self.newest_gate.lock().clone(),
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(Error::Api("503 Service Unavailable: down".to_string()));
        }
        let page = self
            .pages
            .lock()
            .get(&(conversation_id.to_string(), before.map(str::to_string)))
            .cloned();
        Ok(page.unwrap_or_default())
    }

    async fn send_message(&self, conversation_id: &str, text: &str, reply_to: Option<&str>) -> Result<Message> {
        self.record(Call::Send(
            conversation_id.to_string(),
            text.to_string(),
            reply_to.map(str::to_string),
        ));
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::Api("502 Bad Gateway: offline".to_string()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut message = Message::new(format!("srv-{}", n), conversation_id, ME_ID, text, Utc::now());
        message.reply_to = reply_to.map(str::to_string);
        Ok(message)
    }

    async fn add_reaction(&self, conversation_id: &str, message_id: &str, emoji: &str) -> Result<bool> {
        self.record(Call::AddReaction(
            conversation_id.to_string(),
            message_id.to_string(),
            emoji.to_string(),
        ));
        self.reaction_result()
    }

    async fn remove_reaction(&self, conversation_id: &str, message_id: &str, emoji: &str) -> Result<bool> {
        self.record(Call::RemoveReaction(
            conversation_id.to_string(),
            message_id.to_string(),
            emoji.to_string(),
        ));
        self.reaction_result()
    }

    async fn mark_messages_as_read(&self, message_ids: &[String]) -> Result<()> {
        self.record(Call::MarkMessagesRead(message_ids.to_vec()));
        Ok(())
    }

    async fn mark_conversation_as_read(&self, conversation_id: &str) -> Result<()> {
        self.record(Call::MarkConversationRead(conversation_id.to_string()));
        Ok(())
    }

    async fn get_conversations(&self) -> Result<Vec<Conversation>> {
        self.record(Call::GetConversations);
        if self.fail_conversations.load(Ordering::SeqCst) {
            return Err(Error::Api("500 Internal Server Error: boom".to_string()));
        }
        Ok(self.conversations.lock().clone())
    }
}

impl MockApi {
    fn reaction_result(&self) -> Result<bool> {
        if self.fail_reactions.load(Ordering::SeqCst) {
            return Err(Error::Api("504 Gateway Timeout: slow".to_string()));
        }
        Ok(!self.refuse_reactions.load(Ordering::SeqCst))
    }
}

/// Identity collaborator returning a fixed user
pub struct MockIdentity(pub Option<CurrentUser>);

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn current_user(&self) -> Result<Option<CurrentUser>> {
        Ok(self.0.clone())
    }
}

pub fn me() -> CurrentUser {
    CurrentUser {
        id: ME_ID.to_string(),
        username: "alice".to_string(),
    }
}

pub fn signed_in() -> Arc<MockIdentity> {
    Arc::new(MockIdentity(Some(me())))
}

pub fn create_test_user(id: &str, username: &str) -> OtherUser {
    OtherUser {
        id: id.to_string(),
        username: username.to_string(),
        display_name: None,
        avatar_url: None,
        has_account: true,
    }
}

/// Conversation with `username`, last active `minutes_ago` minutes before 2024-01-01 12:00
pub fn create_test_conversation(id: &str, username: &str, minutes_ago: i64) -> Conversation {
    let at = base_time() - ChronoDuration::minutes(minutes_ago);
    let other_id = if username == "bob" {
        OTHER_ID.to_string()
    } else {
        format!("u-{}", username)
    };
    Conversation {
        id: id.to_string(),
        other_user: create_test_user(&other_id, username),
        last_message: Some(format!("hello from {}", username)),
        last_message_time: Some(at),
        updated_at: at,
        unread_count: 0,
    }
}

pub fn base_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Message `id` in the test conversation, `seq` seconds after the base time
pub fn create_test_message(id: &str, sender: &str, content: &str, seq: i64) -> Message {
    Message::new(id, CONV_ID, sender, content, base_time() + ChronoDuration::seconds(seq))
}

pub fn page(messages: Vec<Message>, has_more: bool) -> MessagePage {
    MessagePage { messages, has_more }
}

pub fn test_settings() -> Settings {
    Settings::default()
}

/// A channel that is never connected; frames pile up in its outbound queue
pub fn offline_channel() -> ChannelClient {
    ChannelClient::new(ChannelConfig {
        url: "ws://127.0.0.1:9/ws".to_string(),
        token: Some("test-token".to_string()),
        reconnect_base_delay: Duration::from_millis(100),
        reconnect_max_delay: Duration::from_secs(1),
    })
}

pub struct Harness {
    pub api: Arc<MockApi>,
    pub channel: ChannelClient,
    pub cache: SharedMessageCache,
    pub list_cache: SharedListCache,
    pub controller: ConversationController,
}

pub fn create_test_controller(api: MockApi, identity: Arc<MockIdentity>) -> Harness {
    let settings = test_settings();
    let api = Arc::new(api);
    let channel = offline_channel();
    let cache = MessageCache::new(settings.message_cache_ttl(), settings.max_retained_messages).shared();
    let list_cache = ListCache::new(settings.list_cache_ttl()).shared();
    let controller = ConversationController::new(
        api.clone(),
        identity,
        channel.clone(),
        cache.clone(),
        list_cache.clone(),
        Arc::new(Mutex::new(ConversationState::default())),
        settings.read_receipt_delay(),
        settings.typing_idle(),
    );
    Harness {
        api,
        channel,
        cache,
        list_cache,
        controller,
    }
}

/// Let spawned tasks run to completion against the in-memory backend
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
