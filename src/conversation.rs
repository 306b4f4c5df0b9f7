//! Conversation View Controller
//!
//! Drives the open conversation through `idle -> loading -> ready` (or
//! `error`, then `closed`): resolves the conversation, renders from cache or
//! network, joins the realtime channel, and runs the optimistic send,
//! reaction, typing and read-receipt pipelines.
//!
//! Every async continuation captures the context generation it started in.
//! When the user navigated away in the meantime the continuation still
//! updates the cache but leaves the (torn down) view alone.

use crate::api::{ChatApi, IdentityProvider};
use crate::cache::{SharedListCache, SharedMessageCache};
use crate::channel::{ChannelClient, ConversationListener, ReactionChange};
use crate::model::{DeliveryStatus, Message, MessagePage};
use crate::optimistic::{self, CommitOutcome, OptimisticCommand};
use crate::reactions::ReactionEngine;
use crate::read_receipts::ReadReceiptScheduler;
use crate::session::SessionContext;
use crate::view::{ConversationView, Popover, Quote, RenderedMessage, ViewPhase};
use crate::{Error, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Ephemeral session context plus the view it renders into
#[derive(Default)]
pub struct ConversationState {
    /// Identity of the open conversation, timers, subscription, popovers
    pub context: SessionContext,
    /// Render target
    pub view: ConversationView,
}

impl ConversationState {
    /// Whether `generation` is still the open conversation `conversation_id`
    fn shows(&self, generation: u64, conversation_id: &str) -> bool {
        self.context.is_current(generation)
            && self.context.conversation_id.as_deref() == Some(conversation_id)
    }

    fn render(&self, message: &Message) -> RenderedMessage {
        let self_id = self.context.self_id();
        let outgoing = match (self_id, &self.context.counterpart) {
            (Some(me), _) => message.sender_id == me,
            (None, Some(other)) => message.sender_id != other.id,
            (None, None) => false,
        };
        RenderedMessage::from_message(message, outgoing, self_id)
    }

    fn render_all(&mut self, messages: &[Message]) {
        let rendered: Vec<RenderedMessage> = messages.iter().map(|m| self.render(m)).collect();
        self.view.render_messages(rendered);
    }
}

/// Shared handle to the conversation state
pub type SharedConversation = Arc<Mutex<ConversationState>>;

/// Controller of the currently open conversation
#[derive(Clone)]
pub struct ConversationController {
    api: Arc<dyn ChatApi>,
    identity: Arc<dyn IdentityProvider>,
    channel: ChannelClient,
    cache: SharedMessageCache,
    list_cache: SharedListCache,
    state: SharedConversation,
    reads: Arc<ReadReceiptScheduler>,
    reactions: ReactionEngine,
    typing_idle: Duration,
}

impl ConversationController {
    /// Wire a controller to its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn ChatApi>,
        identity: Arc<dyn IdentityProvider>,
        channel: ChannelClient,
        cache: SharedMessageCache,
        list_cache: SharedListCache,
        state: SharedConversation,
        read_delay: Duration,
        typing_idle: Duration,
    ) -> Self {
        let reads = Arc::new(ReadReceiptScheduler::new(
            api.clone(),
            list_cache.clone(),
            read_delay,
        ));
        let reactions = ReactionEngine::new(api.clone(), cache.clone(), state.clone());
        Self {
            api,
            identity,
            channel,
            cache,
            list_cache,
            state,
            reads,
            reactions,
            typing_idle,
        }
    }

    /// Shared conversation state
    pub fn state(&self) -> &SharedConversation {
        &self.state
    }

    /// Read-receipt scheduler used by this controller
    pub fn read_receipts(&self) -> &ReadReceiptScheduler {
        &self.reads
    }

    /// Reaction engine used by this controller
    pub fn reactions(&self) -> &ReactionEngine {
        &self.reactions
    }

    /// Copy of the current view
    pub fn view(&self) -> ConversationView {
        self.state.lock().view.clone()
    }

    /// Id of the open conversation
    pub fn conversation_id(&self) -> Option<String> {
        self.state.lock().context.conversation_id.clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().context.is_current(generation)
    }

    /// Open the conversation with `username`
    ///
    /// A fresh cache entry under `known_id` is shown immediately, with the
    /// composer disabled until the local identity is known. Failing to
    /// resolve the conversation leaves the view in the terminal error phase.
    pub async fn open(&self, username: &str, known_id: Option<&str>) -> Result<()> {
        self.teardown();

        let generation = {
            let mut state = self.state.lock();
            state.view = ConversationView::loading(username);
            let generation = state.context.generation;

            if let Some(known_id) = known_id {
                let cached = self
                    .cache
                    .lock()
                    .fresh(known_id)
                    .map(|entry| (entry.messages().to_vec(), entry.has_more));
                if let Some((messages, has_more)) = cached {
                    debug!("Rendering {} from cache", known_id);
                    state.context.conversation_id = Some(known_id.to_string());
                    state.view.conversation_id = Some(known_id.to_string());
                    state.render_all(&messages);
                    state.view.has_more = has_more;
                    state.view.phase = ViewPhase::Ready;
                    state.view.interactive = false;
                }
            }
            generation
        };

        let current_user = match self.identity.current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!("Could not resolve current user: {}", e);
                None
            }
        };
        if !self.is_current(generation) {
            return Ok(());
        }
        if current_user.is_none() {
            warn!("No signed-in user; conversation stays read-only");
        }
        self.state.lock().context.current_user = current_user;

        let conversation = match self.api.get_or_create_conversation(username).await {
            Ok(conversation) => conversation,
            Err(e) => {
                let error = match e {
                    Error::Bootstrap(message) => Error::Bootstrap(message),
                    other => Error::Bootstrap(other.to_string()),
                };
                warn!("Opening conversation with {} failed: {}", username, error);
                let mut state = self.state.lock();
                if state.context.is_current(generation) {
                    state.context.conversation_id = None;
                    state.view.phase = ViewPhase::Error;
                    state.view.interactive = false;
                    state.view.error = Some(error.to_string());
                }
                return Err(error);
            }
        };
        let conversation_id = conversation.id.clone();

        let cached = {
            let mut state = self.state.lock();
            if !state.context.is_current(generation) {
                return Ok(());
            }
            if state.context.conversation_id.as_deref() != Some(conversation_id.as_str()) {
                state.view.messages.clear();
            }
            state.context.conversation_id = Some(conversation_id.clone());
            state.context.counterpart = Some(conversation.other_user.clone());
            state.view.conversation_id = Some(conversation_id.clone());
            state.view.counterpart = Some(conversation.other_user.clone());

            let mut cache = self.cache.lock();
            cache.set_open(Some(&conversation_id));
            cache
                .fresh(&conversation_id)
                .map(|entry| (entry.messages().to_vec(), entry.has_more))
        };

        let (messages, from_cache) = match cached {
            Some((messages, has_more)) => {
                let mut state = self.state.lock();
                state.render_all(&messages);
                state.view.has_more = has_more;
                (messages, true)
            }
            None => match self.api.get_messages(&conversation_id, None).await {
                Ok(page) => {
                    let MessagePage { messages, has_more } = page;
                    self.cache
                        .lock()
                        .set(&conversation_id, messages.clone(), has_more);
                    let mut state = self.state.lock();
                    if !state.context.is_current(generation) {
                        return Ok(());
                    }
                    state.render_all(&messages);
                    state.view.has_more = has_more;
                    (messages, false)
                }
                Err(e) => {
                    warn!("Loading messages of {} failed: {}", conversation_id, e);
                    let mut state = self.state.lock();
                    if !state.context.is_current(generation) {
                        return Ok(());
                    }
                    state.view.load_error = Some(format!("Could not load messages: {}", e));
                    (Vec::new(), false)
                }
            },
        };

        let unread: Vec<String> = {
            let mut state = self.state.lock();
            if !state.context.is_current(generation) {
                return Ok(());
            }
            state.view.phase = ViewPhase::Ready;
            state.view.interactive = state.context.current_user.is_some();

            let counterpart_id = conversation.other_user.id.as_str();
            let unread: Vec<String> = messages
                .iter()
                .filter(|m| match state.context.self_id() {
                    Some(me) => m.is_unread_for(me),
                    None => m.sender_id == counterpart_id && m.read_at.is_none(),
                })
                .map(|m| m.id.clone())
                .collect();

            let listener = Arc::new(InboundHandler {
                api: self.api.clone(),
                cache: self.cache.clone(),
                list_cache: self.list_cache.clone(),
                state: self.state.clone(),
                reactions: self.reactions.clone(),
                conversation_id: conversation_id.clone(),
                counterpart_id: counterpart_id.to_string(),
                generation,
            });
            state.context.subscription =
                Some(self.channel.join_conversation(&conversation_id, listener));
            unread
        };

        self.reads.schedule(&conversation_id, unread);
        if from_cache {
            self.spawn_refresh(conversation_id.clone(), generation);
        }
        info!("Conversation {} with {} ready", conversation_id, username);
        Ok(())
    }

    /// Re-fetch the newest page behind a cache-rendered view
    fn spawn_refresh(&self, conversation_id: String, generation: u64) -> JoinHandle<()> {
        let baseline: Vec<Message> = self
            .cache
            .lock()
            .get(&conversation_id)
            .map(|entry| entry.messages().to_vec())
            .unwrap_or_default();
        let this = self.clone();
        tokio::spawn(async move {
            match this.api.get_messages(&conversation_id, None).await {
                Ok(page) => this.apply_refresh(&conversation_id, page, &baseline, generation),
                Err(e) => debug!("Background refresh of {} failed: {}", conversation_id, e),
            }
        })
    }

    fn apply_refresh(&self, conversation_id: &str, page: MessagePage, baseline: &[Message], generation: u64) {
        let mut state = self.state.lock();
        let mut cache = self.cache.lock();
        cache.merge_newest(conversation_id, page.messages, page.has_more, baseline);

        if state.shows(generation, conversation_id) {
            if let Some(entry) = cache.get(conversation_id) {
                let messages = entry.messages().to_vec();
                state.render_all(&messages);
                state.view.has_more = entry.has_more;
            }
            debug!("Conversation {} refreshed in background", conversation_id);
        }
    }

    /// Composer text changed
    ///
    /// Emits a typing signal and (re)arms the idle timer that emits
    /// stop-typing.
    pub fn handle_input(&self, text: &str) {
        let mut state = self.state.lock();
        state.view.draft = text.to_string();
        if state.context.conversation_id.is_none() {
            return;
        }

        self.channel.send_typing_indicator();
        state.context.cancel_typing();

        let generation = state.context.generation;
        let channel = self.channel.clone();
        let shared = self.state.clone();
        let idle = self.typing_idle;
        state.context.typing_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            let mut state = shared.lock();
            if state.context.is_current(generation) {
                state.context.typing_timer = None;
                channel.send_stop_typing();
            }
        }));
    }

    /// Send the composer text
    ///
    /// A no-op returning `None` when the text is blank, no conversation is
    /// open or the composer is disabled. Otherwise the placeholder is
    /// already rendered when this returns.
    pub fn send(&self) -> Option<JoinHandle<CommitOutcome>> {
        let command = {
            let mut state = self.state.lock();
            let text = state.view.draft.trim().to_string();
            let Some(conversation_id) = state.context.conversation_id.clone() else {
                debug!("Send ignored: no open conversation");
                return None;
            };
            let Some(sender_id) = state.context.self_id().map(str::to_string) else {
                debug!("Send ignored: identity unknown");
                return None;
            };
            if text.is_empty() || !state.view.interactive {
                return None;
            }

            if state.context.cancel_typing() {
                self.channel.send_stop_typing();
            }
            state.view.draft.clear();
            let reply_to = state.context.quote.take().map(|q| q.message_id);
            let pending_id = state.context.next_pending_id();

            SendCommand {
                api: self.api.clone(),
                cache: self.cache.clone(),
                state: self.state.clone(),
                conversation_id,
                sender_id,
                text,
                reply_to,
                pending_id,
                generation: state.context.generation,
            }
        };
        optimistic::start(command)
    }

    /// Fetch the page before the oldest loaded message
    ///
    /// Returns the number of messages inserted; 0 when there is nothing
    /// more, no conversation is open, or a fetch is already running.
    pub async fn load_older(&self) -> Result<usize> {
        let (conversation_id, cursor, generation) = {
            let mut state = self.state.lock();
            let Some(conversation_id) = state.context.conversation_id.clone() else {
                return Ok(0);
            };
            if state.view.loading_older || !state.view.has_more {
                debug!("Older page not requested (in flight or exhausted)");
                return Ok(0);
            }
            let cursor = self
                .cache
                .lock()
                .get(&conversation_id)
                .and_then(|e| e.oldest_id().map(str::to_string))
                .or_else(|| state.view.oldest_confirmed_id().map(str::to_string));
            let Some(cursor) = cursor else {
                return Ok(0);
            };
            state.view.loading_older = true;
            (conversation_id, cursor, state.context.generation)
        };

        let result = self.api.get_messages(&conversation_id, Some(&cursor)).await;

        let mut state = self.state.lock();
        let showing = state.shows(generation, &conversation_id);
        if showing {
            state.view.loading_older = false;
        }
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!("Loading older messages of {} failed: {}", conversation_id, e);
                if showing {
                    state.view.load_error = Some(format!("Could not load older messages: {}", e));
                }
                return Err(e);
            }
        };

        let rendered: Vec<RenderedMessage> = page.messages.iter().map(|m| state.render(m)).collect();
        let inserted = self
            .cache
            .lock()
            .prepend(&conversation_id, page.messages, page.has_more);
        if !showing {
            return Ok(inserted);
        }
        state.view.has_more = page.has_more;
        let shown = state.view.prepend(rendered);
        debug!("Prepended {} older messages to {}", shown, conversation_id);
        Ok(shown)
    }

    /// Toggle the local user's `emoji` reaction on a message
    pub fn toggle_reaction(&self, message_id: &str, emoji: &str) -> Option<JoinHandle<CommitOutcome>> {
        let (conversation_id, user) = {
            let mut state = self.state.lock();
            state.context.popover = None;
            let conversation_id = state.context.conversation_id.clone()?;
            let user = state.context.current_user.clone()?;
            (conversation_id, user)
        };
        let adding = !self
            .reactions
            .has_reaction(&conversation_id, message_id, &user.id, emoji);
        self.reactions.apply_optimistic(
            &conversation_id,
            message_id,
            emoji,
            adding,
            &user.id,
            &user.username,
        )
    }

    /// Open the emoji picker of a message, or close it if it is open
    pub fn open_emoji_picker(&self, message_id: &str) {
        self.toggle_popover(Popover::EmojiPicker(message_id.to_string()));
    }

    /// Open the options menu of a message, or close it if it is open
    pub fn open_options_menu(&self, message_id: &str) {
        self.toggle_popover(Popover::Options(message_id.to_string()));
    }

    fn toggle_popover(&self, popover: Popover) {
        let mut state = self.state.lock();
        if !state.view.contains(popover.message_id()) {
            return;
        }
        if state.context.popover.as_ref() == Some(&popover) {
            state.context.popover = None;
        } else {
            state.context.popover = Some(popover);
        }
    }

    /// Close whatever popover is open
    pub fn close_popovers(&self) {
        self.state.lock().context.popover = None;
    }

    /// Quote a message in the next send
    pub fn quote_message(&self, message_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let message = state
            .view
            .message(message_id)
            .ok_or_else(|| Error::NotReady(format!("message {} is not shown", message_id)))?;
        let sender_label = if message.outgoing {
            "You".to_string()
        } else {
            state
                .context
                .counterpart
                .as_ref()
                .map(|u| u.username.clone())
                .unwrap_or_else(|| state.view.username.clone())
        };
        let quote = Quote {
            message_id: message.id.clone(),
            content: message.content.clone(),
            sender_label,
        };
        state.context.quote = Some(quote);
        state.context.popover = None;
        Ok(())
    }

    /// Drop the pending quote
    pub fn clear_quote(&self) {
        self.state.lock().context.quote = None;
    }

    /// Leave the open conversation
    ///
    /// Runs to completion without suspending: stop-typing is emitted while
    /// the join is still in place, then the subscription, the typing timer
    /// and the pending read receipt are dropped and the context is reset.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        let was_open = state.context.conversation_id.clone();

        if was_open.is_some() {
            self.channel.send_stop_typing();
        }
        if let Some(subscription) = state.context.subscription.take() {
            subscription.unsubscribe();
        }
        self.reads.cancel();
        self.cache.lock().set_open(None);
        state.context.reset();
        state.view = ConversationView::closed();

        if let Some(conversation_id) = was_open {
            info!("Closed conversation {}", conversation_id);
        }
    }
}

struct SendCommand {
    api: Arc<dyn ChatApi>,
    cache: SharedMessageCache,
    state: SharedConversation,
    conversation_id: String,
    sender_id: String,
    text: String,
    reply_to: Option<String>,
    pending_id: String,
    generation: u64,
}

impl OptimisticCommand for SendCommand {
    type Output = Message;

    fn label(&self) -> &'static str {
        "Send message"
    }

    fn apply(&self) -> bool {
        let mut state = self.state.lock();
        if !state.shows(self.generation, &self.conversation_id) {
            return false;
        }
        state.view.messages.push(RenderedMessage::pending(
            self.pending_id.clone(),
            self.sender_id.clone(),
            self.text.clone(),
            self.reply_to.clone(),
        ));
        true
    }

    fn commit(&self) -> impl Future<Output = Result<Message>> + Send {
        let api = self.api.clone();
        let conversation_id = self.conversation_id.clone();
        let text = self.text.clone();
        let reply_to = self.reply_to.clone();
        async move {
            api.send_message(&conversation_id, &text, reply_to.as_deref())
                .await
        }
    }

    fn confirm(&self, message: Message) {
        info!("Message {} sent as {}", self.pending_id, message.id);
        let mut state = self.state.lock();
        self.cache
            .lock()
            .append(&self.conversation_id, message.clone());

        if !state.shows(self.generation, &self.conversation_id) {
            return;
        }
        if state.view.contains(&message.id) {
            state.view.messages.retain(|m| m.id != self.pending_id);
            return;
        }
        if let Some(rendered) = state.view.message_mut(&self.pending_id) {
            rendered.id = message.id;
            rendered.created_at = message.created_at;
            rendered.status = Some(DeliveryStatus::Sent);
        }
    }

    fn compensate(&self) {
        let mut state = self.state.lock();
        if !state.shows(self.generation, &self.conversation_id) {
            return;
        }
        if let Some(rendered) = state.view.message_mut(&self.pending_id) {
            rendered.status = Some(DeliveryStatus::Failed);
        }
    }
}

/// Per-conversation channel callbacks
struct InboundHandler {
    api: Arc<dyn ChatApi>,
    cache: SharedMessageCache,
    list_cache: SharedListCache,
    state: SharedConversation,
    reactions: ReactionEngine,
    conversation_id: String,
    counterpart_id: String,
    generation: u64,
}

impl ConversationListener for InboundHandler {
    fn on_message(&self, message: Message) {
        if message.sender_id != self.counterpart_id {
            debug!("Ignoring realtime message {} not sent by the counterpart", message.id);
            return;
        }

        {
            let mut state = self.state.lock();
            let showing = state.shows(self.generation, &self.conversation_id);
            if showing {
                state.view.typing = None;
            }
            let appended = self
                .cache
                .lock()
                .append(&self.conversation_id, message.clone());
            if !showing {
                return;
            }
            let rendered = state.render(&message);
            if !state.view.insert(rendered) {
                debug!("Duplicate realtime message {} dropped", message.id);
                return;
            }
            if !appended {
                debug!("Message {} was already cached", message.id);
            }
        }
        self.list_cache.lock().invalidate();

        let api = self.api.clone();
        let ids = vec![message.id];
        tokio::spawn(async move {
            if let Err(e) = api.mark_messages_as_read(&ids).await {
                warn!("Failed to mark {} read: {}", ids[0], e);
            }
        });
    }

    fn on_typing(&self, user_id: &str, username: &str) {
        let mut state = self.state.lock();
        if user_id == self.counterpart_id && state.shows(self.generation, &self.conversation_id) {
            state.view.typing = Some(username.to_string());
        }
    }

    fn on_stop_typing(&self, user_id: &str) {
        let mut state = self.state.lock();
        if user_id == self.counterpart_id && state.shows(self.generation, &self.conversation_id) {
            state.view.typing = None;
        }
    }

    fn on_messages_read(&self, message_ids: &[String]) {
        let mut state = self.state.lock();
        let now = Utc::now();
        {
            let mut cache = self.cache.lock();
            for id in message_ids {
                cache.update_message(&self.conversation_id, id, |m| {
                    m.read_at.get_or_insert(now);
                });
            }
        }
        if !state.shows(self.generation, &self.conversation_id) {
            return;
        }
        let flipped = message_ids
            .iter()
            .filter(|id| state.view.mark_read(id.as_str()))
            .count();
        debug!("{} messages marked read by counterpart", flipped);
    }

    fn on_reaction(
        &self,
        change: ReactionChange,
        message_id: &str,
        emoji: &str,
        user_id: &str,
        username: &str,
    ) {
        self.reactions.apply_remote(
            &self.conversation_id,
            change,
            message_id,
            emoji,
            user_id,
            username,
        );
    }
}
