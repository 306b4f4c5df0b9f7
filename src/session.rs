//! Session orchestration
//!
//! [`ChatSession`] composes the controllers, owns the explicit
//! [`SessionContext`] and exposes the engine to a renderer as a command
//! interface plus snapshots of the view model.

use crate::api::{ChatApi, IdentityProvider};
use crate::cache::{ListCache, MessageCache, SharedListCache, SharedMessageCache};
use crate::channel::{ChannelClient, ConversationSubscription, SubscriptionMode};
use crate::config::Settings;
use crate::conversation::{ConversationController, ConversationState};
use crate::list::ListController;
use crate::model::{ChatPreview, CurrentUser, OtherUser};
use crate::optimistic::CommitOutcome;
use crate::view::{ConversationView, Popover, Quote, PENDING_PREFIX};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Scroll offset (from the top) under which the next older page is loaded
pub const LOAD_OLDER_THRESHOLD: u32 = 100;

/// Ephemeral state of the conversation being viewed
///
/// Reset whenever the user leaves a conversation or closes the drawer. The
/// pending-message counter is the one field that survives a reset, so
/// placeholder ids stay unique for the lifetime of the session.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// Open conversation
    pub conversation_id: Option<String>,
    /// Its counterpart
    pub counterpart: Option<OtherUser>,
    /// Signed-in user, once resolved
    pub current_user: Option<CurrentUser>,
    /// Incremented on every reset; async work compares it to detect staleness
    pub generation: u64,
    /// The open popover
    pub popover: Option<Popover>,
    /// Message quoted by the next send
    pub quote: Option<Quote>,
    pub(crate) typing_timer: Option<JoinHandle<()>>,
    pub(crate) subscription: Option<ConversationSubscription>,
    pending_counter: u64,
}

impl SessionContext {
    /// A context with no open conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the signed-in user
    pub fn self_id(&self) -> Option<&str> {
        self.current_user.as_ref().map(|u| u.id.as_str())
    }

    /// Whether `generation` is still the live one
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Next local placeholder id, `pending-1`, `pending-2`, ...
    pub fn next_pending_id(&mut self) -> String {
        self.pending_counter += 1;
        format!("{}{}", PENDING_PREFIX, self.pending_counter)
    }

    /// Abort the typing idle timer; true if one was armed
    pub fn cancel_typing(&mut self) -> bool {
        match self.typing_timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// Clear everything except the pending counter and start a new generation
    pub fn reset(&mut self) {
        self.cancel_typing();
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        *self = Self {
            generation: self.generation + 1,
            pending_counter: self.pending_counter,
            ..Self::default()
        };
    }
}

/// What the drawer currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveView {
    /// Drawer closed
    Closed,
    /// Conversation list
    List,
    /// One conversation
    Conversation,
}

/// User intents accepted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the drawer on the conversation list
    OpenDrawer,
    /// Close the drawer, tearing everything down
    CloseDrawer,
    /// Open a conversation
    OpenConversation {
        /// Counterpart login
        username: String,
        /// Conversation id, when known from the list
        conversation_id: Option<String>,
    },
    /// Back from a conversation to the list
    Back,
    /// Composer text changed
    Input(String),
    /// Send the composer text
    Send,
    /// The message pane scrolled; offset from the top in pixels or rows
    Scroll {
        /// Distance from the top of the scroll area
        offset: u32,
    },
    /// Toggle the local user's reaction
    ToggleReaction {
        /// Target message
        message_id: String,
        /// Emoji
        emoji: String,
    },
    /// Toggle the emoji picker of a message
    OpenEmojiPicker(String),
    /// Toggle the options menu of a message
    OpenOptions(String),
    /// Close any popover
    ClosePopovers,
    /// Quote a message in the next send
    Quote(String),
    /// Drop the quote
    ClearQuote,
    /// Re-fetch the conversation list
    RefreshList,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// What the drawer shows
    pub active: ActiveView,
    /// Conversation list rows
    pub list: Vec<ChatPreview>,
    /// Inline error of the list
    pub list_error: Option<String>,
    /// Whether the list is being fetched
    pub list_loading: bool,
    /// Sum of unread counts
    pub unread_total: u32,
    /// The open conversation
    pub conversation: ConversationView,
    /// Open popover
    pub popover: Option<Popover>,
    /// Pending quote
    pub quote: Option<Quote>,
    /// Current owner of the realtime subscription slot
    pub subscription: SubscriptionMode,
    /// Whether the realtime channel is up
    pub connected: bool,
}

struct SessionInner {
    conversation: ConversationController,
    list: ListController,
    channel: ChannelClient,
    identity: Arc<dyn IdentityProvider>,
    active: Mutex<ActiveView>,
    me: Mutex<Option<CurrentUser>>,
}

/// Top-level orchestrator of one client instance
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Compose a session from its collaborators
    pub fn new(
        api: Arc<dyn ChatApi>,
        identity: Arc<dyn IdentityProvider>,
        channel: ChannelClient,
        settings: &Settings,
    ) -> Self {
        let cache: SharedMessageCache =
            MessageCache::new(settings.message_cache_ttl(), settings.max_retained_messages)
                .shared();
        let list_cache: SharedListCache = ListCache::new(settings.list_cache_ttl()).shared();
        let state = Arc::new(Mutex::new(ConversationState::default()));

        let conversation = ConversationController::new(
            api.clone(),
            identity.clone(),
            channel.clone(),
            cache.clone(),
            list_cache.clone(),
            state,
            settings.read_receipt_delay(),
            settings.typing_idle(),
        );
        let list = ListController::new(
            api,
            channel.clone(),
            cache,
            list_cache,
            settings.prefetch_count,
        );

        Self {
            inner: Arc::new(SessionInner {
                conversation,
                list,
                channel,
                identity,
                active: Mutex::new(ActiveView::Closed),
                me: Mutex::new(None),
            }),
        }
    }

    /// Conversation controller
    pub fn conversation(&self) -> &ConversationController {
        &self.inner.conversation
    }

    /// List controller
    pub fn list(&self) -> &ListController {
        &self.inner.list
    }

    /// Realtime channel
    pub fn channel(&self) -> &ChannelClient {
        &self.inner.channel
    }

    /// What the drawer shows
    pub fn active(&self) -> ActiveView {
        *self.inner.active.lock()
    }

    /// Open the realtime connection
    ///
    /// A failure is returned but leaves the session usable without live
    /// updates; the channel keeps retrying in the background.
    pub async fn connect(&self) -> Result<()> {
        self.inner.channel.connect().await
    }

    async fn resolve_me(&self) -> Option<CurrentUser> {
        if let Some(me) = self.inner.me.lock().clone() {
            return Some(me);
        }
        match self.inner.identity.current_user().await {
            Ok(Some(me)) => {
                *self.inner.me.lock() = Some(me.clone());
                Some(me)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Could not resolve current user: {}", e);
                None
            }
        }
    }

    async fn show_list(&self) -> Result<()> {
        *self.inner.active.lock() = ActiveView::List;
        let me = self.resolve_me().await;
        if self.active() != ActiveView::List {
            return Ok(());
        }
        self.inner.list.activate(me.map(|u| u.id));
        self.inner.list.load().await.map(|_| ())
    }

    /// Execute one command
    ///
    /// Collaborator failures are logged and reflected in the view model;
    /// the returned error is informational.
    pub async fn execute(&self, command: Command) -> Result<()> {
        debug!("Command {:?}", command);
        match command {
            Command::OpenDrawer | Command::Back => {
                self.inner.conversation.teardown();
                self.show_list().await
            }
            Command::CloseDrawer => {
                self.inner.conversation.teardown();
                self.inner.list.deactivate();
                *self.inner.active.lock() = ActiveView::Closed;
                Ok(())
            }
            Command::OpenConversation {
                username,
                conversation_id,
            } => {
                self.inner.list.deactivate();
                *self.inner.active.lock() = ActiveView::Conversation;
                self.inner
                    .conversation
                    .open(&username, conversation_id.as_deref())
                    .await
            }
            Command::Input(text) => {
                self.inner.conversation.handle_input(&text);
                Ok(())
            }
            Command::Send => {
                self.send();
                Ok(())
            }
            Command::Scroll { offset } => {
                if offset < LOAD_OLDER_THRESHOLD {
                    self.inner.conversation.load_older().await?;
                }
                Ok(())
            }
            Command::ToggleReaction { message_id, emoji } => {
                self.inner.conversation.toggle_reaction(&message_id, &emoji);
                Ok(())
            }
            Command::OpenEmojiPicker(message_id) => {
                self.inner.conversation.open_emoji_picker(&message_id);
                Ok(())
            }
            Command::OpenOptions(message_id) => {
                self.inner.conversation.open_options_menu(&message_id);
                Ok(())
            }
            Command::ClosePopovers => {
                self.inner.conversation.close_popovers();
                Ok(())
            }
            Command::Quote(message_id) => self.inner.conversation.quote_message(&message_id),
            Command::ClearQuote => {
                self.inner.conversation.clear_quote();
                Ok(())
            }
            Command::RefreshList => self.inner.list.refresh().await.map(|_| ()),
        }
    }

    /// Send the composer text, returning the handle of the pending send
    pub fn send(&self) -> Option<JoinHandle<CommitOutcome>> {
        self.inner.conversation.send()
    }

    /// Copy of the view model
    pub fn snapshot(&self) -> SessionSnapshot {
        let (conversation, popover, quote) = {
            let state = self.inner.conversation.state().lock();
            (
                state.view.clone(),
                state.context.popover.clone(),
                state.context.quote.clone(),
            )
        };
        let list = self.inner.list.snapshot();
        SessionSnapshot {
            active: self.active(),
            unread_total: self.inner.list.unread_total(),
            list: list.chats,
            list_error: list.error,
            list_loading: list.loading,
            conversation,
            popover,
            quote,
            subscription: self.inner.channel.mode(),
            connected: self.inner.channel.is_connected(),
        }
    }
}
