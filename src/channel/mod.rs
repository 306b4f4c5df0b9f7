//! Realtime channel client
//!
//! This module owns the single realtime connection of a client instance:
//! - One websocket per instance, reused by every subscriber
//! - A single subscription slot: either the conversation list's global
//!   listener or one conversation's typed callbacks, never both
//! - Fire-and-forget typing signals, queued while disconnected
//! - Transparent reconnection with exponential backoff; the current join is
//!   re-sent after every reconnect, missed history is not replayed

mod connection;
pub mod protocol;

pub use connection::Backoff;
pub use protocol::{ClientFrame, ReactionChange, ServerEvent};

use crate::{config::Settings, model::Message, Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Typed callbacks for the events of one joined conversation
///
/// Callbacks run on the connection task, one event at a time, in the order
/// the server produced them. They must not block.
pub trait ConversationListener: Send + Sync {
    /// A new message arrived
    fn on_message(&self, message: Message);
    /// A participant started typing
    fn on_typing(&self, user_id: &str, username: &str);
    /// A participant stopped typing
    fn on_stop_typing(&self, user_id: &str);
    /// The counterpart read these messages
    fn on_messages_read(&self, message_ids: &[String]);
    /// A reaction was added or removed
    fn on_reaction(
        &self,
        change: ReactionChange,
        message_id: &str,
        emoji: &str,
        user_id: &str,
        username: &str,
    );
}

/// Callback type for inbound messages while no conversation is open
pub type GlobalMessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Which kind of listener currently owns the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Nobody is listening
    None,
    /// The conversation list's global listener
    List,
    /// The per-conversation listener of this conversation
    Conversation(String),
}

/// The single subscription slot
enum Slot {
    None,
    List(GlobalMessageHandler),
    Conversation {
        conversation_id: String,
        listener: Arc<dyn ConversationListener>,
        token: u64,
    },
}

impl Slot {
    fn mode(&self) -> SubscriptionMode {
        match self {
            Slot::None => SubscriptionMode::None,
            Slot::List(_) => SubscriptionMode::List,
            Slot::Conversation { conversation_id, .. } => {
                SubscriptionMode::Conversation(conversation_id.clone())
            }
        }
    }
}

/// Connection parameters of the realtime channel
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Websocket endpoint
    pub url: String,
    /// Bearer token sent with the handshake
    pub token: Option<String>,
    /// First reconnect delay
    pub reconnect_base_delay: Duration,
    /// Reconnect delay cap
    pub reconnect_max_delay: Duration,
}

impl ChannelConfig {
    /// Channel parameters from client settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.realtime_url.clone(),
            token: settings.auth_token.clone(),
            reconnect_base_delay: settings.reconnect_base_delay(),
            reconnect_max_delay: settings.reconnect_max_delay(),
        }
    }

    /// Handshake URL carrying the token and the per-instance client id
    pub fn connect_url(&self, client_id: &Uuid) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
            query.append_pair("client_id", &client_id.to_string());
        }
        Ok(url)
    }
}

pub(crate) struct ChannelShared {
    config: ChannelConfig,
    client_id: Uuid,
    slot: Mutex<Slot>,
    next_token: AtomicU64,
    connected: AtomicBool,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    outbound_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<ClientFrame>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Realtime channel client
///
/// Cheap to clone; every clone shares the same connection and slot.
#[derive(Clone)]
pub struct ChannelClient {
    shared: Arc<ChannelShared>,
}

impl ChannelClient {
    /// Create a channel client; no connection is opened until [`connect`](Self::connect)
    pub fn new(config: ChannelConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(ChannelShared {
                config,
                client_id: Uuid::new_v4(),
                slot: Mutex::new(Slot::None),
                next_token: AtomicU64::new(1),
                connected: AtomicBool::new(false),
                outbound: tx,
                outbound_rx: Arc::new(AsyncMutex::new(rx)),
                task: Mutex::new(None),
            }),
        }
    }

    fn from_shared(shared: Arc<ChannelShared>) -> Self {
        Self { shared }
    }

    fn downgrade(&self) -> Weak<ChannelShared> {
        Arc::downgrade(&self.shared)
    }

    /// Per-instance client id sent with the handshake
    pub fn client_id(&self) -> Uuid {
        self.shared.client_id
    }

    /// Whether the websocket is currently up
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.shared.connected.store(connected, Ordering::SeqCst);
    }

    /// Establish the connection, or reuse the running one
    ///
    /// Resolves after the first connection attempt. When that attempt
    /// fails the error is returned, but the connection task keeps retrying
    /// in the background with backoff.
    pub async fn connect(&self) -> Result<()> {
        let ready = {
            let mut task = self.shared.task.lock();
            if task.as_ref().is_some_and(|t| !t.is_finished()) {
                return Ok(());
            }

            let url = self.shared.config.connect_url(&self.shared.client_id)?;
            let (ready_tx, ready_rx) = oneshot::channel();
            *task = Some(tokio::spawn(connection::run(
                self.downgrade(),
                url,
                self.shared.outbound_rx.clone(),
                Backoff::new(
                    self.shared.config.reconnect_base_delay,
                    self.shared.config.reconnect_max_delay,
                ),
                ready_tx,
            )));
            ready_rx
        };

        match ready.await {
            Ok(result) => result,
            Err(_) => Err(Error::Channel("connection task ended".to_string())),
        }
    }

    /// Stop the connection task; subscriptions stay registered
    pub fn disconnect(&self) {
        if let Some(task) = self.shared.task.lock().take() {
            task.abort();
        }
        self.set_connected(false);
        info!("Realtime channel disconnected");
    }

    /// Current owner of the subscription slot
    pub fn mode(&self) -> SubscriptionMode {
        self.shared.slot.lock().mode()
    }

    /// The conversation whose events are currently delivered, if any
    pub fn joined_conversation(&self) -> Option<String> {
        match &*self.shared.slot.lock() {
            Slot::Conversation { conversation_id, .. } => Some(conversation_id.clone()),
            _ => None,
        }
    }

    /// Subscribe to one conversation's events
    ///
    /// Replaces whatever listener held the slot, including the global list
    /// listener. The returned handle unsubscribes when consumed or dropped.
    pub fn join_conversation(
        &self,
        conversation_id: &str,
        listener: Arc<dyn ConversationListener>,
    ) -> ConversationSubscription {
        let token = self.shared.next_token.fetch_add(1, Ordering::SeqCst);
        let previous = {
            let mut slot = self.shared.slot.lock();
            std::mem::replace(
                &mut *slot,
                Slot::Conversation {
                    conversation_id: conversation_id.to_string(),
                    listener,
                    token,
                },
            )
        };

        if let Slot::Conversation {
            conversation_id: old, ..
        } = previous
        {
            if old != conversation_id {
                self.send_control(ClientFrame::Leave { conversation_id: old });
            }
        }
        self.send_control(ClientFrame::Join {
            conversation_id: conversation_id.to_string(),
        });
        info!("Joined conversation {}", conversation_id);

        ConversationSubscription {
            channel: self.downgrade(),
            conversation_id: conversation_id.to_string(),
            token,
            active: true,
        }
    }

    fn unsubscribe(&self, conversation_id: &str, token: u64) {
        let removed = {
            let mut slot = self.shared.slot.lock();
            match &*slot {
                Slot::Conversation { token: current, .. } if *current == token => {
                    *slot = Slot::None;
                    true
                }
                _ => false,
            }
        };

        if removed {
            self.send_control(ClientFrame::Leave {
                conversation_id: conversation_id.to_string(),
            });
            info!("Left conversation {}", conversation_id);
        } else {
            debug!("Stale unsubscribe for {} ignored", conversation_id);
        }
    }

    /// Install or remove the global inbound-message listener
    ///
    /// Installing it takes the slot over from any conversation listener.
    /// Removing it leaves a conversation listener untouched.
    pub fn set_global_message_listener(&self, handler: Option<GlobalMessageHandler>) {
        let previous = {
            let mut slot = self.shared.slot.lock();
            match handler {
                Some(handler) => std::mem::replace(&mut *slot, Slot::List(handler)),
                None => {
                    if matches!(&*slot, Slot::List(_)) {
                        std::mem::replace(&mut *slot, Slot::None)
                    } else {
                        Slot::None
                    }
                }
            }
        };

        if let Slot::Conversation { conversation_id, .. } = previous {
            self.send_control(ClientFrame::Leave { conversation_id });
        }
        debug!("Subscription mode is now {:?}", self.mode());
    }

    /// Signal that the local user is typing in the joined conversation
    pub fn send_typing_indicator(&self) {
        if let Some(conversation_id) = self.joined_conversation() {
            self.queue(ClientFrame::Typing { conversation_id });
        }
    }

    /// Signal that the local user stopped typing in the joined conversation
    pub fn send_stop_typing(&self) {
        if let Some(conversation_id) = self.joined_conversation() {
            self.queue(ClientFrame::StopTyping { conversation_id });
        }
    }

    /// Join/leave frames only make sense on a live socket; the connection
    /// task re-sends the current join after every reconnect.
    fn send_control(&self, frame: ClientFrame) {
        if self.is_connected() {
            self.queue(frame);
        }
    }

    fn queue(&self, frame: ClientFrame) {
        if self.shared.outbound.send(frame).is_err() {
            warn!("Outbound channel closed, frame dropped");
        }
    }

    /// Deliver one server event to the listener that owns the slot
    pub fn dispatch(&self, event: ServerEvent) {
        enum Target {
            Global(GlobalMessageHandler),
            Conversation(String, Arc<dyn ConversationListener>),
            Nobody,
        }

        let target = match &*self.shared.slot.lock() {
            Slot::None => Target::Nobody,
            Slot::List(handler) => Target::Global(handler.clone()),
            Slot::Conversation {
                conversation_id,
                listener,
                ..
            } => Target::Conversation(conversation_id.clone(), listener.clone()),
        };

        if let ServerEvent::Error { message } = &event {
            warn!("Realtime server error: {}", message);
            return;
        }

        match target {
            Target::Global(handler) => match event {
                ServerEvent::NewMessage { message } => handler(message),
                other => debug!("List listener ignores {:?}", other),
            },
            Target::Conversation(joined, listener) => {
                if event.conversation_id() != Some(joined.as_str()) {
                    debug!("Dropping event for conversation other than {}", joined);
                    return;
                }
                match event {
                    ServerEvent::NewMessage { message } => listener.on_message(message),
                    ServerEvent::Typing {
                        user_id, username, ..
                    } => listener.on_typing(&user_id, &username),
                    ServerEvent::StopTyping { user_id, .. } => listener.on_stop_typing(&user_id),
                    ServerEvent::MessagesRead { message_ids, .. } => {
                        listener.on_messages_read(&message_ids)
                    }
                    ServerEvent::ReactionAdded {
                        message_id,
                        emoji,
                        user_id,
                        username,
                        ..
                    } => listener.on_reaction(
                        ReactionChange::Added,
                        &message_id,
                        &emoji,
                        &user_id,
                        &username,
                    ),
                    ServerEvent::ReactionRemoved {
                        message_id,
                        emoji,
                        user_id,
                        username,
                        ..
                    } => listener.on_reaction(
                        ReactionChange::Removed,
                        &message_id,
                        &emoji,
                        &user_id,
                        &username,
                    ),
                    ServerEvent::Error { .. } => {}
                }
            }
            Target::Nobody => debug!("No listener for {:?}", event),
        }
    }

    /// Frames queued for the server and not yet written
    #[cfg(test)]
    pub(crate) fn drain_outbound(&self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        if let Ok(mut rx) = self.shared.outbound_rx.try_lock() {
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Handle of a conversation subscription
///
/// Unsubscribes when [`unsubscribe`](Self::unsubscribe) is called or the
/// handle is dropped. A handle never removes a newer subscription.
pub struct ConversationSubscription {
    channel: Weak<ChannelShared>,
    conversation_id: String,
    token: u64,
    active: bool,
}

impl ConversationSubscription {
    /// Conversation this handle subscribes to
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Drop the subscription
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(shared) = self.channel.upgrade() {
            ChannelClient::from_shared(shared).unsubscribe(&self.conversation_id, self.token);
        }
    }
}

impl Drop for ConversationSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ConversationSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSubscription")
            .field("conversation_id", &self.conversation_id)
            .field("token", &self.token)
            .finish()
    }
}
