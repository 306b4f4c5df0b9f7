//! List View Controller
//!
//! Keeps the conversation summaries, backed by the short-lived list cache,
//! and owns the global inbound-message listener while the list is the
//! active view.

use crate::api::ChatApi;
use crate::cache::{SharedListCache, SharedMessageCache};
use crate::channel::{ChannelClient, GlobalMessageHandler};
use crate::model::{ChatPreview, Message};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Rendered state of the conversation list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListState {
    /// Rows, most recent first
    pub chats: Vec<ChatPreview>,
    /// A fetch is running
    pub loading: bool,
    /// Inline error of the last fetch
    pub error: Option<String>,
}

/// Controller of the conversation list
#[derive(Clone)]
pub struct ListController {
    api: Arc<dyn ChatApi>,
    channel: ChannelClient,
    cache: SharedMessageCache,
    list_cache: SharedListCache,
    state: Arc<Mutex<ListState>>,
    prefetch: Arc<Mutex<Option<JoinHandle<usize>>>>,
    prefetch_count: usize,
}

impl ListController {
    /// Wire the controller to its collaborators
    pub fn new(
        api: Arc<dyn ChatApi>,
        channel: ChannelClient,
        cache: SharedMessageCache,
        list_cache: SharedListCache,
        prefetch_count: usize,
    ) -> Self {
        Self {
            api,
            channel,
            cache,
            list_cache,
            state: Arc::new(Mutex::new(ListState::default())),
            prefetch: Arc::new(Mutex::new(None)),
            prefetch_count,
        }
    }

    /// Copy of the list state
    pub fn snapshot(&self) -> ListState {
        self.state.lock().clone()
    }

    /// Sum of unread counts over every row
    pub fn unread_total(&self) -> u32 {
        self.state.lock().chats.iter().map(|c| c.unread_count).sum()
    }

    /// Show the list: from the cache when fresh, otherwise from the server
    pub async fn load(&self) -> Result<Vec<ChatPreview>> {
        let cached = self.list_cache.lock().fresh().map(<[ChatPreview]>::to_vec);
        if let Some(chats) = cached {
            debug!("Conversation list served from cache");
            let mut state = self.state.lock();
            state.chats = chats.clone();
            state.error = None;
            return Ok(chats);
        }
        self.refresh().await
    }

    /// Fetch the list, republish the cache and prefetch the newest few
    pub async fn refresh(&self) -> Result<Vec<ChatPreview>> {
        self.state.lock().loading = true;

        let conversations = match self.api.get_conversations().await {
            Ok(conversations) => conversations,
            Err(e) => {
                warn!("Loading conversations failed: {}", e);
                let mut state = self.state.lock();
                state.loading = false;
                state.error = Some(format!("Could not load conversations: {}", e));
                return Err(e);
            }
        };

        let mut chats: Vec<ChatPreview> = conversations.iter().map(ChatPreview::from).collect();
        chats.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));

        self.list_cache.lock().set(chats.clone());
        {
            let mut state = self.state.lock();
            state.chats = chats.clone();
            state.loading = false;
            state.error = None;
        }
        info!("Loaded {} conversations", chats.len());

        let ids: Vec<String> = chats
            .iter()
            .take(self.prefetch_count)
            .map(|c| c.conversation_id.clone())
            .collect();
        let this = self.clone();
        let task = tokio::spawn(async move { this.prefetch(ids).await });
        if let Some(previous) = self.prefetch.lock().replace(task) {
            previous.abort();
        }
        Ok(chats)
    }

    /// Warm the message cache for `conversation_ids`, skipping fresh entries
    ///
    /// Best effort: failures are logged and skipped. Returns how many
    /// conversations were fetched.
    pub async fn prefetch(&self, conversation_ids: Vec<String>) -> usize {
        let mut fetched = 0;
        for conversation_id in conversation_ids {
            if self.cache.lock().fresh(&conversation_id).is_some() {
                continue;
            }
            match self.api.get_messages(&conversation_id, None).await {
                Ok(page) => {
                    let mut cache = self.cache.lock();
                    // A conversation opened meanwhile owns its entry
                    if cache.fresh(&conversation_id).is_none() {
                        cache.set(&conversation_id, page.messages, page.has_more);
                        fetched += 1;
                    }
                }
                Err(e) => debug!("Prefetch of {} failed: {}", conversation_id, e),
            }
        }
        fetched
    }

    /// Wait for the prefetch started by the last refresh
    pub async fn settle_prefetch(&self) -> usize {
        let task = self.prefetch.lock().take();
        match task {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }

    /// Install the global listener patching previews for inbound messages
    pub fn activate(&self, self_id: Option<String>) {
        let state = self.state.clone();
        let list_cache = self.list_cache.clone();
        let cache = self.cache.clone();
        let handler: GlobalMessageHandler = Arc::new(move |message: Message| {
            let own = self_id.as_deref() == Some(message.sender_id.as_str());
            let known = patch_preview(&mut state.lock().chats, &message, own);
            {
                let mut list = list_cache.lock();
                if known {
                    patch_preview(list.chats_mut(), &message, own);
                } else {
                    debug!(
                        "Message for unknown conversation {}, list cache invalidated",
                        message.conversation_id
                    );
                    list.invalidate();
                }
            }
            let conversation_id = message.conversation_id.clone();
            cache.lock().append(&conversation_id, message);
        });
        self.channel.set_global_message_listener(Some(handler));
        debug!("Global message listener active");
    }

    /// Remove the global listener
    pub fn deactivate(&self) {
        self.channel.set_global_message_listener(None);
        if let Some(task) = self.prefetch.lock().take() {
            task.abort();
        }
    }
}

/// Update the row of the message's conversation and move it to the top
///
/// Returns false when the conversation has no row.
fn patch_preview(chats: &mut Vec<ChatPreview>, message: &Message, own: bool) -> bool {
    let Some(index) = chats
        .iter()
        .position(|c| c.conversation_id == message.conversation_id)
    else {
        return false;
    };
    let mut preview = chats.remove(index);
    if own {
        preview.record_outgoing(&message.content, message.created_at);
    } else {
        preview.record_incoming(&message.content, message.created_at);
    }
    chats.insert(0, preview);
    true
}
