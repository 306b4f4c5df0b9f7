//! Delayed read receipts
//!
//! Opening a conversation does not mark it read right away: the user has to
//! stay on it for the read delay (1.5 s by default). Leaving earlier cancels
//! the pending operation, so a glance never reports messages as read.

use crate::api::ChatApi;
use crate::cache::SharedListCache;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Scheduled {
    conversation_id: String,
    token: u64,
    handle: JoinHandle<()>,
}

/// Single-slot scheduler of delayed mark-as-read operations
pub struct ReadReceiptScheduler {
    api: Arc<dyn ChatApi>,
    list_cache: SharedListCache,
    delay: Duration,
    pending: Arc<Mutex<Option<Scheduled>>>,
    next_token: AtomicU64,
}

impl ReadReceiptScheduler {
    /// Create a scheduler firing after `delay`
    pub fn new(api: Arc<dyn ChatApi>, list_cache: SharedListCache, delay: Duration) -> Self {
        Self {
            api,
            list_cache,
            delay,
            pending: Arc::new(Mutex::new(None)),
            next_token: AtomicU64::new(1),
        }
    }

    /// Mark `conversation_id` (and `message_ids`) read once the delay elapses
    ///
    /// Replaces any operation still pending, whatever its conversation.
    pub fn schedule(&self, conversation_id: &str, message_ids: Vec<String>) {
        self.cancel();

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let api = self.api.clone();
        let list_cache = self.list_cache.clone();
        let pending = self.pending.clone();
        let delay = self.delay;
        let conversation = conversation_id.to_string();

        let mut slot = self.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut pending = pending.lock();
                let current = matches!(
                    pending.as_ref(),
                    Some(s) if s.token == token && s.conversation_id == conversation
                );
                if !current {
                    return;
                }
                *pending = None;
            }

            info!("Marking conversation {} as read", conversation);
            if let Err(e) = api.mark_conversation_as_read(&conversation).await {
                warn!("Failed to mark conversation {} read: {}", conversation, e);
            }
            if !message_ids.is_empty() {
                if let Err(e) = api.mark_messages_as_read(&message_ids).await {
                    warn!("Failed to mark {} messages read: {}", message_ids.len(), e);
                }
            }

            let mut list = list_cache.lock();
            if let Some(preview) = list
                .chats_mut()
                .iter_mut()
                .find(|c| c.conversation_id == conversation)
            {
                preview.mark_read();
            }
            list.invalidate();
        });

        // The task cannot observe the slot before this guard is released
        *slot = Some(Scheduled {
            conversation_id: conversation_id.to_string(),
            token,
            handle,
        });
        debug!("Read receipt scheduled for {} in {:?}", conversation_id, self.delay);
    }

    /// Drop the pending operation, if any; safe to call repeatedly
    pub fn cancel(&self) {
        if let Some(scheduled) = self.pending.lock().take() {
            scheduled.handle.abort();
            debug!("Read receipt for {} cancelled", scheduled.conversation_id);
        }
    }

    /// Whether an operation is waiting for its delay
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Conversation of the pending operation
    pub fn pending_conversation(&self) -> Option<String> {
        self.pending.lock().as_ref().map(|s| s.conversation_id.clone())
    }
}

impl Drop for ReadReceiptScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
