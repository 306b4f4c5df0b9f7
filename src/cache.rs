//! In-memory caches
//!
//! This module holds the two caches the engine renders from:
//! - `MessageCache` - per-conversation message sequences with a pagination
//!   flag and a freshness timestamp (30 s TTL by default)
//! - `ListCache` - the conversation list, kept briefly (10 s TTL by
//!   default) for instant back-navigation
//!
//! Neither cache is persisted; both live for one session.

use crate::model::{ChatPreview, Message};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Message cache shared between the controllers
pub type SharedMessageCache = Arc<Mutex<MessageCache>>;

/// List cache shared between the controllers and the read scheduler
pub type SharedListCache = Arc<Mutex<ListCache>>;

/// Cached messages of one conversation
#[derive(Debug, Clone)]
pub struct CacheEntry {
    messages: Vec<Message>,
    /// Whether older pages exist on the server
    pub has_more: bool,
    fetched_at: Instant,
}

impl CacheEntry {
    fn new(messages: Vec<Message>, has_more: bool) -> Self {
        Self {
            messages: normalize(messages),
            has_more,
            fetched_at: Instant::now(),
        }
    }

    /// Messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether a message with this id is cached
    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    /// Look up a message
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Id of the oldest cached message, the cursor for the next older page
    pub fn oldest_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.id.as_str())
    }

    /// When the entry was last written
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    fn touch(&mut self) {
        self.fetched_at = Instant::now();
    }

    fn trim_to(&mut self, max: usize) -> usize {
        if self.messages.len() <= max {
            return 0;
        }
        let excess = self.messages.len() - max;
        self.messages.drain(..excess);
        self.has_more = true;
        excess
    }
}

/// Sort by creation time (stable) and drop repeated ids, keeping the first
fn normalize(mut messages: Vec<Message>) -> Vec<Message> {
    let mut seen = std::collections::HashSet::new();
    messages.retain(|m| seen.insert(m.id.clone()));
    messages.sort_by_key(|m| m.created_at);
    messages
}

/// Per-conversation message cache
#[derive(Debug)]
pub struct MessageCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_retained: usize,
    open: Option<String>,
}

impl MessageCache {
    /// Create a cache with the given freshness window and per-conversation cap
    pub fn new(ttl: Duration, max_retained: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_retained: max_retained.max(1),
            open: None,
        }
    }

    /// Wrap into the shared handle used by the controllers
    pub fn shared(self) -> SharedMessageCache {
        Arc::new(Mutex::new(self))
    }

    /// Cached entry of a conversation
    pub fn get(&self, conversation_id: &str) -> Option<&CacheEntry> {
        self.entries.get(conversation_id)
    }

    /// Cached entry of a conversation, only if still fresh
    pub fn fresh(&self, conversation_id: &str) -> Option<&CacheEntry> {
        self.get(conversation_id).filter(|entry| self.is_fresh(entry))
    }

    /// Whether an entry is younger than the TTL
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.fetched_at.elapsed() < self.ttl
    }

    /// Replace a conversation's messages
    pub fn set(&mut self, conversation_id: &str, messages: Vec<Message>, has_more: bool) {
        let mut entry = CacheEntry::new(messages, has_more);
        if !self.is_open(conversation_id) {
            entry.trim_to(self.max_retained);
        }
        self.entries.insert(conversation_id.to_string(), entry);
    }

    /// Append one message
    ///
    /// Returns false, leaving the entry untouched, when the id is already
    /// present. A conversation without an entry only gets one while it is
    /// open; otherwise the message is not cached.
    pub fn append(&mut self, conversation_id: &str, message: Message) -> bool {
        let open = self.is_open(conversation_id);
        let max = self.max_retained;
        if open && !self.entries.contains_key(conversation_id) {
            self.entries
                .insert(conversation_id.to_string(), CacheEntry::new(Vec::new(), false));
        }
        let Some(entry) = self.entries.get_mut(conversation_id) else {
            return false;
        };
        if entry.contains(&message.id) {
            return false;
        }

        let position = entry
            .messages
            .iter()
            .rposition(|m| m.created_at <= message.created_at)
            .map(|i| i + 1)
            .unwrap_or(0);
        entry.messages.insert(position, message);
        entry.touch();
        if !open {
            entry.trim_to(max);
        }
        true
    }

    /// Merge an older page in front of the cached messages
    ///
    /// Returns how many messages were actually inserted.
    pub fn prepend(&mut self, conversation_id: &str, older: Vec<Message>, has_more: bool) -> usize {
        let entry = self
            .entries
            .entry(conversation_id.to_string())
            .or_insert_with(|| CacheEntry::new(Vec::new(), has_more));

        let older: Vec<Message> = older
            .into_iter()
            .filter(|m| !entry.contains(&m.id))
            .collect();
        let mut merged = normalize(older);
        let inserted = merged.len();

        merged.append(&mut entry.messages);
        merged.sort_by_key(|m| m.created_at);
        entry.messages = merged;
        entry.has_more = has_more;
        entry.touch();
        inserted
    }

    /// Merge a re-fetched newest page into the cached messages
    ///
    /// `baseline` is the entry's content when the page was requested. A
    /// message that changed locally since then (read receipt, reaction) or
    /// arrived after the request keeps its local state; unchanged ones take
    /// the server copy. Messages absent from the page are kept.
    pub fn merge_newest(
        &mut self,
        conversation_id: &str,
        page: Vec<Message>,
        has_more: bool,
        baseline: &[Message],
    ) {
        if !self.entries.contains_key(conversation_id) {
            self.set(conversation_id, page, has_more);
            return;
        }
        let open = self.is_open(conversation_id);
        let max = self.max_retained;
        let Some(entry) = self.entries.get_mut(conversation_id) else {
            return;
        };

        let page = normalize(page);
        let keeps_older = page
            .first()
            .is_some_and(|first| entry.messages.iter().any(|m| m.created_at < first.created_at));

        for incoming in page {
            match entry.messages.iter_mut().find(|m| m.id == incoming.id) {
                Some(local) => {
                    let untouched = baseline.iter().any(|b| b == &*local);
                    if untouched {
                        *local = incoming;
                    } else if local.read_at.is_none() {
                        local.read_at = incoming.read_at;
                    }
                }
                None => entry.messages.push(incoming),
            }
        }
        entry.messages.sort_by_key(|m| m.created_at);
        if !keeps_older {
            entry.has_more = has_more;
        }
        entry.touch();
        if !open {
            entry.trim_to(max);
        }
    }

    /// Mutate one cached message in place
    ///
    /// Returns false when the conversation or message is not cached.
    pub fn update_message<F>(&mut self, conversation_id: &str, message_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        let Some(entry) = self.entries.get_mut(conversation_id) else {
            return false;
        };
        let Some(message) = entry.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        update(message);
        entry.touch();
        true
    }

    /// Drop a conversation's entry
    pub fn invalidate(&mut self, conversation_id: &str) {
        self.entries.remove(conversation_id);
    }

    /// Number of cached conversations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark the conversation currently on screen
    ///
    /// The open conversation keeps everything infinite scroll pulled in;
    /// the one being closed is trimmed back to the retention cap.
    pub fn set_open(&mut self, conversation_id: Option<&str>) {
        let previous = std::mem::replace(&mut self.open, conversation_id.map(str::to_string));
        if let Some(previous) = previous {
            if Some(previous.as_str()) != conversation_id {
                let max = self.max_retained;
                if let Some(entry) = self.entries.get_mut(&previous) {
                    entry.trim_to(max);
                }
            }
        }
    }

    fn is_open(&self, conversation_id: &str) -> bool {
        self.open.as_deref() == Some(conversation_id)
    }
}

/// Short-lived cache of the conversation list
#[derive(Debug)]
pub struct ListCache {
    chats: Vec<ChatPreview>,
    fetched_at: Option<Instant>,
    ttl: Duration,
}

impl ListCache {
    /// Create an empty list cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            chats: Vec::new(),
            fetched_at: None,
            ttl,
        }
    }

    /// Wrap into the shared handle
    pub fn shared(self) -> SharedListCache {
        Arc::new(Mutex::new(self))
    }

    /// Replace the cached list
    pub fn set(&mut self, chats: Vec<ChatPreview>) {
        self.chats = chats;
        self.fetched_at = Some(Instant::now());
    }

    /// Whether the cached list is younger than the TTL
    pub fn is_fresh(&self) -> bool {
        self.fetched_at
            .is_some_and(|fetched_at| fetched_at.elapsed() < self.ttl)
    }

    /// Cached list, only if fresh
    pub fn fresh(&self) -> Option<&[ChatPreview]> {
        self.is_fresh().then_some(self.chats.as_slice())
    }

    /// Cached list regardless of age
    pub fn chats(&self) -> &[ChatPreview] {
        &self.chats
    }

    /// Mutable access for incremental patches; does not extend freshness
    pub fn chats_mut(&mut self) -> &mut Vec<ChatPreview> {
        &mut self.chats
    }

    /// Force the next read to go to the server
    pub fn invalidate(&mut self) {
        self.fetched_at = None;
    }
}
