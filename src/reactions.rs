//! Reaction Engine
//!
//! Optimistic add/remove of emoji reactions. The cache and the rendered
//! badges change synchronously; the network call follows and is undone by
//! the exact inverse mutation when it fails. The cache is the reference for
//! uniqueness, so a realtime echo of our own change finds it already applied
//! and is dropped.

use crate::api::ChatApi;
use crate::cache::{MessageCache, SharedMessageCache};
use crate::channel::ReactionChange;
use crate::conversation::{ConversationState, SharedConversation};
use crate::optimistic::{self, CommitOutcome, OptimisticCommand};
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Applies local and remote reaction changes to the cache and the view
#[derive(Clone)]
pub struct ReactionEngine {
    api: Arc<dyn ChatApi>,
    cache: SharedMessageCache,
    state: SharedConversation,
}

impl ReactionEngine {
    /// Create an engine mutating `cache` and the view held in `state`
    pub fn new(api: Arc<dyn ChatApi>, cache: SharedMessageCache, state: SharedConversation) -> Self {
        Self { api, cache, state }
    }

    /// Add or remove a reaction of the local user
    ///
    /// Returns `None` without touching anything when the change is a no-op
    /// (adding a present reaction or removing an absent one). Otherwise the
    /// change is visible when this returns, and the handle resolves once the
    /// server settled it.
    pub fn apply_optimistic(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
        adding: bool,
        user_id: &str,
        username: &str,
    ) -> Option<JoinHandle<CommitOutcome>> {
        let generation = self.state.lock().context.generation;
        optimistic::start(ReactionCommand {
            engine: self.clone(),
            target: Target {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
                emoji: emoji.to_string(),
                user_id: user_id.to_string(),
                username: username.to_string(),
            },
            adding,
            generation,
        })
    }

    /// Apply a reaction event from the realtime channel
    ///
    /// Returns false when the cache already reflects it.
    pub fn apply_remote(
        &self,
        conversation_id: &str,
        change: ReactionChange,
        message_id: &str,
        emoji: &str,
        user_id: &str,
        username: &str,
    ) -> bool {
        let target = Target {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
        };
        let mut state = self.state.lock();
        let mut cache = self.cache.lock();
        let generation = state.context.generation;

        if is_present(&state, &cache, &target) == change.is_add() {
            debug!(
                "Reaction {} on {} by {} already reflected, echo dropped",
                emoji, message_id, user_id
            );
            return false;
        }
        mutate(&mut state, &mut cache, &target, change.is_add(), generation);
        true
    }

    /// Whether `user_id` currently has `emoji` on the message
    pub fn has_reaction(&self, conversation_id: &str, message_id: &str, user_id: &str, emoji: &str) -> bool {
        let state = self.state.lock();
        let cache = self.cache.lock();
        is_present(
            &state,
            &cache,
            &Target {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
                emoji: emoji.to_string(),
                user_id: user_id.to_string(),
                username: String::new(),
            },
        )
    }
}

struct Target {
    conversation_id: String,
    message_id: String,
    emoji: String,
    user_id: String,
    username: String,
}

fn is_present(state: &ConversationState, cache: &MessageCache, target: &Target) -> bool {
    let cached = cache
        .get(&target.conversation_id)
        .and_then(|entry| entry.message(&target.message_id))
        .map(|m| m.has_reaction(&target.user_id, &target.emoji));
    if let Some(present) = cached {
        return present;
    }
    state.context.conversation_id.as_deref() == Some(target.conversation_id.as_str())
        && state
            .view
            .message(&target.message_id)
            .is_some_and(|m| m.has_reaction(&target.user_id, &target.emoji))
}

/// Apply one change to the cache, and to the view while it still shows the
/// conversation of `generation`
fn mutate(
    state: &mut ConversationState,
    cache: &mut MessageCache,
    target: &Target,
    adding: bool,
    generation: u64,
) {
    cache.update_message(&target.conversation_id, &target.message_id, |m| {
        if adding {
            m.add_reaction(&target.emoji, &target.user_id, &target.username);
        } else {
            m.remove_reaction(&target.emoji, &target.user_id);
        }
    });

    let showing = state.context.is_current(generation)
        && state.context.conversation_id.as_deref() == Some(target.conversation_id.as_str());
    if !showing {
        return;
    }
    let is_self = state.context.self_id() == Some(target.user_id.as_str());
    if let Some(message) = state.view.message_mut(&target.message_id) {
        if adding {
            message.add_reaction(&target.emoji, &target.user_id, &target.username, is_self);
        } else {
            message.remove_reaction(&target.emoji, &target.user_id, is_self);
        }
    }
}

struct ReactionCommand {
    engine: ReactionEngine,
    target: Target,
    adding: bool,
    generation: u64,
}

impl OptimisticCommand for ReactionCommand {
    type Output = bool;

    fn label(&self) -> &'static str {
        if self.adding {
            "Add reaction"
        } else {
            "Remove reaction"
        }
    }

    fn apply(&self) -> bool {
        let mut state = self.engine.state.lock();
        let mut cache = self.engine.cache.lock();
        if is_present(&state, &cache, &self.target) == self.adding {
            return false;
        }
        mutate(&mut state, &mut cache, &self.target, self.adding, self.generation);
        true
    }

    fn commit(&self) -> impl Future<Output = Result<bool>> + Send {
        let api = self.engine.api.clone();
        let conversation_id = self.target.conversation_id.clone();
        let message_id = self.target.message_id.clone();
        let emoji = self.target.emoji.clone();
        let adding = self.adding;
        async move {
            if adding {
                api.add_reaction(&conversation_id, &message_id, &emoji).await
            } else {
                api.remove_reaction(&conversation_id, &message_id, &emoji).await
            }
        }
    }

    fn accepts(&self, output: &bool) -> bool {
        *output
    }

    fn compensate(&self) {
        let mut state = self.engine.state.lock();
        let mut cache = self.engine.cache.lock();
        mutate(&mut state, &mut cache, &self.target, !self.adding, self.generation);
    }
}
