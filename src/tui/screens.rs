//! Per-screen UI state that the engine does not own

use crate::view::QUICK_EMOJIS;

/// Scroll units per message row
pub const ROW_HEIGHT: u32 = 24;

/// Chat list screen state
#[derive(Debug, Default)]
pub struct ChatListScreen {
    /// Selected chat index
    pub selected_index: usize,
}

impl ChatListScreen {
    /// Create new chat list screen
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to next chat
    pub fn next(&mut self, chat_count: usize) {
        if chat_count > 0 {
            self.selected_index = (self.selected_index + 1) % chat_count;
        }
    }

    /// Move to previous chat
    pub fn previous(&mut self, chat_count: usize) {
        if chat_count > 0 {
            if self.selected_index > 0 {
                self.selected_index -= 1;
            } else {
                self.selected_index = chat_count - 1;
            }
        }
    }

    /// Keep the selection inside the list after it changed size
    pub fn clamp(&mut self, chat_count: usize) {
        if self.selected_index >= chat_count {
            self.selected_index = chat_count.saturating_sub(1);
        }
    }
}

/// Chat view screen state
#[derive(Debug, Default)]
pub struct ChatViewScreen {
    /// Selected message, counted from the oldest loaded one
    pub selected_message: Option<usize>,
    /// Highlighted emoji in the picker
    pub emoji_index: usize,
    /// Message count seen on the previous frame
    last_len: usize,
}

impl ChatViewScreen {
    /// Create new chat view screen
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the previous (older) message; returns the scroll offset of the selection
    pub fn select_up(&mut self, message_count: usize) -> Option<u32> {
        if message_count == 0 {
            return None;
        }
        let index = match self.selected_message {
            Some(i) => i.saturating_sub(1),
            None => message_count - 1,
        };
        self.selected_message = Some(index);
        Some(index as u32 * ROW_HEIGHT)
    }

    /// Select the next (newer) message; deselects past the newest
    pub fn select_down(&mut self, message_count: usize) {
        self.selected_message = match self.selected_message {
            Some(i) if i + 1 < message_count => Some(i + 1),
            _ => None,
        };
    }

    /// Keep the selection on the same message after older ones were prepended
    pub fn sync(&mut self, message_count: usize, prepended: usize) {
        if message_count > self.last_len {
            if let Some(i) = self.selected_message.as_mut() {
                *i += prepended.min(message_count - self.last_len);
            }
        }
        self.last_len = message_count;
        if let Some(i) = self.selected_message {
            if i >= message_count {
                self.selected_message = message_count.checked_sub(1);
            }
        }
    }

    /// Move the picker highlight left
    pub fn emoji_left(&mut self) {
        self.emoji_index = (self.emoji_index + QUICK_EMOJIS.len() - 1) % QUICK_EMOJIS.len();
    }

    /// Move the picker highlight right
    pub fn emoji_right(&mut self) {
        self.emoji_index = (self.emoji_index + 1) % QUICK_EMOJIS.len();
    }

    /// The highlighted emoji
    pub fn emoji(&self) -> &'static str {
        QUICK_EMOJIS[self.emoji_index % QUICK_EMOJIS.len()]
    }
}

/// New chat prompt state
#[derive(Debug, Default)]
pub struct NewChatScreen {
    /// Username being typed
    pub input: String,
}

impl NewChatScreen {
    /// Create new prompt
    pub fn new() -> Self {
        Self::default()
    }

    /// Add character to input; usernames have no spaces
    pub fn add_char(&mut self, c: char) {
        if !c.is_whitespace() {
            self.input.push(c);
        }
    }

    /// Remove last character from input
    pub fn backspace(&mut self) {
        self.input.pop();
    }

    /// Trimmed username, if any
    pub fn username(&self) -> Option<String> {
        let name = self.input.trim().trim_start_matches('@');
        (!name.is_empty()).then(|| name.to_string())
    }
}
