//! Core types for TUI screens and navigation

/// Application screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Conversation list
    ChatList,
    /// One open conversation
    ChatView,
    /// Prompt for the username of a new conversation
    NewChat,
}

impl Screen {
    /// Get the key help line for the screen
    pub fn help(&self) -> &str {
        match self {
            Self::ChatList => "↑↓/j/k: Navigate | Enter: Open | n: New chat | r: Refresh | q: Quit",
            Self::ChatView => {
                "Enter: Send | ↑↓: Select message | Ctrl+E: React | Ctrl+O: Options | Ctrl+R: Reply | Esc: Back"
            }
            Self::NewChat => "Type a username | Enter: Open | Esc: Cancel",
        }
    }
}
