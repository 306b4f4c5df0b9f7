//! Domain model shared by every component
//!
//! The module is organized into submodules:
//! - `message` - Messages, reactions and delivery status
//! - `conversation` - Conversations, counterparts and list previews
//! - `user` - The signed-in user

// Submodules
pub mod conversation;
pub mod message;
pub mod user;

// Re-export commonly used types
pub use conversation::{ChatPreview, Conversation, OtherUser};
pub use message::{DeliveryStatus, Message, MessagePage, Reaction};
pub use user::CurrentUser;
