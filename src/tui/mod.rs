//! TUI (Terminal User Interface) module
//!
//! Binds the engine's view model to a ratatui terminal. Kept out of the
//! binary so screens and key handling can be tested.

pub mod app;
pub mod screens;
pub mod types;
pub mod ui;

// Re-export main types for convenience
pub use app::App;
pub use screens::*;
pub use types::Screen;
