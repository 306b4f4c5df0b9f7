//! GH Chat - realtime one-to-one conversation engine
//!
//! This library provides the core of the GH Chat client: a message cache,
//! a live realtime channel, and an eventually-consistent view of delivery,
//! read and reaction state for the conversation a user has open. Any UI
//! layer (browser, terminal, native) binds to the view model exposed by
//! [`session::ChatSession`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod cache;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod list;
pub mod model;
pub mod optimistic;
pub mod reactions;
pub mod read_receipts;
pub mod session;
pub mod tui;
pub mod view;

/// Result type alias for GH Chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for GH Chat operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The API answered with a failure status or an explicit error payload
    #[error("API error: {0}")]
    Api(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Realtime channel error (connection or protocol)
    #[error("Channel error: {0}")]
    Channel(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A conversation could not be resolved or created
    #[error("Conversation bootstrap failed: {0}")]
    Bootstrap(String),

    /// A command was issued in a state that cannot serve it
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// Malformed URL
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Initialize the GH Chat library with logging
///
/// Honours `RUST_LOG`, defaulting to `info`.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests;
