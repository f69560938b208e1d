//! Error types for coral-expand.
//!
//! `NotReady` and `UnknownCommand` render as the exact strings the command
//! channel reports back to callers.

use thiserror::Error;

/// Errors that can occur while reconciling the widget state.
#[derive(Debug, Error)]
pub enum ExpandError {
    /// The comment widget has not been discovered (yet, or ever).
    #[error("Comments not loaded yet")]
    NotReady,

    /// The preference could not be persisted.
    #[error("Failed to save preference: {0}")]
    PersistenceFailure(String),

    /// The request named an action the engine does not know.
    #[error("Unknown action")]
    UnknownCommand(String),

    /// The request was not a well-formed command.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The widget adapter failed to apply an action.
    #[error("Widget error: {0}")]
    Widget(String),

    /// The control surface is open on a page the widget does not live on.
    #[error("Not on an FT page")]
    WrongPage(String),

    /// The engine task is gone.
    #[error("Session closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias for coral-expand operations.
pub type ExpandResult<T> = Result<T, ExpandError>;
