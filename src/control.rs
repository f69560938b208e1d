//! Control surface client.
//!
//! Turns the user's three controls (expand all, collapse replies, the
//! "Always Expand" toggle) into commands and the replies into short status
//! lines. Drawing those lines is left to whoever embeds the panel.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ControlConfig;
use crate::error::{ExpandError, ExpandResult};
use crate::protocol::{Command, Reply};
use crate::session::SessionHandle;
use crate::state::Preference;
use crate::store::PreferenceStore;

/// Something that executes commands for the page currently shown.
#[async_trait]
pub trait CommandTarget: Send + Sync {
    async fn send(&self, command: Command) -> ExpandResult<Reply>;
}

#[async_trait]
impl CommandTarget for SessionHandle {
    async fn send(&self, command: Command) -> ExpandResult<Reply> {
        SessionHandle::send(self, command).await
    }
}

/// One line of feedback for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// The control panel for one page.
pub struct ControlPanel<T: CommandTarget> {
    target: T,
    store: Arc<dyn PreferenceStore>,
    page_url: String,
    page_host: String,
}

impl<T: CommandTarget> ControlPanel<T> {
    pub fn new(
        config: &ControlConfig,
        store: Arc<dyn PreferenceStore>,
        page_url: &str,
        target: T,
    ) -> Self {
        Self {
            target,
            store,
            page_url: page_url.to_string(),
            page_host: config.page_host.clone(),
        }
    }

    /// Initial position of the "Always Expand" toggle.
    pub fn initial_toggle(&self) -> bool {
        match self.store.read() {
            Ok(preference) => preference.always_expand,
            Err(e) => {
                tracing::warn!("Failed to read preference for the toggle: {}", e);
                false
            }
        }
    }

    async fn send(&self, command: Command) -> ExpandResult<Reply> {
        if !self.page_url.contains(&self.page_host) {
            return Err(ExpandError::WrongPage(self.page_url.clone()));
        }
        self.target.send(command).await
    }

    pub async fn expand(&self) -> StatusMessage {
        match self.send(Command::Expand).await {
            Ok(reply) => match reply_count(&reply) {
                0 => StatusMessage::info("No comments to expand"),
                n => StatusMessage::info(format!("Expanded {} comments", n)),
            },
            Err(e) => StatusMessage::error(e.to_string()),
        }
    }

    pub async fn collapse(&self) -> StatusMessage {
        match self.send(Command::Collapse).await {
            Ok(reply) => match reply_count(&reply) {
                0 => StatusMessage::info("No replies to collapse"),
                n => StatusMessage::info(format!("Collapsed {} replies", n)),
            },
            Err(e) => StatusMessage::error(e.to_string()),
        }
    }

    /// Flip the "Always Expand" toggle.
    ///
    /// The preference is saved first, so it takes effect on the next page load
    /// even when the current page cannot be reached.
    pub async fn toggle(&self, enabled: bool) -> StatusMessage {
        if let Err(e) = self.store.write(Preference::new(enabled)) {
            tracing::warn!("Failed to save Always Expand: {}", e);
        }

        match self.send(Command::SetAutoExpand { enabled }).await {
            Ok(_) if enabled => StatusMessage::info("Always Expand enabled"),
            Ok(_) => StatusMessage::info("Always Expand disabled"),
            Err(e) => {
                tracing::debug!("Page did not take the toggle: {}", e);
                if enabled {
                    StatusMessage::info("Enabled (reload page to apply)")
                } else {
                    StatusMessage::info("Disabled")
                }
            }
        }
    }
}

fn reply_count(reply: &Reply) -> usize {
    match reply {
        Reply::Count { count, .. } => *count,
        Reply::State(_) => 0,
    }
}
