//! Boundary to the embedded comment widget.
//!
//! The engine never touches comment nodes itself. It asks a [`WidgetAdapter`]
//! to expand everything or collapse replies and gets back how many comments
//! were affected. A [`WidgetLocator`] finds the widget in the first place.

pub mod discovery;
pub mod thread;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ExpandResult;

pub use discovery::{discover, DiscoveryOutcome, DiscoveryState};
pub use thread::{CommentNode, CommentThread, ThreadLocator, Visibility};

/// The widget's content changed structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChange {
    /// Number of comments added by the change (0 if unknown).
    pub added: usize,
}

/// Where a widget-changed trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// The widget was just found.
    InitialLoad,
    /// The widget reported a content change.
    Observed,
    /// The fallback poll fired.
    Poll,
}

/// Actions the engine can apply to a discovered widget.
///
/// Both actions must be idempotent: re-applying them affects nothing and
/// returns 0.
#[async_trait]
pub trait WidgetAdapter: Send + Sync {
    /// Show every hidden comment. Returns the number revealed.
    async fn expand_all(&self) -> ExpandResult<usize>;

    /// Hide every shown reply (indent level >= 1). Top-level comments are
    /// never touched. Returns the number hidden.
    async fn collapse_replies(&self) -> ExpandResult<usize>;

    /// Subscribe to structural content changes.
    fn content_changes(&self) -> broadcast::Receiver<ContentChange>;
}

/// Finds the widget on the page.
#[async_trait]
pub trait WidgetLocator: Send + Sync {
    /// One lookup attempt.
    async fn locate(&self) -> Option<Arc<dyn WidgetAdapter>>;
}
