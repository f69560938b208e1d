//! In-memory comment thread.
//!
//! Models the widget as an ordered list of comments with an indent level and a
//! shown/hidden flag. Used by the binary and by tests in place of a live page.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{ContentChange, WidgetAdapter, WidgetLocator};
use crate::error::ExpandResult;

/// Whether a comment's body is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Shown,
    Hidden,
}

/// A single comment in the thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    #[serde(default)]
    pub id: u64,
    pub author: String,
    /// 0 for top-level comments, 1 and up for replies.
    #[serde(default)]
    pub indent_level: u32,
    #[serde(default)]
    pub visibility: Visibility,
}

impl CommentNode {
    pub fn new(author: &str, indent_level: u32, visibility: Visibility) -> Self {
        Self {
            id: 0,
            author: author.to_string(),
            indent_level,
            visibility,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.indent_level >= 1
    }
}

#[derive(Default)]
struct ThreadNodes {
    nodes: Vec<CommentNode>,
    next_id: u64,
}

/// A comment thread held in memory. Clones share the same thread.
#[derive(Clone)]
pub struct CommentThread {
    nodes: Arc<Mutex<ThreadNodes>>,
    changes: broadcast::Sender<ContentChange>,
}

impl Default for CommentThread {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentThread {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(32);
        Self {
            nodes: Arc::new(Mutex::new(ThreadNodes {
                nodes: Vec::new(),
                next_id: 1,
            })),
            changes,
        }
    }

    /// A thread pre-populated with `comments`. No change is reported for them.
    pub fn with_comments(comments: Vec<CommentNode>) -> Self {
        let thread = Self::new();
        {
            let mut nodes = thread.lock();
            for comment in comments {
                Self::insert(&mut nodes, comment);
            }
        }
        thread
    }

    /// Load a thread from a JSON array of comments.
    pub fn from_json_file(path: &Path) -> ExpandResult<Self> {
        let contents = fs::read_to_string(path)?;
        let comments: Vec<CommentNode> = serde_json::from_str(&contents)?;
        Ok(Self::with_comments(comments))
    }

    fn lock(&self) -> MutexGuard<'_, ThreadNodes> {
        self.nodes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(nodes: &mut ThreadNodes, mut comment: CommentNode) -> u64 {
        comment.id = nodes.next_id;
        nodes.next_id += 1;
        let id = comment.id;
        nodes.nodes.push(comment);
        id
    }

    /// Append one comment, as if the widget rendered it. Returns its id.
    pub fn push_comment(&self, author: &str, indent_level: u32, visibility: Visibility) -> u64 {
        let id = Self::insert(
            &mut self.lock(),
            CommentNode::new(author, indent_level, visibility),
        );
        let _ = self.changes.send(ContentChange { added: 1 });
        id
    }

    /// Append a lazily loaded batch of comments and report one change for it.
    pub fn load_batch(&self, comments: Vec<CommentNode>) {
        let added = comments.len();
        if added == 0 {
            return;
        }
        {
            let mut nodes = self.lock();
            for comment in comments {
                Self::insert(&mut nodes, comment);
            }
        }
        let _ = self.changes.send(ContentChange { added });
    }

    /// Flip one comment, as a reader clicking its toggle would.
    pub fn set_visibility(&self, id: u64, visibility: Visibility) -> bool {
        match self.lock().nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.visibility = visibility;
                true
            }
            None => false,
        }
    }

    pub fn nodes(&self) -> Vec<CommentNode> {
        self.lock().nodes.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hidden_count(&self) -> usize {
        self.lock()
            .nodes
            .iter()
            .filter(|n| n.visibility == Visibility::Hidden)
            .count()
    }

    /// Reveal every hidden comment.
    pub fn reveal_all(&self) -> usize {
        let mut count = 0;
        for node in self.lock().nodes.iter_mut() {
            if node.visibility == Visibility::Hidden {
                node.visibility = Visibility::Shown;
                count += 1;
            }
        }
        count
    }

    /// Hide every shown reply; top-level comments stay as they are.
    pub fn hide_replies(&self) -> usize {
        let mut count = 0;
        for node in self.lock().nodes.iter_mut() {
            if node.is_reply() && node.visibility == Visibility::Shown {
                node.visibility = Visibility::Hidden;
                count += 1;
            }
        }
        count
    }
}

#[async_trait]
impl WidgetAdapter for CommentThread {
    async fn expand_all(&self) -> ExpandResult<usize> {
        Ok(self.reveal_all())
    }

    async fn collapse_replies(&self) -> ExpandResult<usize> {
        Ok(self.hide_replies())
    }

    fn content_changes(&self) -> broadcast::Receiver<ContentChange> {
        self.changes.subscribe()
    }
}

/// Locator for an in-memory thread that "renders" after a number of lookups.
pub struct ThreadLocator {
    thread: Option<CommentThread>,
    appear_after: usize,
    attempts: AtomicUsize,
}

impl ThreadLocator {
    /// Found on the `attempts`-th lookup (1 = the first one).
    pub fn after_attempts(thread: CommentThread, attempts: usize) -> Self {
        Self {
            thread: Some(thread),
            appear_after: attempts.max(1),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn immediately(thread: CommentThread) -> Self {
        Self::after_attempts(thread, 1)
    }

    /// A page without the widget.
    pub fn never() -> Self {
        Self {
            thread: None,
            appear_after: usize::MAX,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of lookups made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WidgetLocator for ThreadLocator {
    async fn locate(&self) -> Option<Arc<dyn WidgetAdapter>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt < self.appear_after {
            return None;
        }
        self.thread
            .clone()
            .map(|thread| Arc::new(thread) as Arc<dyn WidgetAdapter>)
    }
}
