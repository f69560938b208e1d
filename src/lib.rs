//! coral-expand - keeps a threaded comment widget expanded or collapsed.
//!
//! Three independent actors touch the widget's visibility: a monitor watching
//! the widget for new content, a control surface issuing commands, and a
//! preference ("Always Expand") shared with other sessions. The
//! [`ReconciliationEngine`] serializes all of them through one trigger queue
//! and decides when to expand or collapse.
//!
//! # Architecture
//!
//! - [`engine`] - the reconciliation state machine and its trigger queue
//! - [`session`] - discovery, monitoring and preference-feed tasks around an engine
//! - [`store`] - shared preference storage with cross-session change feed
//! - [`widget`] - the widget boundary, discovery, and an in-memory thread
//! - [`protocol`] - JSON command channel
//! - [`control`] - control surface client producing status messages
//! - [`config`] - configuration loading
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use coral_expand::{Config, SessionHandle, SyncStorage, CommentThread, ThreadLocator};
//!
//! let config = Config::load();
//! let storage = SyncStorage::open(config.storage.dir.clone(), &config.storage.scope);
//! let locator = Arc::new(ThreadLocator::immediately(CommentThread::new()));
//! let session = SessionHandle::start(&config, Arc::new(storage.session()), locator);
//!
//! let response = session.request_json(r#"{"action":"getState"}"#).await;
//! ```

pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod protocol;
pub mod session;
pub mod state;
pub mod store;
pub mod widget;

mod error;

pub use config::Config;
pub use control::{CommandTarget, ControlPanel, StatusMessage};
pub use engine::{ReconciliationEngine, Trigger};
pub use error::{ExpandError, ExpandResult};
pub use protocol::{parse_request, Command, Reply, Response};
pub use session::SessionHandle;
pub use state::{Preference, ReconciliationState};
pub use store::{PreferenceChange, PreferenceFeed, PreferenceStore, StoreSession, SyncStorage};
pub use widget::{
    ChangeSource, CommentNode, CommentThread, ContentChange, DiscoveryState, ThreadLocator,
    Visibility, WidgetAdapter, WidgetLocator,
};
