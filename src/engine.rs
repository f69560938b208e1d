//! Reconciliation engine.
//!
//! The engine is the only owner of the session's [`ReconciliationState`]. All
//! inputs (widget changes, commands, preference changes from other sessions,
//! discovery results) arrive as [`Trigger`]s on one queue and are handled one
//! at a time, so every trigger sees the complete effect of the previous one.
//!
//! ```text
//! monitor ──WidgetChanged──┐
//! commands ──Command───────┼──> mpsc ──> ReconciliationEngine ──> WidgetAdapter
//! store feed ──Preference──┤                    │
//! discovery ──Discovered───┘                    └──> PreferenceStore
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{ExpandError, ExpandResult};
use crate::protocol::{Command, Reply};
use crate::state::{Preference, ReconciliationState};
use crate::store::{PreferenceChange, PreferenceStore};
use crate::widget::{ChangeSource, DiscoveryState, WidgetAdapter};

/// Input to the engine.
pub enum Trigger {
    /// The widget may have new content.
    WidgetChanged(ChangeSource),
    /// A command awaiting a reply.
    Command {
        command: Command,
        reply: oneshot::Sender<ExpandResult<Reply>>,
    },
    /// Another session changed the preference.
    PreferenceChanged(PreferenceChange),
    /// Discovery found the widget.
    Discovered(Arc<dyn WidgetAdapter>),
    /// Discovery gave up.
    DiscoveryTimedOut,
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::WidgetChanged(source) => f.debug_tuple("WidgetChanged").field(source).finish(),
            Trigger::Command { command, .. } => f.debug_tuple("Command").field(command).finish(),
            Trigger::PreferenceChanged(change) => {
                f.debug_tuple("PreferenceChanged").field(change).finish()
            }
            Trigger::Discovered(_) => f.write_str("Discovered"),
            Trigger::DiscoveryTimedOut => f.write_str("DiscoveryTimedOut"),
        }
    }
}

/// Owns the live state and decides when to expand or collapse.
pub struct ReconciliationEngine {
    state: ReconciliationState,
    store: Arc<dyn PreferenceStore>,
    widget: Option<Arc<dyn WidgetAdapter>>,
    discovery: watch::Sender<DiscoveryState>,
    /// Highest store revision already reflected in `state`.
    applied_revision: u64,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        let (discovery, _) = watch::channel(DiscoveryState::Searching);
        Self {
            state: ReconciliationState::default(),
            store,
            widget: None,
            discovery,
            applied_revision: 0,
        }
    }

    pub fn state(&self) -> ReconciliationState {
        self.state
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        *self.discovery.borrow()
    }

    /// Follow the discovery state as the engine moves through it.
    pub fn watch_discovery(&self) -> watch::Receiver<DiscoveryState> {
        self.discovery.subscribe()
    }

    fn set_discovery(&self, state: DiscoveryState) {
        self.discovery.send_replace(state);
    }

    fn ready_widget(&self) -> ExpandResult<Arc<dyn WidgetAdapter>> {
        match &self.widget {
            Some(widget) if self.discovery_state().is_ready() => Ok(Arc::clone(widget)),
            _ => Err(ExpandError::NotReady),
        }
    }

    /// Consume triggers until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Trigger>) {
        while let Some(trigger) = rx.recv().await {
            self.handle(trigger).await;
        }
        tracing::debug!("Trigger queue closed, engine stopping");
    }

    /// Handle one trigger. Never fails: errors are replied or logged.
    pub async fn handle(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::WidgetChanged(source) => {
                self.on_widget_changed(source).await;
            }
            Trigger::Command { command, reply } => {
                let result = self.on_command(command).await;
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
            Trigger::PreferenceChanged(change) => {
                self.on_preference_changed(change).await;
            }
            Trigger::Discovered(widget) => {
                self.on_discovered(widget).await;
            }
            Trigger::DiscoveryTimedOut => self.on_discovery_timed_out(),
        }
    }

    /// The widget's content may have changed. Expands everything when
    /// auto-expand is on and the user has not collapsed manually.
    ///
    /// Returns the number of comments revealed.
    pub async fn on_widget_changed(&mut self, source: ChangeSource) -> usize {
        if !self.state.should_auto_expand() {
            return 0;
        }
        let Ok(widget) = self.ready_widget() else {
            return 0;
        };

        match widget.expand_all().await {
            Ok(count) => {
                if count > 0 {
                    match source {
                        ChangeSource::InitialLoad => {
                            tracing::info!("Auto-expanded {} comments", count)
                        }
                        ChangeSource::Observed => {
                            tracing::info!("Auto-expanded {} newly loaded comments", count)
                        }
                        ChangeSource::Poll => {
                            tracing::info!("Periodic check: expanded {} comments", count)
                        }
                    }
                }
                count
            }
            Err(e) => {
                tracing::warn!("Auto-expand failed: {}", e);
                0
            }
        }
    }

    /// Apply a command from the control surface.
    pub async fn on_command(&mut self, command: Command) -> ExpandResult<Reply> {
        if let Command::GetState = command {
            return Ok(Reply::State(self.state));
        }

        let widget = self.ready_widget()?;

        match command {
            Command::Expand => {
                self.state.apply_expand();
                let count = widget.expand_all().await?;
                tracing::info!("Manual expand: {} comments", count);
                Ok(Reply::count(count))
            }
            Command::Collapse => {
                self.state.apply_collapse();
                let count = widget.collapse_replies().await?;
                tracing::info!("Manual collapse: {} replies", count);
                Ok(Reply::count(count))
            }
            Command::SetAutoExpand { enabled } => {
                self.state.apply_auto_expand(enabled);
                tracing::info!("Auto-expand set to: {}", enabled);

                let warning = self.persist(enabled).await.err().map(|e| {
                    tracing::warn!("Keeping auto-expand for this session only: {}", e);
                    e.to_string()
                });

                let count = if enabled {
                    widget.expand_all().await?
                } else {
                    0
                };
                Ok(Reply::Count { count, warning })
            }
            Command::GetState => Ok(Reply::State(self.state)),
        }
    }

    /// Save the preference and remember its revision so the echo of this
    /// write (or an older one) is not applied again.
    ///
    /// The write may hit the disk, so it runs on the blocking pool.
    async fn persist(&mut self, enabled: bool) -> ExpandResult<()> {
        let store = Arc::clone(&self.store);
        let written = tokio::task::spawn_blocking(move || store.write(Preference::new(enabled)))
            .await
            .map_err(|e| ExpandError::PersistenceFailure(e.to_string()))??;

        match written {
            Some(revision) => {
                self.applied_revision = self.applied_revision.max(revision);
            }
            None => {
                // Already stored; adopt the revision that stored it.
                let (stored, revision) = self.store.read_versioned()?;
                if stored.always_expand == enabled {
                    self.applied_revision = self.applied_revision.max(revision);
                }
            }
        }
        Ok(())
    }

    /// Another session changed the preference.
    ///
    /// Notifications at or below the last applied revision are duplicates or
    /// arrived out of order and are dropped, so they can neither clear a
    /// manual collapse nor re-expand. Returns the number of comments revealed,
    /// or `None` if the notification was dropped.
    pub async fn on_preference_changed(&mut self, change: PreferenceChange) -> Option<usize> {
        if change.revision <= self.applied_revision {
            tracing::debug!(
                "Ignoring stale preference change (revision {} <= {})",
                change.revision,
                self.applied_revision
            );
            return None;
        }
        self.applied_revision = change.revision;

        let enabled = change.new.always_expand;
        self.state.apply_auto_expand(enabled);
        tracing::info!("Always Expand changed to: {}", enabled);

        if !enabled {
            return Some(0);
        }
        let Ok(widget) = self.ready_widget() else {
            return Some(0);
        };
        match widget.expand_all().await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Expand after preference change failed: {}", e);
                Some(0)
            }
        }
    }

    /// Discovery found the widget: seed the state from the stored preference,
    /// run the initial pass, then start monitoring.
    pub async fn on_discovered(&mut self, widget: Arc<dyn WidgetAdapter>) {
        if self.discovery_state() != DiscoveryState::Searching {
            tracing::warn!(
                "Ignoring widget discovery in state {:?}",
                self.discovery_state()
            );
            return;
        }

        match self.store.read_versioned() {
            Ok((preference, revision)) => {
                self.state = ReconciliationState::seeded(preference);
                self.applied_revision = self.applied_revision.max(revision);
            }
            Err(e) => {
                tracing::warn!("Failed to read preference, keeping defaults: {}", e);
            }
        }
        tracing::info!("Always Expand setting: {}", self.state.auto_expand_enabled);

        self.widget = Some(widget);
        self.set_discovery(DiscoveryState::Found);

        self.on_widget_changed(ChangeSource::InitialLoad).await;
        self.set_discovery(DiscoveryState::Monitoring);
    }

    pub fn on_discovery_timed_out(&mut self) {
        if self.discovery_state() == DiscoveryState::Searching {
            self.set_discovery(DiscoveryState::TimedOut);
        }
    }
}
