//! Session wiring.
//!
//! A session runs one [`ReconciliationEngine`] and the tasks that feed it:
//! widget discovery, content monitoring (change subscription plus a fallback
//! poll) and the preference feed from other sessions. Everything funnels into
//! the engine's trigger queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::{Config, DiscoveryConfig};
use crate::engine::{ReconciliationEngine, Trigger};
use crate::error::{ExpandError, ExpandResult};
use crate::protocol::{parse_request, Command, Reply, Response};
use crate::store::PreferenceStore;
use crate::widget::{
    discover, ChangeSource, ContentChange, DiscoveryOutcome, DiscoveryState, WidgetLocator,
};

/// Handle to a running session.
///
/// Dropping the handle tears the session down.
pub struct SessionHandle {
    tx: mpsc::Sender<Trigger>,
    discovery: watch::Receiver<DiscoveryState>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandle {
    /// Start a session on the current tokio runtime.
    ///
    /// `config` is validated first, so hand-built values out of range are
    /// clamped rather than rejected.
    pub fn start(
        config: &Config,
        store: Arc<dyn PreferenceStore>,
        locator: Arc<dyn WidgetLocator>,
    ) -> Self {
        let mut config = config.clone();
        config.validate();

        let (tx, rx) = mpsc::channel(config.monitor.queue_capacity);

        // Subscribe before anything runs so no write after start() is missed.
        let mut feed = store.subscribe();

        let engine = ReconciliationEngine::new(store);
        let discovery = engine.watch_discovery();

        let mut tasks = Vec::with_capacity(3);
        tasks.push(tokio::spawn(engine.run(rx)));

        let feed_tx = tx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(change) = feed.recv().await {
                if feed_tx
                    .send(Trigger::PreferenceChanged(change))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }));

        tasks.push(tokio::spawn(discover_and_monitor(
            locator,
            config.discovery.clone(),
            config.monitor.check_interval(),
            tx.clone(),
        )));

        Self {
            tx,
            discovery,
            tasks,
        }
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        *self.discovery.borrow()
    }

    /// Wait until discovery has either reached monitoring or timed out.
    pub async fn wait_until_settled(&mut self) -> DiscoveryState {
        let settled = self
            .discovery
            .wait_for(|s| matches!(s, DiscoveryState::Monitoring | DiscoveryState::TimedOut))
            .await
            .map(|state| *state);
        settled.unwrap_or_else(|_| self.discovery_state())
    }

    /// Send a command and wait for the engine's reply.
    pub async fn send(&self, command: Command) -> ExpandResult<Reply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Trigger::Command { command, reply })
            .await
            .map_err(|_| ExpandError::ChannelClosed)?;
        rx.await.map_err(|_| ExpandError::ChannelClosed)?
    }

    /// Send a command and shape the outcome as a wire response.
    pub async fn request(&self, command: Command) -> Response {
        self.send(command).await.into()
    }

    /// Handle one raw JSON request and return the encoded JSON response.
    pub async fn request_json(&self, raw: &str) -> String {
        let response = match parse_request(raw) {
            Ok(command) => self.request(command).await,
            Err(e) => {
                tracing::debug!("Rejected request {:?}: {}", raw, e);
                Response::failure(&e)
            }
        };
        response.encode()
    }

    /// Tear the session down.
    pub fn shutdown(mut self) {
        self.abort_tasks();
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Find the widget, hand it to the engine, then keep reporting changes.
async fn discover_and_monitor(
    locator: Arc<dyn WidgetLocator>,
    discovery: DiscoveryConfig,
    check_interval: Duration,
    tx: mpsc::Sender<Trigger>,
) {
    let widget = match discover(locator.as_ref(), &discovery).await {
        DiscoveryOutcome::Found(widget) => widget,
        DiscoveryOutcome::TimedOut => {
            let _ = tx.send(Trigger::DiscoveryTimedOut).await;
            return;
        }
    };

    // Subscribe before the initial pass so content added meanwhile is seen.
    let changes = widget.content_changes();
    if tx.send(Trigger::Discovered(Arc::clone(&widget))).await.is_err() {
        return;
    }

    monitor(changes, check_interval, tx).await;
}

/// Report content changes and fallback poll ticks until the engine is gone.
async fn monitor(
    mut changes: broadcast::Receiver<ContentChange>,
    check_interval: Duration,
    tx: mpsc::Sender<Trigger>,
) {
    let mut ticker = time::interval(check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick is immediate and the initial pass already covered it.
    ticker.tick().await;

    let mut observing = true;
    loop {
        let source = tokio::select! {
            change = changes.recv(), if observing => match change {
                Ok(_) | Err(RecvError::Lagged(_)) => ChangeSource::Observed,
                Err(RecvError::Closed) => {
                    tracing::debug!("Widget change feed closed, polling only");
                    observing = false;
                    continue;
                }
            },
            _ = ticker.tick() => ChangeSource::Poll,
        };

        if tx.send(Trigger::WidgetChanged(source)).await.is_err() {
            break;
        }
    }
}
