//! Waiting for the widget to show up.

use std::sync::Arc;

use tokio::time::{self, Instant, MissedTickBehavior};

use super::{WidgetAdapter, WidgetLocator};
use crate::config::DiscoveryConfig;

/// Lifecycle of the widget as seen by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryState {
    /// Still polling for the widget.
    #[default]
    Searching,
    /// Found; the initial pass has not run yet.
    Found,
    /// Found and being watched for changes.
    Monitoring,
    /// Gave up. Terminal; there is no re-discovery.
    TimedOut,
}

impl DiscoveryState {
    /// Whether commands can be applied to the widget.
    pub fn is_ready(&self) -> bool {
        matches!(self, DiscoveryState::Found | DiscoveryState::Monitoring)
    }
}

/// How a discovery attempt ended.
pub enum DiscoveryOutcome {
    Found(Arc<dyn WidgetAdapter>),
    TimedOut,
}

impl std::fmt::Debug for DiscoveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryOutcome::Found(_) => f.write_str("Found"),
            DiscoveryOutcome::TimedOut => f.write_str("TimedOut"),
        }
    }
}

/// Poll `locator` every `poll_interval` until it finds the widget or
/// `max_wait` has elapsed.
///
/// Dropping the returned future cancels the wait.
pub async fn discover(locator: &dyn WidgetLocator, config: &DiscoveryConfig) -> DiscoveryOutcome {
    let started = Instant::now();
    let mut ticker = time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if let Some(adapter) = locator.locate().await {
            tracing::info!(
                "Comment widget found after {} ms",
                started.elapsed().as_millis()
            );
            return DiscoveryOutcome::Found(adapter);
        }

        if started.elapsed() >= config.max_wait() {
            tracing::info!(
                "Comment widget not found within {} ms",
                config.max_wait_ms
            );
            return DiscoveryOutcome::TimedOut;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{CommentThread, ThreadLocator};
    use std::time::Duration;

    #[test]
    fn test_readiness() {
        assert!(!DiscoveryState::Searching.is_ready());
        assert!(DiscoveryState::Found.is_ready());
        assert!(DiscoveryState::Monitoring.is_ready());
        assert!(!DiscoveryState::TimedOut.is_ready());
        assert_eq!(DiscoveryState::default(), DiscoveryState::Searching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_after_a_few_polls() {
        let locator = ThreadLocator::after_attempts(CommentThread::new(), 3);
        let config = DiscoveryConfig::default();

        let started = Instant::now();
        let outcome = discover(&locator, &config).await;

        assert!(matches!(outcome, DiscoveryOutcome::Found(_)));
        // Ticks at 0, 500, 1000 ms: the third attempt succeeds.
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        assert_eq!(locator.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let locator = ThreadLocator::never();
        let config = DiscoveryConfig::default();

        let started = Instant::now();
        let outcome = discover(&locator, &config).await;

        assert!(matches!(outcome, DiscoveryOutcome::TimedOut));
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(locator.attempts(), 61);
    }
}
