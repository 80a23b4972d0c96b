//! Periodic state push to every WebSocket client.
//!
//! Browsers keep the `/dynamic` channel open to follow the player.  A single
//! task ticks at the configured period, asks a provider for the current state
//! and broadcasts it through the [`ConnectionRegistry`].  Ticks with no
//! connected clients skip the provider entirely.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::trace;

use crate::application::broadcast::ConnectionRegistry;

/// Spawns the push loop.  It runs until the returned handle is aborted.
///
/// `provider` returns `None` when there is nothing new to send.
///
/// # Panics
///
/// Panics if `period` is zero, like [`tokio::time::interval`].
pub fn spawn_periodic_broadcast<F>(
    registry: Arc<ConnectionRegistry>,
    period: Duration,
    provider: F,
) -> JoinHandle<()>
where
    F: Fn() -> Option<String> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // A slow provider delays the schedule instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick resolves immediately; skip it.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if registry.is_empty() {
                continue;
            }
            if let Some(state) = provider() {
                let reached = registry.broadcast(&state);
                trace!("state pushed to {reached} websocket client(s)");
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::broadcast::Outbox;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::Instant;

    fn registry_with_client() -> (Arc<ConnectionRegistry>, UnboundedReceiver<String>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (outbox, queue) = Outbox::channel();
        registry.add_connection(outbox, "127.0.0.1:45000".parse().unwrap());
        (registry, queue)
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_pushed_once_per_period() {
        // Arrange
        let (registry, mut queue) = registry_with_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let started = Instant::now();

        // Act
        let task = spawn_periodic_broadcast(registry, Duration::from_millis(500), move || {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            Some(format!("{{\"tick\":{n}}}"))
        });
        let first = queue.recv().await.unwrap();
        let second = queue.recv().await.unwrap();

        // Assert
        assert_eq!(first, "{\"tick\":1}");
        assert_eq!(second, "{\"tick\":2}");
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1500));
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_without_state_sends_nothing() {
        let (registry, mut queue) = registry_with_client();

        let task = spawn_periodic_broadcast(registry, Duration::from_millis(500), || None);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(queue.try_recv().is_err());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_is_skipped_without_clients() {
        // Arrange
        let registry = Arc::new(ConnectionRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        // Act
        let task = spawn_periodic_broadcast(registry, Duration::from_millis(500), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Some("state".to_string())
        });
        tokio::time::sleep(Duration::from_secs(3)).await;

        // Assert
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        task.abort();
    }
}
