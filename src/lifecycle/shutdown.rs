//! Shutdown coordination.
//!
//! A single latch shared by the signal listener, the HTTP server and tests.
//! Once tripped it stays tripped, so a waiter that arrives after the trigger
//! (the server still binding, a test racing the signal) resolves at once.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Latch for graceful shutdown.
#[derive(Clone)]
pub struct Shutdown {
    state: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Trip the latch. Later calls are no-ops.
    pub fn trigger(&self) {
        let already = self.state.send_replace(true);
        if !already {
            tracing::info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.state.borrow()
    }

    /// A future resolving once the latch is tripped, whenever it is polled.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut tripped = self.state.subscribe();
        async move {
            // Err means every handle was dropped, which also ends the wait.
            let _ = tripped.wait_for(|tripped| *tripped).await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_releases_every_waiter() {
        let shutdown = Shutdown::new();
        let first = tokio::spawn(shutdown.wait());
        let second = tokio::spawn(shutdown.clone().wait());

        shutdown.trigger();
        first.await.unwrap();
        second.await.unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_late_waiter_sees_earlier_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();

        let waited = tokio::time::timeout(Duration::from_secs(1), shutdown.wait()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_wait_pends_until_triggered() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        let waited = tokio::time::timeout(Duration::from_millis(20), shutdown.wait()).await;
        assert!(waited.is_err());
    }
}
