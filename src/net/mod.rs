//! Socket-level plumbing: the lobby dispatcher, the encryption transport,
//! daemon channels, and the status endpoint.

pub mod channel;
pub mod crypt;
pub mod lobby;
pub mod status;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative shutdown signal plus per-service liveness counters, used for
/// the two-phase drain at exit.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Wait until the signal fires. Usable inside `tokio::select!`.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Counts live client tasks for one service.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    count: AtomicUsize,
}

impl ClientRegistry {
    pub fn register(self: &Arc<Self>) -> ClientGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ClientGuard {
            registry: self.clone(),
        }
    }

    pub fn live_clients(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Poll until the registry drains or the timeout passes. Returns whether
    /// the drain completed.
    pub async fn drain(&self, timeout: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.live_clients() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        true
    }
}

/// RAII registration of one client task.
pub struct ClientGuard {
    registry: Arc<ClientRegistry>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.registry.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_counts_and_drains() {
        let registry = Arc::new(ClientRegistry::default());
        let guard = registry.register();
        assert_eq!(registry.live_clients(), 1);
        assert!(!registry.drain(std::time::Duration::from_millis(150)).await);
        drop(guard);
        assert!(registry.drain(std::time::Duration::from_millis(150)).await);
    }

    #[tokio::test]
    async fn shutdown_signal_wakes_subscribers() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        let waiter = tokio::spawn(async move {
            wait_for_shutdown(&mut rx).await;
        });
        signal.trigger();
        waiter.await.unwrap();
    }
}
