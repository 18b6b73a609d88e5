//! Tagged message FIFO connecting workers to the daemons.
//!
//! Producers never block. Every request message embeds a [`ReplyGuard`] built
//! from the requesting worker's private reply port; the guard posts a
//! fallback reply if a handler drops the request without answering, so a
//! worker blocked on its reply port can always make progress.

use tokio::sync::mpsc;

use crate::errors::{NetError, NetResult};

/// Cloneable producer side of a daemon channel.
pub struct MsgChannel<M> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M> Clone for MsgChannel<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> MsgChannel<M> {
    /// Enqueue a message. Returns false when the consumer is gone (shutdown
    /// already drained the daemon).
    pub fn post(&self, message: M) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Consumer side; owned by exactly one daemon task.
pub struct MsgPump<M> {
    rx: mpsc::UnboundedReceiver<M>,
}

impl<M> MsgPump<M> {
    /// Wait for the next message. `None` once every producer is dropped.
    pub async fn next(&mut self) -> Option<M> {
        self.rx.recv().await
    }
}

pub fn msg_channel<M>() -> (MsgChannel<M>, MsgPump<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MsgChannel { tx }, MsgPump { rx })
}

/// A worker's private reply port. The worker keeps the receiving end and
/// hands a fresh [`ReplyGuard`] to every request it posts.
pub struct ReplyPort<R> {
    tx: mpsc::UnboundedSender<R>,
    rx: mpsc::UnboundedReceiver<R>,
}

impl<R> Default for ReplyPort<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ReplyPort<R> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Build the guard for one outgoing request. `fallback` is posted if the
    /// handler never replies.
    pub fn guard(&self, fallback: R) -> ReplyGuard<R> {
        ReplyGuard {
            tx: Some(self.tx.clone()),
            fallback: Some(fallback),
        }
    }

    /// Block until the matching reply arrives.
    pub async fn recv(&mut self) -> NetResult<R> {
        self.rx.recv().await.ok_or(NetError::Shutdown)
    }
}

/// Single-use reply handle; replies exactly once on every path.
pub struct ReplyGuard<R> {
    tx: Option<mpsc::UnboundedSender<R>>,
    fallback: Option<R>,
}

impl<R> ReplyGuard<R> {
    pub fn send(mut self, reply: R) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(reply);
        }
        self.fallback = None;
    }
}

impl<R> Drop for ReplyGuard<R> {
    fn drop(&mut self) {
        if let (Some(tx), Some(fallback)) = (self.tx.take(), self.fallback.take()) {
            let _ = tx.send(fallback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let (tx, mut rx) = msg_channel::<u32>();
        for i in 0..100 {
            assert!(tx.post(i));
        }
        for i in 0..100 {
            assert_eq!(rx.next().await, Some(i));
        }
    }

    #[tokio::test]
    async fn guard_replies_once() {
        let mut port = ReplyPort::<&'static str>::new();
        let guard = port.guard("fallback");
        guard.send("real");
        assert_eq!(port.recv().await.unwrap(), "real");
    }

    #[tokio::test]
    async fn dropped_guard_sends_fallback() {
        let mut port = ReplyPort::<&'static str>::new();
        {
            let _guard = port.guard("fallback");
            // Handler "panics" without replying.
        }
        assert_eq!(port.recv().await.unwrap(), "fallback");
    }

    #[tokio::test]
    async fn post_after_consumer_drop_reports_failure() {
        let (tx, rx) = msg_channel::<u8>();
        drop(rx);
        assert!(!tx.post(1));
    }
}
