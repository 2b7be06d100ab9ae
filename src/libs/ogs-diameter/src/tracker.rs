//! Request/answer correlation
//!
//! A waiter is registered under the request's Session-Id before the request
//! is written; the connection reader delivers the matching answer exactly
//! once. Waiters are removed on every exit path, so an answer arriving after
//! its waiter gave up finds nothing and is reported as undeliverable.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::message::DiameterMessage;

type WaiterMap = HashMap<String, (u64, oneshot::Sender<DiameterMessage>)>;

/// Pending answer for one registered request
///
/// Resolves with the delivered answer, or with a closed-channel error once a
/// newer waiter replaced it under the same Session-Id.
#[derive(Debug)]
pub struct Waiter {
    session_id: String,
    id: u64,
    rx: oneshot::Receiver<DiameterMessage>,
}

impl Waiter {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Future for Waiter {
    type Output = Result<DiameterMessage, oneshot::error::RecvError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx)
    }
}

/// Registry of in-flight requests keyed by Session-Id
#[derive(Debug, Default)]
pub struct RequestTracker {
    waiters: Mutex<WaiterMap>,
    next_id: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `session_id`
    ///
    /// A previous waiter under the same key is replaced; it then resolves
    /// with a closed-channel error.
    pub fn register(&self, session_id: &str) -> Waiter {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(session_id.to_string(), (id, tx));
        Waiter {
            session_id: session_id.to_string(),
            id,
            rx,
        }
    }

    /// Hand `msg` to the waiter for `session_id`
    ///
    /// Returns false if no waiter is registered or the waiter already went away.
    pub fn deliver(&self, session_id: &str, msg: DiameterMessage) -> bool {
        let waiter = self.lock().remove(session_id);
        match waiter {
            Some((_, tx)) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Drop `waiter`'s registration
    ///
    /// A newer waiter registered under the same Session-Id is left in place.
    pub fn cancel(&self, waiter: &Waiter) {
        let mut waiters = self.lock();
        if waiters.get(&waiter.session_id).is_some_and(|(id, _)| *id == waiter.id) {
            waiters.remove(&waiter.session_id);
        }
    }

    /// Number of outstanding waiters
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WaiterMap> {
        // A panic while holding this lock cannot leave the map inconsistent
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swx::{cmd, SWX_APPLICATION_ID};

    fn answer() -> DiameterMessage {
        let req = DiameterMessage::new_request(cmd::MULTIMEDIA_AUTH, SWX_APPLICATION_ID);
        DiameterMessage::new_answer(&req)
    }

    #[tokio::test]
    async fn test_deliver_to_registered_waiter() {
        let tracker = RequestTracker::new();
        let rx = tracker.register("s1");
        assert_eq!(tracker.pending(), 1);

        assert!(tracker.deliver("s1", answer()));
        let msg = rx.await.unwrap();
        assert_eq!(msg.header.command_code, cmd::MULTIMEDIA_AUTH);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_deliver_without_waiter() {
        let tracker = RequestTracker::new();
        assert!(!tracker.deliver("unknown", answer()));
    }

    #[test]
    fn test_deliver_after_cancel_is_dropped() {
        let tracker = RequestTracker::new();
        let rx = tracker.register("s1");
        tracker.cancel(&rx);
        tracker.cancel(&rx);

        assert_eq!(tracker.pending(), 0);
        assert!(!tracker.deliver("s1", answer()));
    }

    #[test]
    fn test_deliver_to_dropped_receiver() {
        let tracker = RequestTracker::new();
        drop(tracker.register("s1"));
        assert!(!tracker.deliver("s1", answer()));
    }

    #[tokio::test]
    async fn test_answer_delivered_once() {
        let tracker = RequestTracker::new();
        let rx = tracker.register("s1");
        assert!(tracker.deliver("s1", answer()));
        assert!(!tracker.deliver("s1", answer()));
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_keeps_newer_waiter() {
        let tracker = RequestTracker::new();
        let mut first = tracker.register("s1");
        let second = tracker.register("s1");

        tracker.cancel(&first);
        assert_eq!(tracker.pending(), 1);
        assert!((&mut first).await.is_err());

        assert!(tracker.deliver("s1", answer()));
        assert!(second.await.is_ok());
    }
}
