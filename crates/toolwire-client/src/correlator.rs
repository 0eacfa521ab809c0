//! Request/response correlation.
//!
//! The correlator owns a session's monotonically increasing id counter and
//! its pending table. The call path inserts entries, the receive path removes
//! them; both touch the table under a std mutex that is never held across an
//! await, so the two logically concurrent actors cannot interleave between a
//! lookup and its removal.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use toolwire_protocol::{RequestId, Response};

/// Pending-request table plus id minting for one session.
///
/// Each entry is settled at most once, and removed exactly once: by a
/// matching response, by the awaiting side when its deadline fires, or by
/// [`fail_all`](Correlator::fail_all) at session teardown.
#[derive(Debug)]
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Response>>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Create an empty correlator. Ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Mint the next id and register a pending entry for it.
    ///
    /// The receiver resolves when a matching response is settled; it errors
    /// if the entry is torn down by [`fail_all`](Correlator::fail_all).
    pub fn register(&self) -> (RequestId, oneshot::Receiver<Response>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending table poisoned")
            .insert(id, tx);
        (id, rx)
    }

    /// Route an inbound response to its waiter.
    ///
    /// Unknown ids (never requested, already settled, or duplicates) are
    /// dropped with a warning, never raised. A waiter that already gave up
    /// (its deadline fired and removed the entry, or it dropped the receiver)
    /// is silently ignored: no double-settlement, no error.
    pub fn settle(&self, response: Response) {
        let id = response.id;
        let entry = self
            .pending
            .lock()
            .expect("pending table poisoned")
            .remove(&id);
        match entry {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!(id, "waiter gone before settlement, dropping response");
                }
            }
            None => warn!(id, "response with no matching pending request, dropping"),
        }
    }

    /// Remove one entry without settling it (the timeout path).
    pub fn abort(&self, id: RequestId) {
        self.pending
            .lock()
            .expect("pending table poisoned")
            .remove(&id);
    }

    /// Drain the table, rejecting every remaining waiter. Returns how many
    /// entries were rejected.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.drain().collect()
        };
        // Dropping the senders wakes each receiver with a closed-channel
        // error, which the session maps to the session-closed error.
        drained.len()
    }

    /// Number of requests currently awaiting settlement.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending table poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolwire_protocol::{JsonRpcVersion, ResponsePayload};

    fn response(id: RequestId, result: serde_json::Value) -> Response {
        Response {
            jsonrpc: JsonRpcVersion,
            id,
            payload: ResponsePayload::Success { result },
        }
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let correlator = Correlator::new();
        let (a, _rx_a) = correlator.register();
        let (b, _rx_b) = correlator.register();
        let (c, _rx_c) = correlator.register();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn settle_resolves_the_matching_waiter() {
        let correlator = Correlator::new();
        let (id, rx) = correlator.register();
        correlator.settle(response(id, json!({"ok": true})));
        let resolved = rx.await.unwrap();
        assert_eq!(resolved.id, id);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn out_of_order_settlement_pairs_by_id() {
        let correlator = Correlator::new();
        let (first, rx_first) = correlator.register();
        let (second, rx_second) = correlator.register();

        correlator.settle(response(second, json!("second")));
        correlator.settle(response(first, json!("first")));

        assert_eq!(rx_first.await.unwrap().result(), Some(&json!("first")));
        assert_eq!(rx_second.await.unwrap().result(), Some(&json!("second")));
    }

    #[test]
    fn unknown_id_is_dropped_without_panicking() {
        let correlator = Correlator::new();
        correlator.settle(response(999, json!(null)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn late_arrival_after_abort_is_silently_discarded() {
        let correlator = Correlator::new();
        let (id, rx) = correlator.register();
        // Deadline fired: the awaiting side removed the entry.
        correlator.abort(id);
        drop(rx);
        correlator.settle(response(id, json!(null)));
        // Settling again is the duplicate-id case, identical to unknown.
        correlator.settle(response(id, json!(null)));
    }

    #[test]
    fn settlement_with_dropped_receiver_does_not_panic() {
        let correlator = Correlator::new();
        let (id, rx) = correlator.register();
        drop(rx);
        correlator.settle(response(id, json!(null)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_all_rejects_every_waiter() {
        let correlator = Correlator::new();
        let (_a, rx_a) = correlator.register();
        let (_b, rx_b) = correlator.register();
        assert_eq!(correlator.fail_all(), 2);
        assert!(rx_a.await.is_err());
        assert!(rx_b.await.is_err());
        assert_eq!(correlator.pending_count(), 0);
    }
}
