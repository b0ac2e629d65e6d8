//! Per-key single-flight guard.
//!
//! At most one operation runs per key. Callers arriving while it is in
//! flight wait for it and receive a clone of its result. If the leader is
//! cancelled before finishing, one of the waiters takes over.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Result of [`SingleFlight::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightResult<V> {
    /// Value produced by the operation.
    pub value: V,
    /// True if this caller received another caller's result.
    pub shared: bool,
}

/// Single-flight group keyed by `K`.
#[derive(Debug)]
pub struct SingleFlight<K, V> {
    inflight: Mutex<HashMap<K, broadcast::Sender<V>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an operation is currently running for `key`.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight.lock().contains_key(key)
    }

    /// Number of keys with an operation in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Run `operation` unless one is already in flight for `key`, in which
    /// case wait for it and share its result.
    pub async fn run<F, Fut>(&self, key: K, operation: F) -> FlightResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        loop {
            let waiter = {
                let mut inflight = self.inflight.lock();
                if let Some(tx) = inflight.get(&key) {
                    Some(tx.subscribe())
                } else {
                    let (tx, _) = broadcast::channel(1);
                    inflight.insert(key.clone(), tx);
                    None
                }
            };

            match waiter {
                Some(mut rx) => match rx.recv().await {
                    Ok(value) => {
                        return FlightResult {
                            value,
                            shared: true,
                        };
                    }
                    // Leader dropped without a result; contend again.
                    Err(_) => continue,
                },
                None => break,
            }
        }

        let guard = LeaderGuard {
            inflight: &self.inflight,
            key: Some(key),
        };
        let value = operation().await;
        guard.complete(value.clone());

        FlightResult {
            value,
            shared: false,
        }
    }
}

/// Removes the in-flight entry when the leader finishes or is dropped.
struct LeaderGuard<'a, K: Eq + Hash, V> {
    inflight: &'a Mutex<HashMap<K, broadcast::Sender<V>>>,
    key: Option<K>,
}

impl<K: Eq + Hash, V> LeaderGuard<'_, K, V> {
    fn complete(mut self, value: V) {
        if let Some(key) = self.key.take() {
            // Remove and send under the lock so no waiter subscribes late.
            let mut inflight = self.inflight.lock();
            if let Some(tx) = inflight.remove(&key) {
                let _ = tx.send(value);
            }
        }
    }
}

impl<K: Eq + Hash, V> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.inflight.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::<&'static str, u32>::new());
        let calls = Arc::new(AtomicU32::new(0));

        let run = |flight: Arc<SingleFlight<&'static str, u32>>, calls: Arc<AtomicU32>| async move {
            flight
                .run("k", || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    calls.fetch_add(1, Ordering::SeqCst) + 1
                })
                .await
        };

        let (a, b) = tokio::join!(
            run(Arc::clone(&flight), Arc::clone(&calls)),
            run(Arc::clone(&flight), Arc::clone(&calls))
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.value, 1);
        assert_eq!(b.value, 1);
        assert!(a.shared ^ b.shared);
        assert!(!flight.is_in_flight(&"k"));
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let flight = SingleFlight::<u8, u8>::new();
        let (a, b) = tokio::join!(
            flight.run(1, || async { 10 }),
            flight.run(2, || async { 20 })
        );
        assert_eq!((a.value, b.value), (10, 20));
        assert!(!a.shared && !b.shared);
    }

    #[tokio::test]
    async fn cancelled_leader_releases_key() {
        let flight = Arc::new(SingleFlight::<u8, u8>::new());
        let leader = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                flight
                    .run(1, || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        0
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(flight.is_in_flight(&1));

        leader.abort();
        let _ = leader.await;
        assert!(!flight.is_in_flight(&1));

        let next = flight.run(1, || async { 7 }).await;
        assert_eq!(next.value, 7);
        assert!(!next.shared);
    }
}
