//! Per-key delayed writes with cancel-and-reschedule.
//!
//! Every key owns a gate. A timer claims its value only while holding the
//! gate and keeps it until the write finishes, so a [`KeyGuard`] sees either
//! the value still pending or the write already done, never a write in flight.
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use super::PersistenceError;

struct Pending<T> {
    ticket: u64,
    value: T,
    handle: JoinHandle<()>,
}

struct Entry<T> {
    gate: Arc<AsyncMutex<()>>,
    pending: Option<Pending<T>>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            gate: Arc::default(),
            pending: None,
        }
    }
}

struct Slots<K, T> {
    next_ticket: u64,
    entries: HashMap<K, Entry<T>>,
}

/// Holds at most one pending value per key; it fires once `delay` passes
/// without a newer [`Debouncer::schedule`] call for the same key.
pub struct Debouncer<K, T> {
    delay: Duration,
    slots: Arc<Mutex<Slots<K, T>>>,
}

impl<K, T> Clone for Debouncer<K, T> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K, T> std::fmt::Debug for Debouncer<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = lock(&self.slots);
        let pending = slots.entries.values().filter(|e| e.pending.is_some()).count();
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("keys", &slots.entries.len())
            .field("pending", &pending)
            .finish()
    }
}

fn lock<K, T>(slots: &Mutex<Slots<K, T>>) -> MutexGuard<'_, Slots<K, T>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, T> Debouncer<K, T> {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slots: Arc::new(Mutex::new(Slots {
                next_ticket: 0,
                entries: HashMap::new(),
            })),
        }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether any key has a value waiting on its timer.
    #[must_use]
    pub fn has_any_pending(&self) -> bool {
        lock(&self.slots)
            .entries
            .values()
            .any(|entry| entry.pending.is_some())
    }

    /// Number of keys the debouncer is tracking, pending or busy.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        lock(&self.slots).entries.len()
    }
}

impl<K, T> Debouncer<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
{
    /// Replace any pending value for `key` and restart its timer.
    ///
    /// When the timer elapses, `fire` runs with the value on the current
    /// tokio runtime while the key's gate is held.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::NoRuntime`] outside a tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, value: T, fire: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| PersistenceError::NoRuntime)?;
        let mut slots = lock(&self.slots);
        slots.next_ticket += 1;
        let ticket = slots.next_ticket;
        let entry = slots.entries.entry(key.clone()).or_default();
        if let Some(previous) = entry.pending.take() {
            previous.handle.abort();
        }

        let debouncer = self.clone();
        let delay = self.delay;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Our pending value keeps the entry alive until it is claimed.
            let Some(gate) = debouncer.gate(&key) else {
                return;
            };
            let permit = gate.lock_owned().await;
            let claimed = lock(&debouncer.slots)
                .entries
                .get_mut(&key)
                .and_then(|entry| entry.pending.take_if(|p| p.ticket == ticket));
            if let Some(pending) = claimed {
                fire(pending.value).await;
            }
            drop(permit);
            debouncer.prune(&key);
        });
        entry.pending = Some(Pending {
            ticket,
            value,
            handle,
        });
        Ok(())
    }

    /// Wait for exclusive use of `key`.
    ///
    /// While the guard lives no timer for `key` can start writing, and any
    /// write that had already started has finished.
    pub async fn lock_key(&self, key: &K) -> KeyGuard<K, T> {
        let gate = Arc::clone(&lock(&self.slots).entries.entry(key.clone()).or_default().gate);
        let permit = gate.lock_owned().await;
        KeyGuard {
            debouncer: self.clone(),
            key: key.clone(),
            permit: Some(permit),
        }
    }

    /// Keys with a value waiting on their timer.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<K> {
        lock(&self.slots)
            .entries
            .iter()
            .filter(|(_, entry)| entry.pending.is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    #[must_use]
    pub fn has_pending(&self, key: &K) -> bool {
        lock(&self.slots)
            .entries
            .get(key)
            .is_some_and(|entry| entry.pending.is_some())
    }

    fn gate(&self, key: &K) -> Option<Arc<AsyncMutex<()>>> {
        lock(&self.slots)
            .entries
            .get(key)
            .map(|entry| Arc::clone(&entry.gate))
    }

    fn take(&self, key: &K) -> Option<T> {
        let pending = lock(&self.slots).entries.get_mut(key)?.pending.take()?;
        pending.handle.abort();
        Some(pending.value)
    }

    /// Forget `key` once nothing is pending for it and nobody else holds its gate.
    ///
    /// Gates are only cloned under the slot lock, so the count is exact here.
    fn prune(&self, key: &K) {
        let mut slots = lock(&self.slots);
        let idle = slots
            .entries
            .get(key)
            .is_some_and(|entry| entry.pending.is_none() && Arc::strong_count(&entry.gate) == 1);
        if idle {
            slots.entries.remove(key);
        }
    }
}

/// Exclusive hold on one key of a [`Debouncer`].
pub struct KeyGuard<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
{
    debouncer: Debouncer<K, T>,
    key: K,
    permit: Option<OwnedMutexGuard<()>>,
}

impl<K, T> KeyGuard<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
{
    /// Take the pending value without waiting for the timer.
    pub fn take_pending(&mut self) -> Option<T> {
        self.debouncer.take(&self.key)
    }

    /// Drop the pending value. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.take_pending().is_some()
    }
}

impl<K, T> Drop for KeyGuard<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
{
    fn drop(&mut self) {
        drop(self.permit.take());
        self.debouncer.prune(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_latest_value() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_millis(500));
        for value in 1..=3 {
            let tx = tx.clone();
            debouncer
                .schedule("game", value, move |v| async move {
                    let _ = tx.send(v);
                })
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(rx.try_recv(), Ok(3));
        assert!(rx.try_recv().is_err());
        assert!(!debouncer.has_any_pending());
        assert_eq!(debouncer.tracked_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_debounce_independently() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_millis(500));
        for (key, value) in [("a", 1), ("b", 2), ("a", 3)] {
            let tx = tx.clone();
            debouncer
                .schedule(key, value, move |v| async move {
                    let _ = tx.send((key, v));
                })
                .unwrap();
        }
        assert!(debouncer.has_pending(&"a") && debouncer.has_pending(&"b"));
        tokio::time::sleep(Duration::from_millis(600)).await;
        let mut fired = vec![rx.try_recv().unwrap(), rx.try_recv().unwrap()];
        fired.sort_unstable();
        assert_eq!(fired, vec![("a", 3), ("b", 2)]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_before_the_window_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer
            .schedule(1_u8, "state", move |v| async move {
                let _ = tx.send(v);
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());
        assert!(debouncer.has_pending(&1));
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.try_recv(), Ok("state"));
    }

    #[tokio::test(start_paused = true)]
    async fn take_pending_preempts_the_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer
            .schedule("game", 7, move |v| async move {
                let _ = tx.send(v);
            })
            .unwrap();
        assert_eq!(debouncer.pending_keys(), vec!["game"]);
        let mut guard = debouncer.lock_key(&"game").await;
        assert_eq!(guard.take_pending(), Some(7));
        assert!(!guard.cancel());
        drop(guard);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(debouncer.tracked_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_key_waits_for_a_write_in_flight() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer
            .schedule("game", 1, move |v| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let _ = tx.send(v);
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(550)).await;
        assert!(!debouncer.has_pending(&"game"));
        assert!(rx.try_recv().is_err());

        let guard = debouncer.lock_key(&"game").await;
        assert_eq!(rx.try_recv(), Ok(1));
        drop(guard);
        assert_eq!(debouncer.tracked_keys(), 0);
    }

    #[test]
    fn schedule_outside_runtime_is_an_error() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        let outcome = debouncer.schedule("game", 1, |_| async {});
        assert!(matches!(outcome, Err(PersistenceError::NoRuntime)));
    }
}
