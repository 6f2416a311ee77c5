//! Expiring cache with single-flight population.
//!
//! Every key holds either a ready value stamped with its creation time or a
//! pending fetch shared by all callers that missed while it runs. Only ready
//! values younger than the TTL are served. A failed fetch leaves nothing behind,
//! so the next caller starts a new one.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

enum Slot<V, E> {
    Ready(CacheEntry<V>),
    Pending { flight: u64, fetch: SharedFetch<V, E> },
}

enum Lookup<V, E> {
    Hit(V),
    Wait { flight: u64, fetch: SharedFetch<V, E> },
}

pub struct Cache<K, V, E> {
    ttl: Duration,
    slots: Mutex<HashMap<K, Slot<V, E>>>,
    next_flight: AtomicU64,
}

impl<K, V, E> Cache<K, V, E>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
            next_flight: AtomicU64::new(0),
        }
    }

    /// Returns the live value for `key` without triggering a fetch.
    #[cfg(test)]
    fn get(&self, key: &K) -> Option<V> {
        let slots = self.lock();
        match slots.get(key) {
            Some(Slot::Ready(entry)) if self.is_live(entry) => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Returns the live value for `key`, or runs `fetch` to produce it.
    ///
    /// Concurrent callers missing on the same key await one shared fetch and
    /// all observe its outcome. `fetch` is only invoked when no live value and
    /// no pending fetch exist.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (flight, shared) = match self.begin(&key, fetch) {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Wait { flight, fetch } => (flight, fetch),
        };

        let guard = UnwindGuard {
            cache: self,
            key,
            flight,
        };
        let result = shared.await;
        self.finish(&guard.key, flight, &result);
        result
    }

    /// Number of keys holding a ready or pending slot
    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin<F, Fut>(&self, key: &K, fetch: F) -> Lookup<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut slots = self.lock();
        self.evict_expired(&mut slots);

        match slots.entry(key.clone()) {
            Entry::Occupied(occupied) => match occupied.get() {
                Slot::Ready(entry) => {
                    debug!("Cache HIT for key: {:?}", key);
                    Lookup::Hit(entry.value.clone())
                }
                Slot::Pending { flight, fetch } => {
                    debug!("Joining in-flight fetch for key: {:?}", key);
                    Lookup::Wait {
                        flight: *flight,
                        fetch: fetch.clone(),
                    }
                }
            },
            Entry::Vacant(vacant) => {
                debug!("Cache MISS for key: {:?}", key);
                let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let shared = fetch().boxed().shared();
                vacant.insert(Slot::Pending {
                    flight,
                    fetch: shared.clone(),
                });
                Lookup::Wait {
                    flight,
                    fetch: shared,
                }
            }
        }
    }

    fn finish(&self, key: &K, flight: u64, result: &Result<V, E>) {
        let mut slots = self.lock();
        // The first waiter to get here settles the slot; later ones find it
        // already replaced.
        if !is_flight(&slots, key, flight) {
            return;
        }

        match result {
            Ok(value) => {
                debug!("Cache PUT for key: {:?}", key);
                slots.insert(
                    key.clone(),
                    Slot::Ready(CacheEntry {
                        value: value.clone(),
                        created_at: Instant::now(),
                    }),
                );
            }
            Err(_) => {
                debug!("Fetch failed, nothing cached for key: {:?}", key);
                slots.remove(key);
            }
        }
    }

    fn abandon(&self, key: &K, flight: u64) {
        let mut slots = self.lock();
        if is_flight(&slots, key, flight) {
            debug!("Fetch panicked, clearing key: {:?}", key);
            slots.remove(key);
        }
    }

    fn evict_expired(&self, slots: &mut HashMap<K, Slot<V, E>>) {
        slots.retain(|key, slot| match slot {
            Slot::Ready(entry) if !self.is_live(entry) => {
                debug!("Cache entry expired for key: {:?}", key);
                false
            }
            _ => true,
        });
    }

    fn is_live(&self, entry: &CacheEntry<V>) -> bool {
        entry.created_at.elapsed() < self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V, E>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_flight<K, V, E>(slots: &HashMap<K, Slot<V, E>>, key: &K, flight: u64) -> bool
where
    K: Eq + Hash,
{
    matches!(
        slots.get(key),
        Some(Slot::Pending { flight: pending, .. }) if *pending == flight
    )
}

/// Clears the pending slot if the fetch panics while being awaited, so later
/// callers start a new fetch instead of polling a poisoned one.
struct UnwindGuard<'a, K, V, E>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    cache: &'a Cache<K, V, E>,
    key: K,
    flight: u64,
}

impl<K, V, E> Drop for UnwindGuard<'_, K, V, E>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.cache.abandon(&self.key, self.flight);
        }
    }
}
