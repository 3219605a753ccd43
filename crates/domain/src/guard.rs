//! Keyed mutual exclusion for order mutations.
//!
//! One async mutex per key, created on first use and dropped from the table
//! as soon as no holder or waiter references it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use common::{CustomerId, OrderId};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Entry {
    mutex: Arc<AsyncMutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

type LockTable<K> = Arc<Mutex<HashMap<K, Entry>>>;

/// What a mutation is serialized on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKey {
    /// Updates and deletes of one order.
    Order(OrderId),
    /// Creates by one customer.
    Customer(CustomerId),
}

impl std::fmt::Display for GuardKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardKey::Order(id) => write!(f, "order:{id}"),
            GuardKey::Customer(id) => write!(f, "customer:{id}"),
        }
    }
}

/// Gauge reporting the table size of the service's lock table.
pub const ORDER_LOCKS_GAUGE: &str = "order_locks_active";

/// A table of lazily created per-key async locks.
pub struct KeyedLock<K> {
    table: LockTable<K>,
    gauge: &'static str,
}

impl<K> Clone for KeyedLock<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            gauge: self.gauge,
        }
    }
}

impl<K> Default for KeyedLock<K> {
    fn default() -> Self {
        Self::with_gauge(ORDER_LOCKS_GAUGE)
    }
}

impl<K> KeyedLock<K> {
    /// Creates an empty table that reports its size under `gauge`.
    pub fn with_gauge(gauge: &'static str) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            gauge,
        }
    }
}

impl<K> KeyedLock<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other guard for `key` is alive.
    ///
    /// Waiters are admitted in FIFO order. Dropping the returned guard
    /// releases the key.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let mutex = {
            let mut table = self.table.lock();
            let entry = table.entry(key.clone()).or_insert_with(|| Entry {
                mutex: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            entry.users += 1;
            let mutex = Arc::clone(&entry.mutex);
            metrics::gauge!(self.gauge).set(table.len() as f64);
            mutex
        };

        // Reclaims the entry even if this future is dropped while waiting.
        let slot = Slot {
            key,
            table: Arc::clone(&self.table),
            gauge: self.gauge,
        };
        let guard = mutex.lock_owned().await;

        KeyedGuard {
            _guard: guard,
            _slot: slot,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.table.lock().len()
    }
}

/// One registered user of a table entry.
struct Slot<K: Eq + Hash> {
    key: K,
    table: LockTable<K>,
    gauge: &'static str,
}

impl<K: Eq + Hash> Drop for Slot<K> {
    fn drop(&mut self) {
        let mut table = self.table.lock();
        let unused = match table.get_mut(&self.key) {
            Some(entry) => {
                entry.users -= 1;
                entry.users == 0
            }
            None => false,
        };
        if unused {
            table.remove(&self.key);
        }
        metrics::gauge!(self.gauge).set(table.len() as f64);
    }
}

/// Exclusive access to one key. The mutex is released before the slot
/// unregisters.
pub struct KeyedGuard<K: Eq + Hash> {
    _guard: OwnedMutexGuard<()>,
    _slot: Slot<K>,
}
