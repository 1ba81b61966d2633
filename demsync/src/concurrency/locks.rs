//! Per-key apply serialization.
//!
//! Live notifications and reconciliation replays can target the same row
//! concurrently. Serializing applies per `(entity, id)` keeps those two
//! writers from interleaving destructively, without a lock shared across
//! unrelated rows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::EntityKind;

/// Map size above which released locks are pruned on the next acquire.
const PRUNE_THRESHOLD: usize = 1024;

/// Keyed async locks scoped to `(entity, id)`.
///
/// Cloning is cheap and all clones share the same lock table, so the listener
/// and the reconciliation engine can hold clones of one instance.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<StdMutex<HashMap<(EntityKind, i64), Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for the given key, waiting until any current holder
    /// releases it. The returned guard releases the lock on drop.
    pub async fn acquire(&self, kind: EntityKind, id: i64) -> OwnedMutexGuard<()> {
        let entry = {
            let mut table = self.inner.lock().expect("keyed lock table poisoned");

            // Uncontended entries are dropped once the table grows, keeping
            // the table bounded over a long process lifetime.
            if table.len() > PRUNE_THRESHOLD {
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            Arc::clone(table.entry((kind, id)).or_default())
        };

        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_applies_are_serialized() {
        let locks = KeyedLocks::new();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let running = running.clone();
            let max_seen = max_seen.clone();

            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(EntityKind::Demand, 42).await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();

        let _demand_guard = locks.acquire(EntityKind::Demand, 1).await;
        let _other_id_guard = locks.acquire(EntityKind::Demand, 2).await;
        let _other_kind_guard = locks.acquire(EntityKind::FiscalDemanda, 1).await;
    }
}
