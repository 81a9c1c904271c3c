use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key mutual exclusion. Operations touching the same feature or stored
/// query identifier hold the key's guard for their whole duration.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Guards for several keys, acquired in sorted order.
pub struct KeyGuards {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `key`. Slots nobody holds or waits on are dropped first;
    /// every holder and waiter owns a clone of the slot's `Arc`.
    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    /// Acquire every key; sorting and deduplicating avoids lock-order deadlocks.
    pub async fn acquire_all<I, S>(&self, keys: I) -> KeyGuards
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire(&key).await);
        }
        KeyGuards { _guards: guards }
    }
}

#[cfg(test)]
impl KeyedLocks {
    fn slot_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or_default()
    }
}

pub fn feature_key(id: &str) -> String {
    format!("feature:{}", id)
}

pub fn stored_query_key(id: &str) -> String {
    format!("storedquery:{}", id)
}
