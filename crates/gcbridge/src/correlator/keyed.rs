use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::bytes::Bytes;

use super::waiter::{Entry, RequestContext, Waiter};
use crate::bridge::BridgeError;
use crate::sync::lock_unpoisoned;

struct KeyedState<K> {
    next_id: u64,
    waiters: HashMap<K, Entry>,
}

/// At most one live waiter per key.
pub struct KeyedCorrelator<K> {
    inner: Arc<Mutex<KeyedState<K>>>,
}

impl<K> Clone for KeyedCorrelator<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for KeyedCorrelator<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(KeyedState {
                next_id: 0,
                waiters: HashMap::new(),
            })),
        }
    }
}

impl<K> KeyedCorrelator<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        key: K,
        context: RequestContext,
        timeout: Duration,
    ) -> Result<Waiter, BridgeError> {
        let (id, rx) = {
            let mut state = lock_unpoisoned(&self.inner);
            if state.waiters.contains_key(&key) {
                return Err(BridgeError::DuplicateKey(format!("{key:?}")));
            }
            state.next_id += 1;
            let id = state.next_id;
            let (tx, rx) = oneshot::channel();
            state.waiters.insert(key.clone(), Entry { id, tx });
            (id, rx)
        };

        let inner = Arc::clone(&self.inner);
        let release = move || {
            let mut state = lock_unpoisoned(&inner);
            if state.waiters.get(&key).is_some_and(|entry| entry.id == id) {
                state.waiters.remove(&key);
            }
        };
        Ok(Waiter::new(rx, timeout, context, Box::new(release)))
    }

    /// Deliver `payload` to the waiter for `key`. Returns false when there is
    /// none; a second resolve for the same key is therefore a no-op.
    pub fn resolve(&self, key: &K, payload: Bytes) -> bool {
        self.settle(key, Ok(payload))
    }

    pub fn reject(&self, key: &K, error: BridgeError) -> bool {
        self.settle(key, Err(error))
    }

    fn settle(&self, key: &K, settlement: Result<Bytes, BridgeError>) -> bool {
        let entry = lock_unpoisoned(&self.inner).waiters.remove(key);
        entry.is_some_and(|entry| entry.tx.send(settlement).is_ok())
    }

    pub fn reject_all(&self, error: BridgeError) -> usize {
        let waiters = std::mem::take(&mut lock_unpoisoned(&self.inner).waiters);
        let count = waiters.len();
        for entry in waiters.into_values() {
            let _ = entry.tx.send(Err(error.clone()));
        }
        count
    }

    pub fn contains(&self, key: &K) -> bool {
        lock_unpoisoned(&self.inner).waiters.contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner).waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
