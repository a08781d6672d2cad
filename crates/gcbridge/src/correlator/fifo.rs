use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::bytes::Bytes;

use super::waiter::{Entry, RequestContext, Settlement, Waiter};
use crate::bridge::BridgeError;
use crate::sync::lock_unpoisoned;

#[derive(Default)]
struct FifoState {
    next_id: u64,
    queues: HashMap<u32, VecDeque<Entry>>,
}

impl FifoState {
    fn push(&mut self, reply_type: u32) -> (u64, oneshot::Receiver<Settlement>) {
        self.next_id += 1;
        let id = self.next_id;
        let (tx, rx) = oneshot::channel();
        self.queues
            .entry(reply_type)
            .or_default()
            .push_back(Entry { id, tx });
        (id, rx)
    }

    fn remove(&mut self, reply_type: u32, id: u64) {
        let Some(queue) = self.queues.get_mut(&reply_type) else {
            return;
        };
        queue.retain(|entry| entry.id != id);
        if queue.is_empty() {
            self.queues.remove(&reply_type);
        }
    }
}

/// Per-reply-type queues of waiters, resolved oldest first.
#[derive(Clone, Default)]
pub struct FifoCorrelator {
    inner: Arc<Mutex<FifoState>>,
}

impl FifoCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, reply_type: u32, context: RequestContext, timeout: Duration) -> Waiter {
        let (id, rx) = lock_unpoisoned(&self.inner).push(reply_type);
        self.waiter(reply_type, id, rx, context, timeout)
    }

    /// Like [`register`](Self::register), but refuses while another waiter
    /// for `reply_type` is pending.
    pub fn register_exclusive(
        &self,
        reply_type: u32,
        context: RequestContext,
        timeout: Duration,
    ) -> Result<Waiter, BridgeError> {
        let (id, rx) = {
            let mut state = lock_unpoisoned(&self.inner);
            if state.queues.get(&reply_type).is_some_and(|q| !q.is_empty()) {
                return Err(BridgeError::AlreadyInFlight(reply_type));
            }
            state.push(reply_type)
        };
        Ok(self.waiter(reply_type, id, rx, context, timeout))
    }

    fn waiter(
        &self,
        reply_type: u32,
        id: u64,
        rx: oneshot::Receiver<Settlement>,
        context: RequestContext,
        timeout: Duration,
    ) -> Waiter {
        let inner = Arc::clone(&self.inner);
        Waiter::new(
            rx,
            timeout,
            context,
            Box::new(move || lock_unpoisoned(&inner).remove(reply_type, id)),
        )
    }

    /// Hand `payload` to the oldest live waiter for `reply_type`.
    ///
    /// Returns false when nobody was waiting.
    pub fn resolve_oldest(&self, reply_type: u32, payload: Bytes) -> bool {
        let mut state = lock_unpoisoned(&self.inner);
        let Some(queue) = state.queues.get_mut(&reply_type) else {
            return false;
        };

        let mut delivered = false;
        while let Some(entry) = queue.pop_front() {
            if entry.tx.send(Ok(payload.clone())).is_ok() {
                delivered = true;
                break;
            }
        }
        if queue.is_empty() {
            state.queues.remove(&reply_type);
        }
        delivered
    }

    /// Settle every pending waiter with `error`. Returns how many were pending.
    pub fn reject_all(&self, error: BridgeError) -> usize {
        let queues = std::mem::take(&mut lock_unpoisoned(&self.inner).queues);
        let mut count = 0;
        for entry in queues.into_values().flatten() {
            let _ = entry.tx.send(Err(error.clone()));
            count += 1;
        }
        count
    }

    pub fn pending(&self, reply_type: u32) -> usize {
        lock_unpoisoned(&self.inner)
            .queues
            .get(&reply_type)
            .map_or(0, VecDeque::len)
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.inner)
            .queues
            .values()
            .map(VecDeque::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
