use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::bytes::Bytes;

use crate::bridge::BridgeError;

/// Caller-supplied context handed back with the reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub account_id: Option<u64>,
}

impl RequestContext {
    pub fn for_account(account_id: u64) -> Self {
        Self {
            account_id: Some(account_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub payload: Bytes,
    pub context: RequestContext,
    pub elapsed: Duration,
}

pub(crate) type Settlement = Result<Bytes, BridgeError>;

/// Correlator-side half of a waiter.
pub(crate) struct Entry {
    pub id: u64,
    pub tx: oneshot::Sender<Settlement>,
}

type Release = Box<dyn FnOnce() + Send>;

/// Caller-side half of a registered request.
///
/// The deadline lives here rather than in a spawned timer: when the wait
/// times out, or the waiter is dropped unresolved, `release` removes the
/// correlator entry so nothing outlives the request.
pub struct Waiter {
    rx: oneshot::Receiver<Settlement>,
    timeout: Duration,
    started: Instant,
    context: RequestContext,
    release: Option<Release>,
}

impl Waiter {
    pub(crate) fn new(
        rx: oneshot::Receiver<Settlement>,
        timeout: Duration,
        context: RequestContext,
        release: Release,
    ) -> Self {
        Self {
            rx,
            timeout,
            started: Instant::now(),
            context,
            release: Some(release),
        }
    }

    pub fn context(&self) -> RequestContext {
        self.context
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.timeout
    }

    pub async fn wait(mut self) -> Result<Reply, BridgeError> {
        match tokio::time::timeout_at(self.deadline(), &mut self.rx).await {
            Ok(Ok(settlement)) => {
                self.release = None;
                settlement.map(|payload| Reply {
                    payload,
                    context: self.context,
                    elapsed: self.started.elapsed(),
                })
            }
            // Correlator dropped with the entry still in it.
            Ok(Err(_)) => {
                self.release = None;
                Err(BridgeError::SessionLost)
            }
            Err(_) => {
                self.reclaim();
                Err(BridgeError::RequestTimeout(self.timeout))
            }
        }
    }

    fn reclaim(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.reclaim();
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("timeout", &self.timeout)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
