//! Coordinator readiness: app-active, hello, welcome.
//!
//! State machine:
//! ```text
//! Inactive --hello sent--> HelloSent --welcome--> Ready
//!     ^                                              |
//!     +------------- session lost / app quit --------+
//! ```
//!
//! Callers block in [`ReadinessCoordinator::wait_until_ready`]. Each waiting
//! call nudges the handshake on a fixed cadence (re-request app-active,
//! resend hello) until the welcome releases every waiter at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{FusedFuture, FutureExt};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::bytes::Bytes;

use crate::bridge::BridgeError;
use crate::config::{BridgeConfig, MIN_APP_ACTIVE_INTERVAL, MIN_HANDSHAKE_RETRY_INTERVAL};
use crate::gateway::SessionGateway;
use crate::gc::{GcHeader, encode_hello, msg};
use crate::sync::lock_unpoisoned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPhase {
    Inactive,
    HelloSent,
    Ready,
}

struct ReadinessState {
    phase: ReadinessPhase,
    app_active_confirmed: bool,
    app_active_requested_at: Option<Instant>,
    hello_sent_at: Option<Instant>,
    next_waiter_id: u64,
    waiters: HashMap<u64, oneshot::Sender<Result<(), BridgeError>>>,
}

impl ReadinessState {
    fn new() -> Self {
        Self {
            phase: ReadinessPhase::Inactive,
            app_active_confirmed: false,
            app_active_requested_at: None,
            hello_sent_at: None,
            next_waiter_id: 0,
            waiters: HashMap::new(),
        }
    }

    fn reset_handshake(&mut self) {
        self.phase = ReadinessPhase::Inactive;
        self.app_active_confirmed = false;
        self.app_active_requested_at = None;
        self.hello_sent_at = None;
    }
}

fn within(last: Option<Instant>, interval: Duration) -> bool {
    last.is_some_and(|at| at.elapsed() < interval)
}

pub struct ReadinessCoordinator {
    gateway: Arc<dyn SessionGateway>,
    app_id: u32,
    hello_interval: Duration,
    active_interval: Duration,
    state: Mutex<ReadinessState>,
}

/// Removes a readiness waiter when its wait ends without a settlement.
struct WaiterGuard<'a> {
    coordinator: &'a ReadinessCoordinator,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock_unpoisoned(&self.coordinator.state)
            .waiters
            .remove(&self.id);
    }
}

impl ReadinessCoordinator {
    pub fn new(gateway: Arc<dyn SessionGateway>, config: &BridgeConfig) -> Self {
        Self {
            gateway,
            app_id: config.app_id,
            hello_interval: config
                .handshake_retry_interval
                .max(MIN_HANDSHAKE_RETRY_INTERVAL),
            active_interval: config.app_active_interval.max(MIN_APP_ACTIVE_INTERVAL),
            state: Mutex::new(ReadinessState::new()),
        }
    }

    pub fn phase(&self) -> ReadinessPhase {
        lock_unpoisoned(&self.state).phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == ReadinessPhase::Ready
    }

    pub fn waiter_count(&self) -> usize {
        lock_unpoisoned(&self.state).waiters.len()
    }

    /// Ask the session to mark the app active.
    ///
    /// No-op once the app is confirmed active or when a request went out
    /// within the app-active interval. Returns whether a request was sent.
    pub async fn ensure_active(&self) -> Result<bool, BridgeError> {
        {
            let mut state = lock_unpoisoned(&self.state);
            if state.app_active_confirmed
                || within(state.app_active_requested_at, self.active_interval)
            {
                return Ok(false);
            }
            state.app_active_requested_at = Some(Instant::now());
        }

        tracing::debug!(app_id = self.app_id, "Requesting app active");
        if let Err(e) = self.gateway.set_app_active(self.app_id).await {
            lock_unpoisoned(&self.state).app_active_requested_at = None;
            return Err(e.into());
        }
        Ok(true)
    }

    /// Send the client hello.
    ///
    /// Skipped when already Ready, or when a hello went out within the retry
    /// interval, unless `force` is set. Returns whether a hello was sent.
    pub async fn send_hello(&self, force: bool) -> Result<bool, BridgeError> {
        {
            let mut state = lock_unpoisoned(&self.state);
            if !force
                && (state.phase == ReadinessPhase::Ready
                    || within(state.hello_sent_at, self.hello_interval))
            {
                return Ok(false);
            }
            state.hello_sent_at = Some(Instant::now());
            if state.phase == ReadinessPhase::Inactive {
                state.phase = ReadinessPhase::HelloSent;
            }
        }

        let payload = Bytes::from(encode_hello()?);
        tracing::debug!(app_id = self.app_id, force, "Sending client hello");
        if let Err(e) = self
            .gateway
            .send_raw(self.app_id, msg::CLIENT_HELLO, GcHeader::default(), payload)
            .await
        {
            lock_unpoisoned(&self.state).hello_sent_at = None;
            return Err(e.into());
        }
        Ok(true)
    }

    async fn nudge(&self) {
        if let Err(e) = self.ensure_active().await {
            tracing::debug!(error = %e, "App-active request failed");
        }
        if let Err(e) = self.send_hello(false).await {
            tracing::debug!(error = %e, "Hello send failed");
        }
    }

    /// Block until the welcome arrives, or fail after `timeout`.
    ///
    /// Returns immediately when already Ready.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), BridgeError> {
        let (id, mut rx) = {
            let mut state = lock_unpoisoned(&self.state);
            if state.phase == ReadinessPhase::Ready {
                return Ok(());
            }
            state.next_waiter_id += 1;
            let id = state.next_waiter_id;
            let (tx, rx) = oneshot::channel();
            state.waiters.insert(id, tx);
            (id, rx)
        };
        let _guard = WaiterGuard {
            coordinator: self,
            id,
        };

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        // At most one nudge in flight; a stalled gateway must not hold off
        // the deadline or the welcome.
        let nudge = self.nudge().fuse();
        tokio::pin!(nudge);
        let mut ticker = tokio::time::interval(self.hello_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.reset();

        loop {
            tokio::select! {
                biased;
                settled = &mut rx => {
                    return settled.unwrap_or(Err(BridgeError::SessionLost));
                }
                _ = &mut deadline => {
                    tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Timed out waiting for GC welcome");
                    return Err(BridgeError::ReadinessTimeout(timeout));
                }
                _ = &mut nudge, if !nudge.is_terminated() => {}
                _ = ticker.tick(), if nudge.is_terminated() => nudge.set(self.nudge().fuse()),
            }
        }
    }

    /// Welcome received: mark Ready and release every waiter.
    pub fn on_welcome(&self) -> usize {
        let waiters = {
            let mut state = lock_unpoisoned(&self.state);
            state.phase = ReadinessPhase::Ready;
            std::mem::take(&mut state.waiters)
        };
        let released = waiters.len();
        for tx in waiters.into_values() {
            let _ = tx.send(Ok(()));
        }
        released
    }

    pub fn on_app_active_confirmed(&self) {
        lock_unpoisoned(&self.state).app_active_confirmed = true;
    }

    /// Start the handshake over without touching waiters. Used when a new
    /// session comes up.
    pub fn reset(&self) {
        lock_unpoisoned(&self.state).reset_handshake();
    }

    /// Reset the handshake and settle every waiter with `error`.
    pub fn fail_all(&self, error: BridgeError) -> usize {
        let waiters = {
            let mut state = lock_unpoisoned(&self.state);
            state.reset_handshake();
            std::mem::take(&mut state.waiters)
        };
        let failed = waiters.len();
        for tx in waiters.into_values() {
            let _ = tx.send(Err(error.clone()));
        }
        failed
    }
}
