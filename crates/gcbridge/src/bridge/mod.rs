//! GC session bridge.
//!
//! Owns the readiness handshake and the correlators, routes inbound GC
//! messages to waiting requests, and supervises reconnects.
//!
//! Inbound dispatch order for messages of the configured app:
//! 1. welcome: readiness
//! 2. `job_id_target` matching a pending job: that job
//! 3. installed [`ReplyRoute`] for the message type
//! 4. otherwise logged and dropped
//!
//! A lost session is a global cancellation: every pending request and every
//! readiness waiter fails with [`BridgeError::SessionLost`], then a single
//! reconnect is scheduled.

mod error;
mod routes;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::bytes::Bytes;

pub use error::BridgeError;
pub use routes::{KeyExtractor, ReplyRoute};

use crate::config::BridgeConfig;
use crate::correlator::{FifoCorrelator, KeyedCorrelator, Reply, RequestContext};
use crate::gateway::{GatewayError, GatewayEvent, SessionGateway};
use crate::gc::{GcHeader, GcMessage, msg};
use crate::readiness::ReadinessCoordinator;
use crate::sync::lock_unpoisoned;

pub struct GcBridge {
    config: BridgeConfig,
    gateway: Arc<dyn SessionGateway>,
    readiness: ReadinessCoordinator,
    fifo: FifoCorrelator,
    keyed: KeyedCorrelator<(u32, u64)>,
    jobs: KeyedCorrelator<u64>,
    routes: RwLock<HashMap<u32, ReplyRoute>>,
    /// One async lane per FIFO reply type; holders have the type to themselves.
    fifo_lanes: StdMutex<HashMap<u32, Arc<Mutex<()>>>>,
    next_job_id: AtomicU64,
    /// Bumped on every flush; requests queued across a flush fail.
    session_epoch: AtomicU64,
    reconnect_task: StdMutex<Option<JoinHandle<()>>>,
    login_in_flight: AtomicBool,
}

impl GcBridge {
    pub fn new(config: BridgeConfig, gateway: Arc<dyn SessionGateway>) -> Self {
        let config = config.validated();
        let readiness = ReadinessCoordinator::new(Arc::clone(&gateway), &config);
        Self {
            config,
            gateway,
            readiness,
            fifo: FifoCorrelator::new(),
            keyed: KeyedCorrelator::new(),
            jobs: KeyedCorrelator::new(),
            routes: RwLock::new(HashMap::new()),
            fifo_lanes: StdMutex::new(HashMap::new()),
            next_job_id: AtomicU64::new(1),
            session_epoch: AtomicU64::new(0),
            reconnect_task: StdMutex::new(None),
            login_in_flight: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn readiness(&self) -> &ReadinessCoordinator {
        &self.readiness
    }

    /// Requests currently waiting on a reply, across all correlators.
    pub fn pending_requests(&self) -> usize {
        self.fifo.len() + self.keyed.len() + self.jobs.len()
    }

    /// Install the reply route for `msg_type`. Returns false if a route that
    /// cannot coexist with `route` is already installed.
    pub fn install_route(&self, msg_type: u32, route: ReplyRoute) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(|poisoned| {
            tracing::error!("Route table lock poisoned, recovering");
            poisoned.into_inner()
        });
        match routes.get(&msg_type) {
            Some(existing) if !existing.compatible_with(&route) => false,
            Some(_) => true,
            None => {
                routes.insert(msg_type, route);
                true
            }
        }
    }

    fn route_for(&self, msg_type: u32) -> Option<ReplyRoute> {
        let routes = self.routes.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        routes.get(&msg_type).copied()
    }

    fn fifo_lane(&self, reply_type: u32) -> Arc<Mutex<()>> {
        let mut lanes = lock_unpoisoned(&self.fifo_lanes);
        Arc::clone(lanes.entry(reply_type).or_default())
    }

    async fn send(&self, message: GcMessage, header: GcHeader) -> Result<(), BridgeError> {
        self.gateway
            .send_raw(
                self.config.app_id,
                message.msg_type,
                header,
                Bytes::from(message.payload),
            )
            .await?;
        Ok(())
    }

    /// Send `message` and wait for the next reply of `reply_type`.
    ///
    /// Requests sharing a reply type queue behind each other so that at most
    /// one is ever in flight per type.
    pub async fn request_fifo(
        &self,
        message: GcMessage,
        reply_type: u32,
        context: RequestContext,
        timeout: Option<Duration>,
    ) -> Result<Reply, BridgeError> {
        let timeout = self.config.request_timeout_for(timeout);
        self.readiness
            .wait_until_ready(self.config.readiness_timeout)
            .await?;

        let epoch = self.session_epoch.load(Ordering::SeqCst);

        let lane = self.fifo_lane(reply_type);
        let _lane = lane.lock().await;
        if self.session_epoch.load(Ordering::SeqCst) != epoch || !self.readiness.is_ready() {
            tracing::debug!(reply_type, "Session reset while queued for FIFO lane");
            return Err(BridgeError::SessionLost);
        }
        let waiter = self.fifo.register_exclusive(reply_type, context, timeout)?;
        tracing::debug!(
            msg_type = message.msg_type,
            reply_type,
            "Sending FIFO-correlated request"
        );
        self.send(message, GcHeader::default()).await?;
        waiter.wait().await
    }

    /// Send `message` and wait for a `reply_type` reply whose extracted keys
    /// include `key`.
    pub async fn request_keyed(
        &self,
        message: GcMessage,
        reply_type: u32,
        key: u64,
        context: RequestContext,
        timeout: Option<Duration>,
    ) -> Result<Reply, BridgeError> {
        let timeout = self.config.request_timeout_for(timeout);
        self.readiness
            .wait_until_ready(self.config.readiness_timeout)
            .await?;

        let waiter = self.keyed.register((reply_type, key), context, timeout)?;
        tracing::debug!(msg_type = message.msg_type, reply_type, key, "Sending keyed request");
        self.send(message, GcHeader::default()).await?;
        waiter.wait().await
    }

    /// Send `message` tagged with a fresh job id and wait for the reply that
    /// targets it.
    pub async fn request_job(
        &self,
        message: GcMessage,
        context: RequestContext,
        timeout: Option<Duration>,
    ) -> Result<Reply, BridgeError> {
        let timeout = self.config.request_timeout_for(timeout);
        self.readiness
            .wait_until_ready(self.config.readiness_timeout)
            .await?;

        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let waiter = self.jobs.register(job_id, context, timeout)?;
        tracing::debug!(msg_type = message.msg_type, job_id, "Sending job request");
        self.send(message, GcHeader::with_source(job_id)).await?;
        waiter.wait().await
    }

    pub async fn handle_event(self: &Arc<Self>, event: GatewayEvent) {
        match event {
            GatewayEvent::SessionEstablished => self.on_session_established().await,
            GatewayEvent::MessageReceived {
                app_id,
                msg_type,
                header,
                payload,
            } => self.dispatch(app_id, msg_type, header, payload),
            GatewayEvent::SessionLost { reason } => self.on_session_lost(&reason),
            GatewayEvent::AppActiveConfirmed { app_id } if app_id == self.config.app_id => {
                tracing::debug!(app_id, "App active confirmed");
                self.readiness.on_app_active_confirmed();
                if !self.readiness.is_ready()
                    && let Err(e) = self.readiness.send_hello(true).await
                {
                    tracing::warn!(error = %e, "Hello after app launch failed");
                }
            }
            GatewayEvent::AppInactive { app_id } if app_id == self.config.app_id => {
                let failed = self.flush(BridgeError::SessionLost);
                tracing::warn!(app_id, failed, "App no longer active, pending requests failed");
            }
            GatewayEvent::AppActiveConfirmed { app_id } | GatewayEvent::AppInactive { app_id } => {
                tracing::trace!(app_id, "Ignoring app event for another app");
            }
        }
    }

    fn dispatch(&self, app_id: u32, msg_type: u32, header: GcHeader, payload: Bytes) {
        if app_id != self.config.app_id {
            tracing::trace!(app_id, msg_type, "Ignoring GC message for another app");
            return;
        }

        if msg_type == msg::CLIENT_WELCOME {
            let released = self.readiness.on_welcome();
            tracing::info!(released, "GC welcome received, coordinator ready");
            return;
        }

        if let Some(job_id) = header.job_id_target
            && self.jobs.resolve(&job_id, payload.clone())
        {
            tracing::debug!(msg_type, job_id, "Job reply delivered");
            return;
        }

        match self.route_for(msg_type) {
            Some(ReplyRoute::Fifo) => {
                if !self.fifo.resolve_oldest(msg_type, payload) {
                    tracing::warn!(msg_type, "FIFO reply arrived with no pending request");
                }
            }
            Some(ReplyRoute::Keyed(extract)) => match extract(&payload) {
                Ok(keys) => {
                    let delivered = keys
                        .into_iter()
                        .filter(|key| self.keyed.resolve(&(msg_type, *key), payload.clone()))
                        .count();
                    if delivered == 0 {
                        tracing::warn!(msg_type, "Keyed reply matched no pending request");
                    }
                }
                Err(e) => {
                    tracing::warn!(msg_type, error = %e, "Could not extract correlation key from reply");
                }
            },
            None => tracing::debug!(msg_type, "Dropping unrouted GC message"),
        }
    }

    /// Fail every readiness waiter and pending request with `error`.
    pub fn flush(&self, error: BridgeError) -> usize {
        self.session_epoch.fetch_add(1, Ordering::SeqCst);
        self.readiness.fail_all(error.clone())
            + self.fifo.reject_all(error.clone())
            + self.keyed.reject_all(error.clone())
            + self.jobs.reject_all(error)
    }

    async fn on_session_established(&self) {
        if let Some(task) = lock_unpoisoned(&self.reconnect_task).take() {
            task.abort();
        }
        self.login_in_flight.store(false, Ordering::SeqCst);
        self.readiness.reset();
        tracing::info!("GC session established");

        if let Err(e) = self.readiness.ensure_active().await {
            tracing::warn!(error = %e, "App-active request after login failed");
        }
        if let Err(e) = self.readiness.send_hello(true).await {
            tracing::warn!(error = %e, "Hello after login failed");
        }
    }

    fn on_session_lost(self: &Arc<Self>, reason: &str) {
        let failed = self.flush(BridgeError::SessionLost);
        tracing::warn!(reason, failed, "GC session lost");
        self.login_in_flight.store(false, Ordering::SeqCst);
        self.schedule_reconnect();
    }

    /// Log on now; if that fails, fall back to the reconnect schedule.
    pub async fn start(self: &Arc<Self>) {
        if let Err(e) = self.try_login().await {
            tracing::warn!(error = %e, "Initial login failed");
            self.schedule_reconnect();
        }
    }

    /// Schedule a login after the reconnect delay unless one is already
    /// scheduled.
    pub fn schedule_reconnect(self: &Arc<Self>) {
        let mut slot = lock_unpoisoned(&self.reconnect_task);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!("Reconnect already scheduled");
            return;
        }

        let delay = self.config.reconnect_delay;
        tracing::info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        let bridge = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Leave the slot free so a failed attempt can re-arm.
            drop(lock_unpoisoned(&bridge.reconnect_task).take());
            if let Err(e) = bridge.try_login().await {
                tracing::warn!(error = %e, "Reconnect login failed");
                bridge.schedule_reconnect();
            }
        }));
    }

    async fn try_login(&self) -> Result<(), GatewayError> {
        if self.login_in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Login already in flight");
            return Ok(());
        }
        tracing::info!("Logging on to game session");
        if let Err(e) = self.gateway.log_on().await {
            self.login_in_flight.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Feed gateway events into the bridge until shutdown or until the
    /// gateway drops its sender.
    pub async fn run_event_loop(
        self: Arc<Self>,
        mut events: mpsc::Receiver<GatewayEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Event loop shutting down");
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::warn!("Gateway event channel closed");
                        break;
                    }
                },
            }
        }

        if let Some(task) = lock_unpoisoned(&self.reconnect_task).take() {
            task.abort();
        }
        self.flush(BridgeError::SessionLost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LoopbackGateway;
    use crate::wire::{MessageWriter, parse_top_level_fields};

    const REQ: u32 = 9131;
    const REPLY: u32 = 9132;
    const PROFILE_REQ: u32 = 9127;
    const PROFILE: u32 = 9128;

    fn bridge() -> (Arc<LoopbackGateway>, Arc<GcBridge>) {
        let gateway = Arc::new(LoopbackGateway::new());
        let bridge = Arc::new(GcBridge::new(BridgeConfig::builtin(), gateway.clone()));
        (gateway, bridge)
    }

    async fn welcome(bridge: &Arc<GcBridge>) {
        bridge
            .handle_event(GatewayEvent::message(730, msg::CLIENT_WELCOME, Vec::new()))
            .await;
    }

    fn account_ids(payload: &[u8]) -> Result<Vec<u64>, crate::wire::WireError> {
        Ok(parse_top_level_fields(payload)?.first_varint(1).into_iter().collect())
    }

    fn body(account_id: u64) -> Vec<u8> {
        let mut w = MessageWriter::new();
        w.varint(1, account_id).unwrap();
        w.finish()
    }

    #[tokio::test(start_paused = true)]
    async fn welcome_for_other_app_is_ignored() {
        let (_gateway, bridge) = bridge();
        bridge
            .handle_event(GatewayEvent::message(570, msg::CLIENT_WELCOME, Vec::new()))
            .await;
        assert!(!bridge.readiness().is_ready());
        welcome(&bridge).await;
        assert!(bridge.readiness().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn construction_applies_config_floors() {
        use crate::config::{MIN_HANDSHAKE_RETRY_INTERVAL, MIN_READINESS_TIMEOUT};

        let gateway = Arc::new(LoopbackGateway::new());
        let config = BridgeConfig::builtin()
            .with_readiness_timeout(Duration::ZERO)
            .with_handshake_retry_interval(Duration::ZERO);
        let bridge = Arc::new(GcBridge::new(config, gateway.clone()));
        assert_eq!(bridge.config().readiness_timeout, MIN_READINESS_TIMEOUT);
        assert_eq!(
            bridge.config().handshake_retry_interval,
            MIN_HANDSHAKE_RETRY_INTERVAL
        );
        assert!(bridge.install_route(REPLY, ReplyRoute::Fifo));

        // A zero hello period would panic the ticker; a zero readiness
        // timeout would fail before the first hello.
        let err = bridge
            .request_fifo(GcMessage::new(REQ, body(1)), REPLY, RequestContext::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::ReadinessTimeout(MIN_READINESS_TIMEOUT));
        assert!(!gateway.sent_of_type(msg::CLIENT_HELLO).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn request_waits_for_welcome() {
        let (gateway, bridge) = bridge();
        assert!(bridge.install_route(REPLY, ReplyRoute::Fifo));

        let request = tokio::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .request_fifo(GcMessage::new(REQ, body(1)), REPLY, RequestContext::default(), None)
                    .await
            }
        });

        gateway.next_sent(msg::CLIENT_HELLO).await;
        assert!(gateway.sent_of_type(REQ).is_empty());
        welcome(&bridge).await;

        gateway.next_sent(REQ).await;
        bridge
            .handle_event(GatewayEvent::message(730, REPLY, body(1)))
            .await;
        let reply = request.await.unwrap().unwrap();
        assert_eq!(account_ids(&reply.payload).unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_requests_are_serialized() {
        let (gateway, bridge) = bridge();
        bridge.install_route(REPLY, ReplyRoute::Fifo);
        welcome(&bridge).await;

        let spawn_request = |account: u64| {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .request_fifo(
                        GcMessage::new(REQ, body(account)),
                        REPLY,
                        RequestContext::for_account(account),
                        None,
                    )
                    .await
            })
        };
        let first = spawn_request(1);
        let second = spawn_request(2);

        gateway.next_sent(REQ).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gateway.sent_of_type(REQ).len(), 1);

        bridge
            .handle_event(GatewayEvent::message(730, REPLY, b"first".to_vec()))
            .await;
        gateway.next_sent(REQ).await;
        bridge
            .handle_event(GatewayEvent::message(730, REPLY, b"second".to_vec()))
            .await;

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.context.account_id, Some(1));
        assert_eq!(first.payload, Bytes::from_static(b"first"));
        assert_eq!(second.context.account_id, Some(2));
        assert_eq!(second.payload, Bytes::from_static(b"second"));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_fifo_request_fails_when_session_drops() {
        let (gateway, bridge) = bridge();
        bridge.install_route(REPLY, ReplyRoute::Fifo);
        welcome(&bridge).await;

        let spawn_request = |account: u64| {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .request_fifo(
                        GcMessage::new(REQ, body(account)),
                        REPLY,
                        RequestContext::for_account(account),
                        None,
                    )
                    .await
            })
        };
        let first = spawn_request(1);
        gateway.next_sent(REQ).await;
        let second = spawn_request(2);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        bridge
            .handle_event(GatewayEvent::SessionLost {
                reason: "test".into(),
            })
            .await;

        assert_eq!(first.await.unwrap(), Err(BridgeError::SessionLost));
        assert_eq!(second.await.unwrap(), Err(BridgeError::SessionLost));
        assert_eq!(gateway.sent_of_type(REQ).len(), 1);
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keyed_replies_route_by_account() {
        let (gateway, bridge) = bridge();
        bridge.install_route(PROFILE, ReplyRoute::Keyed(account_ids));
        welcome(&bridge).await;

        let lookup = |account: u64| {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .request_keyed(
                        GcMessage::new(PROFILE_REQ, body(account)),
                        PROFILE,
                        account,
                        RequestContext::for_account(account),
                        None,
                    )
                    .await
            })
        };
        let a = lookup(10);
        let b = lookup(20);
        gateway.next_sent(PROFILE_REQ).await;
        gateway.next_sent(PROFILE_REQ).await;

        // Replies arrive in the opposite order.
        bridge
            .handle_event(GatewayEvent::message(730, PROFILE, body(20)))
            .await;
        assert!(bridge.keyed.contains(&(PROFILE, 10)));
        assert!(!bridge.keyed.contains(&(PROFILE, 20)));
        bridge
            .handle_event(GatewayEvent::message(730, PROFILE, body(10)))
            .await;

        assert_eq!(
            account_ids(&a.await.unwrap().unwrap().payload).unwrap(),
            vec![10]
        );
        assert_eq!(
            account_ids(&b.await.unwrap().unwrap().payload).unwrap(),
            vec![20]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn job_replies_route_by_target() {
        let (gateway, bridge) = bridge();
        welcome(&bridge).await;

        let request = tokio::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .request_job(GcMessage::new(4501, Vec::new()), RequestContext::default(), None)
                    .await
            }
        });
        let sent = gateway.next_sent(4501).await;
        let job_id = sent.header.job_id_source.unwrap();

        // Unknown target falls through to the (absent) route and is dropped.
        bridge
            .handle_event(GatewayEvent::job_reply(730, 4502, job_id + 100, b"stray".to_vec()))
            .await;
        bridge
            .handle_event(GatewayEvent::job_reply(730, 4502, job_id, b"ok".to_vec()))
            .await;

        let reply = request.await.unwrap().unwrap();
        assert_eq!(reply.payload, Bytes::from_static(b"ok"));
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (_gateway, bridge) = bridge();
        bridge.install_route(REPLY, ReplyRoute::Fifo);
        welcome(&bridge).await;

        let err = bridge
            .request_fifo(
                GcMessage::new(REQ, Vec::new()),
                REPLY,
                RequestContext::default(),
                Some(Duration::from_secs(4)),
            )
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::RequestTimeout(Duration::from_secs(4)));
        assert_eq!(bridge.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_loss_fails_everything_and_reconnects_once() {
        let (gateway, bridge) = bridge();
        bridge.install_route(REPLY, ReplyRoute::Fifo);
        welcome(&bridge).await;

        let request = tokio::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .request_fifo(GcMessage::new(REQ, Vec::new()), REPLY, RequestContext::default(), None)
                    .await
            }
        });
        gateway.next_sent(REQ).await;

        let lost = || GatewayEvent::SessionLost {
            reason: "test".into(),
        };
        bridge.handle_event(lost()).await;
        bridge.handle_event(lost()).await;

        assert_eq!(request.await.unwrap(), Err(BridgeError::SessionLost));
        assert!(!bridge.readiness().is_ready());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(gateway.log_on_calls(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(gateway.log_on_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_login_rearms_reconnect() {
        let (gateway, bridge) = bridge();
        gateway.set_connected(false);
        bridge
            .handle_event(GatewayEvent::SessionLost {
                reason: "test".into(),
            })
            .await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(gateway.log_on_calls(), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(gateway.log_on_calls(), 2);

        gateway.set_connected(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(gateway.log_on_calls(), 3);
        bridge.handle_event(GatewayEvent::SessionEstablished).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(gateway.log_on_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn session_established_restarts_handshake() {
        let (gateway, bridge) = bridge();
        welcome(&bridge).await;
        bridge.handle_event(GatewayEvent::SessionEstablished).await;

        assert!(!bridge.readiness().is_ready());
        assert_eq!(gateway.sent_of_type(msg::CLIENT_HELLO).len(), 1);
        assert_eq!(gateway.app_active_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn established_cancels_pending_reconnect() {
        let (gateway, bridge) = bridge();
        bridge
            .handle_event(GatewayEvent::SessionLost {
                reason: "test".into(),
            })
            .await;
        bridge.handle_event(GatewayEvent::SessionEstablished).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(gateway.log_on_calls(), 0);
    }

    #[test]
    fn route_conflicts() {
        let (_gateway, bridge) = bridge();
        assert!(bridge.install_route(REPLY, ReplyRoute::Fifo));
        assert!(bridge.install_route(REPLY, ReplyRoute::Fifo));
        assert!(!bridge.install_route(REPLY, ReplyRoute::Keyed(account_ids)));
        assert!(bridge.install_route(PROFILE, ReplyRoute::Keyed(account_ids)));
        assert!(!bridge.install_route(PROFILE, ReplyRoute::Keyed(account_ids)));
    }
}
