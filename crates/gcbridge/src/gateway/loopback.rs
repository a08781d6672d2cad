//! In-process gateway that records outbound traffic.
//!
//! Used when embedding the bridge behind another transport and by tests that
//! drive the bridge through [`crate::GcBridge::handle_event`] directly.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::bytes::Bytes;

use super::{GatewayError, SessionGateway};
use crate::gc::GcHeader;
use crate::sync::lock_unpoisoned;

/// One recorded `send_raw` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub app_id: u32,
    pub msg_type: u32,
    pub header: GcHeader,
    pub payload: Bytes,
}

pub struct LoopbackGateway {
    connected: AtomicBool,
    history: StdMutex<Vec<SentMessage>>,
    sent_tx: mpsc::UnboundedSender<SentMessage>,
    sent_rx: Mutex<mpsc::UnboundedReceiver<SentMessage>>,
    app_active_calls: AtomicUsize,
    log_on_calls: AtomicUsize,
}

impl Default for LoopbackGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackGateway {
    pub fn new() -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Self {
            connected: AtomicBool::new(true),
            history: StdMutex::new(Vec::new()),
            sent_tx,
            sent_rx: Mutex::new(sent_rx),
            app_active_calls: AtomicUsize::new(0),
            log_on_calls: AtomicUsize::new(0),
        }
    }

    /// While disconnected every call fails with [`GatewayError::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock_unpoisoned(&self.history).clone()
    }

    pub fn sent_of_type(&self, msg_type: u32) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.msg_type == msg_type)
            .collect()
    }

    /// Wait for the next `send_raw` of `msg_type`, skipping other types.
    pub async fn next_sent(&self, msg_type: u32) -> SentMessage {
        let mut rx = self.sent_rx.lock().await;
        loop {
            match rx.recv().await {
                Some(sent) if sent.msg_type == msg_type => return sent,
                Some(_) => continue,
                // The sender lives in `self`, so the channel cannot close.
                None => std::future::pending::<()>().await,
            }
        }
    }

    pub fn app_active_calls(&self) -> usize {
        self.app_active_calls.load(Ordering::SeqCst)
    }

    pub fn log_on_calls(&self) -> usize {
        self.log_on_calls.load(Ordering::SeqCst)
    }

    fn check_connected(&self) -> Result<(), GatewayError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }
}

#[async_trait]
impl SessionGateway for LoopbackGateway {
    async fn send_raw(
        &self,
        app_id: u32,
        msg_type: u32,
        header: GcHeader,
        payload: Bytes,
    ) -> Result<(), GatewayError> {
        self.check_connected()?;
        let sent = SentMessage {
            app_id,
            msg_type,
            header,
            payload,
        };
        lock_unpoisoned(&self.history).push(sent.clone());
        let _ = self.sent_tx.send(sent);
        Ok(())
    }

    async fn set_app_active(&self, _app_id: u32) -> Result<(), GatewayError> {
        self.check_connected()?;
        self.app_active_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn log_on(&self) -> Result<(), GatewayError> {
        self.log_on_calls.fetch_add(1, Ordering::SeqCst);
        self.check_connected()
    }
}
