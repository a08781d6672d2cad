//! [`SessionGateway`] backed by a local sidecar process.
//!
//! One TCP connection carries requests out and session events back. The
//! read half runs in its own task and forwards events into the bridge's
//! channel; a closed or corrupt stream is reported as
//! [`GatewayEvent::SessionLost`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::JsonCodec;
use super::protocol::{SidecarEvent, SidecarRequest};
use super::{GatewayError, GatewayEvent, SessionGateway};
use crate::gc::GcHeader;
use crate::sync::lock_unpoisoned;

type Writer = FramedWrite<OwnedWriteHalf, JsonCodec<SidecarRequest>>;

/// Write half of one connection, tagged so a stale reader cannot clear a
/// newer connection.
struct Link {
    id: u64,
    writer: Writer,
}

type SharedLink = Arc<Mutex<Option<Link>>>;

pub struct SidecarGateway {
    addr: String,
    link: SharedLink,
    next_link_id: AtomicU64,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    events: mpsc::Sender<GatewayEvent>,
}

impl SidecarGateway {
    pub fn new(addr: impl Into<String>, events: mpsc::Sender<GatewayEvent>) -> Self {
        Self {
            addr: addr.into(),
            link: Arc::new(Mutex::new(None)),
            next_link_id: AtomicU64::new(1),
            reader_task: StdMutex::new(None),
            events,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Open (or replace) the sidecar connection.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| GatewayError::Connect {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        let (read_half, write_half) = stream.into_split();

        let id = self.next_link_id.fetch_add(1, Ordering::Relaxed);

        let mut link = self.link.lock().await;
        if let Some(previous) = lock_unpoisoned(&self.reader_task).take() {
            previous.abort();
        }
        *link = Some(Link {
            id,
            writer: FramedWrite::new(write_half, JsonCodec::new()),
        });

        let reader = FramedRead::new(read_half, JsonCodec::<SidecarEvent>::new());
        let task = tokio::spawn(forward_events(
            reader,
            self.events.clone(),
            Arc::clone(&self.link),
            id,
        ));
        *lock_unpoisoned(&self.reader_task) = Some(task);
        drop(link);

        tracing::info!(addr = %self.addr, "Connected to session sidecar");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    async fn send(&self, request: SidecarRequest) -> Result<(), GatewayError> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or(GatewayError::NotConnected)?;
        if let Err(e) = link.writer.send(request).await {
            *guard = None;
            return Err(GatewayError::Send(e.to_string()));
        }
        Ok(())
    }
}

impl Drop for SidecarGateway {
    fn drop(&mut self) {
        if let Some(task) = lock_unpoisoned(&self.reader_task).take() {
            task.abort();
        }
    }
}

async fn forward_events(
    mut reader: FramedRead<OwnedReadHalf, JsonCodec<SidecarEvent>>,
    events: mpsc::Sender<GatewayEvent>,
    link: SharedLink,
    link_id: u64,
) {
    let reason = loop {
        match reader.next().await {
            Some(Ok(frame)) => {
                let event = match GatewayEvent::try_from(frame) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping sidecar message with undecodable payload");
                        continue;
                    }
                };
                if events.send(event).await.is_err() {
                    tracing::debug!("Event channel closed, stopping sidecar reader");
                    return;
                }
            }
            Some(Err(e)) => break format!("sidecar frame error: {e}"),
            None => break "sidecar closed the connection".to_string(),
        }
    };

    tracing::warn!(%reason, "Sidecar stream ended");
    {
        // Drop the dead write half first so the next log_on reconnects.
        let mut current = link.lock().await;
        if current.as_ref().is_some_and(|l| l.id == link_id) {
            *current = None;
        }
    }
    let _ = events.send(GatewayEvent::SessionLost { reason }).await;
}

#[async_trait]
impl SessionGateway for SidecarGateway {
    async fn send_raw(
        &self,
        app_id: u32,
        msg_type: u32,
        header: GcHeader,
        payload: Bytes,
    ) -> Result<(), GatewayError> {
        self.send(SidecarRequest::send_raw(app_id, msg_type, header, &payload))
            .await
    }

    async fn set_app_active(&self, app_id: u32) -> Result<(), GatewayError> {
        self.send(SidecarRequest::SetAppActive { app_id }).await
    }

    async fn log_on(&self) -> Result<(), GatewayError> {
        if !self.is_connected().await {
            self.connect().await?;
        }
        self.send(SidecarRequest::LogOn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let (tx, _rx) = mpsc::channel(4);
        let gateway = SidecarGateway::new("127.0.0.1:1", tx);
        assert_eq!(
            gateway.set_app_active(730).await,
            Err(GatewayError::NotConnected)
        );
    }

    #[tokio::test]
    async fn requests_and_events_cross_the_socket() {
        let (listener, addr) = listener().await;
        let (tx, mut rx) = mpsc::channel(4);
        let gateway = SidecarGateway::new(addr, tx);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let mut requests = FramedRead::new(read_half, JsonCodec::<SidecarRequest>::new());
            let mut events = FramedWrite::new(write_half, JsonCodec::<SidecarEvent>::new());

            let first = requests.next().await.unwrap().unwrap();
            events.send(SidecarEvent::SessionEstablished).await.unwrap();
            let second = requests.next().await.unwrap().unwrap();
            (first, second)
        });

        gateway.log_on().await.unwrap();
        assert_eq!(rx.recv().await, Some(GatewayEvent::SessionEstablished));
        gateway
            .send_raw(730, 4006, GcHeader::default(), Bytes::from_static(&[8, 1]))
            .await
            .unwrap();

        let (first, second) = server.await.unwrap();
        assert_eq!(first, SidecarRequest::LogOn);
        assert_eq!(
            second,
            SidecarRequest::send_raw(730, 4006, GcHeader::default(), &[8, 1])
        );

        // Server dropped its end: the reader reports the session as lost.
        assert!(matches!(
            rx.recv().await,
            Some(GatewayEvent::SessionLost { .. })
        ));
    }

    #[tokio::test]
    async fn log_on_reconnects_after_sidecar_drops() {
        let (listener, addr) = listener().await;
        let (tx, mut rx) = mpsc::channel(4);
        let gateway = SidecarGateway::new(addr, tx);

        let server = tokio::spawn(async move {
            // First connection: read the LogOn, then hang up.
            let (stream, _) = listener.accept().await.unwrap();
            let mut requests = FramedRead::new(stream, JsonCodec::<SidecarRequest>::new());
            assert_eq!(requests.next().await.unwrap().unwrap(), SidecarRequest::LogOn);
            drop(requests);

            let (stream, _) = listener.accept().await.unwrap();
            let mut requests = FramedRead::new(stream, JsonCodec::<SidecarRequest>::new());
            requests.next().await.unwrap().unwrap()
        });

        gateway.log_on().await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(GatewayEvent::SessionLost { .. })
        ));
        assert!(!gateway.is_connected().await);

        gateway.log_on().await.unwrap();
        assert_eq!(server.await.unwrap(), SidecarRequest::LogOn);
        assert!(gateway.is_connected().await);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let (listener, addr) = listener().await;
        drop(listener);
        let (tx, _rx) = mpsc::channel(4);
        let gateway = SidecarGateway::new(addr, tx);
        assert!(matches!(
            gateway.log_on().await,
            Err(GatewayError::Connect { .. })
        ));
    }
}
