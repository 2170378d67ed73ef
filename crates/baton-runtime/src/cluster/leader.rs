use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use baton_core::cluster::{PeerId, PeerIdGenerator};
use baton_core::config::ClusterConfig;
use baton_core::protocol::HEARTBEAT;
use baton_core::{BatonError, Result};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::liveness::{CloseReason, LivenessMonitor, MonitoredLink};
use super::registry::{Frame, PeerEvent, PeerHandle, RegistryActor};

/// Leader service configuration.
#[derive(Debug, Clone)]
pub struct LeaderConfig {
    /// Rendezvous address to bind.
    pub bind_addr: SocketAddr,
    /// Silence tolerated from a peer before it is dropped.
    pub idle_timeout: Duration,
    /// Heartbeat broadcast period.
    pub heartbeat_interval: Duration,
    /// Pause after a failed accept.
    pub accept_retry_backoff: Duration,
    /// Capacity of the peer event queue. Producers wait when it is full.
    pub event_queue_capacity: usize,
    /// Heartbeats buffered per peer.
    pub outbound_queue_capacity: usize,
}

impl LeaderConfig {
    pub fn from_cluster(cluster: &ClusterConfig) -> Result<Self> {
        Ok(Self {
            bind_addr: cluster.bind_addr()?,
            idle_timeout: cluster.idle_timeout(),
            heartbeat_interval: cluster.heartbeat_interval(),
            accept_retry_backoff: cluster.retry_backoff(),
            event_queue_capacity: cluster.event_queue_capacity,
            outbound_queue_capacity: cluster.outbound_queue_capacity,
        })
    }
}

impl Default for LeaderConfig {
    fn default() -> Self {
        let cluster = ClusterConfig::default();
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 47912)),
            idle_timeout: cluster.idle_timeout(),
            heartbeat_interval: cluster.heartbeat_interval(),
            accept_retry_backoff: cluster.retry_backoff(),
            event_queue_capacity: cluster.event_queue_capacity,
            outbound_queue_capacity: cluster.outbound_queue_capacity,
        }
    }
}

/// Leader side of the rendezvous protocol.
///
/// Owning the bound listener is what makes a process leader. Followers that
/// connect are tracked by a [`RegistryActor`] and receive heartbeats until
/// they go quiet for longer than the idle timeout.
pub struct LeaderService {
    config: LeaderConfig,
    ids: Arc<PeerIdGenerator>,
    members: watch::Sender<Vec<PeerId>>,
}

impl LeaderService {
    /// Create a new leader service drawing peer ids from `ids`.
    pub fn new(config: LeaderConfig, ids: Arc<PeerIdGenerator>) -> Self {
        let (members, _) = watch::channel(Vec::new());
        Self {
            config,
            ids,
            members,
        }
    }

    pub fn config(&self) -> &LeaderConfig {
        &self.config
    }

    /// Watch registry membership. Empty while not leading.
    pub fn subscribe_peers(&self) -> watch::Receiver<Vec<PeerId>> {
        self.members.subscribe()
    }

    /// Currently registered peers.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.members.borrow().clone()
    }

    /// Claim the rendezvous address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|e| BatonError::from_bind(addr, e))
    }

    /// Try to lead: bind, then serve until `cancel` fires.
    ///
    /// Returns [`BatonError::BindConflict`] right away when another process
    /// already holds the address.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tracing::info!("Trying to become leader");
        let listener = self.bind().await?;
        self.serve(listener, cancel).await
    }

    /// Serve followers on an already bound listener until `cancel` fires.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Accepting connections");

        let service = cancel.child_token();
        let (events_tx, events_rx) = mpsc::channel(self.config.event_queue_capacity);
        let actor = RegistryActor::new(
            events_rx,
            HEARTBEAT,
            self.config.heartbeat_interval,
            self.members.clone(),
        );
        let registry = tokio::spawn(actor.run(service.clone()));
        let mut peers = JoinSet::new();

        loop {
            tokio::select! {
                _ = service.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        self.admit(stream, addr, &events_tx, &service, &mut peers).await;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        tokio::select! {
                            _ = service.cancelled() => break,
                            _ = tokio::time::sleep(self.config.accept_retry_backoff) => {}
                        }
                    }
                },
                Some(joined) = peers.join_next(), if !peers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!("Peer task failed: {}", e);
                    }
                }
            }
        }

        tracing::info!(addr = %local_addr, "Leader shutting down");
        drop(listener);
        service.cancel();
        drop(events_tx);

        while let Some(joined) = peers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Peer task failed: {}", e);
            }
        }
        if let Err(e) = registry.await {
            tracing::warn!("Peer registry task failed: {}", e);
        }
        self.members.send_replace(Vec::new());

        Ok(())
    }

    /// Register a freshly accepted connection and start its tasks.
    ///
    /// The `Connected` event is queued before the reader starts, so the
    /// registry always sees a peer's arrival before its departure.
    async fn admit(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        events: &mpsc::Sender<PeerEvent>,
        service: &CancellationToken,
        peers: &mut JoinSet<()>,
    ) {
        let id = match self.ids.next_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(addr = %addr, "Refusing connection: {}", e);
                return;
            }
        };
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue_capacity);
        let handle = PeerHandle::new(id, addr, outbound_tx);

        tracing::info!(addr = %addr, "{} connected", id);
        if events.send(PeerEvent::Connected(handle)).await.is_err() {
            // Registry already gone; the service is shutting down.
            return;
        }

        let (read, write) = stream.into_split();
        let peer = service.child_token();
        let monitor = LivenessMonitor::new(self.config.idle_timeout);

        peers.spawn(write_peer(id, write, outbound_rx, peer.clone()));
        peers.spawn(read_peer(id, read, monitor, events.clone(), peer));
    }
}

/// Read a peer's lines until it closes or goes quiet, then report it gone.
async fn read_peer(
    id: PeerId,
    read: OwnedReadHalf,
    monitor: LivenessMonitor,
    events: mpsc::Sender<PeerEvent>,
    peer: CancellationToken,
) {
    let mut link = MonitoredLink::new(BufReader::new(read), monitor);

    let reason = loop {
        tokio::select! {
            _ = peer.cancelled() => break CloseReason::Shutdown,
            line = link.next_line() => match line {
                Ok(line) => tracing::debug!("{} msg -> {}", id, line),
                Err(reason) => break reason,
            }
        }
    };

    reason.log(&id);
    peer.cancel();

    if !matches!(reason, CloseReason::Shutdown) {
        let _ = events.send(PeerEvent::Disconnected(id)).await;
    }
}

/// Drain a peer's outbound queue onto its socket.
///
/// Ends when the registry drops the peer's handle, when the peer is
/// cancelled, or on the first failed write. The reader notices a dead peer
/// on its own.
async fn write_peer(
    id: PeerId,
    mut write: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Frame>,
    peer: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = peer.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        tokio::select! {
            _ = peer.cancelled() => break,
            written = write.write_all(frame) => {
                if let Err(e) = written {
                    tracing::debug!("{} write failed: {}", id, e);
                    break;
                }
            }
        }
    }

    let _ = write.shutdown().await;
}
