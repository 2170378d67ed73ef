use std::net::SocketAddr;
use std::time::Duration;

use baton_core::cluster::PeerId;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A frame queued for a peer's writer task.
pub type Frame = &'static [u8];

/// The registry's reference to a connected peer.
///
/// Holds only the sending side of the peer's outbound queue; the stream
/// itself belongs to the peer's reader and writer tasks.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: PeerId,
    addr: SocketAddr,
    outbound: mpsc::Sender<Frame>,
}

impl PeerHandle {
    pub fn new(id: PeerId, addr: SocketAddr, outbound: mpsc::Sender<Frame>) -> Self {
        Self { id, addr, outbound }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Registry membership change.
#[derive(Debug)]
pub enum PeerEvent {
    Connected(PeerHandle),
    Disconnected(PeerId),
}

impl PeerEvent {
    pub fn peer_id(&self) -> PeerId {
        match self {
            Self::Connected(handle) => handle.id(),
            Self::Disconnected(id) => *id,
        }
    }
}

/// Outcome of one heartbeat broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Frames handed to a writer queue.
    pub queued: usize,
    /// Peers skipped because their queue was full or their writer had exited.
    pub dropped: usize,
}

/// Connected peers, owned by exactly one task.
///
/// Removal swaps the last entry into the freed slot, so iteration order is
/// not stable.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Vec<PeerHandle>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a membership event. Returns whether the collection changed.
    pub fn apply(&mut self, event: PeerEvent) -> bool {
        match event {
            PeerEvent::Connected(handle) => self.add(handle),
            PeerEvent::Disconnected(id) => match self.remove(id) {
                Some(peer) => {
                    tracing::debug!(peer = %id, addr = %peer.addr(), "Peer removed");
                    true
                }
                None => false,
            },
        }
    }

    /// Register a peer. Rejects a second peer with an id already present.
    pub fn add(&mut self, handle: PeerHandle) -> bool {
        if self.contains(handle.id()) {
            tracing::warn!(peer = %handle.id(), "Ignoring duplicate peer registration");
            return false;
        }
        tracing::debug!(peer = %handle.id(), addr = %handle.addr(), "Peer registered");
        self.peers.push(handle);
        true
    }

    /// Remove a peer by id.
    pub fn remove(&mut self, id: PeerId) -> Option<PeerHandle> {
        let index = self.peers.iter().position(|p| p.id() == id)?;
        Some(self.peers.swap_remove(index))
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.iter().any(|p| p.id() == id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Ids of all registered peers, sorted.
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.iter().map(|p| p.id()).collect();
        ids.sort();
        ids
    }

    /// Queue `frame` for every peer without waiting on any of them.
    pub fn broadcast(&self, frame: Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for peer in &self.peers {
            match peer.outbound.try_send(frame) {
                Ok(()) => report.queued += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(peer = %peer.id(), "Outbound queue full, skipping heartbeat");
                    report.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => report.dropped += 1,
            }
        }
        report
    }

    /// Drop every handle, closing all outbound queues.
    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

/// Task that owns the [`PeerRegistry`].
///
/// Applies events strictly in delivery order and broadcasts `heartbeat` on
/// every tick. Membership is published after every change.
pub struct RegistryActor {
    registry: PeerRegistry,
    events: mpsc::Receiver<PeerEvent>,
    heartbeat: Frame,
    heartbeat_interval: Duration,
    members: watch::Sender<Vec<PeerId>>,
}

impl RegistryActor {
    pub fn new(
        events: mpsc::Receiver<PeerEvent>,
        heartbeat: Frame,
        heartbeat_interval: Duration,
        members: watch::Sender<Vec<PeerId>>,
    ) -> Self {
        Self {
            registry: PeerRegistry::new(),
            events,
            heartbeat,
            heartbeat_interval,
            members,
        }
    }

    /// Run until `shutdown` fires or every event sender is gone.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let start = tokio::time::Instant::now() + self.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(start, self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    let id = event.peer_id();
                    if self.registry.apply(event) {
                        tracing::debug!(peer = %id, peers = self.registry.len(), "Registry updated");
                        self.publish();
                    }
                }
                _ = ticker.tick() => {
                    let report = self.registry.broadcast(self.heartbeat);
                    tracing::trace!(queued = report.queued, dropped = report.dropped, "Heartbeat broadcast");
                }
            }
        }

        self.registry.clear();
        self.publish();
        tracing::debug!("Peer registry stopped");
    }

    fn publish(&self) {
        self.members.send_replace(self.registry.ids());
    }
}
