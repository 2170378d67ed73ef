use std::net::SocketAddr;
use std::time::Duration;

use baton_core::config::ClusterConfig;
use baton_core::protocol::HEARTBEAT;
use baton_core::{BatonError, Result};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::liveness::{CloseReason, LivenessMonitor, MonitoredLink};

/// Follower client configuration.
#[derive(Debug, Clone)]
pub struct FollowerConfig {
    /// Rendezvous address of the leader.
    pub leader_addr: SocketAddr,
    /// Silence tolerated from the leader.
    pub idle_timeout: Duration,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Dial timeout.
    pub connect_timeout: Duration,
}

impl FollowerConfig {
    pub fn from_cluster(cluster: &ClusterConfig) -> Result<Self> {
        Ok(Self {
            leader_addr: cluster.bind_addr()?,
            idle_timeout: cluster.idle_timeout(),
            heartbeat_interval: cluster.heartbeat_interval(),
            connect_timeout: cluster.connect_timeout(),
        })
    }
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            leader_addr: SocketAddr::from(([127, 0, 0, 1], 47912)),
            idle_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_millis(2500),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Follower side of the rendezvous protocol.
pub struct FollowerClient {
    config: FollowerConfig,
}

impl FollowerClient {
    pub fn new(config: FollowerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FollowerConfig {
        &self.config
    }

    /// Try to follow: dial the leader, then exchange heartbeats until the
    /// leader goes away or `cancel` fires.
    ///
    /// Losing the leader is not an error; only a failed dial is.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tracing::info!("Trying to become follower");
        match self.dial(&cancel).await? {
            Some(stream) => self.follow(stream, cancel).await,
            None => Ok(()),
        }
    }

    /// Connect to the leader. `None` when cancelled first.
    async fn dial(&self, cancel: &CancellationToken) -> Result<Option<TcpStream>> {
        let addr = self.config.leader_addr;
        let connect = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr));

        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            connected = connect => match connected {
                Ok(Ok(stream)) => reject_self_connect(stream, addr).map(Some),
                Ok(Err(source)) => Err(BatonError::Dial { addr, source }),
                Err(_) => Err(BatonError::Dial {
                    addr,
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                }),
            },
        }
    }

    /// Follow the leader on an established connection.
    pub async fn follow(&self, stream: TcpStream, cancel: CancellationToken) -> Result<()> {
        let leader_addr = stream.peer_addr()?;
        tracing::info!(addr = %leader_addr, "Following leader");

        let (read, write) = stream.into_split();
        let session = cancel.child_token();
        let sender = tokio::spawn(send_heartbeats(
            write,
            self.config.heartbeat_interval,
            session.clone(),
        ));

        let mut link = MonitoredLink::new(
            BufReader::new(read),
            LivenessMonitor::new(self.config.idle_timeout),
        );

        let reason = loop {
            tokio::select! {
                _ = session.cancelled() => break CloseReason::Shutdown,
                line = link.next_line() => match line {
                    Ok(line) => tracing::debug!("Leader: {}", line),
                    Err(reason) => break reason,
                }
            }
        };

        reason.log(&"Leader");
        session.cancel();

        if let Err(e) = sender.await {
            tracing::warn!("Heartbeat sender failed: {}", e);
        }

        Ok(())
    }
}

/// With no leader listening, a loopback dial from an ephemeral port equal to
/// the rendezvous port connects the socket to itself. Such a stream would
/// echo our own heartbeats forever while holding the address, so it counts
/// as a failed dial.
fn reject_self_connect(stream: TcpStream, addr: SocketAddr) -> Result<TcpStream> {
    if stream.local_addr()? == stream.peer_addr()? {
        return Err(BatonError::Dial {
            addr,
            source: std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection looped back to itself",
            ),
        });
    }
    Ok(stream)
}

/// Write a heartbeat every `interval` until the session ends.
///
/// A failed write ends the session as well.
async fn send_heartbeats(mut write: OwnedWriteHalf, interval: Duration, session: CancellationToken) {
    let start = tokio::time::Instant::now() + interval;
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = session.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = session.cancelled() => break,
            written = write.write_all(HEARTBEAT) => {
                if let Err(e) = written {
                    tracing::debug!("Heartbeat write failed: {}", e);
                    session.cancel();
                    break;
                }
            }
        }
    }

    let _ = write.shutdown().await;
}
