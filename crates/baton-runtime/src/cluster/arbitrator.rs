use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use baton_core::cluster::{PeerIdGenerator, Role, RoleState};
use baton_core::config::ClusterConfig;
use baton_core::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::follower::{FollowerClient, FollowerConfig};
use super::leader::{LeaderConfig, LeaderService};

/// One attempt at taking a role.
///
/// Implementations return when the attempt is over: immediately when the
/// role cannot be taken, or when an established role is lost or cancelled.
pub trait RoleAttempt: Send + Sync + 'static {
    fn attempt(
        &self,
        role: Role,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Role attempts over the real rendezvous address.
pub struct NetworkRoles {
    leader: LeaderService,
    follower: FollowerClient,
}

impl NetworkRoles {
    pub fn new(leader: LeaderService, follower: FollowerClient) -> Self {
        Self { leader, follower }
    }

    /// Build both sides from cluster configuration.
    pub fn from_cluster(cluster: &ClusterConfig, ids: Arc<PeerIdGenerator>) -> Result<Self> {
        Ok(Self::new(
            LeaderService::new(LeaderConfig::from_cluster(cluster)?, ids),
            FollowerClient::new(FollowerConfig::from_cluster(cluster)?),
        ))
    }

    pub fn leader(&self) -> &LeaderService {
        &self.leader
    }
}

impl RoleAttempt for NetworkRoles {
    fn attempt(
        &self,
        role: Role,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        match role {
            Role::Leader => Box::pin(self.leader.run(cancel)),
            Role::Follower => Box::pin(self.follower.run(cancel)),
        }
    }
}

/// Role arbitrator configuration.
#[derive(Debug, Clone)]
pub struct ArbitratorConfig {
    /// Constant pause after every attempt.
    pub retry_backoff: Duration,
    /// Role tried first.
    pub first_role: Role,
}

impl Default for ArbitratorConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(150),
            first_role: Role::Leader,
        }
    }
}

impl ArbitratorConfig {
    pub fn from_cluster(cluster: &ClusterConfig) -> Self {
        Self {
            retry_backoff: cluster.retry_backoff(),
            ..Default::default()
        }
    }
}

/// Alternates leader and follower attempts until cancelled.
pub struct RoleArbitrator<A> {
    attempts: A,
    config: ArbitratorConfig,
    state: watch::Sender<RoleState>,
}

impl<A: RoleAttempt> RoleArbitrator<A> {
    pub fn new(attempts: A, config: ArbitratorConfig) -> Self {
        let (state, _) = watch::channel(RoleState::Idle);
        Self {
            attempts,
            config,
            state,
        }
    }

    pub fn attempts(&self) -> &A {
        &self.attempts
    }

    /// Watch role transitions.
    pub fn subscribe(&self) -> watch::Receiver<RoleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RoleState {
        *self.state.borrow()
    }

    /// Run until `cancel` fires.
    ///
    /// The in-flight attempt receives the same token and is expected to
    /// unwind promptly; no new attempt starts once it has fired.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut role = self.config.first_role;

        while !cancel.is_cancelled() {
            self.state.send_replace(RoleState::attempting(role));

            match self.attempts.attempt(role, cancel.clone()).await {
                Ok(()) => tracing::info!(role = %role, "Role attempt ended"),
                Err(e) if e.is_expected_contention() => {
                    tracing::info!(role = %role, "Role unavailable: {}", e)
                }
                Err(e) => tracing::warn!(role = %role, "Role attempt failed: {}", e),
            }

            self.state.send_replace(RoleState::Idle);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_backoff) => {}
            }

            role = role.next();
        }

        self.state.send_replace(RoleState::Stopped);
        tracing::info!("Role arbitrator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_core::BatonError;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    /// Records every attempt and fails it the way an idle cluster would.
    struct Scripted {
        seen: mpsc::UnboundedSender<Role>,
        addr: SocketAddr,
    }

    impl RoleAttempt for Scripted {
        fn attempt(
            &self,
            role: Role,
            _cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let _ = self.seen.send(role);
            let addr = self.addr;
            Box::pin(async move {
                match role {
                    Role::Leader => Err(BatonError::BindConflict { addr }),
                    Role::Follower => Err(BatonError::Dial {
                        addr,
                        source: std::io::ErrorKind::ConnectionRefused.into(),
                    }),
                }
            })
        }
    }

    /// Holds every attempt open until cancelled.
    struct Blocking;

    impl RoleAttempt for Blocking {
        fn attempt(
            &self,
            _role: Role,
            cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                cancel.cancelled().await;
                Ok(())
            })
        }
    }

    /// Fails every attempt with an error that is not role contention.
    struct Failing {
        seen: mpsc::UnboundedSender<Role>,
    }

    impl RoleAttempt for Failing {
        fn attempt(
            &self,
            role: Role,
            _cancel: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let _ = self.seen.send(role);
            Box::pin(async {
                Err(BatonError::Cluster("peer id space exhausted".to_string()))
            })
        }
    }

    fn fast() -> ArbitratorConfig {
        ArbitratorConfig {
            retry_backoff: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_arbitrator_config_default() {
        let config = ArbitratorConfig::default();
        assert_eq!(config.retry_backoff, Duration::from_millis(150));
        assert_eq!(config.first_role, Role::Leader);
    }

    #[tokio::test]
    async fn test_alternates_starting_with_leader() {
        let (seen, mut rx) = mpsc::unbounded_channel();
        let arbitrator = Arc::new(RoleArbitrator::new(
            Scripted {
                seen,
                addr: "127.0.0.1:1".parse().unwrap(),
            },
            fast(),
        ));
        let cancel = CancellationToken::new();
        let task = {
            let arbitrator = arbitrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { arbitrator.run(cancel).await })
        };

        let mut roles = Vec::new();
        while roles.len() < 6 {
            roles.push(rx.recv().await.unwrap());
        }
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(
            roles,
            vec![
                Role::Leader,
                Role::Follower,
                Role::Leader,
                Role::Follower,
                Role::Leader,
                Role::Follower,
            ]
        );
        assert_eq!(arbitrator.state(), RoleState::Stopped);
    }

    #[tokio::test]
    async fn test_backoff_spaces_attempts() {
        let (seen, mut rx) = mpsc::unbounded_channel();
        let arbitrator = RoleArbitrator::new(
            Scripted {
                seen,
                addr: "127.0.0.1:1".parse().unwrap(),
            },
            ArbitratorConfig {
                retry_backoff: Duration::from_millis(40),
                ..Default::default()
            },
        );
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();

        let run = arbitrator.run(cancel.clone());
        let observe = async {
            for _ in 0..3 {
                rx.recv().await.unwrap();
            }
            cancel.cancel();
        };
        tokio::join!(run, observe);

        // Three attempts need at least two pauses between them.
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_cancel_stops_in_flight_attempt() {
        let arbitrator = Arc::new(RoleArbitrator::new(Blocking, fast()));
        let mut state = arbitrator.subscribe();
        let cancel = CancellationToken::new();
        let task = {
            let arbitrator = arbitrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { arbitrator.run(cancel).await })
        };

        state
            .wait_for(|s| *s == RoleState::AttemptingLeader)
            .await
            .unwrap();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(arbitrator.state(), RoleState::Stopped);
    }

    #[tokio::test]
    async fn test_unexpected_errors_keep_alternating() {
        let (seen, mut rx) = mpsc::unbounded_channel();
        let arbitrator = RoleArbitrator::new(Failing { seen }, fast());
        let cancel = CancellationToken::new();

        let run = arbitrator.run(cancel.clone());
        let observe = async {
            let mut roles = Vec::new();
            while roles.len() < 4 {
                roles.push(rx.recv().await.unwrap());
            }
            cancel.cancel();
            roles
        };
        let ((), roles) = tokio::join!(run, observe);

        assert_eq!(
            roles,
            vec![Role::Leader, Role::Follower, Role::Leader, Role::Follower]
        );
        assert_eq!(arbitrator.state(), RoleState::Stopped);
    }

    #[tokio::test]
    async fn test_pre_cancelled_makes_no_attempt() {
        let (seen, mut rx) = mpsc::unbounded_channel();
        let arbitrator = RoleArbitrator::new(
            Scripted {
                seen,
                addr: "127.0.0.1:1".parse().unwrap(),
            },
            fast(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        arbitrator.run(cancel).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(arbitrator.state(), RoleState::Stopped);
    }
}
