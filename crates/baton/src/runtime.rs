//! Process runtime: one role arbitrator under a shutdown coordinator.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use baton_core::cluster::PeerIdGenerator;
use baton_core::config::BatonConfig;
use baton_core::error::{BatonError, Result};
use baton_runtime::cluster::{
    ArbitratorConfig, NetworkRoles, RoleArbitrator, ShutdownConfig, ShutdownCoordinator,
    ShutdownReport,
};

/// A configured baton process.
pub struct Baton {
    config: BatonConfig,
    ids: Arc<PeerIdGenerator>,
    shutdown: CancellationToken,
}

impl Baton {
    /// Create a new builder for configuring baton.
    pub fn builder() -> BatonBuilder {
        BatonBuilder::new()
    }

    /// Get the configuration.
    pub fn config(&self) -> &BatonConfig {
        &self.config
    }

    /// Token that stops [`Baton::run`] when cancelled, as a signal would.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<ShutdownReport> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` completes or the shutdown token is cancelled.
    pub async fn run_until<S>(self, signal: S) -> Result<ShutdownReport>
    where
        S: Future<Output = ()>,
    {
        let cluster = &self.config.cluster;
        let roles = NetworkRoles::from_cluster(cluster, self.ids.clone())?;
        let arbitrator = RoleArbitrator::new(roles, ArbitratorConfig::from_cluster(cluster));

        let mut coordinator = ShutdownCoordinator::new(ShutdownConfig {
            deadline: self.config.shutdown.deadline(),
        });
        let token = coordinator.token();
        coordinator.spawn("arbitrator", async move { arbitrator.run(token).await });

        tracing::info!(
            addr = %cluster.bind_addr,
            idle_timeout = ?cluster.idle_timeout(),
            heartbeat_interval = ?cluster.heartbeat_interval(),
            "baton started"
        );

        let requested = self.shutdown.clone();
        let report = coordinator
            .run_until(async move {
                tokio::select! {
                    _ = signal => {}
                    _ = requested.cancelled() => {}
                }
            })
            .await;

        tracing::info!(clean = report.is_clean(), "baton stopped");
        Ok(report)
    }
}

/// Builder for configuring the baton runtime.
pub struct BatonBuilder {
    config: Option<BatonConfig>,
    ids: Option<Arc<PeerIdGenerator>>,
}

impl BatonBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            ids: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: BatonConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share a peer id source instead of starting a fresh one.
    pub fn peer_ids(mut self, ids: Arc<PeerIdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validate the configuration and build the runtime.
    pub fn build(self) -> Result<Baton> {
        let config = self
            .config
            .ok_or_else(|| BatonError::Config("Configuration is required".to_string()))?;
        config.validate()?;

        Ok(Baton {
            config,
            ids: self.ids.unwrap_or_default(),
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for BatonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where supported.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
