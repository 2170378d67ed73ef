use std::future::Future;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Graceful shutdown configuration.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time allowed for components to unwind once shutdown starts.
    pub deadline: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(2),
        }
    }
}

/// How a shutdown ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReport {
    /// Every component finished on its own before any signal.
    Finished,
    /// Every component unwound within the deadline.
    Completed,
    /// The deadline elapsed; these components were still running and have
    /// been aborted.
    TimedOut { stuck: Vec<String> },
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        !matches!(self, Self::TimedOut { .. })
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }
}

type Joined = (usize, Result<(), JoinError>);

/// A component that has not finished yet. Names need not be unique.
struct Running {
    key: usize,
    name: String,
    abort: AbortHandle,
}

/// Owns the root cancellation token and the long-running components that
/// observe it.
pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    token: CancellationToken,
    components: JoinSet<Joined>,
    running: Vec<Running>,
    next_key: usize,
}

impl ShutdownCoordinator {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            token: CancellationToken::new(),
            components: JoinSet::new(),
            running: Vec::new(),
            next_key: 0,
        }
    }

    /// Token every component must observe.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start a named component.
    pub fn spawn<F>(&mut self, name: impl Into<String>, component: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = self.next_key;
        self.next_key += 1;

        let handle = tokio::spawn(component);
        self.running.push(Running {
            key,
            name: name.into(),
            abort: handle.abort_handle(),
        });
        self.components.spawn(async move { (key, handle.await) });
    }

    /// Names of components that have not finished yet.
    pub fn running(&self) -> Vec<String> {
        self.running.iter().map(|r| r.name.clone()).collect()
    }

    /// Wait for `signal`, then shut down.
    ///
    /// Returns [`ShutdownReport::Finished`] without waiting for the signal
    /// when every component ends on its own.
    pub async fn run_until<S>(mut self, signal: S) -> ShutdownReport
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
                _ = self.token.cancelled() => {
                    tracing::info!("Received shutdown notification");
                    break;
                }
                joined = self.components.join_next() => match joined {
                    Some(joined) => self.reap(joined),
                    None => return ShutdownReport::Finished,
                },
            }
        }

        self.shutdown().await
    }

    /// Cancel every component and wait up to the deadline for them to end.
    pub async fn shutdown(mut self) -> ShutdownReport {
        tracing::info!("Starting graceful shutdown");
        self.token.cancel();

        let deadline = tokio::time::sleep(self.config.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                joined = self.components.join_next() => match joined {
                    Some(joined) => self.reap(joined),
                    None => break,
                },
            }
        }

        if self.running.is_empty() {
            tracing::info!("Graceful shutdown complete");
            return ShutdownReport::Completed;
        }

        let stuck = self.running();
        tracing::error!(
            components = ?stuck,
            deadline = ?self.config.deadline,
            "Shutdown deadline elapsed before components unwound"
        );
        for running in &self.running {
            running.abort.abort();
        }
        ShutdownReport::TimedOut { stuck }
    }

    fn reap(&mut self, joined: Result<Joined, JoinError>) {
        let (key, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!("Component watcher failed: {}", e);
                return;
            }
        };

        let Some(index) = self.running.iter().position(|r| r.key == key) else {
            return;
        };
        let finished = self.running.remove(index);

        match outcome {
            Ok(()) => tracing::debug!(component = %finished.name, "Component stopped"),
            Err(e) => tracing::warn!(component = %finished.name, "Component failed: {}", e),
        }
    }
}
