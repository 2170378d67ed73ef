use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BatonError, Result};

/// Rendezvous and timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Rendezvous address; whoever binds it is leader.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Silence tolerated on a connection before it is declared dead.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// Heartbeat period (defaults to half the idle timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,

    /// Pause between role attempts.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Dial timeout for followers (defaults to the idle timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    /// Capacity of the leader's peer event queue.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Heartbeats buffered per peer before new ones are dropped.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            idle_timeout_ms: default_idle_timeout(),
            heartbeat_interval_ms: None,
            retry_backoff_ms: default_retry_backoff(),
            connect_timeout_ms: None,
            event_queue_capacity: default_event_queue_capacity(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

impl ClusterConfig {
    /// Parsed rendezvous address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind_addr.parse().map_err(|e| {
            BatonError::Config(format!("Invalid bind_addr '{}': {}", self.bind_addr, e))
        })
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        match self.heartbeat_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.idle_timeout() / 2,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        match self.connect_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.idle_timeout(),
        }
    }

    /// Check the timing relationships the liveness protocol relies on.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if self.idle_timeout_ms == 0 {
            return Err(BatonError::Config(
                "idle_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let heartbeat = self.heartbeat_interval();
        if heartbeat.is_zero() {
            return Err(BatonError::Config(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if heartbeat >= self.idle_timeout() {
            return Err(BatonError::Config(format!(
                "heartbeat interval ({:?}) must be shorter than the idle timeout ({:?})",
                heartbeat,
                self.idle_timeout()
            )));
        }

        if self.connect_timeout().is_zero() {
            return Err(BatonError::Config(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.event_queue_capacity == 0 || self.outbound_queue_capacity == 0 {
            return Err(BatonError::Config(
                "queue capacities must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:47912".to_string()
}

fn default_idle_timeout() -> u64 {
    5000
}

fn default_retry_backoff() -> u64 {
    150
}

fn default_event_queue_capacity() -> usize {
    1024
}

fn default_outbound_queue_capacity() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cluster_config() {
        let config = ClusterConfig::default();
        assert_eq!(config.bind_addr().unwrap(), "127.0.0.1:47912".parse().unwrap());
        assert_eq!(config.idle_timeout(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(2500));
        assert_eq!(config.retry_backoff(), Duration::from_millis(150));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_cluster_config() {
        let toml = r#"
            bind_addr = "127.0.0.1:9000"
            idle_timeout_ms = 1000
            heartbeat_interval_ms = 200
        "#;

        let config: ClusterConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.bind_addr().unwrap().port(), 9000);
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(200));
        assert_eq!(config.retry_backoff_ms, 150);
    }

    #[test]
    fn test_heartbeat_must_be_shorter_than_idle_timeout() {
        let config = ClusterConfig {
            idle_timeout_ms: 1000,
            heartbeat_interval_ms: Some(1000),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_values() {
        let zero_idle = ClusterConfig {
            idle_timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero_idle.validate().is_err());

        let zero_queue = ClusterConfig {
            event_queue_capacity: 0,
            ..Default::default()
        };
        assert!(zero_queue.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_address() {
        let config = ClusterConfig {
            bind_addr: "localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BatonError::Config(_))));
    }
}
