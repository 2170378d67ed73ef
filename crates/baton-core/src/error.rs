use std::net::SocketAddr;

use thiserror::Error;

/// Core error type for baton operations.
#[derive(Error, Debug)]
pub enum BatonError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another process already holds the rendezvous address.
    #[error("Rendezvous address {addr} is already bound by another process")]
    BindConflict { addr: SocketAddr },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// No leader is reachable on the rendezvous address.
    #[error("Failed to dial leader at {addr}: {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cluster error: {0}")]
    Cluster(String),
}

impl BatonError {
    /// Classify a bind failure: `AddrInUse` means someone else is leader.
    pub fn from_bind(addr: SocketAddr, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::AddrInUse {
            Self::BindConflict { addr }
        } else {
            Self::Bind { addr, source }
        }
    }

    pub fn is_bind_conflict(&self) -> bool {
        matches!(self, Self::BindConflict { .. })
    }

    pub fn is_dial_failure(&self) -> bool {
        matches!(self, Self::Dial { .. })
    }

    /// Errors that are part of normal role contention and carry no fault.
    pub fn is_expected_contention(&self) -> bool {
        self.is_bind_conflict() || self.is_dial_failure()
    }
}

impl From<toml::de::Error> for BatonError {
    fn from(e: toml::de::Error) -> Self {
        BatonError::Config(format!("Failed to parse config: {}", e))
    }
}

/// Result type alias using BatonError.
pub type Result<T> = std::result::Result<T, BatonError>;
