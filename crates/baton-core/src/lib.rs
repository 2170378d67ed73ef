//! Shared types for baton: configuration, errors, peer identity, roles and
//! the line protocol.

pub mod cluster;
pub mod config;
pub mod error;
pub mod protocol;

pub use cluster::{PeerId, PeerIdGenerator, Role, RoleState};
pub use config::BatonConfig;
pub use error::{BatonError, Result};
