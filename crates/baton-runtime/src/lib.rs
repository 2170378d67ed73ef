//! Runtime for baton: the rendezvous leader service, the follower client,
//! the role arbitrator that alternates between them, and shutdown
//! coordination.

pub mod cluster;

pub use cluster::{
    ArbitratorConfig, FollowerClient, LeaderService, NetworkRoles, RoleArbitrator,
    ShutdownCoordinator, ShutdownReport,
};
