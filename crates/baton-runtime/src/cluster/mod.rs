mod arbitrator;
mod follower;
mod leader;
mod liveness;
mod registry;
mod shutdown;

pub use arbitrator::{ArbitratorConfig, NetworkRoles, RoleArbitrator, RoleAttempt};
pub use follower::{FollowerClient, FollowerConfig};
pub use leader::{LeaderConfig, LeaderService};
pub use liveness::{CloseReason, LinkState, LivenessMonitor, MonitoredLink};
pub use registry::{BroadcastReport, Frame, PeerEvent, PeerHandle, PeerRegistry, RegistryActor};
pub use shutdown::{ShutdownConfig, ShutdownCoordinator, ShutdownReport};
