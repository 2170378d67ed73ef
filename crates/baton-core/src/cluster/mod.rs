mod peer;
mod roles;

pub use peer::{PeerId, PeerIdGenerator};
pub use roles::{Role, RoleState};
