/// Role a process is attempting to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Bind the rendezvous address and serve followers.
    Leader,
    /// Dial the rendezvous address and follow the leader.
    Follower,
}

impl Role {
    /// The role attempted after this one.
    pub fn next(self) -> Self {
        match self {
            Self::Leader => Self::Follower,
            Self::Follower => Self::Leader,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leader => "leader",
            Self::Follower => "follower",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable state of the role arbitrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    /// Not started, or pausing between attempts.
    Idle,
    /// Running a leader attempt.
    AttemptingLeader,
    /// Running a follower attempt.
    AttemptingFollower,
    /// Cancelled; no further attempts.
    Stopped,
}

impl RoleState {
    /// State entered while attempting `role`.
    pub fn attempting(role: Role) -> Self {
        match role {
            Role::Leader => Self::AttemptingLeader,
            Role::Follower => Self::AttemptingFollower,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AttemptingLeader => "attempting_leader",
            Self::AttemptingFollower => "attempting_follower",
            Self::Stopped => "stopped",
        }
    }
}
