use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BatonError, Result};

/// Identity of one accepted follower connection.
///
/// Ids are issued by a [`PeerIdGenerator`] and are strictly increasing in
/// acceptance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u32);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Peer({})", self.0)
    }
}

/// Issues peer ids.
///
/// One generator is shared by every leader attempt of a process so ids stay
/// unique for the lifetime of the process, not just of one leadership term.
/// Ids never wrap: once `u32::MAX` has been issued the generator is
/// exhausted and every further call fails.
#[derive(Debug)]
pub struct PeerIdGenerator {
    next: AtomicU64,
}

impl PeerIdGenerator {
    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a generator whose first id is `first`.
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU64::new(u64::from(first)),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> Result<PeerId> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next <= u64::from(u32::MAX)).then_some(next + 1)
            })
            .ok()
            .and_then(|issued| u32::try_from(issued).ok())
            .map(PeerId)
            .ok_or_else(|| BatonError::Cluster("peer id space exhausted".to_string()))
    }
}

impl Default for PeerIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ids_start_at_one() {
        let ids = PeerIdGenerator::new();
        assert_eq!(ids.next_id().unwrap(), PeerId(1));
        assert_eq!(ids.next_id().unwrap(), PeerId(2));
    }

    #[test]
    fn test_starting_at() {
        let ids = PeerIdGenerator::starting_at(100);
        assert_eq!(ids.next_id().unwrap(), PeerId(100));
        assert_eq!(ids.next_id().unwrap(), PeerId(101));
    }

    #[test]
    fn test_starting_at_zero_issues_zero() {
        let ids = PeerIdGenerator::starting_at(0);
        assert_eq!(ids.next_id().unwrap(), PeerId(0));
        assert_eq!(ids.next_id().unwrap(), PeerId(1));
    }

    #[test]
    fn test_exhausted_generator_never_repeats() {
        let ids = PeerIdGenerator::starting_at(u32::MAX - 1);
        assert_eq!(ids.next_id().unwrap(), PeerId(u32::MAX - 1));
        assert_eq!(ids.next_id().unwrap(), PeerId(u32::MAX));

        for _ in 0..3 {
            let err = ids.next_id().unwrap_err();
            assert!(matches!(err, BatonError::Cluster(_)));
        }
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let ids = Arc::new(PeerIdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.next_id().unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<PeerId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(all.first(), Some(&PeerId(1)));
        assert_eq!(all.last(), Some(&PeerId(800)));
    }

    #[test]
    fn test_display() {
        assert_eq!(PeerId(7).to_string(), "Peer(7)");
    }
}
