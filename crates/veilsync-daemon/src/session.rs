//! Per-address contact statistics for the current daemon run.
//!
//! Kept in memory only and owned by the [`Communicator`]. A burst of
//! failures from one address gates further contact for a while but never
//! touches the persisted reliability or trust data; the counts are folded
//! into the address directory once, at shutdown.
//!
//! [`Communicator`]: crate::Communicator

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;
use veilsync_shared::PeerAddress;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub connect_count: u32,
    /// Every failure this session. Persisted at shutdown.
    pub fail_count: u32,
    /// Failures still counted against the address; lowered by decay.
    pub recent_failures: u32,
    pub last_connect: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    sessions: HashMap<PeerAddress, SessionStats>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, address: &PeerAddress) {
        let stats = self.sessions.entry(address.clone()).or_default();
        stats.connect_count += 1;
        stats.last_connect = Some(Instant::now());
    }

    pub fn record_failure(&mut self, address: &PeerAddress) {
        let stats = self.sessions.entry(address.clone()).or_default();
        stats.fail_count += 1;
        stats.recent_failures += 1;
        debug!(address = %address, failures = stats.recent_failures, "Contact failed");
    }

    pub fn get(&self, address: &PeerAddress) -> Option<&SessionStats> {
        self.sessions.get(address)
    }

    /// Whether `address` has reached `ceiling` failures this session.
    pub fn is_high_failure(&self, address: &PeerAddress, ceiling: u32) -> bool {
        self.sessions
            .get(address)
            .is_some_and(|stats| stats.recent_failures >= ceiling)
    }

    /// Lower every recent-failure counter at or above `ceiling` by one.
    /// Returns how many addresses were decayed. Totals are left intact.
    pub fn decay(&mut self, ceiling: u32) -> usize {
        let mut decayed = 0;
        for (address, stats) in &mut self.sessions {
            if stats.recent_failures >= ceiling && stats.recent_failures > 0 {
                stats.recent_failures -= 1;
                decayed += 1;
                debug!(address = %address, failures = stats.recent_failures, "Decayed failure count");
            }
        }
        decayed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Take every session, leaving the tracker empty.
    pub fn drain(&mut self) -> Vec<(PeerAddress, SessionStats)> {
        self.sessions.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_address(c: char) -> PeerAddress {
        PeerAddress::parse(&format!("{}.onion", c.to_string().repeat(56))).unwrap()
    }

    #[test]
    fn test_success_and_failure() {
        let mut tracker = SessionTracker::new();
        let addr = test_address('a');
        assert!(tracker.get(&addr).is_none());

        tracker.record_success(&addr);
        tracker.record_failure(&addr);
        tracker.record_success(&addr);

        let stats = tracker.get(&addr).unwrap();
        assert_eq!(stats.connect_count, 2);
        assert_eq!(stats.fail_count, 1);
        assert!(stats.last_connect.is_some());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_high_failure_and_decay() {
        let mut tracker = SessionTracker::new();
        let bad = test_address('b');
        let flaky = test_address('c');

        for _ in 0..3 {
            tracker.record_failure(&bad);
        }
        tracker.record_failure(&flaky);

        assert!(tracker.is_high_failure(&bad, 3));
        assert!(!tracker.is_high_failure(&flaky, 3));
        assert!(!tracker.is_high_failure(&test_address('d'), 3));

        assert_eq!(tracker.decay(3), 1);
        assert!(!tracker.is_high_failure(&bad, 3));
        let stats = tracker.get(&bad).unwrap();
        assert_eq!((stats.recent_failures, stats.fail_count), (2, 3));
        assert_eq!(tracker.get(&flaky).unwrap().recent_failures, 1);
    }

    #[test]
    fn test_drain() {
        let mut tracker = SessionTracker::new();
        tracker.record_success(&test_address('e'));
        tracker.record_failure(&test_address('f'));

        let drained = tracker.drain();
        assert_eq!(drained.len(), 2);
        assert!(tracker.is_empty());
    }
}
