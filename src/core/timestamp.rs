use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Logical time attached to every message, tagged with the clock that produced it.
///
/// Ordering is total: the logical clock first, then the producer UUID bytes so that
/// two producers emitting the same logical value always compare the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    logical_clock: u64,
    producer_id: Uuid,
}

impl Timestamp {
    pub fn new(logical_clock: u64, producer_id: Uuid) -> Self {
        Self {
            logical_clock,
            producer_id,
        }
    }

    pub fn logical_clock(&self) -> u64 {
        self.logical_clock
    }

    pub fn producer_id(&self) -> Uuid {
        self.producer_id
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.logical_clock.cmp(&other.logical_clock) {
            Ordering::Equal => self.producer_id.as_bytes().cmp(other.producer_id.as_bytes()),
            other => other,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.logical_clock, self.producer_id)
    }
}

/// Hybrid logical clock shared by the nodes of one runtime.
///
/// Values are nanoseconds since the Unix epoch, bumped so that they strictly
/// increase and never fall behind a timestamp observed on an incoming message.
/// Once the clock reaches `u64::MAX` it stays there.
#[derive(Debug)]
pub struct HybridClock {
    id: Uuid,
    last: AtomicU64,
}

impl HybridClock {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            last: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn new_timestamp(&self) -> Timestamp {
        let now = physical_now_ns();
        let mut last = self.last.load(AtomicOrdering::Acquire);
        loop {
            let next = now.max(last.saturating_add(1));
            match self.last.compare_exchange_weak(
                last,
                next,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            ) {
                Ok(_) => return Timestamp::new(next, self.id),
                Err(current) => last = current,
            }
        }
    }

    /// Stamp with a caller-provided logical value. The clock still advances past it.
    pub fn timestamp_at(&self, logical_clock: u64) -> Timestamp {
        self.last.fetch_max(logical_clock, AtomicOrdering::AcqRel);
        Timestamp::new(logical_clock, self.id)
    }

    /// Merge a remote timestamp so local time never runs behind it.
    pub fn update_with_timestamp(&self, ts: &Timestamp) {
        self.last.fetch_max(ts.logical_clock(), AtomicOrdering::AcqRel);
    }

    /// Current logical reading without producing a new timestamp.
    pub fn now(&self) -> u64 {
        physical_now_ns().max(self.last.load(AtomicOrdering::Acquire))
    }
}

impl Default for HybridClock {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

fn physical_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_breaks_ties_on_producer() {
        let a = Uuid::from_bytes([1; 16]);
        let b = Uuid::from_bytes([2; 16]);

        assert!(Timestamp::new(5, b) < Timestamp::new(6, a));
        assert!(Timestamp::new(5, a) < Timestamp::new(5, b));
        assert_eq!(
            Timestamp::new(5, a).cmp(&Timestamp::new(5, a)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_clock_is_strictly_increasing() {
        let clock = HybridClock::default();
        let mut previous = clock.new_timestamp();
        for _ in 0..1000 {
            let next = clock.new_timestamp();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_clock_merges_remote_time() {
        let clock = HybridClock::default();
        let far_future = Timestamp::new(u64::MAX / 2, Uuid::new_v4());
        clock.update_with_timestamp(&far_future);
        assert!(clock.new_timestamp().logical_clock() > far_future.logical_clock());
    }

    #[test]
    fn test_clock_saturates_at_max() {
        let clock = HybridClock::default();
        clock.update_with_timestamp(&Timestamp::new(u64::MAX, Uuid::nil()));

        let first = clock.new_timestamp();
        let second = clock.new_timestamp();
        assert_eq!(first.logical_clock(), u64::MAX);
        assert_eq!(second.logical_clock(), u64::MAX);
        assert!(clock.now() >= first.logical_clock());

        let stamped = HybridClock::default();
        stamped.timestamp_at(u64::MAX);
        assert_eq!(stamped.new_timestamp().logical_clock(), u64::MAX);
    }
}
