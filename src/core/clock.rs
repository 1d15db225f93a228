use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic time source for durations and deadlines. Injectable for tests.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;

    fn elapsed_millis(&self, since: u64) -> u64 {
        self.now_millis().saturating_sub(since)
    }
}

/// Opaque id source for runs and node executions.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

// --- Real implementations ---

pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// --- Fake implementations ---

pub struct FakeClock {
    millis: AtomicU64,
}

impl FakeClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_clock_advances() {
        let clock = FakeClock::new(1000);
        assert_eq!(clock.now_millis(), 1000);
        clock.advance(250);
        assert_eq!(clock.now_millis(), 1250);
        assert_eq!(clock.elapsed_millis(1000), 250);
    }

    #[test]
    fn test_elapsed_never_underflows() {
        let clock = FakeClock::new(10);
        assert_eq!(clock.elapsed_millis(500), 0);
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdGenerator::new("run");
        assert_eq!(ids.next_id(), "run-0");
        assert_eq!(ids.next_id(), "run-1");
    }

    #[test]
    fn test_uuid_ids_unique() {
        let ids = UuidGenerator;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
