use std::time::Duration;

/// Exponential backoff schedule: starts at `initial`, doubles per step,
/// never exceeds `cap`
///
/// Pure value type so upload retries and the poll loop share one schedule
/// and tests can assert it without sleeping.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    next: Duration,
    cap: Duration,
}

impl Backoff {
    pub(crate) const fn new(initial: Duration, cap: Duration) -> Self {
        Self { next: initial, cap }
    }

    /// The delay to wait before the next attempt; advances the schedule
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.next.min(self.cap);
        self.next = self.next.saturating_mul(2);
        delay
    }
}
