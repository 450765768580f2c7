//! Retry cooldown after failed deliveries.
//!
//! # State Machine
//!
//! ```text
//! Ready --[failure]--> CoolingDown(delay)        delay starts at floor
//! CoolingDown --[failure]--> CoolingDown(2×delay) capped at ceiling
//! CoolingDown --[delay elapsed]--> Ready          delay kept
//! CoolingDown --[link restored]--> Ready         delay kept
//! any --[success]--> Ready                        delay reset to floor
//! ```

use std::time::Duration;

use tokio::time::Instant;

/// Default shortest cooldown after a failure.
pub const DEFAULT_COOLDOWN_FLOOR: Duration = Duration::from_secs(5);

/// Default longest cooldown after repeated failures.
pub const DEFAULT_COOLDOWN_CEILING: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct RetryCooldown {
    floor: Duration,
    ceiling: Duration,
    next_delay: Duration,
    until: Option<Instant>,
    consecutive_failures: u32,
}

impl RetryCooldown {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            next_delay: floor,
            until: None,
            consecutive_failures: 0,
        }
    }

    /// Whether deliveries must wait at `now`.
    pub fn is_active(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Time left at `now`, if cooling down.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Starts a cooldown and returns its length.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        let delay = self.next_delay;
        // An unrepresentable deadline means waiting indefinitely
        self.until = Some(now.checked_add(delay).unwrap_or_else(|| far_future(now)));
        self.next_delay = delay.saturating_mul(2).min(self.ceiling);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        delay
    }

    /// Ends the current wait early, keeping the delay progression.
    pub fn release(&mut self) {
        self.until = None;
    }

    pub fn record_success(&mut self) {
        self.next_delay = self.floor;
        self.until = None;
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Length of the cooldown the next failure would start.
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }
}

/// Roughly 30 years past `now`, as far as `Instant` allows.
fn far_future(now: Instant) -> Instant {
    let mut span = Duration::from_secs(86_400 * 365 * 30);
    loop {
        match now.checked_add(span) {
            Some(at) => return at,
            None if span.is_zero() => return now,
            None => span /= 2,
        }
    }
}

impl Default for RetryCooldown {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_FLOOR, DEFAULT_COOLDOWN_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_ready() {
        let cooldown = RetryCooldown::default();
        assert!(!cooldown.is_active(Instant::now()));
        assert_eq!(cooldown.remaining(Instant::now()), None);
    }

    #[test]
    fn test_doubles_up_to_ceiling() {
        let mut cooldown = RetryCooldown::new(Duration::from_secs(5), Duration::from_secs(30));
        let now = Instant::now();
        let delays: Vec<_> = (0..5).map(|_| cooldown.record_failure(now)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30),
                Duration::from_secs(30),
            ]
        );
        assert_eq!(cooldown.consecutive_failures(), 5);
    }

    #[test]
    fn test_huge_delays_saturate_instead_of_overflowing() {
        let mut cooldown = RetryCooldown::new(Duration::MAX, Duration::MAX);
        let now = Instant::now();

        assert_eq!(cooldown.record_failure(now), Duration::MAX);
        assert_eq!(cooldown.next_delay(), Duration::MAX);
        assert!(cooldown.is_active(now + Duration::from_secs(86_400 * 365)));

        cooldown.record_success();
        assert!(!cooldown.is_active(now));
    }

    #[test]
    fn test_active_until_delay_elapses() {
        let mut cooldown = RetryCooldown::new(Duration::from_secs(5), Duration::from_secs(30));
        let now = Instant::now();
        cooldown.record_failure(now);

        assert!(cooldown.is_active(now + Duration::from_secs(4)));
        assert_eq!(
            cooldown.remaining(now + Duration::from_secs(4)),
            Some(Duration::from_secs(1))
        );
        assert!(!cooldown.is_active(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_success_resets_to_floor() {
        let mut cooldown = RetryCooldown::new(Duration::from_secs(5), Duration::from_secs(30));
        let now = Instant::now();
        cooldown.record_failure(now);
        cooldown.record_failure(now);
        cooldown.record_success();

        assert!(!cooldown.is_active(now));
        assert_eq!(cooldown.next_delay(), Duration::from_secs(5));
        assert_eq!(cooldown.consecutive_failures(), 0);
    }

    #[test]
    fn test_release_keeps_progression() {
        let mut cooldown = RetryCooldown::new(Duration::from_secs(5), Duration::from_secs(30));
        let now = Instant::now();
        cooldown.record_failure(now);
        cooldown.release();

        assert!(!cooldown.is_active(now));
        assert_eq!(cooldown.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_ceiling_below_floor_is_raised() {
        let mut cooldown = RetryCooldown::new(Duration::from_secs(10), Duration::from_secs(1));
        let now = Instant::now();
        assert_eq!(cooldown.record_failure(now), Duration::from_secs(10));
        assert_eq!(cooldown.record_failure(now), Duration::from_secs(10));
    }
}
