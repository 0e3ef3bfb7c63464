//! Polled timers and the transmit lock

use crate::time::{Duration, Instant};

/// One-shot or periodic software timer
///
/// The owner polls the timer with the current time. A periodic timer re-arms itself on expiry;
/// missed periods are skipped rather than replayed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timer {
    deadline: Option<Instant>,
    period: Option<Duration>,
}

impl Timer {
    pub const fn new() -> Self {
        Self {
            deadline: None,
            period: None,
        }
    }

    /// Arms the timer to expire after `delay`, then every `period` if given.
    pub fn set(&mut self, now: Instant, delay: Duration, period: Option<Duration>) {
        self.deadline = Some(now + delay);
        self.period = period.filter(|p| *p > Duration::from_ticks(0));
    }

    pub fn clear(&mut self) {
        self.deadline = None;
        self.period = None;
    }

    pub fn is_in_use(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once per expiry.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = self.period.map(|period| {
                    let next = deadline + period;
                    if next <= now {
                        now + period
                    } else {
                        next
                    }
                });
                if self.deadline.is_none() {
                    self.period = None;
                }
                true
            }
            _ => false,
        }
    }
}

/// Exclusive lock with a release deadline
///
/// Guards a send-and-await-response exchange. If the holder does not release the lock in time,
/// [`TimedLock::poll_timeout`] frees it and reports the timeout once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimedLock {
    timeout: Duration,
    expires_at: Option<Instant>,
}

impl TimedLock {
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            expires_at: None,
        }
    }

    /// Takes the lock. Returns false if it is already held.
    pub fn try_lock(&mut self, now: Instant) -> bool {
        if self.expires_at.is_some() {
            return false;
        }
        self.expires_at = Some(now + self.timeout);
        true
    }

    pub fn release(&mut self) {
        self.expires_at = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Releases an expired lock. Returns true if the lock timed out.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires_at) if expires_at <= now => {
                self.expires_at = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_one_shot() {
        let mut timer = Timer::new();
        assert!(!timer.is_in_use());
        timer.set(at(0), Duration::from_millis(200), None);
        assert!(timer.is_in_use());
        assert!(!timer.poll(at(199)));
        assert!(timer.poll(at(200)));
        assert!(!timer.is_in_use());
        assert!(!timer.poll(at(400)));
    }

    #[test]
    fn test_periodic() {
        let mut timer = Timer::new();
        let period = Duration::from_millis(1000);
        timer.set(at(0), period, Some(period));
        assert!(timer.poll(at(1000)));
        assert_eq!(timer.deadline(), Some(at(2000)));
        assert!(!timer.poll(at(1500)));
        assert!(timer.poll(at(2100)));
        assert_eq!(timer.deadline(), Some(at(3000)));
    }

    #[test]
    fn test_periodic_skips_missed() {
        let mut timer = Timer::new();
        let period = Duration::from_millis(1000);
        timer.set(at(0), period, Some(period));
        assert!(timer.poll(at(5500)));
        assert_eq!(timer.deadline(), Some(at(6500)));
        assert!(!timer.poll(at(5500)));
    }

    #[test]
    fn test_clear() {
        let mut timer = Timer::new();
        let period = Duration::from_millis(1000);
        timer.set(at(0), period, Some(period));
        timer.clear();
        assert!(!timer.is_in_use());
        assert!(!timer.poll(at(1000)));
    }

    #[test]
    fn test_lock_exclusive() {
        let mut lock = TimedLock::new(Duration::from_millis(100));
        assert!(lock.try_lock(at(0)));
        assert!(!lock.try_lock(at(10)));
        lock.release();
        assert!(lock.try_lock(at(20)));
        assert_eq!(lock.deadline(), Some(at(120)));
    }

    #[test]
    fn test_lock_timeout() {
        let mut lock = TimedLock::new(Duration::from_millis(100));
        assert!(lock.try_lock(at(0)));
        assert!(!lock.poll_timeout(at(99)));
        assert!(lock.poll_timeout(at(100)));
        assert_eq!(lock.deadline(), None);
        assert!(!lock.poll_timeout(at(200)));
    }
}
