//! Periodic task bookkeeping for the cooperative network loop

use embassy_time::{Duration, Instant};

/// A task run at a fixed period, never overlapping itself.
///
/// The next run is scheduled from the completion instant, so a slow request
/// delays the following one instead of causing a burst.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTask {
    period: Duration,
    next_due: Instant,
    in_flight: bool,
    runs: u32,
}

impl PeriodicTask {
    /// First run is due immediately
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: Instant::from_ticks(0),
            in_flight: false,
            runs: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.in_flight && now >= self.next_due
    }

    /// Mark the task started if it is due and idle
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.in_flight = true;
        self.runs = self.runs.wrapping_add(1);
        true
    }

    /// Mark the task finished at `now`
    pub fn finish(&mut self, now: Instant) {
        self.in_flight = false;
        self.next_due = now + self.period;
    }

    /// Time left until the task is due, zero if overdue
    pub fn remaining(&self, now: Instant) -> Duration {
        if now >= self.next_due {
            Duration::from_ticks(0)
        } else {
            self.next_due - now
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
    fn test_first_run_immediate() {
        let mut task = PeriodicTask::new(Duration::from_millis(1000));
        assert!(task.try_begin(at(0)));
        assert!(task.in_flight());
    }

    #[test]
    fn test_never_overlaps() {
        let mut task = PeriodicTask::new(Duration::from_millis(200));
        assert!(task.try_begin(at(0)));
        // Still outstanding long after the period
        assert!(!task.try_begin(at(5_000)));
        task.finish(at(5_000));
        assert!(!task.try_begin(at(5_100)));
        assert!(task.try_begin(at(5_200)));
        assert_eq!(task.runs(), 2);
    }

    #[test]
    fn test_next_due_from_completion() {
        let mut task = PeriodicTask::new(Duration::from_millis(1000));
        task.try_begin(at(0));
        task.finish(at(2_500));
        assert_eq!(task.next_due(), at(3_500));
        assert_eq!(task.remaining(at(3_000)), Duration::from_millis(500));
        assert_eq!(task.remaining(at(4_000)), Duration::from_ticks(0));
    }
}
