use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Period at which the host is expected to call `tick`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Converts wall time into a count of samples that are due.
///
/// Due counts are measured against the virtual timeline since the start of
/// the acquisition, so the total never depends on how the time was sliced
/// into ticks.
#[derive(Debug, Clone)]
pub struct Pacer {
    samplerate: u64,
    started: Instant,
    last: Instant,
    accounted: u64,
    not_sent: u64,
}

impl Pacer {
    pub fn new(samplerate: u64, now: Instant) -> Self {
        Self {
            samplerate,
            started: now,
            last: now,
            accounted: 0,
            not_sent: 0,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Sub-quantum remainder carried to the next tick.
    pub fn not_sent(&self) -> u64 {
        self.not_sent
    }

    /// Samples that became due since the previous call (ceiling).
    pub fn due_samples(&mut self, now: Instant) -> u64 {
        let since_last = now.saturating_duration_since(self.last);
        self.last = now.max(self.last);

        let elapsed = self.last.duration_since(self.started).as_nanos();
        let total = (elapsed * u128::from(self.samplerate)).div_ceil(1_000_000_000);
        let total = u64::try_from(total).unwrap_or(u64::MAX);
        let due = total.saturating_sub(self.accounted);
        self.accounted = total;

        log::trace!("{due} samples due after {since_last:?}");
        due
    }

    /// Round a due count down to whole quanta, carrying the remainder.
    ///
    /// Returns zero while less than one quantum is pending. Otherwise the
    /// carry is always below one quantum. Once at least a quantum is pending
    /// and it covers the whole `remaining` budget, exactly that budget is
    /// released even when it is not a multiple of the quantum.
    pub fn quantize(&mut self, due: u64, quantum: u64, remaining: u64) -> u64 {
        let pending = due + self.not_sent;
        if pending < quantum {
            self.not_sent = pending;
            return 0;
        }
        self.not_sent = pending % quantum;
        if remaining > 0 && pending >= remaining {
            return remaining;
        }
        pending - self.not_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let before = clock.now();
        other.advance(Duration::from_millis(5));
        assert_eq!(clock.now() - before, Duration::from_millis(5));
    }

    #[test]
    fn test_due_samples_exact_rate() {
        let clock = ManualClock::new();
        let mut pacer = Pacer::new(10_000, clock.now());
        clock.advance(POLL_INTERVAL);
        assert_eq!(pacer.due_samples(clock.now()), 500);
        clock.advance(Duration::from_micros(150));
        assert_eq!(pacer.due_samples(clock.now()), 2);
        clock.advance(Duration::from_micros(50));
        assert_eq!(pacer.due_samples(clock.now()), 0);
    }

    #[test]
    fn test_due_samples_independent_of_slicing() {
        let clock = ManualClock::new();
        let mut fine = Pacer::new(333, clock.now());
        let mut coarse = Pacer::new(333, clock.now());
        let origin = clock.now();

        let mut fine_total = 0;
        for _ in 0..1000 {
            clock.advance(Duration::from_micros(1_700));
            fine_total += fine.due_samples(clock.now());
        }
        let mut coarse_total = 0;
        coarse_total += coarse.due_samples(origin + Duration::from_millis(850));
        coarse_total += coarse.due_samples(clock.now());

        assert!(fine_total.abs_diff(coarse_total) <= 1);
    }

    #[test]
    fn test_quantize_carries_remainder() {
        let clock = ManualClock::new();
        let mut pacer = Pacer::new(1, clock.now());
        assert_eq!(pacer.quantize(40, 64, 10_000), 0);
        assert_eq!(pacer.not_sent(), 40);
        assert_eq!(pacer.quantize(100, 64, 10_000), 128);
        assert_eq!(pacer.not_sent(), 12);
    }

    #[test]
    fn test_quantize_holds_sub_quantum_budget() {
        let clock = ManualClock::new();
        let mut pacer = Pacer::new(1, clock.now());
        assert_eq!(pacer.quantize(20, 64, 16), 0);
        assert_eq!(pacer.not_sent(), 20);
        assert_eq!(pacer.quantize(44, 64, 16), 16);
        assert_eq!(pacer.not_sent(), 0);
    }

    #[test]
    fn test_quantize_releases_final_budget() {
        let clock = ManualClock::new();
        let mut pacer = Pacer::new(1, clock.now());
        assert_eq!(pacer.quantize(528, 64, 528), 528);
        assert_eq!(pacer.not_sent(), 16);
    }

    #[test]
    fn test_quantize_carry_stays_below_quantum() {
        let clock = ManualClock::new();
        let mut pacer = Pacer::new(1, clock.now());
        assert_eq!(pacer.quantize(5_000_030, 64, 1_000_000), 1_000_000);
        assert!(pacer.not_sent() < 64);
        assert_eq!(pacer.quantize(4_000_000, 64, 0), 4_000_000);
        assert_eq!(pacer.not_sent(), 5_000_030 % 64);
    }
}
