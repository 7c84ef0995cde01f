//! Minimum-interval debounce gate.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Discarded; `elapsed` since the last admitted trigger.
    TooSoon { elapsed: Duration },
}

/// Admits at most one trigger per `min_interval`. The first trigger of a burst
/// opens the window; rejected triggers do not move it.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    min_interval: Duration,
    last_run: Option<Instant>,
}

impl DebounceGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_run: None }
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }

    pub fn admit(&mut self, now: Instant) -> Admission {
        if let Some(last) = self.last_run {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Admission::TooSoon { elapsed };
            }
        }
        self.last_run = Some(now);
        Admission::Admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(10);

    #[test]
    fn first_trigger_is_admitted() {
        let mut gate = DebounceGate::new(MIN);
        let now = Instant::now();
        assert_eq!(gate.admit(now), Admission::Admitted);
        assert_eq!(gate.last_run(), Some(now));
    }

    #[test]
    fn burst_admits_only_first() {
        let mut gate = DebounceGate::new(MIN);
        let t0 = Instant::now();
        assert_eq!(gate.admit(t0), Admission::Admitted);
        for s in 1..10 {
            let t = t0 + Duration::from_secs(s);
            assert_eq!(gate.admit(t), Admission::TooSoon { elapsed: Duration::from_secs(s) });
        }
        // rejected triggers did not move the window start
        assert_eq!(gate.last_run(), Some(t0));
        assert_eq!(gate.admit(t0 + MIN), Admission::Admitted);
        assert_eq!(gate.last_run(), Some(t0 + MIN));
    }

    #[test]
    fn zero_interval_admits_everything() {
        let mut gate = DebounceGate::new(Duration::ZERO);
        let t0 = Instant::now();
        assert_eq!(gate.admit(t0), Admission::Admitted);
        assert_eq!(gate.admit(t0), Admission::Admitted);
    }
}
