use std::time::Instant;
use tracing::info;

/// Logs completion of a long stage at most once per whole percent.
pub struct Progress {
    label: &'static str,
    total: u64,
    last_pct: u64,
    start: Instant,
}

impl Progress {
    pub fn new(label: &'static str, total: u64) -> Self {
        Progress {
            label,
            total,
            last_pct: 0,
            start: Instant::now(),
        }
    }

    /// Record that `done` of `total` units are complete; `bytes` feeds the rate.
    pub fn update(&mut self, done: u64, bytes: u64) -> bool {
        let Some(pct) = self.advance(done) else {
            return false;
        };

        let mb_per_sec = self.per_sec(bytes) / (1024.0 * 1024.0);
        info!(stage = self.label, "{}% complete ({:.2} MB/sec)", pct, mb_per_sec);
        true
    }

    /// Like `update` for stages with no byte volume; the rate is `unit`s per second.
    pub fn tick(&mut self, done: u64, unit: &str) -> bool {
        let Some(pct) = self.advance(done) else {
            return false;
        };

        info!(stage = self.label, "{}% complete ({:.0} {}/sec)", pct, self.per_sec(done), unit);
        true
    }

    pub fn last_percent(&self) -> u64 {
        self.last_pct
    }

    /// New whole percent reached by `done`, if any.
    fn advance(&mut self, done: u64) -> Option<u64> {
        if self.total == 0 {
            return None;
        }

        let pct = done.saturating_mul(100) / self.total;
        if pct <= self.last_pct {
            return None;
        }
        self.last_pct = pct;
        Some(pct)
    }

    fn per_sec(&self, amount: u64) -> f64 {
        let secs = self.start.elapsed().as_secs_f64();
        if secs > 0.0 { amount as f64 / secs } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_fires_once_per_percent() {
        let mut progress = Progress::new("users", 200);
        let fired = (1..=200).filter(|&done| progress.tick(done, "users")).count();

        assert_eq!(fired, 100);
        assert_eq!(progress.last_percent(), 100);
    }

    #[test]
    fn tick_ignores_repeats_and_empty_totals() {
        let mut progress = Progress::new("users", 10);
        assert!(progress.tick(1, "users"));
        assert!(!progress.tick(1, "users"));
        assert!(progress.tick(5, "users"));
        assert_eq!(progress.last_percent(), 50);

        let mut empty = Progress::new("users", 0);
        assert!(!empty.tick(1, "users"));
    }

    #[test]
    fn tick_and_update_share_the_percent_gate() {
        let mut progress = Progress::new("blocks", 4);
        assert!(progress.update(1, 1024));
        assert!(!progress.tick(1, "users"));
        assert!(progress.tick(2, "users"));
        assert!(!progress.update(2, 2048));
    }
}
