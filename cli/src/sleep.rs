use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{event, Level};

/// MinimalSleeper paces the emulation against the wall clock.
///
/// Each system clock lasts a tiny fraction of a microsecond, far less
/// than the host can usefully sleep for.  So the sleeper keeps a
/// running debt of emulated time and only actually sleeps once the
/// debt exceeds `min_sleep`.  Time the host spent emulating counts
/// against the debt, so on average the emulation keeps pace with
/// real time (scaled by the speed multiplier).
#[derive(Debug)]
pub struct MinimalSleeper {
    min_sleep: Duration,
    /// Seconds of sleep owed.  Negative when the emulation is running
    /// behind.
    owed: f64,
    last_update: Instant,
    total_slept: Duration,
}

impl MinimalSleeper {
    pub fn new(min_sleep: Duration) -> MinimalSleeper {
        MinimalSleeper {
            min_sleep,
            owed: 0.0,
            last_update: Instant::now(),
            total_slept: Duration::ZERO,
        }
    }

    /// Records that `emulated` seconds have passed on the chip,
    /// which should take `emulated / multiplier` seconds of real
    /// time.
    pub fn time_passes(&mut self, emulated: f64, multiplier: f64) {
        let now = Instant::now();
        let spent = now.duration_since(self.last_update);
        self.last_update = now;
        self.owed += emulated / multiplier - spent.as_secs_f64();

        // Never let the emulation "bank" more than a second of lag;
        // after a stall, it should not then run flat out to catch up.
        self.owed = self.owed.max(-1.0);

        let owed = Duration::try_from_secs_f64(self.owed).unwrap_or(Duration::ZERO);
        if owed > self.min_sleep {
            event!(Level::TRACE, "sleeping for {owed:?}");
            sleep(owed);
            let after = Instant::now();
            self.owed -= after.duration_since(now).as_secs_f64();
            self.total_slept += owed;
            self.last_update = after;
        }
    }
}

impl Drop for MinimalSleeper {
    fn drop(&mut self) {
        event!(
            Level::DEBUG,
            "MinimalSleeper: total cumulative sleep is {:?}",
            self.total_slept
        );
    }
}

#[test]
fn test_small_debts_do_not_sleep() {
    let mut sleeper = MinimalSleeper::new(Duration::from_secs(3600));
    sleeper.time_passes(1e-6, 1.0);
    assert_eq!(sleeper.total_slept, Duration::ZERO);
}

#[test]
fn test_lag_is_capped() {
    let mut sleeper = MinimalSleeper::new(Duration::from_millis(1));
    sleeper.time_passes(-100.0, 1.0);
    assert!(sleeper.owed >= -1.0);
}

#[test]
fn test_sleeps_off_debt() {
    let mut sleeper = MinimalSleeper::new(Duration::from_millis(1));
    sleeper.time_passes(0.005, 1.0);
    assert!(sleeper.total_slept >= Duration::from_millis(1));
}
