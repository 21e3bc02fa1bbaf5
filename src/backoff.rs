//! Retry pacing for the outer retry loop and for transport-level retries.

use std::{
    fmt,
    sync::{Arc, Mutex, OnceLock},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Nominal wait intervals in seconds for successive outer retries.
///
/// Once the attempt count runs past the end of the table the last entry is
/// reused for every further retry.
pub const BACKOFF_INTERVALS_SECS: [u64; 5] = [2, 4, 8, 16, 32];

/// Nominal interval for the given zero-based retry attempt.
pub fn nominal_interval(attempt: usize) -> u64 {
    let index = attempt.min(BACKOFF_INTERVALS_SECS.len() - 1);
    BACKOFF_INTERVALS_SECS[index]
}

/// Jittered wait in whole seconds for a nominal interval.
///
/// `floor((interval * (1 + sample)) / 2 + 0.5)` with `sample` in `[0, 1)`,
/// which lands in `[floor(interval / 2), interval]`.
pub fn jittered_secs(interval: u64, sample: f64) -> u64 {
    let sample = sample.clamp(0.0, 1.0);
    let wait = ((interval as f64 * (1.0 + sample)) / 2.0 + 0.5).floor();
    (wait as u64).min(interval)
}

/// Uniform `[0, 1)` samples used for retry jitter.
///
/// The default source is a single process-wide generator seeded once from the
/// operating system's CSPRNG, falling back to the wall clock if that fails.
/// Tests can inject a seeded generator or a fixed function.
#[derive(Clone, Default)]
pub struct JitterSource {
    inner: JitterInner,
}

#[derive(Clone, Default)]
enum JitterInner {
    #[default]
    Process,
    Seeded(Arc<Mutex<fastrand::Rng>>),
    Function(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl fmt::Debug for JitterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner {
            JitterInner::Process => "Process",
            JitterInner::Seeded(_) => "Seeded",
            JitterInner::Function(_) => "Function",
        };
        f.debug_tuple("JitterSource").field(&kind).finish()
    }
}

impl JitterSource {
    /// Deterministic generator for reproducible retry schedules.
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: JitterInner::Seeded(Arc::new(Mutex::new(fastrand::Rng::with_seed(seed)))),
        }
    }

    /// Samples produced by an arbitrary function, e.g. a constant in tests.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self {
            inner: JitterInner::Function(Arc::new(f)),
        }
    }

    pub fn next_f64(&self) -> f64 {
        match &self.inner {
            JitterInner::Process => sample(process_rng()),
            JitterInner::Seeded(rng) => sample(rng),
            JitterInner::Function(f) => f(),
        }
    }

    /// Jittered wait before outer retry number `attempt` (zero-based).
    pub fn retry_wait(&self, attempt: usize) -> Duration {
        Duration::from_secs(jittered_secs(nominal_interval(attempt), self.next_f64()))
    }
}

fn sample(rng: &Mutex<fastrand::Rng>) -> f64 {
    // A poisoned generator is still a usable generator.
    let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    rng.f64()
}

fn process_rng() -> &'static Mutex<fastrand::Rng> {
    static RNG: OnceLock<Mutex<fastrand::Rng>> = OnceLock::new();
    RNG.get_or_init(|| Mutex::new(fastrand::Rng::with_seed(process_seed())))
}

fn process_seed() -> u64 {
    let mut buf = [0u8; 8];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf),
        Err(_) => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15),
    }
}

/// Wait before transport-level retry number `attempt` (zero-based).
///
/// `min * 2^attempt`, capped at `max`. A server-provided `Retry-After` wins
/// over the computed value.
pub fn transport_wait(
    min: Duration,
    max: Duration,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(retry_after) = retry_after {
        return retry_after;
    }
    let multiplier = 1u32 << attempt.min(16);
    min.saturating_mul(multiplier).min(max)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{jittered_secs, nominal_interval, transport_wait, JitterSource};

    #[test]
    fn interval_table_escalates_then_holds() {
        let intervals: Vec<u64> = (0..8).map(nominal_interval).collect();
        assert_eq!(intervals, vec![2, 4, 8, 16, 32, 32, 32, 32]);
    }

    #[test]
    fn jitter_extremes() {
        assert_eq!(jittered_secs(2, 0.0), 1);
        assert_eq!(jittered_secs(4, 0.0), 2);
        assert_eq!(jittered_secs(32, 0.0), 16);
        assert_eq!(jittered_secs(32, 0.999_999), 32);
        assert_eq!(jittered_secs(5, 0.0), 3);
    }

    #[test]
    fn jitter_stays_within_bounds_over_many_trials() {
        let source = JitterSource::seeded(7);
        for interval in [1u64, 2, 3, 4, 8, 15, 16, 32] {
            for _ in 0..2_000 {
                let wait = jittered_secs(interval, source.next_f64());
                assert!(wait >= interval / 2, "{wait} below floor for {interval}");
                assert!(wait <= interval, "{wait} above ceiling for {interval}");
            }
        }
    }

    #[test]
    fn process_source_samples_unit_interval() {
        let source = JitterSource::default();
        for _ in 0..1_000 {
            let value = source.next_f64();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn seeded_sources_are_reproducible() {
        let a = JitterSource::seeded(42);
        let b = JitterSource::seeded(42);
        let first: Vec<Duration> = (0..6).map(|n| a.retry_wait(n)).collect();
        let second: Vec<Duration> = (0..6).map(|n| b.retry_wait(n)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn fixed_function_source_drives_retry_wait() {
        let source = JitterSource::from_fn(|| 0.0);
        assert_eq!(source.retry_wait(0), Duration::from_secs(1));
        assert_eq!(source.retry_wait(4), Duration::from_secs(16));
        assert_eq!(source.retry_wait(99), Duration::from_secs(16));
    }

    #[test]
    fn transport_wait_doubles_and_caps() {
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(15);
        assert_eq!(transport_wait(min, max, 0, None), Duration::from_secs(1));
        assert_eq!(transport_wait(min, max, 1, None), Duration::from_secs(2));
        assert_eq!(transport_wait(min, max, 3, None), Duration::from_secs(8));
        assert_eq!(transport_wait(min, max, 4, None), max);
        assert_eq!(transport_wait(min, max, 40, None), max);
    }

    #[test]
    fn transport_wait_honors_retry_after() {
        let wait = transport_wait(
            Duration::from_secs(1),
            Duration::from_secs(15),
            0,
            Some(Duration::from_secs(11)),
        );
        assert_eq!(wait, Duration::from_secs(11));
    }
}
