use std::time::Duration;

use instant::Instant;

/// Monotonic wall-clock timer for ad hoc benchmarking.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch(Instant);

impl Default for Stopwatch {
    fn default() -> Self {
        Self::start()
    }
}

impl Stopwatch {
    #[inline]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    /// Milliseconds since the stopwatch started.
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the milliseconds since the last lap and restarts.
    #[inline]
    pub fn lap(&mut self) -> f64 {
        let elapsed = self.elapsed_ms();
        self.0 = Instant::now();
        elapsed
    }
}
