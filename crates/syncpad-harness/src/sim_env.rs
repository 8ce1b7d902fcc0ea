//! Deterministic simulation environment.
//!
//! [`SimEnv`] provides a seeded RNG and a manually advanced clock. Two
//! simulations with the same seed and the same schedule of
//! [`SimEnv::advance`] calls observe identical time and randomness, which
//! makes failures reproducible from just the seed.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use syncpad_core::Environment;

/// Arbitrary but realistic wall-clock base (seconds since epoch).
const WALL_CLOCK_BASE_SECS: u64 = 1_700_000_000;

struct SimClock {
    now: Instant,
    wall_secs: u64,
}

/// Simulation environment with virtual time and seeded randomness.
///
/// Time never advances on its own: tests call [`SimEnv::advance`] to move
/// the clock, so backoff and idle timers fire exactly when the test says
/// they do. Clones share the same clock and RNG.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    clock: Arc<Mutex<SimClock>>,
}

impl SimEnv {
    /// Create an environment with a fixed default seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create an environment seeded with `seed`.
    #[must_use]
    #[allow(clippy::disallowed_methods)]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            clock: Arc::new(Mutex::new(SimClock {
                now: Instant::now(),
                wall_secs: WALL_CLOCK_BASE_SECS,
            })),
        }
    }

    /// Advance the virtual clock by `duration`.
    ///
    /// # Panics
    ///
    /// Panics if the clock mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, duration: Duration) {
        let mut clock = self.clock.lock().expect("invariant: clock mutex is never poisoned");
        clock.now += duration;
        clock.wall_secs += duration.as_secs();
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = Instant;

    #[allow(clippy::expect_used)]
    fn now(&self) -> Instant {
        self.clock.lock().expect("invariant: clock mutex is never poisoned").now
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        // Simulated time moves via `advance`, never by waiting.
        std::future::ready(())
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut rng = self.rng.lock().expect("invariant: rng mutex is never poisoned");
        rng.fill_bytes(buffer);
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        self.clock.lock().expect("invariant: clock mutex is never poisoned").wall_secs
    }
}
