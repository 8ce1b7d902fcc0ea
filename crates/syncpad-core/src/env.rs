//! Environment abstraction for deterministic testing.
//!
//! Decouples connection and session logic from system resources (time,
//! randomness). Enables deterministic simulation (virtual clock, seeded RNG)
//! and production use with real system resources.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time (e.g., `turmoil::Instant`).
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - This method MUST return values that never decrease within a single
    ///   execution context. Subsequent calls must return times >= previous
    ///   calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not connection or session logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Seconds since the Unix epoch, from the wall clock.
    ///
    /// Unlike `now()`, this is NOT monotonic (NTP adjustments can move it)
    /// and must only be used for human-facing timestamps, never for
    /// measuring elapsed time.
    fn wall_clock_secs(&self) -> u64;

    /// Generates a random `u64`.
    ///
    /// This is a convenience method for common use cases like generating
    /// session IDs or request IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    ///
    /// Useful for UUIDs or room IDs.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}

/// Test support: a deterministic environment for unit tests.
pub mod test_utils {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use rand::{RngCore, SeedableRng, rngs::StdRng};

    use super::Environment;

    /// Arbitrary but realistic wall-clock base (seconds since epoch).
    const WALL_CLOCK_BASE_SECS: u64 = 1_700_000_000;

    /// Deterministic environment for unit tests.
    ///
    /// Uses a seeded RNG so random values are reproducible, real
    /// `std::time::Instant` for time (tests drive timeouts by constructing
    /// instants explicitly rather than sleeping), and a manually advanced
    /// wall clock.
    #[derive(Clone)]
    pub struct MockEnv {
        rng: Arc<Mutex<StdRng>>,
        wall_clock: Arc<Mutex<u64>>,
    }

    impl MockEnv {
        /// Create a mock environment with a fixed default seed.
        #[must_use]
        pub fn new() -> Self {
            Self::with_seed(0)
        }

        /// Create a mock environment with the given RNG seed.
        #[must_use]
        pub fn with_seed(seed: u64) -> Self {
            Self {
                rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
                wall_clock: Arc::new(Mutex::new(WALL_CLOCK_BASE_SECS)),
            }
        }

        /// Advance the wall clock by `secs` seconds.
        ///
        /// # Panics
        ///
        /// Panics if the clock mutex is poisoned.
        #[allow(clippy::expect_used)]
        pub fn advance_wall_clock(&self, secs: u64) {
            let mut clock =
                self.wall_clock.lock().expect("invariant: clock mutex is never poisoned");
            *clock += secs;
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        #[allow(clippy::expect_used)]
        fn random_bytes(&self, buffer: &mut [u8]) {
            let mut rng = self.rng.lock().expect("invariant: rng mutex is never poisoned");
            rng.fill_bytes(buffer);
        }

        #[allow(clippy::expect_used)]
        fn wall_clock_secs(&self) -> u64 {
            *self.wall_clock.lock().expect("invariant: clock mutex is never poisoned")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn same_seed_same_bytes() {
            let env1 = MockEnv::with_seed(7);
            let env2 = MockEnv::with_seed(7);

            let mut bytes1 = [0u8; 16];
            let mut bytes2 = [0u8; 16];
            env1.random_bytes(&mut bytes1);
            env2.random_bytes(&mut bytes2);

            assert_eq!(bytes1, bytes2);
        }

        #[test]
        fn different_seeds_diverge() {
            let env1 = MockEnv::with_seed(1);
            let env2 = MockEnv::with_seed(2);

            assert_ne!(env1.random_u64(), env2.random_u64());
        }

        #[test]
        fn wall_clock_advances_manually() {
            let env = MockEnv::new();

            let before = env.wall_clock_secs();
            env.advance_wall_clock(60);
            let after = env.wall_clock_secs();

            assert_eq!(after, before + 60);
        }
    }
}
