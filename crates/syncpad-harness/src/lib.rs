//! Deterministic simulation harness for Syncpad testing.
//!
//! Two levels of simulation, both driven by seeded randomness and virtual
//! time so every run is reproducible:
//!
//! - [`TestCluster`]: N session controllers wired straight to a server
//!   driver with no sockets. Single-threaded, instant delivery, manual
//!   clock. The workhorse for end-to-end protocol scenarios.
//! - [`SimServer`]: the real server driver behind turmoil's simulated TCP,
//!   for tests that need actual framing, partial reads, and partitions.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cluster;
pub mod sim_env;
pub mod sim_server;

pub use cluster::TestCluster;
pub use sim_env::SimEnv;
pub use sim_server::{SimServer, read_frame, write_frame};
