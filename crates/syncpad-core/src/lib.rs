//! Core connection machinery for Syncpad.
//!
//! Houses the Sans-IO connection manager and the environment abstraction
//! that keeps it testable: protocol logic never touches sockets, clocks, or
//! RNGs directly, so the exact same state machine runs in production and in
//! deterministic simulation.
//!
//! # Architecture
//!
//! The [`Connection`] receives events ([`ConnectionEvent`]), processes them
//! through pure state machine logic, and returns actions
//! ([`ConnectionAction`]) for the caller to execute. The caller owns all
//! I/O: dialing, reading frames, executing sends, and driving time forward
//! with ticks.
//!
//! # Components
//!
//! - [`Connection`]: Channel lifecycle state machine (dial, handshake,
//!   liveness, bounded-backoff recovery)
//! - [`Environment`]: Time and randomness abstraction
//! - [`SystemEnv`]: Production environment over system clock and OS RNG

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;

mod connection;
mod error;
mod event;
mod system_env;

pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use env::Environment;
pub use error::ConnectionError;
pub use event::{ConnectionAction, ConnectionEvent, ConnectionNotice};
pub use system_env::SystemEnv;
