//! Client
//!
//! Action-based session controller for Syncpad rooms. Manages the join
//! lifecycle, the shared text buffer, membership notifications, and local
//! persistence of recent rooms.
//!
//! # Architecture
//!
//! The client follows the same sans-IO and action-based patterns as
//! [`syncpad_core`]. It receives events ([`SessionEvent`]), processes them
//! through pure state machine logic, and returns actions ([`SessionAction`])
//! for the caller to execute. The controller owns its connection machine, so
//! channel lifetime is exactly session lifetime.
//!
//! # Components
//!
//! - [`SessionController`]: State machine for one room session
//! - [`SessionEvent`]: Events fed into the controller
//! - [`SessionAction`]: Actions produced by the controller
//! - [`SessionStore`]: Recent rooms and saved profile persistence
//! - [`RoomDirectory`]: Advisory view of active rooms
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: Framed TCP stream to a server
//! - [`transport::connect`]: Connect to a server
//! - [`ClientDriver`]: Event loop binding a controller to real I/O

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod directory;
mod error;
mod event;
mod session;
mod store;

#[cfg(feature = "transport")]
mod driver;
#[cfg(feature = "transport")]
pub mod transport;

pub use directory::{RoomDirectory, sample_rooms};
#[cfg(feature = "transport")]
pub use driver::{ClientCommand, ClientDriver, ClientUpdate};
pub use error::SessionError;
pub use event::{RoomSession, SessionAction, SessionEvent, SessionNotice};
pub use session::{SessionController, generate_room_id};
pub use store::{
    MAX_RECENT_ROOMS, MemoryStore, RecentRoomEntry, RedbStore, SessionStore, StoreError,
    recent_rooms_or_empty, saved_username_or_none,
};
pub use syncpad_core::{ConnectionConfig, ConnectionState, env::Environment};
