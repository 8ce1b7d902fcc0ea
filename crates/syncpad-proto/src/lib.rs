//! Wire protocol for Syncpad.
//!
//! Defines the binary framing and message payloads exchanged between
//! clients and the room registry server. The protocol is
//! transport-agnostic: frames are plain byte sequences that any ordered,
//! reliable stream can carry.
//!
//! # Wire Format
//!
//! Each message is a [`Frame`]: a fixed-size binary [`FrameHeader`]
//! (magic, version, opcode, payload size) followed by a CBOR-encoded
//! [`Payload`]. Headers use raw big-endian fields for cheap validation;
//! payloads use CBOR so messages can evolve without breaking framing.
//!
//! # Components
//!
//! - [`FrameHeader`]: Fixed 12-byte header with zero-copy parsing
//! - [`Frame`]: Header plus payload bytes
//! - [`Opcode`]: Message type vocabulary
//! - [`Payload`]: Typed message bodies keyed by opcode

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
mod frame;
mod header;
mod opcode;
mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::{
    CodeChanged, DirectoryResponse, Hello, HelloReply, JoinRoom, Payload, RoomSummary, RoomUsers,
    UpdateCode,
};
