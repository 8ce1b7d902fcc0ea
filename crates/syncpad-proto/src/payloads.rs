//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary, but payloads use CBOR for type safety and
//! forward compatibility. CBOR is self-describing (field names embedded),
//! compact, and needs no code generation; a payload can gain optional
//! fields without breaking older peers.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). The variant discriminator is NOT serialized: the frame
//! header's opcode already identifies the payload type, which prevents
//! mismatched opcode/payload pairs from being constructed on the wire.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// Client greeting opening the logical channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks.
    pub protocol_version: u8,
}

/// Server acknowledgement of a [`Hello`], completing the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Server-assigned identifier for this logical channel.
    pub session_id: u64,
}

/// Client request to become a member of a room.
///
/// The server answers with a [`RoomUsers`] push to every member of the
/// room, the sender included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Room to join. Opaque, client-generated, non-empty.
    pub room_id: String,
    /// Display name, unique within the room at any instant.
    pub username: String,
}

/// Full replacement of a room's buffer, sent by the editing client.
///
/// The server fans this out as [`UpdateCode`] to every member of the room
/// except the sender. No diffing: the entire content travels on every
/// change, trading bandwidth for guaranteed convergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChanged {
    /// Room whose buffer changed.
    pub room_id: String,
    /// Complete new buffer content.
    pub code: String,
}

/// Server push carrying replacement buffer content.
///
/// Receivers overwrite their local buffer unconditionally (last write
/// wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCode {
    /// Complete buffer content.
    pub code: String,
}

/// Server push carrying a room's full membership.
///
/// Receivers replace their local member list wholly; the list never
/// contains duplicate usernames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUsers {
    /// Current members in insertion order.
    pub users: Vec<String>,
}

/// Advisory description of one active room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    /// Room identifier.
    pub room_id: String,
    /// Members at snapshot time.
    pub users: Vec<String>,
    /// Dominant editor language of the room.
    pub primary_language: String,
    /// Seconds since the room last saw a join or edit.
    pub idle_secs: u64,
}

/// Server response to a directory request.
///
/// Advisory and possibly stale; never used to authorize a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryResponse {
    /// Currently active rooms.
    pub rooms: Vec<RoomSummary>,
}

/// All possible frame payloads.
///
/// The payload type is determined by the `Opcode` in the frame header, so
/// only the inner struct content is serialized (no variant tag in CBOR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Initial handshake.
    Hello(Hello),
    /// Server response to Hello.
    HelloReply(HelloReply),
    /// Keepalive probe.
    Ping,
    /// Keepalive response.
    Pong,
    /// Room membership request.
    JoinRoom(JoinRoom),
    /// Outbound buffer replacement.
    CodeChanged(CodeChanged),
    /// Inbound buffer replacement.
    UpdateCode(UpdateCode),
    /// Membership push.
    RoomUsers(RoomUsers),
    /// Directory snapshot request.
    DirectoryRequest,
    /// Directory snapshot response.
    DirectoryResponse(DirectoryResponse),
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::JoinRoom(_) => Opcode::JoinRoom,
            Self::CodeChanged(_) => Opcode::CodeChanged,
            Self::UpdateCode(_) => Opcode::UpdateCode,
            Self::RoomUsers(_) => Opcode::RoomUsers,
            Self::DirectoryRequest => Opcode::DirectoryRequest,
            Self::DirectoryResponse(_) => Opcode::DirectoryResponse,
        }
    }

    /// Encode the payload body into a buffer.
    ///
    /// Serializes only the inner struct, NOT the variant tag; the frame
    /// header's opcode identifies the payload type. `Ping`, `Pong` and
    /// `DirectoryRequest` are zero-byte payloads.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Ping | Self::Pong | Self::DirectoryRequest => Ok(()),
            Self::JoinRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::CodeChanged(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::UpdateCode(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RoomUsers(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::DirectoryResponse(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a payload from bytes based on its opcode.
    ///
    /// The size check happens BEFORE CBOR parsing so the parser never sees
    /// pathologically large inputs.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if bytes exceed
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]
    /// - [`ProtocolError::CborDecode`] if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(decode_body(bytes)?),
            Opcode::HelloReply => Self::HelloReply(decode_body(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::JoinRoom => Self::JoinRoom(decode_body(bytes)?),
            Opcode::CodeChanged => Self::CodeChanged(decode_body(bytes)?),
            Opcode::UpdateCode => Self::UpdateCode(decode_body(bytes)?),
            Opcode::RoomUsers => Self::RoomUsers(decode_body(bytes)?),
            Opcode::DirectoryRequest => Self::DirectoryRequest,
            Opcode::DirectoryResponse => Self::DirectoryResponse(decode_body(bytes)?),
        };

        Ok(payload)
    }

    /// Convert the payload into a transport frame.
    ///
    /// Builds a header with the matching opcode, encodes the body, and
    /// sets `payload_size` automatically.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn into_frame(self) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(Frame::new(FrameHeader::new(self.opcode()), buf))
    }

    /// Parse a payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownOpcode`] if the header's opcode is not in
    ///   the vocabulary
    /// - [`ProtocolError::CborDecode`] if CBOR deserialization fails
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds the
    ///   maximum size
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn decode_body<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_survives_the_wire() {
        let payload = Payload::JoinRoom(JoinRoom {
            room_id: "1a2b3c".to_string(),
            username: "alice".to_string(),
        });

        let frame = payload.clone().into_frame().unwrap();
        assert_eq!(frame.header.opcode_enum(), Some(Opcode::JoinRoom));

        let parsed = Payload::from_frame(&frame).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn keepalives_are_zero_byte() {
        let ping = Payload::Ping.into_frame().unwrap();
        let pong = Payload::Pong.into_frame().unwrap();

        assert!(ping.payload.is_empty());
        assert!(pong.payload.is_empty());
        assert_eq!(Payload::from_frame(&ping).unwrap(), Payload::Ping);
        assert_eq!(Payload::from_frame(&pong).unwrap(), Payload::Pong);
    }

    #[test]
    fn update_code_carries_full_buffer() {
        let content = "fn main() {\n    let answer = 42;\n}\n".to_string();
        let frame =
            Payload::UpdateCode(UpdateCode { code: content.clone() }).into_frame().unwrap();

        let parsed = Payload::from_frame(&frame).unwrap();
        let Payload::UpdateCode(update) = parsed else {
            panic!("wrong payload variant");
        };
        assert_eq!(update.code, content);
    }

    #[test]
    fn directory_response_preserves_summaries() {
        let response = DirectoryResponse {
            rooms: vec![RoomSummary {
                room_id: "4d5e6f".to_string(),
                users: vec!["charlie".to_string(), "dave".to_string()],
                primary_language: "python".to_string(),
                idle_secs: 300,
            }],
        };

        let frame = Payload::DirectoryResponse(response.clone()).into_frame().unwrap();
        let parsed = Payload::from_frame(&frame).unwrap();
        assert_eq!(parsed, Payload::DirectoryResponse(response));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut frame = Payload::Ping.into_frame().unwrap();
        frame.header.opcode = 0x7777u16.to_be_bytes();

        let result = Payload::from_frame(&frame);
        assert!(matches!(result, Err(ProtocolError::UnknownOpcode(0x7777))));
    }

    #[test]
    fn rejects_garbage_body() {
        let garbage = Frame::new(FrameHeader::new(Opcode::JoinRoom), vec![0xFF, 0x00, 0x13]);

        let result = Payload::from_frame(&garbage);
        assert!(matches!(result, Err(ProtocolError::CborDecode(_))));
    }
}
