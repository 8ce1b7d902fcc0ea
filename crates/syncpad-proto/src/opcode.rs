//! Frame operation codes.

/// Operation code identifying a frame's payload type.
///
/// Stored as a u16 in the frame header. Values are grouped by concern:
/// `0x00xx` session management, `0x01xx` room events, `0x02xx` directory.
/// Gaps are reserved for protocol evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client opens the logical channel.
    Hello = 0x0001,
    /// Server acknowledges the handshake and assigns a session id.
    HelloReply = 0x0002,
    /// Keepalive probe.
    Ping = 0x0003,
    /// Keepalive response.
    Pong = 0x0004,

    /// Client registers as a member of a room.
    JoinRoom = 0x0100,
    /// Client replaces the room's buffer with new content.
    CodeChanged = 0x0101,
    /// Server pushes replacement buffer content to a member.
    UpdateCode = 0x0102,
    /// Server pushes the room's full membership list.
    RoomUsers = 0x0103,

    /// Client asks for an advisory snapshot of active rooms.
    DirectoryRequest = 0x0200,
    /// Server responds with active room summaries.
    DirectoryResponse = 0x0201,
}

impl Opcode {
    /// Parse an opcode from its wire representation. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Ping),
            0x0004 => Some(Self::Pong),
            0x0100 => Some(Self::JoinRoom),
            0x0101 => Some(Self::CodeChanged),
            0x0102 => Some(Self::UpdateCode),
            0x0103 => Some(Self::RoomUsers),
            0x0200 => Some(Self::DirectoryRequest),
            0x0201 => Some(Self::DirectoryResponse),
            _ => None,
        }
    }

    /// Wire representation of this opcode.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Whether a server may legitimately receive this opcode from a client.
    ///
    /// Server-origin opcodes arriving at the server are protocol violations.
    #[must_use]
    pub const fn is_client_origin(self) -> bool {
        matches!(
            self,
            Self::Hello
                | Self::Ping
                | Self::Pong
                | Self::JoinRoom
                | Self::CodeChanged
                | Self::DirectoryRequest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_opcodes() {
        let all = [
            Opcode::Hello,
            Opcode::HelloReply,
            Opcode::Ping,
            Opcode::Pong,
            Opcode::JoinRoom,
            Opcode::CodeChanged,
            Opcode::UpdateCode,
            Opcode::RoomUsers,
            Opcode::DirectoryRequest,
            Opcode::DirectoryResponse,
        ];

        for opcode in all {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn rejects_unknown_values() {
        assert_eq!(Opcode::from_u16(0x0000), None);
        assert_eq!(Opcode::from_u16(0x0105), None);
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }
}
