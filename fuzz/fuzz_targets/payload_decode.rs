//! Fuzz target for Payload::from_frame
//!
//! This fuzzer tests payload deserialization (CBOR decoding) with:
//! - Malformed CBOR data
//! - Type confusion attacks (wrong payload type for opcode)
//! - Oversized strings or collections
//! - Nested structures exceeding depth limits
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use syncpad_proto::{Frame, FrameHeader, Opcode, Payload};

fuzz_target!(|data: &[u8]| {
    // A valid header is needed to reach payload decoding; try every opcode
    // so each payload type sees the input
    let opcodes = [
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

    for opcode in opcodes {
        let header = FrameHeader::new(opcode);
        let frame = Frame::new(header, Bytes::copy_from_slice(data));

        // Attempt to deserialize the payload
        // This should never panic, only return Err for invalid CBOR
        let _ = Payload::from_frame(&frame);
    }
});
