//! OVT wire protocol: packet framing and control messaging.
//!
//! OVT carries both JSON control exchanges and media payloads over a single
//! full-duplex TCP connection. Every unit on the wire is an [`OvtPacket`]:
//! a 20-byte fixed header followed by an opaque payload.
//!
//! ## Fixed header layout (all integers big-endian)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Ver  | R R R |M| PayloadType |        Sequence Number        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Session Id                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                           Timestamp                           +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload Length                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Byte 0 packs the protocol version in its upper four bits and the marker
//! in bit 0; bits 3..1 are reserved (zero on encode, ignored on decode).
//! The marker flags the last packet of a logical message: control bodies
//! and media frames may span several packets, and the packet carrying
//! `marker = 1` closes the unit.
//!
//! ## Control exchange
//!
//! Requests are single-packet JSON objects `{ "id": n, "url": "..." }`.
//! Responses echo the request `id` and carry a `code`/`message` pair;
//! `200` is success. Exactly one control request is in flight at a time.
//!
//! | Payload type | Code | Direction |
//! |--------------|------|-----------|
//! | Describe | 0x01 | client → origin |
//! | DescribeResponse | 0x02 | origin → client |
//! | Play | 0x05 | client → origin |
//! | PlayResponse | 0x06 | origin → client (session id in the header) |
//! | Stop | 0x07 | client → origin |
//! | StopResponse | 0x08 | origin → client |
//! | MediaPacket | 0x10 | origin → client |

pub mod packet;
pub mod request;
pub mod response;

pub use packet::OvtPacket;
pub use request::ControlRequest;
pub use response::{ControlResponse, DescribeResponse};

use crate::error::HeaderErrorKind;

/// Protocol version written into and expected in every header.
pub const OVT_VERSION: u8 = 1;

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 20;

/// Size of the per-packet media preamble (`track_id` + flags) that leads
/// every [`PayloadType::MediaPacket`] payload.
pub const MEDIA_PREAMBLE_SIZE: usize = 5;

/// Kind of payload carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    Describe = 0x01,
    DescribeResponse = 0x02,
    Play = 0x05,
    PlayResponse = 0x06,
    Stop = 0x07,
    StopResponse = 0x08,
    MediaPacket = 0x10,
}

impl PayloadType {
    /// Decode a wire code, rejecting unknown values.
    pub fn from_code(code: u8) -> Result<Self, HeaderErrorKind> {
        match code {
            0x01 => Ok(Self::Describe),
            0x02 => Ok(Self::DescribeResponse),
            0x05 => Ok(Self::Play),
            0x06 => Ok(Self::PlayResponse),
            0x07 => Ok(Self::Stop),
            0x08 => Ok(Self::StopResponse),
            0x10 => Ok(Self::MediaPacket),
            _ => Err(HeaderErrorKind::UnknownPayloadType),
        }
    }

    /// Wire code for this payload type.
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_type_codes_round_trip() {
        for pt in [
            PayloadType::Describe,
            PayloadType::DescribeResponse,
            PayloadType::Play,
            PayloadType::PlayResponse,
            PayloadType::Stop,
            PayloadType::StopResponse,
            PayloadType::MediaPacket,
        ] {
            assert_eq!(PayloadType::from_code(pt.code()).unwrap(), pt);
        }
    }

    #[test]
    fn unknown_payload_type_rejected() {
        assert_eq!(
            PayloadType::from_code(0x42).unwrap_err(),
            HeaderErrorKind::UnknownPayloadType
        );
    }
}
