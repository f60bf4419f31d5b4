use std::time::Instant;

use crate::error::{HeaderErrorKind, OvtError, Result};
use crate::protocol::{HEADER_SIZE, OVT_VERSION, PayloadType};

/// A single framed unit on the OVT wire: fixed header plus opaque payload.
///
/// Construction is two-phase on the receive path, matching how the header
/// and payload are read separately from the socket:
/// [`parse_header`](Self::parse_header) validates the 20 header bytes and
/// yields a payload-less packet, then [`set_payload`](Self::set_payload)
/// attaches the payload once it has been read in full. The stored
/// `payload_length` always equals the actual payload size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvtPacket {
    /// Protocol version (always [`OVT_VERSION`] for valid packets).
    pub version: u8,
    /// Last packet of a logical message (control body or media frame).
    pub marker: bool,
    /// What the payload carries.
    pub payload_type: PayloadType,
    /// Wire sequence number, wrapping.
    pub sequence_number: u16,
    /// Session this packet belongs to; 0 before Play assigns one.
    pub session_id: u32,
    /// Sender clock in milliseconds. Wall-clock-ish for control packets,
    /// stream clock for media packets.
    pub timestamp: u64,
    payload_length: u32,
    payload: Vec<u8>,
}

impl OvtPacket {
    /// Create an outbound packet carrying `payload`.
    ///
    /// The timestamp is stamped from a process-monotonic millisecond clock.
    pub fn new(
        payload_type: PayloadType,
        session_id: u32,
        sequence_number: u16,
        marker: bool,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            version: OVT_VERSION,
            marker,
            payload_type,
            sequence_number,
            session_id,
            timestamp: monotonic_millis(),
            payload_length: payload.len() as u32,
            payload,
        }
    }

    /// Parse and validate the fixed header.
    ///
    /// Rejects short input, a version mismatch, an unknown payload type,
    /// and a `payload_length` beyond `max_packet_size` — all before any
    /// payload byte is consumed. The returned packet has an empty payload;
    /// the caller reads [`payload_length`](Self::payload_length) bytes and
    /// attaches them via [`set_payload`](Self::set_payload).
    pub fn parse_header(buf: &[u8], max_packet_size: usize) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(OvtError::InvalidHeader {
                kind: HeaderErrorKind::Truncated,
            });
        }

        let version = buf[0] >> 4;
        if version != OVT_VERSION {
            return Err(OvtError::InvalidHeader {
                kind: HeaderErrorKind::VersionMismatch,
            });
        }
        let marker = buf[0] & 0x01 != 0;

        let payload_type = PayloadType::from_code(buf[1])
            .map_err(|kind| OvtError::InvalidHeader { kind })?;

        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let session_id = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let timestamp = u64::from_be_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]);
        let payload_length = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);

        if payload_length as usize > max_packet_size {
            return Err(OvtError::InvalidHeader {
                kind: HeaderErrorKind::PayloadTooLarge,
            });
        }

        Ok(Self {
            version,
            marker,
            payload_type,
            sequence_number,
            session_id,
            timestamp,
            payload_length,
            payload: Vec::new(),
        })
    }

    /// Parse a complete packet (header and payload) from one buffer.
    ///
    /// Fails if the buffer does not contain exactly the payload the header
    /// announces.
    pub fn parse(buf: &[u8], max_packet_size: usize) -> Result<Self> {
        let mut packet = Self::parse_header(buf, max_packet_size)?;
        let expected = packet.payload_length as usize;
        if buf.len() != HEADER_SIZE + expected {
            return Err(OvtError::InvalidHeader {
                kind: HeaderErrorKind::Truncated,
            });
        }
        packet.set_payload(buf[HEADER_SIZE..].to_vec());
        Ok(packet)
    }

    /// Attach the payload bytes, keeping `payload_length` in sync.
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload_length = payload.len() as u32;
        self.payload = payload;
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take the payload out of the packet, leaving it empty.
    pub fn take_payload(&mut self) -> Vec<u8> {
        self.payload_length = 0;
        std::mem::take(&mut self.payload)
    }

    /// Announced payload size in bytes.
    pub fn payload_length(&self) -> u32 {
        self.payload_length
    }

    /// Serialize header and payload into one wire buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.push((self.version << 4) | (self.marker as u8));
        buf.push(self.payload_type.code());
        buf.extend_from_slice(&self.sequence_number.to_be_bytes());
        buf.extend_from_slice(&self.session_id.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Milliseconds since an arbitrary process-local epoch.
///
/// Monotonic, so timestamps on outbound packets never go backwards.
fn monotonic_millis() -> u64 {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_PACKET_SIZE;

    fn make_packet() -> OvtPacket {
        OvtPacket::new(
            PayloadType::MediaPacket,
            0xCAFEBABE,
            42,
            true,
            vec![0xAA, 0xBB, 0xCC],
        )
    }

    #[test]
    fn serialize_parse_round_trip() {
        let packet = make_packet();
        let wire = packet.serialize();
        let parsed = OvtPacket::parse(&wire, DEFAULT_MAX_PACKET_SIZE).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn header_fields_big_endian() {
        let mut packet = make_packet();
        packet.timestamp = 0x0102030405060708;
        let wire = packet.serialize();

        assert_eq!(wire[0] >> 4, OVT_VERSION);
        assert_eq!(wire[0] & 0x01, 1); // marker
        assert_eq!(wire[1], 0x10); // MediaPacket
        assert_eq!(&wire[2..4], &42u16.to_be_bytes());
        assert_eq!(&wire[4..8], &0xCAFEBABEu32.to_be_bytes());
        assert_eq!(&wire[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&wire[16..20], &3u32.to_be_bytes());
    }

    #[test]
    fn marker_clear() {
        let packet = OvtPacket::new(PayloadType::Describe, 0, 1, false, vec![]);
        let wire = packet.serialize();
        assert_eq!(wire[0] & 0x01, 0);
    }

    #[test]
    fn parse_header_rejects_short_input() {
        let err = OvtPacket::parse_header(&[0u8; HEADER_SIZE - 1], DEFAULT_MAX_PACKET_SIZE)
            .unwrap_err();
        match err {
            OvtError::InvalidHeader { kind } => assert_eq!(kind, HeaderErrorKind::Truncated),
            other => panic!("expected InvalidHeader, got {:?}", other),
        }
    }

    #[test]
    fn parse_header_rejects_version_mismatch() {
        let mut wire = make_packet().serialize();
        wire[0] = (7 << 4) | (wire[0] & 0x0F);
        let err = OvtPacket::parse_header(&wire, DEFAULT_MAX_PACKET_SIZE).unwrap_err();
        match err {
            OvtError::InvalidHeader { kind } => {
                assert_eq!(kind, HeaderErrorKind::VersionMismatch)
            }
            other => panic!("expected InvalidHeader, got {:?}", other),
        }
    }

    #[test]
    fn parse_header_rejects_unknown_payload_type() {
        let mut wire = make_packet().serialize();
        wire[1] = 0x7F;
        let err = OvtPacket::parse_header(&wire, DEFAULT_MAX_PACKET_SIZE).unwrap_err();
        match err {
            OvtError::InvalidHeader { kind } => {
                assert_eq!(kind, HeaderErrorKind::UnknownPayloadType)
            }
            other => panic!("expected InvalidHeader, got {:?}", other),
        }
    }

    #[test]
    fn parse_header_rejects_oversize_payload() {
        let mut wire = make_packet().serialize();
        wire[16..20].copy_from_slice(&(DEFAULT_MAX_PACKET_SIZE as u32 + 1).to_be_bytes());
        let err = OvtPacket::parse_header(&wire, DEFAULT_MAX_PACKET_SIZE).unwrap_err();
        match err {
            OvtError::InvalidHeader { kind } => {
                assert_eq!(kind, HeaderErrorKind::PayloadTooLarge)
            }
            other => panic!("expected InvalidHeader, got {:?}", other),
        }
    }

    #[test]
    fn parse_header_leaves_payload_empty() {
        let wire = make_packet().serialize();
        let packet = OvtPacket::parse_header(&wire, DEFAULT_MAX_PACKET_SIZE).unwrap();
        assert_eq!(packet.payload_length(), 3);
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn set_payload_updates_length() {
        let mut packet = OvtPacket::new(PayloadType::Describe, 0, 0, true, vec![]);
        assert_eq!(packet.payload_length(), 0);
        packet.set_payload(vec![1, 2, 3, 4]);
        assert_eq!(packet.payload_length(), 4);
    }

    #[test]
    fn timestamps_monotonic() {
        let a = OvtPacket::new(PayloadType::Describe, 0, 0, true, vec![]);
        let b = OvtPacket::new(PayloadType::Describe, 0, 1, true, vec![]);
        assert!(b.timestamp >= a.timestamp);
    }
}
