use std::collections::{HashMap, VecDeque};

use crate::error::{OvtError, Result};
use crate::media::MediaFrame;
use crate::protocol::{MEDIA_PREAMBLE_SIZE, OvtPacket, PayloadType};

/// Reassembles fragmented media packets into complete [`MediaFrame`]s.
///
/// Each media packet payload starts with a 5-byte preamble (`track_id: u32`
/// big-endian, then a flags byte), followed by a slice of the frame. The
/// pair `(track_id, header timestamp)` identifies one in-flight frame;
/// fragments concatenate in sequence-number order and the packet carrying
/// `marker = 1` completes the frame.
///
/// Completed frames queue in marker-arrival order, which is the dispatch
/// order the downstream router observes — even when fragments of different
/// tracks interleave freely.
///
/// The table of open frames is bounded. Admitting a frame beyond the bound
/// evicts the oldest open entry with a warning; an origin that leaves
/// frames unfinished cannot grow the table without limit.
pub struct Depacketizer {
    session_id: u32,
    max_inflight: usize,
    inflight: HashMap<FrameKey, Reassembly>,
    completed: VecDeque<MediaFrame>,
    admissions: u64,
    overflows: u64,
}

type FrameKey = (u32, u64);

struct Reassembly {
    buffer: Vec<u8>,
    last_sequence: u16,
    flags: u8,
    /// Admission order, for oldest-first eviction.
    admitted: u64,
}

impl Depacketizer {
    /// Create a depacketizer for the session assigned by Play.
    pub fn new(session_id: u32, max_inflight: usize) -> Self {
        Self {
            session_id,
            max_inflight,
            inflight: HashMap::new(),
            completed: VecDeque::new(),
            admissions: 0,
            overflows: 0,
        }
    }

    /// Feed one media packet into reassembly.
    ///
    /// Rejects packets from a different session, non-media payload types,
    /// payloads too short for the preamble, and sequence numbers that go
    /// backwards within a frame. On TCP none of these occur in a healthy
    /// session, so each is a protocol error the worker treats as fatal.
    pub fn append_packet(&mut self, packet: &OvtPacket) -> Result<()> {
        if packet.payload_type != PayloadType::MediaPacket {
            return Err(OvtError::ProtocolError(format!(
                "depacketizer fed non-media packet {:?}",
                packet.payload_type
            )));
        }
        if packet.session_id != self.session_id {
            return Err(OvtError::ProtocolError(format!(
                "media packet for session {:#010X}, expected {:#010X}",
                packet.session_id, self.session_id
            )));
        }

        let payload = packet.payload();
        if payload.len() < MEDIA_PREAMBLE_SIZE {
            return Err(OvtError::ProtocolError(format!(
                "media payload of {} bytes is shorter than the preamble",
                payload.len()
            )));
        }
        let track_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let flags = payload[4];
        let fragment = &payload[MEDIA_PREAMBLE_SIZE..];

        let key = (track_id, packet.timestamp);
        match self.inflight.get_mut(&key) {
            Some(entry) => {
                // Wrapping-aware forward check: a delta of 0 or >= 0x8000
                // means the sequence stalled or went backwards.
                let delta = packet.sequence_number.wrapping_sub(entry.last_sequence);
                if delta == 0 || delta >= 0x8000 {
                    return Err(OvtError::ProtocolError(format!(
                        "sequence went backwards within frame ({} after {})",
                        packet.sequence_number, entry.last_sequence
                    )));
                }
                entry.last_sequence = packet.sequence_number;
                entry.buffer.extend_from_slice(fragment);
            }
            None => {
                if self.inflight.len() >= self.max_inflight {
                    self.evict_oldest();
                }
                self.admissions += 1;
                self.inflight.insert(
                    key,
                    Reassembly {
                        buffer: fragment.to_vec(),
                        last_sequence: packet.sequence_number,
                        flags,
                        admitted: self.admissions,
                    },
                );
            }
        }

        if packet.marker {
            // The entry is present: it was inserted or updated above.
            if let Some(entry) = self.inflight.remove(&key) {
                self.completed.push_back(MediaFrame {
                    track_id,
                    pts: packet.timestamp,
                    dts: packet.timestamp,
                    duration: 0,
                    flags: entry.flags,
                    payload: entry.buffer,
                });
            }
        }

        Ok(())
    }

    fn evict_oldest(&mut self) {
        if let Some(key) = self
            .inflight
            .iter()
            .min_by_key(|(_, entry)| entry.admitted)
            .map(|(key, _)| *key)
        {
            self.inflight.remove(&key);
            self.overflows += 1;
            tracing::warn!(
                track_id = key.0,
                timestamp = key.1,
                open = self.inflight.len(),
                "reassembly overflow, dropped oldest open frame"
            );
        }
    }

    /// Whether a completed frame is waiting.
    pub fn is_available_media_frame(&self) -> bool {
        !self.completed.is_empty()
    }

    /// Pop the next completed frame, in marker-arrival order.
    pub fn pop_media_frame(&mut self) -> Option<MediaFrame> {
        self.completed.pop_front()
    }

    /// Number of frames still being reassembled.
    pub fn open_frames(&self) -> usize {
        self.inflight.len()
    }

    /// How many open frames were evicted by the in-flight bound.
    pub fn overflow_count(&self) -> u64 {
        self.overflows
    }

    /// Drop every open reassembly entry; called at session teardown so
    /// half-received frames never leak past the session.
    pub fn discard_inflight(&mut self) {
        if !self.inflight.is_empty() {
            tracing::debug!(
                discarded = self.inflight.len(),
                "discarding open reassembly entries"
            );
            self.inflight.clear();
        }
    }
}
