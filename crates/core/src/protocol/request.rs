use serde::{Deserialize, Serialize};

use crate::error::{OvtError, Result};
use crate::protocol::{OvtPacket, PayloadType};

/// Body of a control request (Describe, Play, Stop all share this shape).
///
/// ```json
/// { "id": 1, "url": "ovt://origin:9000/app/stream" }
/// ```
///
/// The `id` is stream-local and strictly increasing; the matching response
/// must echo it. Exactly one control request is in flight at a time, so a
/// single id correlates the entire exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub id: u32,
    pub url: String,
}

impl ControlRequest {
    pub fn new(id: u32, url: &str) -> Self {
        Self {
            id,
            url: url.to_string(),
        }
    }

    /// Wrap the request into a single OVT packet.
    ///
    /// Control requests always fit one packet, so the marker is set.
    /// `session_id` is 0 until Play has assigned a real one (only Stop
    /// carries a non-zero session id).
    pub fn into_packet(
        self,
        payload_type: PayloadType,
        session_id: u32,
        sequence_number: u16,
    ) -> Result<OvtPacket> {
        let body = serde_json::to_vec(&self)
            .map_err(|e| OvtError::SendFailed(format!("could not serialize request: {e}")))?;
        Ok(OvtPacket::new(
            payload_type,
            session_id,
            sequence_number,
            true,
            body,
        ))
    }
}
