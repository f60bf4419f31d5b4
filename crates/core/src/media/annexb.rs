use crate::media::MediaFrame;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H.264 Annex-B header fix-up.
///
/// Origins may deliver H.264 frames either already in Annex-B byte-stream
/// form (start-code prefixed) or in AVCC form (each NAL unit prefixed with
/// a 4-byte big-endian length). Decoders downstream of the router expect
/// Annex-B, so every completed H.264 frame passes through
/// [`prepend_header`](Self::prepend_header) exactly once before dispatch.
/// Non-H.264 tracks bypass this entirely.
pub struct AvcAnnexBFramer;

impl AvcAnnexBFramer {
    /// Rewrite the frame payload into Annex-B form.
    ///
    /// - Already start-code prefixed (3- or 4-byte): left untouched.
    /// - Valid AVCC length-prefixed layout: each length slot is replaced
    ///   with a 4-byte start code.
    /// - Anything else: treated as a bare NAL unit and given one start code.
    pub fn prepend_header(frame: &mut MediaFrame) {
        let payload = &frame.payload;
        if payload.is_empty() || starts_with_start_code(payload) {
            return;
        }

        if let Some(nal_ranges) = parse_avcc(payload) {
            let total: usize = nal_ranges
                .iter()
                .map(|(start, end)| START_CODE.len() + (end - start))
                .sum();
            let mut rewritten = Vec::with_capacity(total);
            for (start, end) in nal_ranges {
                rewritten.extend_from_slice(&START_CODE);
                rewritten.extend_from_slice(&payload[start..end]);
            }
            tracing::trace!(
                track_id = frame.track_id,
                bytes = rewritten.len(),
                "rewrote AVCC frame to Annex-B"
            );
            frame.payload = rewritten;
            return;
        }

        let mut prefixed = Vec::with_capacity(START_CODE.len() + payload.len());
        prefixed.extend_from_slice(&START_CODE);
        prefixed.extend_from_slice(payload);
        frame.payload = prefixed;
    }
}

fn starts_with_start_code(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&START_CODE)
}

/// Interpret `data` as AVCC: consecutive `[u32 length][NAL]` records that
/// cover the buffer exactly. Returns the NAL byte ranges, or `None` when
/// the layout does not hold.
fn parse_avcc(data: &[u8]) -> Option<Vec<(usize, usize)>> {
    let mut ranges = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        if data.len() - offset < 4 {
            return None;
        }
        let length = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        if length == 0 || length > data.len() - offset - 4 {
            return None;
        }
        let start = offset + 4;
        ranges.push((start, start + length));
        offset = start + length;
    }

    if ranges.is_empty() { None } else { Some(ranges) }
}
