//! Media-side data model: tracks, frames, reassembly, and codec fix-ups.
//!
//! The origin describes each stream as a set of tracks (video, audio, data)
//! and then delivers media as fragmented packets. This module turns those
//! packets back into complete, decodable [`MediaFrame`]s:
//!
//! - [`track`] — per-track description parsed from the Describe reply.
//! - [`depacketizer`] — stitches media packets into frames keyed by
//!   `(track_id, timestamp)`.
//! - [`annexb`] — H.264 Annex-B start-code fix-up applied before dispatch.

pub mod annexb;
pub mod depacketizer;
pub mod track;

pub use annexb::AvcAnnexBFramer;
pub use depacketizer::Depacketizer;
pub use track::MediaTrack;

/// Frame flag bit: the frame is a keyframe (video sync point).
pub const FRAME_FLAG_KEYFRAME: u8 = 0x01;

/// Codec carried by a track. Codes are the enum-coded integers the origin
/// sends in the Describe `codecId` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    None,
    H264,
    H265,
    Vp8,
    Vp9,
    Aac,
    Mp3,
    Opus,
}

impl CodecId {
    /// Decode the wire code; unknown values are rejected so a malformed
    /// Describe never produces a half-described track.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            1 => Some(Self::H264),
            2 => Some(Self::H265),
            3 => Some(Self::Vp8),
            4 => Some(Self::Vp9),
            5 => Some(Self::Aac),
            6 => Some(Self::Mp3),
            7 => Some(Self::Opus),
            _ => None,
        }
    }
}

/// Broad class of a track's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
    Data,
}

impl MediaType {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Video),
            1 => Some(Self::Audio),
            2 => Some(Self::Data),
            _ => None,
        }
    }
}

/// Audio sample format, enum-coded the FFmpeg way: interleaved formats
/// first, then their planar (`P`) counterparts. `-1` is "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    None,
    U8,
    S16,
    S32,
    Flt,
    Dbl,
    U8P,
    S16P,
    S32P,
    FltP,
    DblP,
}

impl SampleFormat {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            -1 => Some(Self::None),
            0 => Some(Self::U8),
            1 => Some(Self::S16),
            2 => Some(Self::S32),
            3 => Some(Self::Flt),
            4 => Some(Self::Dbl),
            5 => Some(Self::U8P),
            6 => Some(Self::S16P),
            7 => Some(Self::S32P),
            8 => Some(Self::FltP),
            9 => Some(Self::DblP),
            _ => None,
        }
    }
}

/// Audio channel layout, as an FFmpeg-style channel mask.
///
/// Masks outside the recognized set map to [`Unknown`](Self::Unknown)
/// rather than rejecting the track — exotic layouts still play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Unknown,
    /// Front center only (mask `0x4`).
    Mono,
    /// Front left + front right (mask `0x3`).
    Stereo,
}

impl ChannelLayout {
    pub fn from_mask(mask: u32) -> Self {
        match mask {
            0x4 => Self::Mono,
            0x3 => Self::Stereo,
            _ => Self::Unknown,
        }
    }
}

/// A complete, decodable unit for one track: the output of the
/// [`Depacketizer`], consumed by the downstream media router.
///
/// `pts`/`dts` are in the track's stream clock (the packet header timestamp
/// of the contributing media packets), not wall-clock. `duration` is 0 when
/// the transport does not carry it; downstream derives it from the track
/// timebase where needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    pub track_id: u32,
    pub pts: u64,
    pub dts: u64,
    pub duration: u64,
    /// Bitfield; see [`FRAME_FLAG_KEYFRAME`].
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl MediaFrame {
    pub fn is_keyframe(&self) -> bool {
        self.flags & FRAME_FLAG_KEYFRAME != 0
    }
}
