use serde_json::Value;

use crate::error::{OvtError, Result};
use crate::media::{ChannelLayout, CodecId, MediaType, SampleFormat};

/// Per-stream track description, validated from the Describe reply.
///
/// The Describe JSON carries one element per track:
///
/// ```json
/// {
///   "id": 1, "codecId": 1, "mediaType": 0,
///   "timebase_num": 1, "timebase_den": 90000, "bitrate": 2500000,
///   "startFrameTime": 0, "lastFrameTime": 0,
///   "videoTrack": { "framerate": 30.0, "width": 1920, "height": 1080 }
/// }
/// ```
///
/// Video tracks require a `videoTrack` sub-object, audio tracks an
/// `audioTrack` sub-object. Any missing or wrong-typed field rejects the
/// whole Describe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaTrack {
    /// Track id, unique within the stream.
    pub id: u32,
    pub codec_id: CodecId,
    /// Timebase numerator/denominator for this track's clock.
    pub timebase_num: u32,
    pub timebase_den: u32,
    pub bitrate: u32,
    pub start_frame_time: u64,
    pub last_frame_time: u64,
    /// Media-type-specific parameters.
    pub params: TrackParams,
}

/// Parameters specific to the track's media type.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackParams {
    Video(VideoParams),
    Audio(AudioParams),
    Data,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoParams {
    pub framerate: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub channel_layout: ChannelLayout,
}

impl MediaTrack {
    /// Media type, derived from the tagged parameters.
    pub fn media_type(&self) -> MediaType {
        match self.params {
            TrackParams::Video(_) => MediaType::Video,
            TrackParams::Audio(_) => MediaType::Audio,
            TrackParams::Data => MediaType::Data,
        }
    }

    /// Parse and validate one element of the Describe `tracks` array.
    pub fn from_json(json: &Value) -> Result<Self> {
        let id = require_u32(json, "id")?;
        let codec_code = require_u32(json, "codecId")?;
        let media_type_code = require_u32(json, "mediaType")?;
        let timebase_num = require_u32(json, "timebase_num")?;
        let timebase_den = require_u32(json, "timebase_den")?;
        let bitrate = require_u32(json, "bitrate")?;
        let start_frame_time = require_u64(json, "startFrameTime")?;
        let last_frame_time = require_u64(json, "lastFrameTime")?;

        if timebase_den == 0 {
            return Err(OvtError::InvalidDescribe("timebase_den is zero".into()));
        }

        let codec_id = CodecId::from_id(codec_code).ok_or_else(|| {
            OvtError::InvalidDescribe(format!("unrecognized codecId {codec_code}"))
        })?;
        let media_type = MediaType::from_id(media_type_code).ok_or_else(|| {
            OvtError::InvalidDescribe(format!("unrecognized mediaType {media_type_code}"))
        })?;

        let params = match media_type {
            MediaType::Video => {
                let video = sub_object(json, "videoTrack")?;
                TrackParams::Video(VideoParams {
                    framerate: require_f64(video, "framerate")?,
                    width: require_u32(video, "width")?,
                    height: require_u32(video, "height")?,
                })
            }
            MediaType::Audio => {
                let audio = sub_object(json, "audioTrack")?;
                TrackParams::Audio(AudioParams {
                    sample_rate: require_u32(audio, "samplerate")?,
                    sample_format: SampleFormat::from_id(require_i32(audio, "sampleFormat")?)
                        .ok_or_else(|| {
                            OvtError::InvalidDescribe("unrecognized sampleFormat".into())
                        })?,
                    channel_layout: ChannelLayout::from_mask(require_u32(audio, "layout")?),
                })
            }
            MediaType::Data => TrackParams::Data,
        };

        Ok(Self {
            id,
            codec_id,
            timebase_num,
            timebase_den,
            bitrate,
            start_frame_time,
            last_frame_time,
            params,
        })
    }
}

fn require_u64(json: &Value, key: &str) -> Result<u64> {
    json.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| OvtError::InvalidDescribe(format!("missing uint key \"{key}\"")))
}

fn require_u32(json: &Value, key: &str) -> Result<u32> {
    let value = require_u64(json, key)?;
    u32::try_from(value)
        .map_err(|_| OvtError::InvalidDescribe(format!("key \"{key}\" out of u32 range")))
}

fn require_i32(json: &Value, key: &str) -> Result<i32> {
    let value = json
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| OvtError::InvalidDescribe(format!("missing int key \"{key}\"")))?;
    i32::try_from(value)
        .map_err(|_| OvtError::InvalidDescribe(format!("key \"{key}\" out of i32 range")))
}

fn require_f64(json: &Value, key: &str) -> Result<f64> {
    json.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| OvtError::InvalidDescribe(format!("missing number key \"{key}\"")))
}

fn sub_object<'a>(json: &'a Value, key: &str) -> Result<&'a Value> {
    json.get(key)
        .filter(|v| v.is_object())
        .ok_or_else(|| OvtError::InvalidDescribe(format!("missing sub-object \"{key}\"")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_json() -> Value {
        serde_json::json!({
            "id": 1, "codecId": 1, "mediaType": 0,
            "timebase_num": 1, "timebase_den": 90000, "bitrate": 2_500_000,
            "startFrameTime": 0u64, "lastFrameTime": 0u64,
            "videoTrack": { "framerate": 30.0, "width": 1920, "height": 1080 }
        })
    }

    fn audio_json() -> Value {
        serde_json::json!({
            "id": 2, "codecId": 5, "mediaType": 1,
            "timebase_num": 1, "timebase_den": 48000, "bitrate": 128_000,
            "startFrameTime": 0u64, "lastFrameTime": 0u64,
            "audioTrack": { "samplerate": 48000, "sampleFormat": 8, "layout": 3 }
        })
    }

    #[test]
    fn parse_video_track() {
        let track = MediaTrack::from_json(&video_json()).unwrap();
        assert_eq!(track.id, 1);
        assert_eq!(track.codec_id, CodecId::H264);
        assert_eq!(track.media_type(), MediaType::Video);
        assert_eq!(track.timebase_den, 90000);
        match &track.params {
            TrackParams::Video(v) => {
                assert_eq!(v.framerate, 30.0);
                assert_eq!(v.width, 1920);
                assert_eq!(v.height, 1080);
            }
            other => panic!("expected video params, got {:?}", other),
        }
    }

    #[test]
    fn parse_audio_track() {
        let track = MediaTrack::from_json(&audio_json()).unwrap();
        assert_eq!(track.codec_id, CodecId::Aac);
        match &track.params {
            TrackParams::Audio(a) => {
                assert_eq!(a.sample_rate, 48000);
                assert_eq!(a.sample_format, SampleFormat::FltP);
                assert_eq!(a.channel_layout, ChannelLayout::Stereo);
            }
            other => panic!("expected audio params, got {:?}", other),
        }
    }

    #[test]
    fn parse_data_track() {
        let json = serde_json::json!({
            "id": 3, "codecId": 0, "mediaType": 2,
            "timebase_num": 1, "timebase_den": 1000, "bitrate": 0,
            "startFrameTime": 0u64, "lastFrameTime": 0u64
        });
        let track = MediaTrack::from_json(&json).unwrap();
        assert_eq!(track.media_type(), MediaType::Data);
        assert_eq!(track.params, TrackParams::Data);
    }

    #[test]
    fn reject_missing_required_field() {
        let mut json = video_json();
        json.as_object_mut().unwrap().remove("bitrate");
        assert!(matches!(
            MediaTrack::from_json(&json),
            Err(OvtError::InvalidDescribe(_))
        ));
    }

    #[test]
    fn reject_wrong_typed_field() {
        let mut json = video_json();
        json["id"] = Value::from("one");
        assert!(matches!(
            MediaTrack::from_json(&json),
            Err(OvtError::InvalidDescribe(_))
        ));
    }

    #[test]
    fn reject_zero_timebase_den() {
        let mut json = video_json();
        json["timebase_den"] = Value::from(0);
        let err = MediaTrack::from_json(&json).unwrap_err();
        match err {
            OvtError::InvalidDescribe(msg) => assert!(msg.contains("timebase_den"), "{msg}"),
            other => panic!("expected InvalidDescribe, got {:?}", other),
        }
    }

    #[test]
    fn reject_video_without_sub_object() {
        let mut json = video_json();
        json.as_object_mut().unwrap().remove("videoTrack");
        assert!(matches!(
            MediaTrack::from_json(&json),
            Err(OvtError::InvalidDescribe(_))
        ));
    }

    #[test]
    fn reject_audio_without_sub_object() {
        let mut json = audio_json();
        json.as_object_mut().unwrap().remove("audioTrack");
        assert!(matches!(
            MediaTrack::from_json(&json),
            Err(OvtError::InvalidDescribe(_))
        ));
    }

    #[test]
    fn reject_unrecognized_codec() {
        let mut json = video_json();
        json["codecId"] = Value::from(250);
        assert!(matches!(
            MediaTrack::from_json(&json),
            Err(OvtError::InvalidDescribe(_))
        ));
    }

    #[test]
    fn unknown_channel_mask_tolerated() {
        let mut json = audio_json();
        json["audioTrack"]["layout"] = Value::from(0x63F);
        let track = MediaTrack::from_json(&json).unwrap();
        match &track.params {
            TrackParams::Audio(a) => assert_eq!(a.channel_layout, ChannelLayout::Unknown),
            other => panic!("expected audio params, got {:?}", other),
        }
    }
}
