use serde_json::Value;

use crate::error::{OvtError, Result};
use crate::media::track::MediaTrack;

/// A validated control response (Describe, Play, or Stop reply).
///
/// Responses are JSON objects with required `id`, `code`, and `message`
/// keys. Validation is strict: a missing or wrong-typed key rejects the
/// response, an `id` that does not echo the request rejects it, and any
/// `code` other than 200 maps to [`OvtError::ServerFailure`].
#[derive(Debug, Clone)]
pub struct ControlResponse {
    pub id: u32,
    pub code: u32,
    pub message: String,
    /// Full response object, kept for payload-specific keys (`stream`, ...).
    body: Value,
}

impl ControlResponse {
    /// Parse a response body, checking the required keys.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let body: Value = serde_json::from_slice(payload)
            .map_err(|e| OvtError::InvalidResponse(format!("not a JSON object: {e}")))?;

        let id = body
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| OvtError::InvalidResponse("missing uint key \"id\"".into()))?;
        let code = body
            .get("code")
            .and_then(Value::as_u64)
            .ok_or_else(|| OvtError::InvalidResponse("missing uint key \"code\"".into()))?;
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| OvtError::InvalidResponse("missing key \"message\"".into()))?
            .to_string();

        Ok(Self {
            id: id as u32,
            code: code as u32,
            message,
            body,
        })
    }

    /// Check id correlation and the result code.
    ///
    /// Control exchanges are strictly synchronous, so the response id must
    /// equal the single in-flight request id.
    pub fn validate(&self, request_id: u32) -> Result<()> {
        if self.id != request_id {
            return Err(OvtError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                self.id, request_id
            )));
        }
        if self.code != 200 {
            return Err(OvtError::ServerFailure {
                code: self.code,
                message: self.message.clone(),
            });
        }
        Ok(())
    }

    /// Parse and validate in one step.
    pub fn parse_validated(payload: &[u8], request_id: u32) -> Result<Self> {
        let response = Self::parse(payload)?;
        response.validate(request_id)?;
        Ok(response)
    }

    /// Interpret this response as a Describe reply, extracting the stream
    /// description.
    pub fn into_describe(self) -> Result<DescribeResponse> {
        DescribeResponse::from_body(&self.body)
    }
}

/// The stream description carried by a successful Describe reply.
#[derive(Debug, Clone)]
pub struct DescribeResponse {
    pub app_name: String,
    pub stream_name: String,
    pub tracks: Vec<MediaTrack>,
}

impl DescribeResponse {
    fn from_body(body: &Value) -> Result<Self> {
        let stream = body
            .get("stream")
            .filter(|v| !v.is_null())
            .ok_or_else(|| OvtError::InvalidResponse("missing key \"stream\"".into()))?;

        let app_name = stream
            .get("appName")
            .and_then(Value::as_str)
            .ok_or_else(|| OvtError::InvalidDescribe("missing stream.appName".into()))?
            .to_string();
        let stream_name = stream
            .get("streamName")
            .and_then(Value::as_str)
            .ok_or_else(|| OvtError::InvalidDescribe("missing stream.streamName".into()))?
            .to_string();
        let json_tracks = stream
            .get("tracks")
            .and_then(Value::as_array)
            .ok_or_else(|| OvtError::InvalidDescribe("stream.tracks is not an array".into()))?;

        let mut tracks = Vec::with_capacity(json_tracks.len());
        for (index, json_track) in json_tracks.iter().enumerate() {
            let track = MediaTrack::from_json(json_track)
                .map_err(|e| OvtError::InvalidDescribe(format!("track [{index}]: {e}")))?;
            if tracks.iter().any(|t: &MediaTrack| t.id == track.id) {
                return Err(OvtError::InvalidDescribe(format!(
                    "duplicate track id {}",
                    track.id
                )));
            }
            tracks.push(track);
        }

        Ok(Self {
            app_name,
            stream_name,
            tracks,
        })
    }
}
