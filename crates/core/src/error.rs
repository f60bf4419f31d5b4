//! Error types for the OVT pull client.

use std::fmt;

use crate::session::SessionState;

/// Errors that can occur while pulling a stream from an OVT origin.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Setup**: [`InvalidUrl`](Self::InvalidUrl),
///   [`ConnectFailed`](Self::ConnectFailed) — `Start` fails and the next
///   configured URL may be tried.
/// - **Transport**: [`SendFailed`](Self::SendFailed),
///   [`RecvFailed`](Self::RecvFailed) — socket faults and receive timeouts.
/// - **Wire**: [`InvalidHeader`](Self::InvalidHeader) — a packet header that
///   cannot be trusted; the connection is closed.
/// - **Control**: [`InvalidResponse`](Self::InvalidResponse),
///   [`ServerFailure`](Self::ServerFailure),
///   [`InvalidDescribe`](Self::InvalidDescribe) — handshake replies that are
///   malformed or negative.
/// - **Streaming**: [`ProtocolError`](Self::ProtocolError) — an unexpected
///   packet mid-stream; the ingest worker exits.
/// - **Lifecycle**: [`InvalidState`](Self::InvalidState) — a control
///   operation invoked outside its legal source state; no side effect.
#[derive(Debug, thiserror::Error)]
pub enum OvtError {
    /// URL could not be parsed, has a non-`ovt` scheme, or the list is empty.
    #[error("invalid origin url: {0}")]
    InvalidUrl(String),

    /// TCP connect to the origin failed or timed out.
    #[error("cannot connect to origin {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// A packet could not be sent in full.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Socket error, connection close, or receive timeout.
    #[error("receive failed: {0}")]
    RecvFailed(String),

    /// A packet header failed validation.
    #[error("invalid packet header: {kind}")]
    InvalidHeader { kind: HeaderErrorKind },

    /// A control response was malformed: missing or wrong-typed JSON keys,
    /// or a response id that does not match the request.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The origin answered a control request with a non-200 code.
    #[error("server failure: {code} ({message})")]
    ServerFailure { code: u32, message: String },

    /// The Describe reply carried a malformed track list.
    #[error("invalid describe: {0}")]
    InvalidDescribe(String),

    /// An unexpected packet type or session id arrived mid-stream.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A control operation was invoked outside its expected source state.
    #[error("{operation} not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

/// Specific kind of OVT header validation failure.
#[derive(Debug, PartialEq, Eq)]
pub enum HeaderErrorKind {
    /// Fewer bytes than the fixed header size.
    Truncated,
    /// Header `version` field does not match [`crate::protocol::OVT_VERSION`].
    VersionMismatch,
    /// `payload_length` exceeds the configured maximum packet size.
    PayloadTooLarge,
    /// `payload_type` code is not a known payload type.
    UnknownPayloadType,
}

impl fmt::Display for HeaderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated header"),
            Self::VersionMismatch => write!(f, "version mismatch"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::UnknownPayloadType => write!(f, "unknown payload type"),
        }
    }
}

impl OvtError {
    /// Whether `Start` may retry this failure against the next configured URL.
    ///
    /// Only pre-handshake failures are retriable; once a request has been
    /// sent, a failure is final for the session.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::InvalidUrl(_) | Self::ConnectFailed { .. })
    }
}

/// Convenience alias for `Result<T, OvtError>`.
pub type Result<T> = std::result::Result<T, OvtError>;
