use crate::media::MediaFrame;

/// Identity of a pull stream, attached to every dispatched frame so the
/// router can demultiplex without holding a reference to the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    /// Application-issued stream id.
    pub id: u32,
    /// Human-readable stream name (used in logs and registry lookups).
    pub name: String,
}

/// Downstream consumer of reassembled media frames.
///
/// Dispatch is infallible by contract: the router owns any buffering or
/// drop policy, and the ingest worker never blocks on it. Frames for one
/// stream always arrive from a single thread, in completion order.
pub trait MediaRouter: Send + Sync {
    fn send_frame(&self, stream: &StreamHandle, frame: MediaFrame);
}
