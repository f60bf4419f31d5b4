//! Provider-side interfaces around a pull stream.
//!
//! The owning application manages stream lifecycles; a stream only borrows
//! the application's routing surface for the duration of its session. Two
//! narrow traits capture that relationship — no base-class hierarchy:
//!
//! - [`PullStream`]: what an application needs from a running stream
//!   (identity, state, tracks, stop).
//! - [`Application`]: what a stream needs from its owner (unique id
//!   issuance, lifecycle notifications, the frame router).
//!
//! [`StreamRegistry`] is a ready-made stream table for `Application`
//! implementors.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Result;
use crate::media::MediaTrack;
use crate::router::MediaRouter;
use crate::session::SessionState;

/// A running pull stream, as seen by its owning application.
pub trait PullStream: Send + Sync {
    /// Application-issued stream id.
    fn id(&self) -> u32;

    /// Stream name, unique within the application.
    fn name(&self) -> &str;

    /// Current session state.
    fn state(&self) -> SessionState;

    /// Tracks negotiated by Describe; empty before the handshake.
    fn tracks(&self) -> Vec<MediaTrack>;

    /// Request a graceful stop. Legal only while playing.
    fn stop(&self) -> Result<()>;
}

/// The owning application, as seen by a stream.
pub trait Application: Send + Sync {
    /// Issue a stream id unique within this application.
    fn issue_unique_stream_id(&self) -> u32;

    /// A stream finished its handshake and is delivering frames.
    fn notify_stream_created(&self, stream: Arc<dyn PullStream>);

    /// A stream ended (gracefully or on a fault) and left the table.
    fn notify_stream_deleted(&self, stream_id: u32);

    /// Downstream router that consumes the application's frames.
    fn router(&self) -> Arc<dyn MediaRouter>;
}

/// Thread-safe stream table with unique id issuance.
///
/// Streams register after a successful `Start` and deregister at teardown.
/// Terminal streams (`Stopped`/`Error`) stay in the table until reaped, so
/// an application can inspect why a stream ended.
#[derive(Clone)]
pub struct StreamRegistry {
    streams: Arc<RwLock<HashMap<u32, Arc<dyn PullStream>>>>,
    last_issued_id: Arc<AtomicU32>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            last_issued_id: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Issue the next unique stream id.
    pub fn issue_unique_stream_id(&self) -> u32 {
        self.last_issued_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register a stream under its id.
    pub fn register(&self, stream: Arc<dyn PullStream>) {
        let id = stream.id();
        self.streams.write().insert(id, stream);
        let total = self.streams.read().len();
        tracing::debug!(stream_id = id, total_streams = total, "stream registered");
    }

    /// Look up a stream by id.
    pub fn get_by_id(&self, id: u32) -> Option<Arc<dyn PullStream>> {
        self.streams.read().get(&id).cloned()
    }

    /// Look up a stream by name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn PullStream>> {
        self.streams
            .read()
            .values()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Remove and return a stream by id.
    pub fn remove(&self, id: u32) -> Option<Arc<dyn PullStream>> {
        let removed = self.streams.write().remove(&id);
        if removed.is_some() {
            tracing::debug!(stream_id = id, "stream removed");
        }
        removed
    }

    /// Remove every stream whose session has reached a terminal state.
    /// Returns how many were reaped.
    pub fn reap_terminated(&self) -> usize {
        let mut streams = self.streams.write();
        let before = streams.len();
        streams.retain(|_, s| {
            !matches!(s.state(), SessionState::Stopped | SessionState::Error)
        });
        let reaped = before - streams.len();
        if reaped > 0 {
            tracing::debug!(reaped, remaining = streams.len(), "reaped terminated streams");
        }
        reaped
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
