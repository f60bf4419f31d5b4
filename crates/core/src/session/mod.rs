//! Pull-session lifecycle.
//!
//! A session is the lifetime of one origin connection, from connect through
//! the Describe/Play handshake to streaming and teardown:
//!
//! ```text
//! Idle ── connect ─→ Connected ── describe ─→ Described ── play ─→ Playing
//!                                                                     │
//!                                             stop() / remote stop ───┤
//!                                                                     ▼
//!                                                   Stopping ── ack ─→ Stopped
//! any state ──(fatal I/O or protocol error)─→ Error
//! ```
//!
//! `Error` absorbs everything except final teardown to `Stopped`, and a
//! failed connect attempt may retry from `Error` (URL failover between
//! `Start` attempts). `Stopped` is terminal.
//!
//! At most one context writes the state at a time — the orchestrator during
//! the handshake, the ingest worker while streaming, and whichever context
//! calls stop during teardown — but status queries may come from anywhere,
//! so the cell is lock-guarded.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{OvtError, Result};

/// Phase of a pull session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection yet.
    Idle,
    /// TCP connection to the origin is up.
    Connected,
    /// Describe succeeded; tracks are known.
    Described,
    /// Play succeeded; the ingest worker owns the socket.
    Playing,
    /// Stop sent; waiting for the origin's ack.
    Stopping,
    /// Session ended gracefully. Terminal.
    Stopped,
    /// Session ended on a fault. Terminal except for teardown.
    Error,
}

impl SessionState {
    /// Whether `self → to` is on the legal transition graph.
    fn allows(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Connected)
                | (Error, Connected) // reconnect attempt / URL failover
                | (Connected, Described)
                | (Described, Playing)
                | (Playing, Stopping)
                | (Playing, Stopped) // remote stop without a local stop()
                | (Stopping, Stopped)
                | (Error, Stopped) // teardown
        )
    }
}

/// Shared, lock-guarded session state cell.
///
/// Every transition goes through [`transition`](Self::transition) (or
/// [`set_error`](Self::set_error) for the fault path), so the legality of
/// the lifecycle graph is enforced in one place.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<RwLock<SessionState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState::Idle)),
        }
    }

    /// Current state.
    pub fn get(&self) -> SessionState {
        *self.inner.read()
    }

    /// Move to `to`, rejecting transitions outside the lifecycle graph.
    ///
    /// On rejection the state is left untouched and the caller receives
    /// [`OvtError::InvalidState`] naming the attempted operation.
    pub fn transition(&self, to: SessionState, operation: &'static str) -> Result<()> {
        let mut state = self.inner.write();
        if !state.allows(to) {
            return Err(OvtError::InvalidState {
                operation,
                state: *state,
            });
        }
        tracing::debug!(from = ?*state, to = ?to, operation, "state transition");
        *state = to;
        Ok(())
    }

    /// Fault path: any state may collapse to `Error`.
    pub fn set_error(&self) {
        let mut state = self.inner.write();
        if *state != SessionState::Error {
            tracing::debug!(from = ?*state, "state transition to Error");
            *state = SessionState::Error;
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
