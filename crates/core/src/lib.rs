//! # ovt — OVT pull client for live media ingest
//!
//! A Rust library for pulling live media streams from an OVT origin.
//! OVT (Origin-to-Verify Transport) is a binary protocol over a single
//! full-duplex TCP connection carrying JSON control exchanges and
//! fragmented media payloads.
//!
//! ## Session lifecycle
//!
//! ```text
//! Idle ── connect ─→ Connected ── Describe ─→ Described ── Play ─→ Playing
//!                                                                    │
//!                                              Stop / remote stop ───┤
//!                                                                    ▼
//!                                                  Stopping ── ack ─→ Stopped
//! ```
//!
//! The handshake runs synchronously on the caller's thread. After Play,
//! a dedicated ingest worker owns the socket: it classifies incoming
//! packets, reassembles fragmented media frames per track and timestamp,
//! applies the H.264 Annex-B fix-up where needed, and dispatches each
//! completed frame to the downstream [`MediaRouter`].
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Application (registry, routing, metrics)     │
//! ├───────────────────────────────────────────────┤
//! │  OvtStream   — orchestrator + ingest worker   │
//! ├───────────────────────────────────────────────┤
//! │  Protocol    — packet codec, control JSON     │
//! │  Media       — tracks, depacketizer, Annex-B  │
//! │  Session     — lifecycle state machine        │
//! ├───────────────────────────────────────────────┤
//! │  Transport   — origin TCP, timeouts, counters │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ovt::{MediaFrame, MediaRouter, OvtStream, PullConfig, StreamHandle};
//!
//! struct PrintRouter;
//!
//! impl MediaRouter for PrintRouter {
//!     fn send_frame(&self, stream: &StreamHandle, frame: MediaFrame) {
//!         println!("{}: track {} frame of {} bytes", stream.name, frame.track_id, frame.payload.len());
//!     }
//! }
//!
//! let config = PullConfig::for_url("ovt://origin:9000/app/stream");
//! let stream = OvtStream::new(1, "stream", config, Arc::new(PrintRouter), None).unwrap();
//! stream.start().unwrap();
//! // ... frames flow to the router ...
//! stream.stop().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`stream`] — [`OvtStream`] orchestrator and the ingest worker.
//! - [`protocol`] — OVT packet framing and the control request/response engine.
//! - [`media`] — track descriptions, the depacketizer, Annex-B fix-up.
//! - [`session`] — [`SessionState`] and the guarded transition cell.
//! - [`transport`] — origin TCP connection with timeouts and byte counting.
//! - [`provider`] — application-facing traits and the stream registry.
//! - [`router`] / [`metrics`] — downstream collaborator interfaces.
//! - [`config`] — per-stream pull configuration.
//! - [`error`] — [`OvtError`] enum and [`Result`] alias.

pub mod config;
pub mod error;
pub mod media;
pub mod metrics;
pub mod protocol;
pub mod provider;
pub mod router;
pub mod session;
pub mod stream;
pub mod transport;

pub use config::PullConfig;
pub use error::{OvtError, Result};
pub use media::{CodecId, MediaFrame, MediaTrack, MediaType};
pub use metrics::StreamMetrics;
pub use provider::{Application, PullStream, StreamRegistry};
pub use router::{MediaRouter, StreamHandle};
pub use session::SessionState;
pub use stream::OvtStream;
