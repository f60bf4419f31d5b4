//! TCP transport to the OVT origin.
//!
//! OVT multiplexes everything — control requests, control replies, and
//! media — over one full-duplex TCP connection. The handshake drives it
//! synchronously from the orchestrator; after Play the ingest worker owns
//! the read side, while `stop()` writes the Stop request on a cloned
//! writer half. The socket is never read by two contexts.

pub mod tcp;

pub use tcp::{OriginConnection, OriginWriter};
