use std::time::Duration;

/// Default TCP connect timeout (1 s).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default per-receive timeout (3 s). A timeout while streaming is fatal.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default maximum packet payload size accepted from the origin.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 65_535;

/// Default bound on concurrently reassembling media frames.
pub const DEFAULT_MAX_INFLIGHT_FRAMES: usize = 64;

/// Default grace period for joining the ingest worker during `stop()`.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Per-stream pull configuration.
///
/// `urls` must contain at least one `ovt://host:port/app/stream` URL.
/// Additional URLs are failover candidates: `Start` tries them in order
/// when connecting fails, but never switches origin mid-session.
#[derive(Debug, Clone)]
pub struct PullConfig {
    /// Origin URLs in failover order (scheme must be `ovt`).
    pub urls: Vec<String>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Receive timeout applied to every socket read.
    pub recv_timeout: Duration,
    /// Maximum accepted `payload_length`; larger headers are rejected
    /// before any payload byte is consumed.
    pub max_packet_size: usize,
    /// Bound on open reassembly entries; the oldest entry is evicted
    /// when a new frame would exceed it.
    pub max_inflight_frames: usize,
    /// How long `stop()` waits for the ingest worker to exit.
    pub stop_grace: Duration,
}

impl PullConfig {
    /// Configuration for a single origin URL with default timeouts.
    pub fn for_url(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            ..Self::default()
        }
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_inflight_frames: DEFAULT_MAX_INFLIGHT_FRAMES,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PullConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.recv_timeout, Duration::from_secs(3));
        assert_eq!(config.max_packet_size, 65_535);
        assert_eq!(config.max_inflight_frames, 64);
        assert!(config.urls.is_empty());
    }

    #[test]
    fn for_url_single_entry() {
        let config = PullConfig::for_url("ovt://origin:9000/app/stream");
        assert_eq!(config.urls, vec!["ovt://origin:9000/app/stream"]);
        assert_eq!(config.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
    }
}
