use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::Parser;

use ovt::{
    MediaFrame, MediaRouter, OvtStream, PullConfig, SessionState, StreamHandle, StreamMetrics,
};

#[derive(Parser)]
#[command(
    name = "ovt-pull",
    about = "Pull a live stream from an OVT origin and log the frames"
)]
struct Args {
    /// Origin URL(s) in failover order (ovt://host:port/app/stream)
    #[arg(required = true)]
    urls: Vec<String>,

    /// Stream name used in logs
    #[arg(long, short, default_value = "pull")]
    name: String,

    /// TCP connect timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    connect_timeout_ms: u64,

    /// Receive timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    recv_timeout_ms: u64,
}

/// Router that logs every frame instead of forwarding it.
struct LogRouter;

impl MediaRouter for LogRouter {
    fn send_frame(&self, stream: &StreamHandle, frame: MediaFrame) {
        tracing::info!(
            stream = %stream.name,
            track_id = frame.track_id,
            pts = frame.pts,
            bytes = frame.payload.len(),
            keyframe = frame.is_keyframe(),
            "frame"
        );
    }
}

/// Byte counter reported when the session ends.
#[derive(Default)]
struct ByteCounter {
    bytes_in: AtomicU64,
}

impl StreamMetrics for ByteCounter {
    fn set_origin_request_time_msec(&self, elapsed: f64) {
        tracing::info!(elapsed_ms = elapsed, "origin connect time");
    }

    fn set_origin_response_time_msec(&self, elapsed: f64) {
        tracing::info!(elapsed_ms = elapsed, "origin handshake time");
    }

    fn increase_bytes_in(&self, bytes: u64) {
        self.bytes_in.fetch_add(bytes, Ordering::Relaxed);
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = PullConfig {
        urls: args.urls,
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        recv_timeout: Duration::from_millis(args.recv_timeout_ms),
        ..PullConfig::default()
    };

    let metrics = Arc::new(ByteCounter::default());
    let stream = match OvtStream::new(1, &args.name, config, Arc::new(LogRouter), Some(metrics.clone()))
    {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = stream.start() {
        eprintln!("Failed to start stream: {e}");
        std::process::exit(1);
    }

    println!("Pulling {} — press Enter to stop", args.name);
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    if stream.state() == SessionState::Playing {
        if let Err(e) = stream.stop() {
            eprintln!("Stop failed: {e}");
        }
    }

    println!(
        "Done. {} bytes received, final state {:?}",
        metrics.bytes_in.load(Ordering::Relaxed),
        stream.state()
    );
}
