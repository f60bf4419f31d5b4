/// Sink for per-stream transport statistics.
///
/// Optional: a stream without a metrics sink skips reporting entirely.
/// Implementations must tolerate concurrent calls — timing setters arrive
/// from the orchestrator during `Start`, byte counters from the ingest
/// worker on every socket read.
pub trait StreamMetrics: Send + Sync {
    /// Time spent establishing the origin TCP connection, in milliseconds.
    fn set_origin_request_time_msec(&self, elapsed: f64);

    /// Time spent on the Describe + Play exchange, in milliseconds.
    fn set_origin_response_time_msec(&self, elapsed: f64);

    /// Bytes consumed from the origin socket since the last call.
    fn increase_bytes_in(&self, bytes: u64);
}
