use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use url::Url;

use crate::config::PullConfig;
use crate::error::{OvtError, Result};
use crate::media::{AvcAnnexBFramer, CodecId, Depacketizer, MediaTrack};
use crate::metrics::StreamMetrics;
use crate::protocol::{ControlRequest, ControlResponse, PayloadType};
use crate::provider::PullStream;
use crate::router::{MediaRouter, StreamHandle};
use crate::session::{SessionState, SharedState};
use crate::transport::{OriginConnection, OriginWriter};

/// A pull stream: one origin session, from connect to teardown.
///
/// [`start`](Self::start) runs the handshake synchronously on the caller's
/// thread — connect, Describe, Play — then hands the connection to a
/// dedicated ingest worker thread that reassembles media packets and
/// dispatches frames to the router. [`stop`](Self::stop) sends the Stop
/// request on a cloned writer half and joins the worker within a bounded
/// grace period.
///
/// When several origin URLs are configured, `start` tries them in order
/// until one gets past the connect phase. Once a request has been sent to
/// an origin, failures are final — there is no mid-session failover.
pub struct OvtStream {
    handle: StreamHandle,
    config: PullConfig,
    urls: Vec<Url>,
    state: SharedState,
    last_request_id: Arc<AtomicU32>,
    send_sequence: AtomicU16,
    session_id: AtomicU32,
    tracks: RwLock<Arc<HashMap<u32, MediaTrack>>>,
    current_url: Mutex<Option<Url>>,
    router: Arc<dyn MediaRouter>,
    metrics: Option<Arc<dyn StreamMetrics>>,
    stop_flag: Arc<AtomicBool>,
    writer: Mutex<Option<OriginWriter>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for OvtStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OvtStream").finish_non_exhaustive()
    }
}

impl OvtStream {
    /// Create a stream for the configured URL list.
    ///
    /// Fails with [`OvtError::InvalidUrl`] when the list is empty or any
    /// entry does not parse — a stream that could never start is rejected
    /// up front.
    pub fn new(
        id: u32,
        name: &str,
        config: PullConfig,
        router: Arc<dyn MediaRouter>,
        metrics: Option<Arc<dyn StreamMetrics>>,
    ) -> Result<Self> {
        if config.urls.is_empty() {
            return Err(OvtError::InvalidUrl("no origin urls configured".into()));
        }
        let mut urls = Vec::with_capacity(config.urls.len());
        for raw in &config.urls {
            let url = Url::parse(raw).map_err(|e| OvtError::InvalidUrl(format!("{raw}: {e}")))?;
            urls.push(url);
        }

        Ok(Self {
            handle: StreamHandle {
                id,
                name: name.to_string(),
            },
            config,
            urls,
            state: SharedState::new(),
            last_request_id: Arc::new(AtomicU32::new(0)),
            send_sequence: AtomicU16::new(0),
            session_id: AtomicU32::new(0),
            tracks: RwLock::new(Arc::new(HashMap::new())),
            current_url: Mutex::new(None),
            router,
            metrics,
            stop_flag: Arc::new(AtomicBool::new(false)),
            writer: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Connect to the origin, run Describe and Play, and spawn the ingest
    /// worker.
    ///
    /// URLs are tried in order; a connect-phase failure advances to the
    /// next URL, any failure after the first request is final. On success
    /// the session is `Playing` and frames flow to the router until the
    /// origin stops, a fault occurs, or [`stop`](Self::stop) is called.
    pub fn start(&self) -> Result<()> {
        let mut last_error = OvtError::InvalidUrl("no origin urls configured".into());
        for (attempt, url) in self.urls.iter().enumerate() {
            match self.start_with(url) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retriable() && attempt + 1 < self.urls.len() => {
                    tracing::warn!(
                        stream = %self.handle.name,
                        url = %url,
                        error = %e,
                        "origin unreachable, trying next url"
                    );
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    fn start_with(&self, url: &Url) -> Result<()> {
        let begin = Instant::now();
        let mut conn = self.connect_origin(url)?;
        let origin_request_time = begin.elapsed().as_secs_f64() * 1000.0;

        let begin = Instant::now();
        let describe = self.request_describe(&mut conn, url)?;
        let session_id = self.request_play(&mut conn, url)?;
        let origin_response_time = begin.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            stream = %self.handle.name,
            app = %describe.app_name,
            origin_stream = %describe.stream_name,
            tracks = describe.tracks.len(),
            session_id = format_args!("{:#010X}", session_id),
            "origin session established"
        );

        let writer = conn.writer().inspect_err(|_| self.state.set_error())?;
        *self.writer.lock() = Some(writer);

        let worker = IngestWorker {
            handle: self.handle.clone(),
            conn,
            depacketizer: Depacketizer::new(session_id, self.config.max_inflight_frames),
            tracks: self.tracks.read().clone(),
            router: self.router.clone(),
            state: self.state.clone(),
            last_request_id: self.last_request_id.clone(),
            session_id,
            stop_flag: self.stop_flag.clone(),
        };
        *self.worker.lock() = Some(thread::spawn(move || worker.run()));

        if let Some(metrics) = &self.metrics {
            metrics.set_origin_request_time_msec(origin_request_time);
            metrics.set_origin_response_time_msec(origin_response_time);
        }

        Ok(())
    }

    /// Validate the URL scheme and open the TCP connection.
    fn connect_origin(&self, url: &Url) -> Result<OriginConnection> {
        let state = self.state.get();
        if state != SessionState::Idle && state != SessionState::Error {
            return Err(OvtError::InvalidState {
                operation: "connect",
                state,
            });
        }

        if !url.scheme().eq_ignore_ascii_case("ovt") {
            self.state.set_error();
            return Err(OvtError::InvalidUrl(format!(
                "scheme {:?} is not ovt",
                url.scheme()
            )));
        }
        let host = url.host_str().ok_or_else(|| {
            self.state.set_error();
            OvtError::InvalidUrl(format!("{url}: missing host"))
        })?;
        let port = url.port().ok_or_else(|| {
            self.state.set_error();
            OvtError::InvalidUrl(format!("{url}: missing port"))
        })?;

        let conn = OriginConnection::connect(
            host,
            port,
            self.config.connect_timeout,
            self.config.recv_timeout,
            self.config.max_packet_size,
            self.metrics.clone(),
        )
        .inspect_err(|e| {
            self.state.set_error();
            tracing::error!(stream = %self.handle.name, url = %url, error = %e, "connect failed");
        })?;

        self.state.transition(SessionState::Connected, "connect")?;
        *self.current_url.lock() = Some(url.clone());
        Ok(conn)
    }

    /// Send Describe and parse the track list from the reply message.
    fn request_describe(
        &self,
        conn: &mut OriginConnection,
        url: &Url,
    ) -> Result<crate::protocol::DescribeResponse> {
        self.ensure_state(SessionState::Connected, "describe")?;

        let request_id = self.next_request_id();
        let packet = ControlRequest::new(request_id, url.as_str())
            .into_packet(PayloadType::Describe, 0, self.next_sequence())
            .inspect_err(|_| self.state.set_error())?;
        conn.send_packet(&packet).inspect_err(|e| {
            self.state.set_error();
            tracing::error!(stream = %self.handle.name, error = %e, "could not send Describe");
        })?;

        let message = conn.receive_message().inspect_err(|e| {
            self.state.set_error();
            tracing::error!(stream = %self.handle.name, error = %e, "no Describe reply");
        })?;
        let describe = ControlResponse::parse_validated(&message, request_id)
            .and_then(ControlResponse::into_describe)
            .inspect_err(|e| {
                self.state.set_error();
                tracing::error!(stream = %self.handle.name, error = %e, "Describe rejected");
            })?;

        let by_id: HashMap<u32, MediaTrack> =
            describe.tracks.iter().map(|t| (t.id, t.clone())).collect();
        *self.tracks.write() = Arc::new(by_id);

        self.state.transition(SessionState::Described, "describe")?;
        Ok(describe)
    }

    /// Send Play and record the session id from the reply packet header.
    ///
    /// Unlike Describe, the reply is taken from a single packet: the
    /// origin assigns the session id in the OVT header itself.
    fn request_play(&self, conn: &mut OriginConnection, url: &Url) -> Result<u32> {
        self.ensure_state(SessionState::Described, "play")?;

        let request_id = self.next_request_id();
        let packet = ControlRequest::new(request_id, url.as_str())
            .into_packet(PayloadType::Play, 0, self.next_sequence())
            .inspect_err(|_| self.state.set_error())?;
        conn.send_packet(&packet).inspect_err(|e| {
            self.state.set_error();
            tracing::error!(stream = %self.handle.name, error = %e, "could not send Play");
        })?;

        let reply = conn.receive_packet().inspect_err(|e| {
            self.state.set_error();
            tracing::error!(stream = %self.handle.name, error = %e, "no Play reply");
        })?;
        ControlResponse::parse_validated(reply.payload(), request_id).inspect_err(|e| {
            self.state.set_error();
            tracing::error!(stream = %self.handle.name, error = %e, "Play rejected");
        })?;

        let session_id = reply.session_id;
        self.session_id.store(session_id, Ordering::SeqCst);
        self.state.transition(SessionState::Playing, "play")?;
        Ok(session_id)
    }

    /// Request a graceful stop and join the ingest worker.
    ///
    /// Legal only while `Playing`. The Stop request goes out on the writer
    /// half; the worker observes the origin's `StopResponse` (or the
    /// connection closing) and transitions to `Stopped` within one receive
    /// timeout. The join is bounded by the configured grace period.
    pub fn stop(&self) -> Result<()> {
        self.state.transition(SessionState::Stopping, "stop")?;
        self.stop_flag.store(true, Ordering::SeqCst);

        let send_result = match self.current_url.lock().clone() {
            Some(url) => {
                let request_id = self.next_request_id();
                ControlRequest::new(request_id, url.as_str())
                    .into_packet(
                        PayloadType::Stop,
                        self.session_id.load(Ordering::SeqCst),
                        self.next_sequence(),
                    )
                    .and_then(|packet| match self.writer.lock().as_mut() {
                        Some(writer) => writer.send_packet(&packet),
                        None => Err(OvtError::SendFailed("no writer for stop".into())),
                    })
            }
            None => Err(OvtError::SendFailed("no current url for stop".into())),
        };
        if let Err(e) = send_result {
            // The worker still unblocks at its receive timeout and sees the
            // stop flag, so teardown proceeds; the session just isn't clean.
            tracing::warn!(stream = %self.handle.name, error = %e, "could not send Stop");
        }

        self.join_worker();
        Ok(())
    }

    fn join_worker(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let deadline = Instant::now() + self.config.stop_grace;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            tracing::warn!(
                stream = %self.handle.name,
                grace = ?self.config.stop_grace,
                "ingest worker did not exit within the grace period"
            );
        }
    }

    fn ensure_state(&self, expected: SessionState, operation: &'static str) -> Result<()> {
        let state = self.state.get();
        if state != expected {
            return Err(OvtError::InvalidState { operation, state });
        }
        Ok(())
    }

    fn next_request_id(&self) -> u32 {
        self.last_request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_sequence(&self) -> u16 {
        self.send_sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Session id assigned by Play; 0 before the handshake completes.
    pub fn session_id(&self) -> u32 {
        self.session_id.load(Ordering::SeqCst)
    }

    /// Stream identity used for frame dispatch.
    pub fn stream_handle(&self) -> &StreamHandle {
        &self.handle
    }
}

impl PullStream for OvtStream {
    fn id(&self) -> u32 {
        self.handle.id
    }

    fn name(&self) -> &str {
        &self.handle.name
    }

    fn state(&self) -> SessionState {
        OvtStream::state(self)
    }

    fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.read().values().cloned().collect()
    }

    fn stop(&self) -> Result<()> {
        OvtStream::stop(self)
    }
}

impl Drop for OvtStream {
    fn drop(&mut self) {
        // Best effort: an owner dropping a playing stream still gets a
        // clean origin-side teardown. Terminal states make stop a no-op.
        if self.state.get() == SessionState::Playing {
            let _ = self.stop();
        }
    }
}

/// Owner of the connection after Play: receives packets, reassembles
/// frames, and dispatches them until the session ends.
struct IngestWorker {
    handle: StreamHandle,
    conn: OriginConnection,
    depacketizer: Depacketizer,
    tracks: Arc<HashMap<u32, MediaTrack>>,
    router: Arc<dyn MediaRouter>,
    state: SharedState,
    last_request_id: Arc<AtomicU32>,
    session_id: u32,
    stop_flag: Arc<AtomicBool>,
}

impl IngestWorker {
    fn run(mut self) {
        let reason = self.ingest_loop();
        self.depacketizer.discard_inflight();
        tracing::info!(
            stream = %self.handle.name,
            reason,
            final_state = ?self.state.get(),
            "ingest worker exited"
        );
        // The connection drops with the worker, releasing the socket.
    }

    /// Packet receive/classify loop. Returns the reason for exiting.
    fn ingest_loop(&mut self) -> &'static str {
        loop {
            let packet = match self.conn.receive_packet() {
                Ok(packet) => packet,
                Err(e) => {
                    // After a stop request, the origin closing (or going
                    // quiet past the receive timeout) completes teardown.
                    if self.stop_flag.load(Ordering::SeqCst) {
                        let _ = self.state.transition(SessionState::Stopped, "stop teardown");
                        return "connection ended after stop";
                    }
                    tracing::error!(
                        stream = %self.handle.name,
                        error = %e,
                        "receive failed, terminating stream"
                    );
                    self.state.set_error();
                    return "receive failure";
                }
            };

            match packet.payload_type {
                PayloadType::StopResponse => {
                    let request_id = self.last_request_id.load(Ordering::SeqCst);
                    match ControlResponse::parse_validated(packet.payload(), request_id) {
                        Ok(_) => {
                            let _ = self.state.transition(SessionState::Stopped, "stop ack");
                            return "stopped gracefully";
                        }
                        Err(e) => {
                            tracing::error!(
                                stream = %self.handle.name,
                                error = %e,
                                "invalid stop response"
                            );
                            self.state.set_error();
                            return "invalid stop response";
                        }
                    }
                }
                PayloadType::MediaPacket => {
                    if packet.session_id != self.session_id {
                        tracing::error!(
                            stream = %self.handle.name,
                            got = format_args!("{:#010X}", packet.session_id),
                            expected = format_args!("{:#010X}", self.session_id),
                            "media packet for wrong session"
                        );
                        self.state.set_error();
                        return "unexpected session id";
                    }
                    if let Err(e) = self.depacketizer.append_packet(&packet) {
                        tracing::error!(
                            stream = %self.handle.name,
                            error = %e,
                            "media reassembly failed"
                        );
                        self.state.set_error();
                        return "reassembly protocol error";
                    }
                    self.dispatch_completed();
                }
                other => {
                    tracing::error!(
                        stream = %self.handle.name,
                        payload_type = ?other,
                        "unexpected packet while streaming"
                    );
                    self.state.set_error();
                    return "unexpected packet type";
                }
            }
        }
    }

    /// Forward every completed frame to the router, fixing up H.264
    /// payloads to Annex-B on the way.
    fn dispatch_completed(&mut self) {
        while let Some(mut frame) = self.depacketizer.pop_media_frame() {
            let Some(track) = self.tracks.get(&frame.track_id) else {
                tracing::warn!(
                    stream = %self.handle.name,
                    track_id = frame.track_id,
                    "frame for undescribed track, dropped"
                );
                continue;
            };
            if track.codec_id == CodecId::H264 {
                AvcAnnexBFramer::prepend_header(&mut frame);
            }
            tracing::trace!(
                stream = %self.handle.name,
                track_id = frame.track_id,
                pts = frame.pts,
                bytes = frame.payload.len(),
                keyframe = frame.is_keyframe(),
                "frame dispatched"
            );
            self.router.send_frame(&self.handle, frame);
        }
    }
}
