//! Integration tests: full OVT handshake and streaming against a scripted
//! loopback origin.
//!
//! Each test binds a TCP listener, scripts the origin side of the exchange
//! (Describe → Play → media / stop), and verifies the client's state
//! machine, frame dispatch, and failure handling.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use ovt::protocol::{HEADER_SIZE, MEDIA_PREAMBLE_SIZE, OvtPacket, PayloadType};
use ovt::{
    MediaFrame, MediaRouter, OvtError, OvtStream, PullConfig, SessionState, StreamHandle,
};

const SESSION_ID: u32 = 0xCAFEBABE;

/// Router that records every dispatched frame.
#[derive(Clone, Default)]
struct CollectingRouter {
    frames: Arc<Mutex<Vec<MediaFrame>>>,
}

impl MediaRouter for CollectingRouter {
    fn send_frame(&self, _stream: &StreamHandle, frame: MediaFrame) {
        self.frames.lock().push(frame);
    }
}

fn read_packet(stream: &mut TcpStream) -> OvtPacket {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).expect("origin read header");
    let mut packet = OvtPacket::parse_header(&header, 65_535).expect("origin parse header");
    let len = packet.payload_length() as usize;
    if len > 0 {
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).expect("origin read payload");
        packet.set_payload(payload);
    }
    packet
}

fn send_control(
    stream: &mut TcpStream,
    payload_type: PayloadType,
    session_id: u32,
    sequence: u16,
    marker: bool,
    body: &str,
) {
    let packet = OvtPacket::new(
        payload_type,
        session_id,
        sequence,
        marker,
        body.as_bytes().to_vec(),
    );
    stream.write_all(&packet.serialize()).expect("origin send");
}

fn send_media(
    stream: &mut TcpStream,
    sequence: u16,
    timestamp: u64,
    track_id: u32,
    flags: u8,
    marker: bool,
    fragment: &[u8],
) {
    let mut payload = Vec::with_capacity(MEDIA_PREAMBLE_SIZE + fragment.len());
    payload.extend_from_slice(&track_id.to_be_bytes());
    payload.push(flags);
    payload.extend_from_slice(fragment);
    let mut packet =
        OvtPacket::new(PayloadType::MediaPacket, SESSION_ID, sequence, marker, payload);
    packet.timestamp = timestamp;
    stream
        .write_all(&packet.serialize())
        .expect("origin send media");
}

/// One H.264 1920×1080 @ 30 fps video track and one AAC 48 kHz stereo
/// audio track.
fn describe_body(id: u32) -> String {
    format!(
        r#"{{
            "id": {id}, "code": 200, "message": "OK",
            "stream": {{
                "appName": "app", "streamName": "stream",
                "tracks": [
                    {{
                        "id": 1, "codecId": 1, "mediaType": 0,
                        "timebase_num": 1, "timebase_den": 90000, "bitrate": 2500000,
                        "startFrameTime": 0, "lastFrameTime": 0,
                        "videoTrack": {{ "framerate": 30.0, "width": 1920, "height": 1080 }}
                    }},
                    {{
                        "id": 2, "codecId": 5, "mediaType": 1,
                        "timebase_num": 1, "timebase_den": 48000, "bitrate": 128000,
                        "startFrameTime": 0, "lastFrameTime": 0,
                        "audioTrack": {{ "samplerate": 48000, "sampleFormat": 8, "layout": 3 }}
                    }}
                ]
            }}
        }}"#
    )
}

fn ok_body(id: u32) -> String {
    format!(r#"{{"id":{id},"code":200,"message":"OK"}}"#)
}

fn request_id(packet: &OvtPacket) -> u32 {
    let body: serde_json::Value =
        serde_json::from_slice(packet.payload()).expect("request body is JSON");
    body["id"].as_u64().expect("request id") as u32
}

/// Accept one connection and answer Describe and Play, then hand the
/// socket to `after_play`.
fn scripted_origin<F>(listener: TcpListener, after_play: F) -> JoinHandle<()>
where
    F: FnOnce(&mut TcpStream) + Send + 'static,
{
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("origin accept");

        let describe = read_packet(&mut stream);
        assert_eq!(describe.payload_type, PayloadType::Describe);
        assert_eq!(describe.session_id, 0);
        let id = request_id(&describe);
        // Split the reply across two packets; only the second is marked.
        let body = describe_body(id);
        let (head, tail) = body.as_bytes().split_at(body.len() / 2);
        send_control(
            &mut stream,
            PayloadType::DescribeResponse,
            0,
            0,
            false,
            std::str::from_utf8(head).unwrap(),
        );
        send_control(
            &mut stream,
            PayloadType::DescribeResponse,
            0,
            1,
            true,
            std::str::from_utf8(tail).unwrap(),
        );

        let play = read_packet(&mut stream);
        assert_eq!(play.payload_type, PayloadType::Play);
        let id = request_id(&play);
        send_control(
            &mut stream,
            PayloadType::PlayResponse,
            SESSION_ID,
            2,
            true,
            &ok_body(id),
        );

        after_play(&mut stream);
    })
}

fn pull_config(port: u16, recv_timeout: Duration) -> PullConfig {
    PullConfig {
        urls: vec![format!("ovt://127.0.0.1:{port}/app/stream")],
        recv_timeout,
        ..PullConfig::default()
    }
}

fn wait_for_state(stream: &OvtStream, expected: SessionState, deadline: Duration) {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if stream.state() == expected {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!(
        "state {:?} not reached, stuck at {:?}",
        expected,
        stream.state()
    );
}

#[test]
fn happy_path_media_then_remote_stop() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |stream| {
        // One video frame split across three packets at ts=1000.
        send_media(stream, 1, 1000, 1, 0x01, false, b"AAA");
        send_media(stream, 2, 1000, 1, 0x00, false, b"BBB");
        send_media(stream, 3, 1000, 1, 0x00, true, b"CCC");
        // Remote stop: ack correlated to the last control request (Play).
        send_control(stream, PayloadType::StopResponse, SESSION_ID, 4, true, &ok_body(2));
    });

    let router = CollectingRouter::default();
    let stream = OvtStream::new(
        1,
        "happy",
        pull_config(port, Duration::from_secs(3)),
        Arc::new(router.clone()),
        None,
    )
    .unwrap();

    stream.start().expect("start");
    assert_eq!(stream.session_id(), SESSION_ID);

    wait_for_state(&stream, SessionState::Stopped, Duration::from_secs(2));
    origin.join().unwrap();

    let frames = router.frames.lock();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.track_id, 1);
    assert_eq!(frame.pts, 1000);
    assert!(frame.is_keyframe());
    // H.264 track: the Annex-B fix-up ran before dispatch.
    assert_eq!(&frame.payload[..4], &[0, 0, 0, 1]);
    assert_eq!(&frame.payload[4..], b"AAABBBCCC");
}

#[test]
fn tracks_available_after_start() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |stream| {
        send_control(stream, PayloadType::StopResponse, SESSION_ID, 3, true, &ok_body(2));
    });

    let stream = OvtStream::new(
        1,
        "tracks",
        pull_config(port, Duration::from_secs(3)),
        Arc::new(CollectingRouter::default()),
        None,
    )
    .unwrap();
    stream.start().expect("start");

    use ovt::PullStream;
    let mut tracks = stream.tracks();
    tracks.sort_by_key(|t| t.id);
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].codec_id, ovt::CodecId::H264);
    assert_eq!(tracks[1].codec_id, ovt::CodecId::Aac);

    wait_for_state(&stream, SessionState::Stopped, Duration::from_secs(2));
    origin.join().unwrap();
}

#[test]
fn describe_server_failure_fails_start() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let describe = read_packet(&mut stream);
        let id = request_id(&describe);
        send_control(
            &mut stream,
            PayloadType::DescribeResponse,
            0,
            0,
            true,
            &format!(r#"{{"id":{id},"code":404,"message":"no such stream"}}"#),
        );
    });

    let router = CollectingRouter::default();
    let stream = OvtStream::new(
        1,
        "missing",
        pull_config(port, Duration::from_secs(3)),
        Arc::new(router.clone()),
        None,
    )
    .unwrap();

    let err = stream.start().unwrap_err();
    match err {
        OvtError::ServerFailure { code, message } => {
            assert_eq!(code, 404);
            assert_eq!(message, "no such stream");
        }
        other => panic!("expected ServerFailure, got {:?}", other),
    }
    assert_eq!(stream.state(), SessionState::Error);
    assert!(router.frames.lock().is_empty());
    origin.join().unwrap();
}

#[test]
fn describe_id_mismatch_fails_start() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = read_packet(&mut stream);
        // Request used id=1; answer with an uncorrelated id.
        send_control(
            &mut stream,
            PayloadType::DescribeResponse,
            0,
            0,
            true,
            r#"{"id":999,"code":200,"message":"OK"}"#,
        );
    });

    let stream = OvtStream::new(
        1,
        "mismatch",
        pull_config(port, Duration::from_secs(3)),
        Arc::new(CollectingRouter::default()),
        None,
    )
    .unwrap();

    let err = stream.start().unwrap_err();
    assert!(matches!(err, OvtError::InvalidResponse(_)), "{err:?}");
    assert_eq!(stream.state(), SessionState::Error);
    origin.join().unwrap();
}

#[test]
fn recv_timeout_mid_stream_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |_stream| {
        // Go silent after Play; keep the socket open past the timeout.
        thread::sleep(Duration::from_millis(900));
    });

    let router = CollectingRouter::default();
    let stream = OvtStream::new(
        1,
        "silent",
        pull_config(port, Duration::from_millis(300)),
        Arc::new(router.clone()),
        None,
    )
    .unwrap();

    stream.start().expect("start");
    wait_for_state(&stream, SessionState::Error, Duration::from_secs(2));
    assert!(router.frames.lock().is_empty());
    origin.join().unwrap();
}

#[test]
fn local_stop_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |stream| {
        let stop = read_packet(stream);
        assert_eq!(stop.payload_type, PayloadType::Stop);
        assert_eq!(stop.session_id, SESSION_ID);
        let id = request_id(&stop);
        assert_eq!(id, 3); // describe=1, play=2, stop=3
        send_control(stream, PayloadType::StopResponse, SESSION_ID, 3, true, &ok_body(id));
    });

    let stream = OvtStream::new(
        1,
        "stoppable",
        pull_config(port, Duration::from_secs(3)),
        Arc::new(CollectingRouter::default()),
        None,
    )
    .unwrap();

    stream.start().expect("start");
    assert_eq!(stream.state(), SessionState::Playing);

    stream.stop().expect("stop");
    assert_eq!(stream.state(), SessionState::Stopped);
    origin.join().unwrap();
}

#[test]
fn stop_rejected_unless_playing() {
    let stream = OvtStream::new(
        1,
        "idle",
        PullConfig::for_url("ovt://127.0.0.1:1/app/stream"),
        Arc::new(CollectingRouter::default()),
        None,
    )
    .unwrap();

    let err = stream.stop().unwrap_err();
    match err {
        OvtError::InvalidState { state, .. } => assert_eq!(state, SessionState::Idle),
        other => panic!("expected InvalidState, got {:?}", other),
    }
    // No side effect.
    assert_eq!(stream.state(), SessionState::Idle);
}

#[test]
fn unexpected_packet_type_mid_stream_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |stream| {
        // A Describe response with nothing outstanding is a protocol error.
        send_control(stream, PayloadType::DescribeResponse, SESSION_ID, 3, true, "{}");
        thread::sleep(Duration::from_millis(200));
    });

    let stream = OvtStream::new(
        1,
        "confused",
        pull_config(port, Duration::from_secs(3)),
        Arc::new(CollectingRouter::default()),
        None,
    )
    .unwrap();

    stream.start().expect("start");
    wait_for_state(&stream, SessionState::Error, Duration::from_secs(2));
    origin.join().unwrap();
}

#[test]
fn wrong_session_id_mid_stream_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |stream| {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.push(0);
        payload.extend_from_slice(b"xx");
        let packet = OvtPacket::new(PayloadType::MediaPacket, 0xDEAD, 1, true, payload);
        stream.write_all(&packet.serialize()).unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let router = CollectingRouter::default();
    let stream = OvtStream::new(
        1,
        "hijacked",
        pull_config(port, Duration::from_secs(3)),
        Arc::new(router.clone()),
        None,
    )
    .unwrap();

    stream.start().expect("start");
    wait_for_state(&stream, SessionState::Error, Duration::from_secs(2));
    assert!(router.frames.lock().is_empty());
    origin.join().unwrap();
}

#[test]
fn non_h264_frames_bypass_annex_b_fixup() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |stream| {
        // Track 2 is AAC: the payload must arrive untouched.
        send_media(stream, 1, 2000, 2, 0x00, true, b"aac-frame");
        send_control(stream, PayloadType::StopResponse, SESSION_ID, 2, true, &ok_body(2));
    });

    let router = CollectingRouter::default();
    let stream = OvtStream::new(
        1,
        "audio",
        pull_config(port, Duration::from_secs(3)),
        Arc::new(router.clone()),
        None,
    )
    .unwrap();

    stream.start().expect("start");
    wait_for_state(&stream, SessionState::Stopped, Duration::from_secs(2));
    origin.join().unwrap();

    let frames = router.frames.lock();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].track_id, 2);
    assert_eq!(frames[0].payload, b"aac-frame");
}

#[test]
fn failover_to_second_url() {
    // First URL points at a port with no listener.
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let live_port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |stream| {
        send_control(stream, PayloadType::StopResponse, SESSION_ID, 3, true, &ok_body(2));
    });

    let config = PullConfig {
        urls: vec![
            format!("ovt://127.0.0.1:{dead_port}/app/stream"),
            format!("ovt://127.0.0.1:{live_port}/app/stream"),
        ],
        ..PullConfig::default()
    };
    let stream =
        OvtStream::new(1, "failover", config, Arc::new(CollectingRouter::default()), None)
            .unwrap();

    stream.start().expect("start via second url");
    wait_for_state(&stream, SessionState::Stopped, Duration::from_secs(2));
    origin.join().unwrap();
}

#[test]
fn non_ovt_scheme_rejected() {
    let stream = OvtStream::new(
        1,
        "web",
        PullConfig::for_url("http://127.0.0.1:8080/app/stream"),
        Arc::new(CollectingRouter::default()),
        None,
    )
    .unwrap();

    let err = stream.start().unwrap_err();
    assert!(matches!(err, OvtError::InvalidUrl(_)), "{err:?}");
    assert_eq!(stream.state(), SessionState::Error);
}

#[test]
fn uppercase_ovt_scheme_accepted() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let origin = scripted_origin(listener, |stream| {
        send_control(stream, PayloadType::StopResponse, SESSION_ID, 3, true, &ok_body(2));
    });

    let stream = OvtStream::new(
        1,
        "shouty",
        PullConfig {
            urls: vec![format!("OVT://127.0.0.1:{port}/app/stream")],
            ..PullConfig::default()
        },
        Arc::new(CollectingRouter::default()),
        None,
    )
    .unwrap();

    stream.start().expect("uppercase scheme accepted");
    wait_for_state(&stream, SessionState::Stopped, Duration::from_secs(2));
    origin.join().unwrap();
}

#[test]
fn empty_url_list_rejected() {
    let err = OvtStream::new(
        1,
        "unconfigured",
        PullConfig::default(),
        Arc::new(CollectingRouter::default()),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, OvtError::InvalidUrl(_)), "{err:?}");
}
