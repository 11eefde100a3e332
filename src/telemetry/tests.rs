use super::*;
use base64::Engine as _;
use crossbeam_channel::{bounded, Receiver};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

// -------------------------------------------------------------------------
// Wire parsing
// -------------------------------------------------------------------------

#[test]
fn parses_tracking_update_fields() {
    let line = r#"{"event":"tracking_update","hand_detected":true,"activation_progress":0.4,"system_active":false,"current_gesture":"swipe_left","play_pause_display":"PAUSE"}"#;
    let event = parse_server_line(line).unwrap().expect("tracking update");
    assert!(event.hand_detected);
    assert_eq!(event.activation_progress(), 0.4);
    assert_eq!(event.system_active, Some(false));
    assert_eq!(event.current_gesture, Some(GestureTag::SwipeLeft));
    assert_eq!(event.play_pause_display, Some(PlayPauseDisplay::Pause));
    assert!(event.tracking_frame.is_none());
}

#[test]
fn missing_optional_fields_take_defaults() {
    let event = parse_server_line(r#"{"event":"tracking_update"}"#)
        .unwrap()
        .expect("tracking update");
    assert!(!event.hand_detected);
    assert_eq!(event.activation_progress(), 0.0);
    assert_eq!(event.system_active, None);
    assert_eq!(event.displayable_gesture(), None);
}

#[test]
fn activation_progress_is_clamped() {
    let over = TelemetryEvent {
        activation_progress: Some(1.7),
        ..TelemetryEvent::default()
    };
    let under = TelemetryEvent {
        activation_progress: Some(-0.2),
        ..TelemetryEvent::default()
    };
    let nan = TelemetryEvent {
        activation_progress: Some(f64::NAN),
        ..TelemetryEvent::default()
    };
    assert_eq!(over.activation_progress(), 1.0);
    assert_eq!(under.activation_progress(), 0.0);
    assert_eq!(nan.activation_progress(), 0.0);
}

#[test]
fn system_toggle_and_empty_gestures_are_not_displayable() {
    let toggle =
        parse_server_line(r#"{"event":"tracking_update","current_gesture":"system_toggle"}"#)
            .unwrap()
            .unwrap();
    assert_eq!(toggle.current_gesture, Some(GestureTag::SystemToggle));
    assert_eq!(toggle.displayable_gesture(), None);

    let empty = parse_server_line(r#"{"event":"tracking_update","current_gesture":""}"#)
        .unwrap()
        .unwrap();
    assert_eq!(empty.displayable_gesture(), None);

    let custom = parse_server_line(r#"{"event":"tracking_update","current_gesture":"pinch"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(
        custom.displayable_gesture(),
        Some(&GestureTag::Unmapped("pinch".to_string()))
    );
}

#[test]
fn other_engine_events_are_ignored_and_garbage_is_an_error() {
    assert_eq!(parse_server_line(r#"{"event":"connected"}"#).unwrap(), None);
    assert_eq!(parse_server_line(r#"{"status":"ok"}"#).unwrap(), None);
    assert!(parse_server_line("not json").is_err());
    assert!(parse_server_line(r#"{"event":"tracking_update","hand_detected":"yes"}"#).is_err());
}

#[test]
fn client_messages_serialize_with_event_tag() {
    assert_eq!(
        serde_json::to_string(&ClientMessage::StartTracking).unwrap(),
        r#"{"event":"start_tracking"}"#
    );
    assert_eq!(
        serde_json::to_string(&ClientMessage::ToggleSystem { active: false }).unwrap(),
        r#"{"event":"toggle_system","active":false}"#
    );
}

#[test]
fn frame_payload_accepts_data_urls_and_bare_base64() {
    let data_url = FramePayload("data:image/jpeg;base64,AQID".to_string());
    assert_eq!(data_url.image_bytes().unwrap(), vec![1, 2, 3]);
    let bare = FramePayload("AQID".to_string());
    assert_eq!(bare.image_bytes().unwrap(), vec![1, 2, 3]);
}

#[test]
fn frame_payload_rejects_non_image_urls() {
    let text = FramePayload("data:text/plain;base64,AQID".to_string());
    assert!(matches!(text.image_bytes(), Err(FrameError::NotDataUrl)));
    let raw = FramePayload("data:image/png,rawbytes".to_string());
    assert!(matches!(raw.image_bytes(), Err(FrameError::NotDataUrl)));
    let bad = FramePayload("data:image/png;base64,@@@".to_string());
    assert!(matches!(bad.image_bytes(), Err(FrameError::Base64(_))));
}

// -------------------------------------------------------------------------
// Frame decoding
// -------------------------------------------------------------------------

fn png_data_url(width: u32, height: u32) -> FramePayload {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes.into_inner());
    FramePayload(format!("data:image/png;base64,{encoded}"))
}

#[test]
fn image_decoder_scales_to_canvas() {
    let decoder = ImageFrameDecoder::new(8, 4);
    let frame = decoder.decode(&png_data_url(4, 2)).unwrap();
    assert_eq!((frame.width, frame.height), (8, 4));
    assert_eq!(frame.pixels.len(), 8 * 4 * 4);
}

#[test]
fn image_decoder_reports_corrupt_images() {
    let decoder = ImageFrameDecoder::new(8, 4);
    let junk = FramePayload("data:image/png;base64,AQIDBA==".to_string());
    assert!(matches!(decoder.decode(&junk), Err(FrameError::Image(_))));
}

/// Decoder whose "slow" frames block until the test releases them.
struct GatedDecoder {
    gate: Receiver<()>,
}

impl FrameDecoder for GatedDecoder {
    fn decode(&self, payload: &FramePayload) -> Result<DecodedFrame, FrameError> {
        if payload.0 == "slow" {
            let _ = self.gate.recv_timeout(WAIT);
        }
        if payload.0 == "broken" {
            return Err(FrameError::NotDataUrl);
        }
        Ok(DecodedFrame {
            width: 1,
            height: 1,
            pixels: payload.0.as_bytes().to_vec(),
        })
    }
}

#[test]
fn slow_earlier_frame_never_overwrites_newer_one() {
    let (release, gate) = bounded(1);
    let renderer = FrameRenderer::new(Arc::new(GatedDecoder { gate }), 2);

    renderer.submit(1, FramePayload("slow".to_string()));
    renderer.submit(2, FramePayload("fast".to_string()));
    // Frame 1 is either still decoding behind the gate or skipped before decoding.
    let first = renderer.outcomes().recv_timeout(WAIT).unwrap();
    release.send(()).unwrap();
    let second = renderer.outcomes().recv_timeout(WAIT).unwrap();
    let mut outcomes = vec![first, second];
    outcomes.sort_by_key(|outcome| match outcome {
        FrameOutcome::Drawn { seq } | FrameOutcome::Stale { seq } => *seq,
        FrameOutcome::Failed { seq, .. } => *seq,
    });
    assert_eq!(
        outcomes,
        vec![FrameOutcome::Stale { seq: 1 }, FrameOutcome::Drawn { seq: 2 }]
    );
    let current = renderer.current().expect("frame drawn");
    assert_eq!(current.seq, 2);
    assert_eq!(current.frame.pixels, b"fast".to_vec());
    assert_eq!(renderer.latest_seq(), 2);
}

#[test]
fn in_order_frames_are_all_drawn() {
    let (_release, gate) = bounded(1);
    let renderer = FrameRenderer::new(Arc::new(GatedDecoder { gate }), 1);
    for seq in 1..=3 {
        renderer.submit(seq, FramePayload(format!("frame-{seq}")));
        assert_eq!(
            renderer.outcomes().recv_timeout(WAIT).unwrap(),
            FrameOutcome::Drawn { seq }
        );
    }
    assert_eq!(renderer.current_seq(), Some(3));
}

/// Decoder that takes a fixed time per frame and counts its calls.
struct CountingDecoder {
    calls: std::sync::atomic::AtomicUsize,
    delay: Duration,
}

impl FrameDecoder for CountingDecoder {
    fn decode(&self, payload: &FramePayload) -> Result<DecodedFrame, FrameError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(DecodedFrame {
            width: 1,
            height: 1,
            pixels: payload.0.as_bytes().to_vec(),
        })
    }
}

#[test]
fn burst_of_frames_decodes_only_what_can_still_be_drawn() {
    let decoder = Arc::new(CountingDecoder {
        calls: std::sync::atomic::AtomicUsize::new(0),
        delay: Duration::from_millis(30),
    });
    let renderer = FrameRenderer::new(Arc::clone(&decoder) as Arc<dyn FrameDecoder>, 1);
    for seq in 1..=20 {
        renderer.submit(seq, FramePayload(format!("frame-{seq}")));
    }

    let mut drawn = Vec::new();
    let mut stale = 0;
    for _ in 0..20 {
        match renderer.outcomes().recv_timeout(WAIT).unwrap() {
            FrameOutcome::Drawn { seq } => drawn.push(seq),
            FrameOutcome::Stale { .. } => stale += 1,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(drawn, vec![20]);
    assert_eq!(stale, 19);
    assert!(
        decoder.calls.load(std::sync::atomic::Ordering::SeqCst) <= 3,
        "superseded frames were decoded"
    );
    assert_eq!(renderer.current_seq(), Some(20));
}

#[test]
fn failed_decode_keeps_previous_frame() {
    let (_release, gate) = bounded(1);
    let renderer = FrameRenderer::new(Arc::new(GatedDecoder { gate }), 1);
    renderer.submit(1, FramePayload("good".to_string()));
    renderer.outcomes().recv_timeout(WAIT).unwrap();
    renderer.submit(2, FramePayload("broken".to_string()));
    assert!(matches!(
        renderer.outcomes().recv_timeout(WAIT).unwrap(),
        FrameOutcome::Failed { seq: 2, .. }
    ));
    assert_eq!(renderer.current_seq(), Some(1));
}

// -------------------------------------------------------------------------
// Session against a loopback fake engine
// -------------------------------------------------------------------------

fn config(port: u16, max_attempts: u32) -> SessionConfig {
    SessionConfig {
        port,
        connect_timeout: Duration::from_secs(1),
        reconnect: ReconnectPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        },
    }
}

fn next_event(session: &TelemetrySession) -> SessionEvent {
    session.events().recv_timeout(WAIT).expect("session event")
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end().to_string()
}

fn accept(listener: &TcpListener) -> (BufReader<TcpStream>, TcpStream) {
    let (stream, _) = listener.accept().unwrap();
    let writer = stream.try_clone().unwrap();
    (BufReader::new(stream), writer)
}

#[test]
fn reconnect_delay_doubles_and_caps() {
    let policy = ReconnectPolicy {
        max_attempts: 10,
        initial_backoff: Duration::from_millis(250),
        max_backoff: Duration::from_millis(5_000),
    };
    assert_eq!(policy.delay(1), Duration::from_millis(250));
    assert_eq!(policy.delay(2), Duration::from_millis(500));
    assert_eq!(policy.delay(4), Duration::from_millis(2_000));
    assert_eq!(policy.delay(6), Duration::from_millis(5_000));
    assert_eq!(policy.delay(40), Duration::from_millis(5_000));
}

#[test]
fn session_requests_tracking_and_delivers_updates_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut session = TelemetrySession::open(config(port, 0));

    let (mut reader, mut writer) = accept(&listener);
    assert_eq!(read_line(&mut reader), r#"{"event":"start_tracking"}"#);
    assert_eq!(next_event(&session), SessionEvent::Connected);

    writer
        .write_all(
            concat!(
                "{\"event\":\"tracking_update\",\"hand_detected\":true}\n",
                "garbage\n",
                "{\"event\":\"connected\"}\n",
                "{\"event\":\"tracking_update\",\"current_gesture\":\"swipe_up\"}\n",
            )
            .as_bytes(),
        )
        .unwrap();

    match next_event(&session) {
        SessionEvent::Update { seq, event } => {
            assert_eq!(seq, 1);
            assert!(event.hand_detected);
        }
        other => panic!("unexpected {other:?}"),
    }
    match next_event(&session) {
        SessionEvent::Update { seq, event } => {
            assert_eq!(seq, 2);
            assert_eq!(event.current_gesture, Some(GestureTag::SwipeUp));
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(session.toggle_system(false).unwrap(), ToggleDelivery::Sent);
    assert_eq!(
        read_line(&mut reader),
        r#"{"event":"toggle_system","active":false}"#
    );

    session.close();
    assert_eq!(read_line(&mut reader), r#"{"event":"stop_tracking"}"#);
    assert!(!session.is_connected());
}

#[test]
fn session_reconnects_and_keeps_sequence_increasing() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let session = TelemetrySession::open(config(port, 3));

    let (mut reader, mut writer) = accept(&listener);
    assert_eq!(read_line(&mut reader), r#"{"event":"start_tracking"}"#);
    writer
        .write_all(b"{\"event\":\"tracking_update\"}\n")
        .unwrap();
    assert_eq!(next_event(&session), SessionEvent::Connected);
    assert!(matches!(next_event(&session), SessionEvent::Update { seq: 1, .. }));
    drop(writer);
    drop(reader);

    assert!(matches!(next_event(&session), SessionEvent::Disconnected { .. }));
    assert_eq!(
        next_event(&session),
        SessionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(10)
        }
    );

    let (mut reader, mut writer) = accept(&listener);
    assert_eq!(read_line(&mut reader), r#"{"event":"start_tracking"}"#);
    writer
        .write_all(b"{\"event\":\"tracking_update\"}\n")
        .unwrap();
    assert_eq!(next_event(&session), SessionEvent::Connected);
    assert!(matches!(next_event(&session), SessionEvent::Update { seq: 2, .. }));
}

#[test]
fn undecodable_engine_line_is_skipped_without_disconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let session = TelemetrySession::open(config(port, 3));

    let (mut reader, mut writer) = accept(&listener);
    read_line(&mut reader);
    writer.write_all(b"{\"event\":\"tracking\xff\"}\n").unwrap();
    writer
        .write_all(b"{\"event\":\"tracking_update\",\"hand_detected\":true}\n")
        .unwrap();

    assert_eq!(next_event(&session), SessionEvent::Connected);
    match next_event(&session) {
        SessionEvent::Update { seq, event } => {
            assert_eq!(seq, 1);
            assert!(event.hand_detected);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(session.is_connected());
}

#[test]
fn toggle_while_disconnected_is_sent_after_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut cfg = config(port, 3);
    cfg.reconnect.initial_backoff = Duration::from_millis(200);
    cfg.reconnect.max_backoff = Duration::from_millis(200);
    let session = TelemetrySession::open(cfg);

    let (mut reader, writer) = accept(&listener);
    read_line(&mut reader);
    assert_eq!(next_event(&session), SessionEvent::Connected);
    drop(writer);
    drop(reader);
    assert!(matches!(next_event(&session), SessionEvent::Disconnected { .. }));
    assert!(matches!(
        next_event(&session),
        SessionEvent::Reconnecting { attempt: 1, .. }
    ));

    assert_eq!(session.toggle_system(false).unwrap(), ToggleDelivery::Queued);
    assert_eq!(session.toggle_system(true).unwrap(), ToggleDelivery::Queued);
    assert_eq!(session.toggle_system(false).unwrap(), ToggleDelivery::Queued);

    let (mut reader, _writer) = accept(&listener);
    assert_eq!(read_line(&mut reader), r#"{"event":"start_tracking"}"#);
    assert_eq!(
        read_line(&mut reader),
        r#"{"event":"toggle_system","active":false}"#
    );
    assert_eq!(next_event(&session), SessionEvent::Connected);
    assert_eq!(session.pending_toggle(), None);
}

#[test]
fn session_gives_up_after_bounded_attempts() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let session = TelemetrySession::open(config(port, 2));

    let mut attempts = Vec::new();
    loop {
        match next_event(&session) {
            SessionEvent::Disconnected { reason } => assert!(reason.contains("connect failed")),
            SessionEvent::Reconnecting { attempt, delay } => attempts.push((attempt, delay)),
            SessionEvent::GaveUp => break,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(
        attempts,
        vec![
            (1, Duration::from_millis(10)),
            (2, Duration::from_millis(20))
        ]
    );
    assert_eq!(session.toggle_system(true).unwrap(), ToggleDelivery::Queued);
    assert_eq!(session.pending_toggle(), Some(true));
}

#[test]
fn close_interrupts_backoff() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut cfg = config(port, 5);
    cfg.reconnect.initial_backoff = Duration::from_secs(30);
    cfg.reconnect.max_backoff = Duration::from_secs(30);
    let mut session = TelemetrySession::open(cfg);
    assert!(matches!(next_event(&session), SessionEvent::Disconnected { .. }));
    assert!(matches!(
        next_event(&session),
        SessionEvent::Reconnecting { attempt: 1, .. }
    ));

    let started = std::time::Instant::now();
    session.close();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn updates_survive_session_thread_handoff() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let engine = thread::spawn(move || {
        let (mut reader, mut writer) = accept(&listener);
        read_line(&mut reader);
        for progress in [0.1, 0.2, 0.3] {
            writeln!(
                writer,
                "{{\"event\":\"tracking_update\",\"activation_progress\":{progress}}}"
            )
            .unwrap();
        }
        // Hold the socket until the client closes.
        read_line(&mut reader);
    });

    let mut session = TelemetrySession::open(config(port, 0));
    assert_eq!(next_event(&session), SessionEvent::Connected);
    let progress: Vec<f64> = (0..3)
        .map(|_| match next_event(&session) {
            SessionEvent::Update { event, .. } => event.activation_progress(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(progress, vec![0.1, 0.2, 0.3]);
    session.close();
    engine.join().unwrap();
}
