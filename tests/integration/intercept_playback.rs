#[path = "../support/mod.rs"]
mod support;

use chrono::Utc;
use harness_protocol::{
    Channel, ControlCommand, Direction, Envelope, InterceptSpec, Payload, RecordedMessage, Recording, SessionMode,
};
use ulid::Ulid;

#[tokio::test]
async fn a_registered_intercept_pre_empts_playback() {
    let dir = tempfile::tempdir().unwrap();
    let recording_path = dir.path().join("empty.json");
    replay_harness::recording::save(&recording_path, &Recording::new("empty", "2026-01-01T00:00:00Z")).unwrap();

    let server = support::spawn_server(SessionMode::Passthrough, None, None).await;

    let mut setup_control = support::connect_control(server.addr, None).await;
    support::send_control(
        &mut setup_control,
        "r1",
        ControlCommand::CreateSession {
            session_id: "p1".to_owned(),
            mode: SessionMode::Playback,
            recording_path: Some(recording_path.to_string_lossy().into_owned()),
        },
    )
    .await;
    assert!(support::recv_control_response(&mut setup_control).await.success);

    // register_intercept carries no sessionId; it binds to the session named
    // in this control connection's own URL.
    let mut bound_control = support::connect_control(server.addr, Some("p1")).await;
    support::send_control(
        &mut bound_control,
        "i1",
        ControlCommand::RegisterIntercept {
            spec: InterceptSpec {
                service: "echo".to_owned(),
                url_pattern: None,
                response: serde_json::json!({"mocked": true}),
                times: None,
            },
        },
    )
    .await;
    let registered = support::recv_control_response(&mut bound_control).await;
    assert!(registered.success);
    assert!(registered.payload.unwrap()["interceptId"].is_string());

    let mut program = support::connect_program(server.addr, "p1").await;
    support::send_envelope(&mut program, &support::open_command("echo", serde_json::json!({"anything": true}))).await;
    let reply = support::recv_envelope(&mut program).await;
    match reply.payload {
        Payload::EventClose { service, payload } => {
            assert_eq!(service, "echo");
            assert_eq!(payload, serde_json::json!({"mocked": true}));
        }
        other => panic!("expected an intercepted EventClose, got {other:?}"),
    }

    server.shutdown().await;
}

/// A recording with `n` `to_harness`/`from_harness` pairs that all hash to
/// the same request, each labelled with a distinct reply so assertions can
/// tell which recorded entry answered a given send.
fn recording_with_duplicate_hash_pairs(n: usize, request: &serde_json::Value) -> Recording {
    let mut recording = Recording::new("dup", "2026-01-01T00:00:00Z");
    let hash = harness_protocol::request_hash("http", request);
    for i in 0..n {
        let stream_id = Ulid::new();
        let trace_id = Ulid::new();
        let request_envelope = Envelope {
            stream_id,
            trace_id,
            causation_stream_id: None,
            parent_stream_id: None,
            sibling_index: 0,
            event_seq: (i * 2) as u64,
            timestamp: Utc::now().to_rfc3339(),
            channel: Channel::Program,
            payload_hash: Some(hash.clone()),
            payload: Payload::CommandOpen { service: "http".to_owned(), payload: request.clone() },
        };
        recording.append(RecordedMessage {
            envelope: request_envelope,
            recorded_at: Utc::now().to_rfc3339(),
            direction: Direction::ToHarness,
            hash: Some(hash.clone()),
        });
        let response_envelope = Envelope {
            stream_id,
            trace_id,
            causation_stream_id: Some(stream_id),
            parent_stream_id: None,
            sibling_index: 0,
            event_seq: (i * 2 + 1) as u64,
            timestamp: Utc::now().to_rfc3339(),
            channel: Channel::Program,
            payload_hash: None,
            payload: Payload::EventClose {
                service: "http".to_owned(),
                payload: serde_json::json!({"recorded": i}),
            },
        };
        recording.append(RecordedMessage {
            envelope: response_envelope,
            recorded_at: Utc::now().to_rfc3339(),
            direction: Direction::FromHarness,
            hash: None,
        });
    }
    recording
}

/// A recording holds 3 responses for requests hashing to the same key; an intercept with
/// `times: 1` pre-empts the first, consuming it out of the Player's
/// consumed-set so the 2nd and 3rd identical requests still land on the
/// recording's own #1 and #2, and a 4th request is a genuine miss (the
/// recording had no #3 left — the intercept spent it).
#[tokio::test]
async fn intercept_with_times_budget_consumes_one_recorded_slot_then_playback_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let recording_path = dir.path().join("dup.json");
    let request = serde_json::json!({"url": "https://api/widgets"});
    replay_harness::recording::save(&recording_path, &recording_with_duplicate_hash_pairs(3, &request)).unwrap();

    let server = support::spawn_server(SessionMode::Passthrough, None, None).await;

    let mut setup_control = support::connect_control(server.addr, None).await;
    support::send_control(
        &mut setup_control,
        "r1",
        ControlCommand::CreateSession {
            session_id: "p1".to_owned(),
            mode: SessionMode::Playback,
            recording_path: Some(recording_path.to_string_lossy().into_owned()),
        },
    )
    .await;
    assert!(support::recv_control_response(&mut setup_control).await.success);

    let mut bound_control = support::connect_control(server.addr, Some("p1")).await;
    support::send_control(
        &mut bound_control,
        "i1",
        ControlCommand::RegisterIntercept {
            spec: InterceptSpec {
                service: "http".to_owned(),
                url_pattern: None,
                response: serde_json::json!({"mocked": true}),
                times: Some(1),
            },
        },
    )
    .await;
    assert!(support::recv_control_response(&mut bound_control).await.success);

    let mut program = support::connect_program(server.addr, "p1").await;

    // 1st: the intercept.
    support::send_envelope(&mut program, &support::open_command("http", request.clone())).await;
    let reply = support::recv_envelope(&mut program).await;
    match reply.payload {
        Payload::EventClose { payload, .. } => assert_eq!(payload, serde_json::json!({"mocked": true})),
        other => panic!("expected intercepted reply, got {other:?}"),
    }

    // 2nd and 3rd: the recording's own #1 and #2, in file order.
    for expected in [1, 2] {
        support::send_envelope(&mut program, &support::open_command("http", request.clone())).await;
        let reply = support::recv_envelope(&mut program).await;
        match reply.payload {
            Payload::EventClose { payload, .. } => assert_eq!(payload, serde_json::json!({"recorded": expected})),
            other => panic!("expected recorded reply #{expected}, got {other:?}"),
        }
    }

    // 4th: a genuine miss — the recording only had 3 slots and the intercept spent one.
    support::send_envelope(&mut program, &support::open_command("http", request)).await;
    let frame = support::recv_raw(&mut program).await;
    assert_eq!(frame["error"]["code"], harness_protocol::error_codes::PLAYBACK_MISS);

    server.shutdown().await;
}
