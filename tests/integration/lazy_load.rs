#[path = "../support/mod.rs"]
mod support;

use harness_protocol::{ControlCommand, Payload, SessionMode};

/// Large enough to cross `lazy::CHUNK`'s chunk boundary at least once, so
/// the lazy loader's yielding behaviour is actually exercised, not just its
/// single-chunk happy path.
const MESSAGE_COUNT: usize = 60;

#[tokio::test]
async fn playback_matches_each_distinct_hash_after_a_multi_chunk_lazy_load() {
    let dir = tempfile::tempdir().unwrap();
    let recording_path = dir.path().join("session.json");

    let server = support::spawn_server(SessionMode::Passthrough, None, None).await;

    let mut control = support::connect_control(server.addr, None).await;
    support::send_control(
        &mut control,
        "r1",
        ControlCommand::CreateSession {
            session_id: "rec1".to_owned(),
            mode: SessionMode::Record,
            recording_path: Some(recording_path.to_string_lossy().into_owned()),
        },
    )
    .await;
    assert!(support::recv_control_response(&mut control).await.success);

    let mut program = support::connect_program(server.addr, "rec1").await;
    let mut platform = support::connect_platform(server.addr, "rec1").await;

    for i in 0..MESSAGE_COUNT {
        support::send_envelope(&mut program, &support::open_command("echo", serde_json::json!({"n": i}))).await;
        support::platform_echo_once(&mut platform, serde_json::json!({"reply_for": i})).await;
        let reply = support::recv_envelope(&mut program).await;
        assert!(matches!(reply.payload, Payload::EventClose { .. }));
    }

    support::send_control(&mut control, "c1", ControlCommand::CloseSession { session_id: "rec1".to_owned() }).await;
    assert!(support::recv_control_response(&mut control).await.success);

    support::send_control(
        &mut control,
        "r2",
        ControlCommand::CreateSession {
            session_id: "play1".to_owned(),
            mode: SessionMode::Playback,
            recording_path: Some(recording_path.to_string_lossy().into_owned()),
        },
    )
    .await;
    assert!(support::recv_control_response(&mut control).await.success);

    let mut playback_program = support::connect_program(server.addr, "play1").await;
    // Replay out of recording order to prove matches are keyed by hash, not
    // by position in the file.
    for i in (0..MESSAGE_COUNT).rev() {
        support::send_envelope(&mut playback_program, &support::open_command("echo", serde_json::json!({"n": i}))).await;
        let reply = support::recv_envelope(&mut playback_program).await;
        match reply.payload {
            Payload::EventClose { payload, .. } => {
                assert_eq!(payload, serde_json::json!({"reply_for": i}));
            }
            other => panic!("expected EventClose for n={i}, got {other:?}"),
        }
    }

    server.shutdown().await;
}
