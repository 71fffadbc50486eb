#[path = "../support/mod.rs"]
mod support;

use harness_protocol::{Payload, SessionMode};

#[tokio::test]
async fn two_passthrough_sessions_do_not_cross_deliver_replies() {
    let server = support::spawn_server(SessionMode::Passthrough, None, None).await;

    let mut program1 = support::connect_program(server.addr, "s1").await;
    let mut platform1 = support::connect_platform(server.addr, "s1").await;
    let mut program2 = support::connect_program(server.addr, "s2").await;
    let mut platform2 = support::connect_platform(server.addr, "s2").await;

    support::send_envelope(&mut program1, &support::open_command("echo", serde_json::json!({"who": "one"}))).await;
    support::send_envelope(&mut program2, &support::open_command("echo", serde_json::json!({"who": "two"}))).await;

    let (reply1, reply2) = tokio::join!(
        async {
            support::platform_echo_once(&mut platform1, serde_json::json!({"from": "s1-platform"})).await;
            support::recv_envelope(&mut program1).await
        },
        async {
            support::platform_echo_once(&mut platform2, serde_json::json!({"from": "s2-platform"})).await;
            support::recv_envelope(&mut program2).await
        },
    );

    match reply1.payload {
        Payload::EventClose { payload, .. } => assert_eq!(payload, serde_json::json!({"from": "s1-platform"})),
        other => panic!("unexpected payload on s1: {other:?}"),
    }
    match reply2.payload {
        Payload::EventClose { payload, .. } => assert_eq!(payload, serde_json::json!({"from": "s2-platform"})),
        other => panic!("unexpected payload on s2: {other:?}"),
    }

    server.shutdown().await;
}
