//! Shared test harness: spawns the server in-process on an ephemeral TCP
//! port and gives each integration test a small WS client for the
//! program/platform/control channels.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use harness_protocol::{
    Channel, ControlChannelTag, ControlCommand, ControlRequest, ControlResponse, Envelope, Payload, SessionMode,
};
use replay_harness::server::{self, ListenAddr, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use ulid::Ulid;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn shutdown(self) {
        self.task.abort();
    }
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn spawn_server(
    default_mode: SessionMode,
    recording_path: Option<PathBuf>,
    recording_dir: Option<PathBuf>,
) -> TestServer {
    let port = free_port().await;
    let config = ServerConfig {
        listen: ListenAddr::Tcp(port),
        default_mode,
        recording_path,
        recording_dir,
        scenario_name: None,
    };
    let task = tokio::spawn(async move {
        let _ = server::run(config).await;
    });
    // Give the listener a moment to bind before tests start connecting.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    TestServer {
        addr: format!("127.0.0.1:{port}").parse().unwrap(),
        task,
    }
}

fn url(addr: SocketAddr, session: Option<&str>, channel: &str) -> String {
    match session {
        Some(session) => format!("ws://{addr}?session={session}&channel={channel}"),
        None => format!("ws://{addr}?channel={channel}"),
    }
}

pub async fn connect_program(addr: SocketAddr, session: &str) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(url(addr, Some(session), "program")).await.unwrap();
    ws
}

pub async fn connect_platform(addr: SocketAddr, session: &str) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(url(addr, Some(session), "platform")).await.unwrap();
    ws
}

pub async fn connect_control(addr: SocketAddr, session: Option<&str>) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(url(addr, session, "control")).await.unwrap();
    ws
}

pub fn open_command(service: &str, payload: serde_json::Value) -> Envelope {
    Envelope {
        stream_id: Ulid::new(),
        trace_id: Ulid::new(),
        causation_stream_id: None,
        parent_stream_id: None,
        sibling_index: 0,
        event_seq: 0,
        timestamp: chrono::Utc::now().to_rfc3339(),
        channel: Channel::Program,
        payload_hash: None,
        payload: Payload::CommandOpen {
            service: service.to_owned(),
            payload,
        },
    }
}

pub async fn send_envelope(ws: &mut WsStream, envelope: &Envelope) {
    ws.send(Message::Text(serde_json::to_string(envelope).unwrap().into())).await.unwrap();
}

pub async fn recv_envelope(ws: &mut WsStream) -> Envelope {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("ws error waiting for envelope: {e}"),
            None => panic!("connection closed waiting for envelope"),
        }
    }
}

/// Reads the next frame as raw JSON, for error frames that aren't a full
/// `Envelope` (e.g. `playback_miss`).
pub async fn recv_raw(ws: &mut WsStream) -> serde_json::Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("ws error waiting for frame: {e}"),
            None => panic!("connection closed waiting for frame"),
        }
    }
}

/// Replies to the most recently forwarded command on a platform connection
/// with an `EventClose` carrying `response`, echoing the command's ids.
pub async fn platform_echo_once(ws: &mut WsStream, response: serde_json::Value) {
    let command = recv_envelope(ws).await;
    let (service, _) = match command.payload {
        Payload::CommandOpen { service, payload } => (service, payload),
        other => panic!("expected a forwarded CommandOpen, got {other:?}"),
    };
    let reply = Envelope {
        stream_id: command.stream_id,
        trace_id: command.trace_id,
        causation_stream_id: Some(command.stream_id),
        parent_stream_id: command.parent_stream_id,
        sibling_index: command.sibling_index,
        event_seq: command.event_seq + 1,
        timestamp: chrono::Utc::now().to_rfc3339(),
        channel: Channel::Platform,
        payload_hash: command.payload_hash,
        payload: Payload::EventClose { service, payload: response },
    };
    send_envelope(ws, &reply).await;
}

pub async fn send_control(ws: &mut WsStream, request_id: &str, command: ControlCommand) {
    let request = ControlRequest {
        channel: ControlChannelTag::Control,
        request_id: request_id.to_owned(),
        payload: command,
    };
    ws.send(Message::Text(serde_json::to_string(&request).unwrap().into())).await.unwrap();
}

pub async fn recv_control_response(ws: &mut WsStream) -> ControlResponse {
    match ws.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a control response, got {other:?}"),
    }
}
