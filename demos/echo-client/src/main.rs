//! A minimal program under test: opens a program-channel connection to the
//! harness, sends one `echo` command, and prints whatever comes back.

use futures_util::{SinkExt, StreamExt};
use harness_protocol::{Channel, Envelope, Payload};
use tokio_tungstenite::tungstenite::protocol::Message;
use ulid::Ulid;

#[tokio::main]
async fn main() {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9876?session=demo&channel=program".to_owned());

    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to {url}: {e}"));
    let (mut sink, mut stream) = ws.split();

    let command = Envelope {
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
            service: "echo".to_owned(),
            payload: serde_json::json!({"message": "hello from echo-client"}),
        },
    };

    sink.send(Message::Text(serde_json::to_string(&command).unwrap().into()))
        .await
        .expect("send failed");

    match stream.next().await {
        Some(Ok(Message::Text(text))) => {
            let reply: Envelope = serde_json::from_str(&text).expect("reply did not parse");
            println!("{}", serde_json::to_string_pretty(&reply).unwrap());
        }
        Some(Ok(other)) => eprintln!("unexpected frame: {other:?}"),
        Some(Err(e)) => eprintln!("ws error: {e}"),
        None => eprintln!("connection closed without a reply"),
    }
}
