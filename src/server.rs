//! Server: accepts WebSocket connections on a TCP port or a
//! UNIX domain socket, parses a `?session=`/`?channel=` selector from the
//! upgrade URL, and dispatches each connection to the Handler. Raw
//! `tokio_tungstenite::accept_hdr_async` (not axum) because a UNIX socket
//! and a custom upgrade-URL selector don't fit axum's typed extractors.

use crate::control;
use crate::error::HandlerError;
use crate::handler::{Handler, ProgramAction};
use crate::id_translation::IdTranslator;
use crate::player::Player;
use crate::recorder::Recorder;
use crate::recording;
use crate::session::{default_scenario_name, Session, SessionRegistry};
use futures_util::{SinkExt, StreamExt};
use harness_protocol::{Channel, ControlChannelTag, ControlCommand, ControlResponse, Envelope, Payload, SessionMode};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub enum ListenAddr {
    Tcp(u16),
    Unix(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: ListenAddr,
    pub default_mode: SessionMode,
    pub recording_path: Option<PathBuf>,
    pub recording_dir: Option<PathBuf>,
    pub scenario_name: Option<String>,
}

struct Shared {
    registry: Arc<SessionRegistry>,
    handler: Arc<Handler>,
    config: ServerConfig,
}

/// Runs the accept loop until SIGINT/SIGTERM, then closes every session
/// (flushing recorders) and returns.
pub async fn run(config: ServerConfig) -> Result<(), HandlerError> {
    if matches!(config.default_mode, SessionMode::Record | SessionMode::Playback)
        && config.recording_path.is_none()
        && config.recording_dir.is_none()
    {
        return Err(HandlerError::Internal(
            "record/playback mode requires --recording-path or --recording-dir".to_owned(),
        ));
    }

    let registry = Arc::new(SessionRegistry::new());
    let handler = Arc::new(Handler::new(registry.clone()));
    let shared = Arc::new(Shared { registry: registry.clone(), handler, config: config.clone() });

    match config.listen.clone() {
        ListenAddr::Tcp(port) => {
            let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| HandlerError::Internal(e.to_string()))?;
            println!("Harness server listening on port {port}");
            info!(port, "listening");
            run_tcp_accept_loop(listener, shared).await;
        }
        ListenAddr::Unix(path) => {
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path).map_err(|e| HandlerError::Internal(e.to_string()))?;
            println!("Harness server listening on socket {}", path.display());
            info!(socket = %path.display(), "listening");
            run_unix_accept_loop(listener, shared).await;
        }
    }

    close_all_sessions(&registry).await;
    Ok(())
}

async fn run_tcp_accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    let mut shutdown = Box::pin(shutdown_signal());
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => { info!("shutting down"); break; }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, shared).await {
                                debug!(peer = %peer, error = %e, "connection ended");
                            }
                        });
                    }
                    Err(e) => { error!(error = %e, "accept failed"); break; }
                }
            }
        }
    }
}

async fn run_unix_accept_loop(listener: UnixListener, shared: Arc<Shared>) {
    let mut shutdown = Box::pin(shutdown_signal());
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => { info!("shutting down"); break; }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, shared).await {
                                debug!(error = %e, "connection ended");
                            }
                        });
                    }
                    Err(e) => { error!(error = %e, "accept failed"); break; }
                }
            }
        }
    }
}

/// Waits for SIGTERM or Ctrl-C (SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn close_all_sessions(registry: &SessionRegistry) {
    for id in registry.list().await {
        if let Err(e) = registry.close(&id).await {
            warn!(session_id = %id, error = %e, "error closing session during shutdown");
        }
    }
}

/// A connection's target, parsed from the upgrade URL's query string
/// (`?session=<id>&channel=program|platform|control`).
struct ConnectionTarget {
    session_id: Option<String>,
    channel: Channel,
}

fn parse_connection_target(uri: &str) -> ConnectionTarget {
    let query = uri.split_once('?').map(|(_, q)| q).unwrap_or("");
    let mut session_id = None;
    let mut channel = Channel::Control;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else { continue };
        match key {
            "session" => session_id = Some(value.to_owned()),
            "channel" => {
                channel = match value {
                    "program" => Channel::Program,
                    "platform" => Channel::Platform,
                    _ => Channel::Control,
                };
            }
            _ => {}
        }
    }
    ConnectionTarget { session_id, channel }
}

async fn handle_connection<S>(stream: S, shared: Arc<Shared>) -> Result<(), HandlerError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let mut uri = String::new();
    let callback = |request: &tokio_tungstenite::tungstenite::handshake::server::Request,
                    response: tokio_tungstenite::tungstenite::handshake::server::Response| {
        uri = request.uri().to_string();
        Ok(response)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let target = parse_connection_target(&uri);
    let (mut sink, mut stream) = ws.split();

    match target.channel {
        Channel::Control => run_control_connection(&mut sink, &mut stream, &shared, target.session_id).await,
        Channel::Program => {
            let Some(session_id) = target.session_id else {
                return Err(HandlerError::Internal("program connection requires ?session=".to_owned()));
            };
            let session = ensure_session(&shared, &session_id).await?;
            run_program_connection(&mut sink, &mut stream, &shared, &session).await
        }
        Channel::Platform => {
            let Some(session_id) = target.session_id else {
                return Err(HandlerError::Internal("platform connection requires ?session=".to_owned()));
            };
            let session = ensure_session(&shared, &session_id).await?;
            run_platform_connection(&mut sink, &mut stream, &shared, &session).await
        }
    }
}

/// Creates the session implicitly, using the server's default mode and
/// recording location, if a control connection hasn't already created it.
/// A connection carrying `?session=` but naming an unknown id auto-binds
/// under the server's default mode, the way the CLI's single-session mode
/// expects.
async fn ensure_session(shared: &Shared, session_id: &str) -> Result<Arc<Mutex<Session>>, HandlerError> {
    if let Some(session) = shared.registry.get(session_id).await {
        return Ok(session);
    }
    let mode = shared.config.default_mode;
    let session = shared
        .registry
        .create(session_id.to_owned(), mode)
        .await
        .map_err(HandlerError::from)?;

    match mode {
        SessionMode::Record => {
            let path = recording_path_for(shared, session_id);
            let scenario = shared.config.scenario_name.clone().unwrap_or_else(|| default_scenario_name(session_id));
            let mut guard = session.lock().await;
            guard.recorder = Some(Recorder::new(scenario, path));
        }
        SessionMode::Playback => {
            let path = recording_path_for(shared, session_id);
            let lazy = recording::load_lazy(&path).await?;
            let mut guard = session.lock().await;
            guard.player = Some(Player::new(lazy).await);
        }
        SessionMode::Passthrough => {}
    }
    Ok(session)
}

fn recording_path_for(shared: &Shared, session_id: &str) -> PathBuf {
    if let Some(path) = &shared.config.recording_path {
        return path.clone();
    }
    if let Some(dir) = &shared.config.recording_dir {
        return dir.join(session_id).join("platform-recording.json");
    }
    PathBuf::from(format!("{session_id}.json"))
}

async fn run_control_connection<Sink, Stream>(
    sink: &mut Sink,
    stream: &mut Stream,
    shared: &Arc<Shared>,
    bound_session: Option<String>,
) -> Result<(), HandlerError>
where
    Sink: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    Stream: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let Message::Text(text) = message? else { continue };
        let request: harness_protocol::ControlRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed control frame");
                continue;
            }
        };
        let outcome = control::dispatch(&shared.registry, bound_session.as_deref(), request.payload).await;
        let response = match outcome {
            Ok(payload) => ControlResponse {
                channel: ControlChannelTag::Control,
                request_id: request.request_id,
                success: true,
                payload: Some(payload),
                error: None,
            },
            Err(err) => ControlResponse {
                channel: ControlChannelTag::Control,
                request_id: request.request_id,
                success: false,
                payload: None,
                error: Some(err),
            },
        };
        sink.send(Message::Text(serde_json::to_string(&response)?.into())).await?;
    }
    Ok(())
}

async fn run_program_connection<Sink, Stream>(
    sink: &mut Sink,
    stream: &mut Stream,
    shared: &Arc<Shared>,
    session: &Arc<Mutex<Session>>,
) -> Result<(), HandlerError>
where
    Sink: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    Stream: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut translator = IdTranslator::new();
    while let Some(message) = stream.next().await {
        let Message::Text(text) = message? else { continue };
        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "malformed program frame; closing connection");
                return Err(HandlerError::Parse(e));
            }
        };
        if !matches!(envelope.payload, Payload::CommandOpen { .. }) {
            continue;
        }
        let action = shared.handler.handle_program_command(session, envelope, &mut translator).await?;
        match action {
            ProgramAction::Reply(reply) => {
                sink.send(Message::Text(serde_json::to_string(&reply)?.into())).await?;
            }
            ProgramAction::Error(err) => {
                let frame = serde_json::json!({ "channel": "program", "error": err });
                sink.send(Message::Text(serde_json::to_string(&frame)?.into())).await?;
            }
            ProgramAction::Forward(command) => {
                let bridge = session.lock().await.platform_bridge.clone();
                // The platform connection's read loop already records this
                // reply (in record mode) and hands it here purely to unblock
                // the waiting program request; recording it a second time
                // here would duplicate every from_harness entry.
                let reply = bridge.forward_and_await(command).await?;
                sink.send(Message::Text(serde_json::to_string(&reply)?.into())).await?;
            }
        }
    }
    Ok(())
}

async fn run_platform_connection<Sink, Stream>(
    sink: &mut Sink,
    stream: &mut Stream,
    shared: &Arc<Shared>,
    session: &Arc<Mutex<Session>>,
) -> Result<(), HandlerError>
where
    Sink: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    Stream: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let bridge = {
        let guard = session.lock().await;
        guard.platform_bridge.clone()
    };
    bridge.bind_platform(tx).await;

    loop {
        tokio::select! {
            biased;
            forwarded = rx.recv() => {
                match forwarded {
                    Some(command) => sink.send(Message::Text(serde_json::to_string(&command)?.into())).await?,
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    None => break,
                    Some(Err(e)) => return Err(HandlerError::Ws(e)),
                    Some(Ok(Message::Text(text))) => {
                        let envelope: Envelope = serde_json::from_str(&text)?;
                        if matches!(envelope.payload, Payload::EventClose { .. }) {
                            shared.handler.handle_platform_reply(session, &envelope).await;
                            bridge.deliver_platform_reply(envelope).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    Ok(())
}
