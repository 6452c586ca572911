//! Per-connection WebSocket handling.
//!
//! Each accepted socket gets one handler task: it parses JSON requests,
//! routes them through [`MessageRouter`], and interleaves watch events from
//! the session's outbound channel onto the same socket. Disconnects, clean
//! or not, always release the session's watches.

use crate::connection::ConnectionManager;
use crate::error::ServerError;
use crate::messaging::{ClientRequest, ErrorCode, MessageRouter, ServerMessage, Session};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use proximity_core::ProximityService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Accepts the WebSocket handshake and runs the connection to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connections: Arc<ConnectionManager>,
    service: Arc<ProximityService>,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let connection_id = connections.add(addr).await;
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let router = MessageRouter::new(service);
    let mut session = Session::new(out_tx);

    let result = connection_loop(
        ws,
        &router,
        &mut session,
        &connections,
        connection_id,
        out_rx,
        shutdown,
    )
    .await;

    // Cleanup runs on every exit path, including transport errors.
    router.cleanup_session(&session);
    connections.remove(connection_id).await;
    debug!(connection_id, %addr, "connection closed");
    result
}

async fn connection_loop(
    ws: WebSocketStream<TcpStream>,
    router: &MessageRouter,
    session: &mut Session,
    connections: &Arc<ConnectionManager>,
    connection_id: usize,
    mut out_rx: mpsc::UnboundedReceiver<ServerMessage>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let response = match serde_json::from_str::<ClientRequest>(text.as_str()) {
                            Ok(request) => router.handle(request, session),
                            Err(e) => ServerMessage::Error {
                                code: ErrorCode::BadRequest,
                                message: format!("malformed request: {e}"),
                            },
                        };
                        if let Some(user_id) = session.user_id {
                            connections.bind_user(connection_id, user_id).await;
                        }
                        send_message(&mut sink, &response).await?;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        sink.send(Message::Pong(payload))
                            .await
                            .map_err(|e| ServerError::Network(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary and pong frames are ignored
                    Some(Err(e)) => {
                        warn!(connection_id, "connection error: {e}");
                        break;
                    }
                }
            }
            Some(message) = out_rx.recv() => {
                send_message(&mut sink, &message).await?;
            }
            _ = shutdown.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    Ok(())
}

async fn send_message(sink: &mut WsSink, message: &ServerMessage) -> Result<(), ServerError> {
    let json = serde_json::to_string(message)
        .map_err(|e| ServerError::Internal(format!("response serialization failed: {e}")))?;
    sink.send(Message::text(json))
        .await
        .map_err(|e| ServerError::Network(e.to_string()))
}
