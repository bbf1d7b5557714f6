//! WebSocket transport for padsync

use crate::engine::Engine;
use crate::room::RoomEvent;
use crate::session::{Action, SyncSession};
use futures_util::{SinkExt, StreamExt};
use padsync_core::DocumentName;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// Path prefix under which documents are addressed: `/collab/{name}`.
const COLLAB_PATH: &str = "/collab";

/// WebSocket server: one task per connection, rooms addressed by path.
pub struct WebSocketServer {
    engine: Arc<Engine>,
    addr: SocketAddr,
}

impl WebSocketServer {
    pub fn new(engine: Arc<Engine>, addr: SocketAddr) -> Self {
        Self { engine, addr }
    }

    /// Start the WebSocket server
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "padsync WebSocket server listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let engine = self.engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, engine).await {
                            debug!(peer = %peer_addr, error = %e, "Connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Resolve the document name from an upgrade request path.
///
/// `/collab/alpha` and `/alpha` both address "alpha"; an empty segment
/// resolves to the default document.
fn document_name(path: &str) -> Result<DocumentName, padsync_core::Error> {
    let segment = match path.strip_prefix(COLLAB_PATH) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };
    DocumentName::from_path_segment(segment)
}

async fn handle_connection(
    stream: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut doc_name: Option<DocumentName> = None;
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        match document_name(req.uri().path()) {
            Ok(name) => {
                doc_name = Some(name);
                Ok(resp)
            }
            Err(e) => {
                warn!(path = %req.uri().path(), error = %e, "Rejected connection");
                let mut reject = ErrorResponse::new(Some(e.to_string()));
                *reject.status_mut() = StatusCode::BAD_REQUEST;
                Err(reject)
            }
        }
    })
    .await?;

    let name = match doc_name {
        Some(name) => name,
        // Handshake rejected; nothing was registered.
        None => return Ok(()),
    };

    let (room, conn_id, mut events) = engine.connect(&name).await;
    info!(conn = conn_id, doc = %name, "Client connected");

    let (mut write, mut read) = ws_stream.split();
    let mut session = SyncSession::new(conn_id, room.clone());

    // Opening exchange: our state vector invites the peer's diff.
    if let Err(e) = write.send(WsMessage::Binary(session.start())).await {
        warn!(conn = conn_id, error = %e, "Failed to send initial sync");
        session.close();
        engine.disconnect(room, conn_id);
        return Ok(());
    }

    'conn: loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Binary(data))) => {
                        match session.handle_frame(&data) {
                            Ok(actions) => {
                                for action in actions {
                                    match action {
                                        Action::Reply(frame) => {
                                            if let Err(e) = write.send(WsMessage::Binary(frame)).await {
                                                warn!(conn = conn_id, error = %e, "WebSocket write error");
                                                break 'conn;
                                            }
                                        }
                                        Action::Fanout(payload) => {
                                            room.fanout(conn_id, payload);
                                        }
                                        Action::Persist => {
                                            engine.scheduler.schedule_save(&room);
                                        }
                                    }
                                }
                                #[cfg(feature = "metrics")]
                                engine.metrics.record_message("ok");
                            }
                            Err(e) => {
                                // Malformed frame: discard it, keep the connection.
                                warn!(conn = conn_id, doc = %name, error = %e, "Discarding malformed message");
                                #[cfg(feature = "metrics")]
                                engine.metrics.record_message("malformed");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if write.send(WsMessage::Pong(data)).await.is_err() {
                            break 'conn;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!(conn = conn_id, doc = %name, "Client disconnected");
                        break 'conn;
                    }
                    Some(Ok(_)) => {
                        // Text and other frame types carry no protocol meaning.
                    }
                    Some(Err(e)) => {
                        warn!(conn = conn_id, error = %e, "WebSocket read error");
                        break 'conn;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(RoomEvent { from, payload }) => {
                        if from == conn_id {
                            continue;
                        }
                        if let Err(e) = write.send(WsMessage::Binary(payload.to_vec())).await {
                            warn!(conn = conn_id, error = %e, "WebSocket write error");
                            break 'conn;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(conn = conn_id, doc = %name, missed = n, "Client lagged behind room fan-out");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break 'conn;
                    }
                }
            }
        }
    }

    session.close();
    engine.disconnect(room, conn_id);
    Ok(())
}
