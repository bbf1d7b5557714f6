//! Health and introspection endpoint
//!
//! A deliberately small HTTP responder: `GET /health` returns a JSON
//! snapshot of the engine, `GET /documents` lists recently updated
//! documents, and `GET /metrics` exposes Prometheus text when the
//! `metrics` feature is enabled.

use crate::engine::Engine;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info};

/// How many documents `GET /documents` reports.
const DOCUMENT_LIST_LIMIT: usize = 100;

/// HTTP server for the health endpoint
pub struct HealthServer {
    engine: Arc<Engine>,
    addr: SocketAddr,
}

impl HealthServer {
    pub fn new(engine: Arc<Engine>, addr: SocketAddr) -> Self {
        Self { engine, addr }
    }

    /// Run the health HTTP server
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Health endpoint listening on http://{}/health", self.addr);

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let engine = self.engine.clone();

                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let n = match stream.read(&mut buf).await {
                            Ok(n) if n > 0 => n,
                            _ => return,
                        };
                        let request = String::from_utf8_lossy(&buf[..n]);

                        let response = if request.starts_with("GET /health") {
                            let status = engine.status();
                            #[cfg(feature = "metrics")]
                            engine.metrics.rooms_active.set(status.rooms as i64);
                            let body = serde_json::json!({
                                "status": "ok",
                                "rooms": status.rooms,
                                "connections": status.connections,
                                "backend": status.backend,
                            })
                            .to_string();
                            http_response("200 OK", "application/json", &body)
                        } else if request.starts_with("GET /documents") {
                            match engine.list_documents(DOCUMENT_LIST_LIMIT).await {
                                Ok(rows) => {
                                    let docs: Vec<serde_json::Value> = rows
                                        .iter()
                                        .map(|(name, updated_at)| {
                                            serde_json::json!({
                                                "name": name.as_str(),
                                                "updated_at": updated_at,
                                            })
                                        })
                                        .collect();
                                    let body = serde_json::Value::Array(docs).to_string();
                                    http_response("200 OK", "application/json", &body)
                                }
                                Err(e) => http_response(
                                    "500 Internal Server Error",
                                    "text/plain",
                                    &e.to_string(),
                                ),
                            }
                        } else if request.starts_with("GET /metrics") {
                            metrics_response(&engine)
                        } else {
                            http_response("404 Not Found", "text/plain", "")
                        };

                        let _ = stream.write_all(response.as_bytes()).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept health connection");
                }
            }
        }
    }
}

#[cfg(feature = "metrics")]
fn metrics_response(engine: &Engine) -> String {
    http_response(
        "200 OK",
        "text/plain; version=0.0.4; charset=utf-8",
        &engine.metrics.export(),
    )
}

#[cfg(not(feature = "metrics"))]
fn metrics_response(_engine: &Engine) -> String {
    http_response("404 Not Found", "text/plain", "")
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}
