use std::net::SocketAddr;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use common::{Result, SessionConfig};
use crate::host::HostEvent;
use super::{LinkMessage, SessionId, SessionLink};

/// Accepts robot WebSocket connections and turns their traffic into host events.
///
/// Connection tasks never touch the registry; everything goes through the
/// host's event queue.
pub struct SessionEndpoint {
    listener: TcpListener,
    path: String,
    events: mpsc::Sender<HostEvent>,
}

impl SessionEndpoint {
    pub async fn bind(config: &SessionConfig, events: mpsc::Sender<HostEvent>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        info!("Session endpoint listening on {}{}", listener.local_addr()?, config.path);
        Ok(Self {
            listener,
            path: config.path.clone(),
            events,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Session endpoint stopping");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            self.path.clone(),
                            self.events.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Session accept failed: {}", e);
                    }
                },
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    path: String,
    events: mpsc::Sender<HostEvent>,
    shutdown: CancellationToken,
) {
    let check_path = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        if request.uri().path() == path {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some(format!("no endpoint at {}", request.uri().path())));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let session_id = SessionId::generate();
    let (link, mut outbound) = SessionLink::new();
    let opened = HostEvent::SessionOpened {
        session_id: session_id.clone(),
        peer: Some(peer),
        link,
    };
    if events.send(opened).await.is_err() {
        return;
    }
    info!("Session {} opened from {}", session_id, peer);

    let (mut sink, mut source) = ws.split();
    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let event = HostEvent::SessionText {
                        session_id: session_id.clone(),
                        text: text.as_str().to_string(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let event = HostEvent::SessionFrame {
                        session_id: session_id.clone(),
                        data: data.to_vec(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Session {} read error: {}", session_id, e);
                    break;
                }
            },
            queued = outbound.recv() => match queued {
                Some(LinkMessage::Text(text)) => {
                    if let Err(e) = sink.send(Message::text(text.to_string())).await {
                        debug!("Session {} write error: {}", session_id, e);
                        break;
                    }
                }
                Some(LinkMessage::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            _ = shutdown.cancelled() => {
                let _ = sink.close().await;
                break;
            }
        }
    }

    // The host may already be gone during shutdown.
    if events.send(HostEvent::SessionClosed { session_id: session_id.clone() }).await.is_err() {
        debug!("Host stopped before close of session {} was reported", session_id);
    }
}
