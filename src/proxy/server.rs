use crate::core::errors::ExchangeError;
use crate::proxy::DepthHub;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

pub const PING_INTERVAL: Duration = Duration::from_secs(5);
const PING_PAYLOAD: &[u8] = b"ping";

/// Serves `ws://{listen}/{pair}`; every client gets each depth published for its pair
pub struct DepthServer {
    listener: TcpListener,
    hub: DepthHub,
    ping_interval: Duration,
    stop_tx: watch::Sender<bool>,
}

impl DepthServer {
    pub async fn bind(addr: &str, hub: DepthHub) -> Result<Self, ExchangeError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            ExchangeError::ConfigurationError(format!("Can not listen on {}: {}", addr, e))
        })?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            listener,
            hub,
            ping_interval: PING_INTERVAL,
            stop_tx,
        })
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ExchangeError> {
        self.listener
            .local_addr()
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Accept clients until `stop` is called; open client sessions end with it
    pub async fn run(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        match self.local_addr() {
            Ok(addr) => info!(%addr, pairs = ?self.hub.currency_pairs(), "depth server listening"),
            Err(e) => warn!(error = %e, "depth server listening on unknown address"),
        }

        loop {
            if *stop_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = stop_rx.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let client = ClientSession {
                            hub: self.hub.clone(),
                            ping_interval: self.ping_interval,
                            stop_rx: self.stop_tx.subscribe(),
                        };
                        tokio::spawn(client.serve(stream, peer));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
        info!("depth server stopped");
    }
}

struct ClientSession {
    hub: DepthHub,
    ping_interval: Duration,
    stop_rx: watch::Receiver<bool>,
}

impl ClientSession {
    #[instrument(skip(self, stream))]
    async fn serve(mut self, stream: TcpStream, peer: SocketAddr) {
        let mut subscription = None;
        let hub = self.hub.clone();
        let handshake = tokio_tungstenite::accept_hdr_async(
            stream,
            |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let pair = request.uri().path().trim_start_matches('/').to_lowercase();
                match hub.subscribe(&pair) {
                    Some(rx) => {
                        subscription = Some((pair, rx));
                        Ok(response)
                    }
                    None => Err(not_found(&pair)),
                }
            },
        )
        .await;

        let ws = match handshake {
            Ok(ws) => ws,
            Err(e) => {
                debug!(error = %e, "handshake rejected");
                return;
            }
        };
        let Some((pair, mut depths)) = subscription else {
            return;
        };
        info!(currency_pair = %pair, "client connected");

        let (mut sink, mut source) = ws.split();
        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + self.ping_interval,
            self.ping_interval,
        );

        loop {
            tokio::select! {
                _ = self.stop_rx.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                depth = depths.recv() => match depth {
                    Ok(body) => {
                        if let Err(e) = sink.send(Message::Text(body.to_string())).await {
                            debug!(currency_pair = %pair, error = %e, "send failed");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(currency_pair = %pair, skipped, "client lagging, depths dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ping.tick() => {
                    if let Err(e) = sink.send(Message::Ping(PING_PAYLOAD.to_vec())).await {
                        debug!(currency_pair = %pair, error = %e, "ping failed");
                        break;
                    }
                }
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(_))) | Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(other)) => {
                        debug!(currency_pair = %pair, message = ?other, "unsupported message, dropping client");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(currency_pair = %pair, error = %e, "read failed");
                        break;
                    }
                    None => break,
                },
            }
        }
        info!(currency_pair = %pair, "client disconnected");
    }
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("unknown currency pair: {}", path)));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_response() {
        let response = not_found("eth_jpy");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.body().as_deref(),
            Some("unknown currency pair: eth_jpy")
        );
    }
}
