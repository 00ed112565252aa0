//! Single WebSocket connection with auto-reconnect.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the exchange WebSocket endpoint (TLS, optionally through an
//!    HTTP CONNECT proxy).
//! 2. Notifies `on_connected` so the protocol layer can log in / resubscribe.
//! 3. Reads frames and forwards them to the text/binary callbacks.
//! 4. Writes frames queued on the outbound channel.
//! 5. Automatically reconnects on disconnection with exponential backoff.
//!
//! Keep-alive is application level (the server pings, the protocol layer
//! answers), so the transport itself never sends pings.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::ProxyConfig;
use crate::error::{GatewayError, Result};

/// Callback invoked on connection lifecycle changes.
///
/// Parameter: `connection_id`
pub type OnStateCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Callback invoked for each received text message.
///
/// Parameters: `(connection_id, message_text)`
pub type OnMessageCallback = Arc<dyn Fn(usize, &str) + Send + Sync>;

/// Callback invoked for each received binary message.
///
/// Parameters: `(connection_id, message_bytes)`
pub type OnBinaryCallback = Arc<dyn Fn(usize, &[u8]) + Send + Sync>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://api.hbdm.com/swap-ws`).
    pub url: String,
    /// Optional HTTP CONNECT proxy.
    pub proxy: Option<ProxyConfig>,
    /// Connection identifier, used in log prefixes.
    pub id: usize,
}

impl WsConnConfig {
    pub fn new(url: impl Into<String>, id: usize) -> Self {
        Self { url: url.into(), proxy: None, id }
    }
}

/// Callbacks driven by the connection task.
#[derive(Clone)]
pub struct WsHandlers {
    pub on_connected: OnStateCallback,
    pub on_disconnected: OnStateCallback,
    pub on_text: OnMessageCallback,
    pub on_binary: OnBinaryCallback,
}

/// A single WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Channel to send outbound messages. Created up front so senders can be
    /// handed out before the task starts. Unbounded: a resubscribe burst on
    /// reconnect is queued before the task gets to drain it.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Held here while stopped; the task owns it while running and hands it
    /// back on exit.
    outbound_rx: Option<mpsc::UnboundedReceiver<String>>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<mpsc::UnboundedReceiver<String>>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        Self { config, outbound_tx, outbound_rx: Some(outbound_rx), shutdown_tx: None, task: None }
    }

    /// Outbound frame sender. Frames queued while disconnected are discarded
    /// on the next connect, before `on_connected` runs.
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.outbound_tx.clone()
    }

    /// Whether the connection task has been started.
    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Start the connection task. A call while running is a no-op; a call
    /// after [`stop`](Self::stop) dials again.
    pub fn start(&mut self, handlers: WsHandlers) {
        if self.task.is_some() {
            warn!("[ws-{}] already started", self.config.id);
            return;
        }
        let Some(outbound_rx) = self.outbound_rx.take() else {
            error!("[ws-{}] outbound queue lost, cannot start", self.config.id);
            return;
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = self.config.clone();

        let task = tokio::spawn(connection_loop(config, handlers, outbound_rx, shutdown_rx));

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
    }

    #[cfg(test)]
    pub(crate) fn outbound(&mut self) -> Option<&mut mpsc::UnboundedReceiver<String>> {
        self.outbound_rx.as_mut()
    }

    /// Stop the connection and wait for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(outbound_rx) => self.outbound_rx = Some(outbound_rx),
                Err(e) => error!("[ws-{}] connection task failed: {e}", self.config.id),
            }
        }
    }
}

/// Main connection loop: connects, notifies, reads, writes, reconnects.
/// Returns the outbound receiver on shutdown.
async fn connection_loop(
    config: WsConnConfig,
    handlers: WsHandlers,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> mpsc::UnboundedReceiver<String> {
    let mut backoff = INITIAL_BACKOFF;
    let conn_id = config.id;

    loop {
        if *shutdown_rx.borrow() {
            info!("[ws-{conn_id}] shutdown requested");
            return outbound_rx;
        }

        info!("[ws-{conn_id}] connecting to {}", config.url);

        let ws_stream = match connect_ws(&config).await {
            Ok(s) => {
                backoff = INITIAL_BACKOFF;
                info!("[ws-{conn_id}] connected");
                s
            }
            Err(e) => {
                error!("[ws-{conn_id}] connection failed: {e}, retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return outbound_rx,
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let mut stale = 0usize;
        while outbound_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("[ws-{conn_id}] dropped {stale} frames queued while disconnected");
        }
        (handlers.on_connected)(conn_id);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("[ws-{conn_id}] shutdown signal received");
                    let _ = ws_write.close().await;
                    return outbound_rx;
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            (handlers.on_text)(conn_id, &text);
                        }
                        Some(Ok(Message::Binary(data))) => {
                            (handlers.on_binary)(conn_id, &data);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[ws-{conn_id}] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[ws-{conn_id}] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[ws-{conn_id}] stream ended");
                            break;
                        }
                        _ => {}
                    }
                }

                Some(msg) = outbound_rx.recv() => {
                    debug!("[ws-{conn_id}] send {msg}");
                    if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                        error!("[ws-{conn_id}] send error: {e}");
                        break;
                    }
                }
            }
        }

        (handlers.on_disconnected)(conn_id);

        warn!("[ws-{conn_id}] disconnected, reconnecting in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return outbound_rx,
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Establish a TLS WebSocket connection, directly or through the proxy.
async fn connect_ws(config: &WsConnConfig) -> Result<WsStream> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let request = config.url.as_str().into_client_request()?;

    match &config.proxy {
        None => {
            let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
            Ok(stream)
        }
        Some(proxy) => {
            let target = target_addr(&config.url)?;
            let tcp = connect_via_proxy(proxy, &target).await?;
            let (stream, _response) = tokio_tungstenite::client_async_tls(request, tcp).await?;
            Ok(stream)
        }
    }
}

/// `host:port` of the WebSocket endpoint, defaulting the port by scheme.
fn target_addr(raw: &str) -> Result<String> {
    let url =
        url::Url::parse(raw).map_err(|e| GatewayError::Config(format!("invalid url {raw}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::Config(format!("url has no host: {raw}")))?;
    let port = url.port_or_known_default().unwrap_or(443);
    Ok(format!("{host}:{port}"))
}

/// Open a TCP tunnel to `target` with an HTTP CONNECT request.
async fn connect_via_proxy(proxy: &ProxyConfig, target: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(proxy.addr()).await?;
    let req = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(req.as_bytes()).await?;

    let mut head = Vec::with_capacity(256);
    let mut buf = [0u8; 256];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(GatewayError::Transport("proxy closed during CONNECT".into()));
        }
        head.extend_from_slice(&buf[..n]);
        if head.len() > 8192 {
            return Err(GatewayError::Transport("proxy response header too large".into()));
        }
    }

    let status_line = String::from_utf8_lossy(&head);
    let status_line = status_line.lines().next().unwrap_or("");
    if !proxy_accepted(status_line) {
        return Err(GatewayError::Transport(format!("proxy refused CONNECT: {status_line}")));
    }
    Ok(stream)
}

fn proxy_accepted(status_line: &str) -> bool {
    status_line.split_whitespace().nth(1) == Some("200")
}
