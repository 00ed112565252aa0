//! Shared WebSocket protocol base: login, keep-alive, frame decoding, dispatch.
//!
//! Both the trade and the market channel run the same state machine:
//!
//! ```text
//! Disconnected → Connecting → Connected → Authenticating → Authenticated
//! ```
//!
//! Public channels skip the two auth states and stay `Connected`.
//!
//! Every inbound binary frame is decompressed and parsed before dispatch.
//! Dispatch order on a decoded packet:
//!
//! 1. `{"ping": ts}` → `{"pong": ts}`
//! 2. `{"op": "ping", "ts": ts}` → `{"op": "pong", "ts": ts}`
//! 3. `err-msg` present → error handling (benign messages dropped)
//! 4. `{"op": "auth"}` ack → `Authenticated`, then the channel's post-login hook
//! 5. anything else → the channel's data handler

use std::io::Read;
use std::sync::Arc;

use flate2::read::{DeflateDecoder, GzDecoder};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::client::{WsConnConfig, WsConnection, WsHandlers};
use crate::auth::{Credentials, split_url};
use crate::config::ProxyConfig;
use crate::error::{GatewayError, Result, is_benign_message};
use crate::event::SharedCallbacks;
use crate::json_util;

/// Connection/auth state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
}

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompress one binary frame to UTF-8 text.
///
/// Frames carrying a gzip header are gunzipped; anything else is treated as
/// raw deflate with no header.
pub fn decompress_frame(data: &[u8]) -> Result<String> {
    let mut out = String::with_capacity(data.len() * 4);
    let res = if data.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(data).read_to_string(&mut out)
    } else {
        DeflateDecoder::new(data).read_to_string(&mut out)
    };
    res.map_err(|e| GatewayError::Decode(format!("frame decompression failed: {e}")))?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Non-blocking handle for writing JSON frames to the connection task.
#[derive(Clone)]
pub struct PacketSender {
    label: &'static str,
    tx: mpsc::UnboundedSender<String>,
}

impl PacketSender {
    pub fn new(label: &'static str, tx: mpsc::UnboundedSender<String>) -> Self {
        Self { label, tx }
    }

    /// Queue a packet. Returns `false` if the connection is gone.
    pub fn send_packet(&self, packet: &Value) -> bool {
        match self.tx.send(packet.to_string()) {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}] dropping outbound packet: {e}", self.label);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Channel hooks
// ---------------------------------------------------------------------------

/// Channel-specific behaviour plugged into [`ProtocolBase`].
pub trait ChannelHandler: Send + Sync + 'static {
    /// Whether the channel logs in after connecting.
    fn requires_auth(&self) -> bool;

    /// Called once per (re)connect, after the login frame (if any) is queued.
    fn on_connected(&self, _proto: &ProtocolBase) {}

    /// Called when the login ack arrives.
    fn on_login(&self, _proto: &ProtocolBase) {}

    /// Called for every packet not consumed by the base.
    fn on_data(&self, proto: &ProtocolBase, packet: &Value);
}

// ---------------------------------------------------------------------------
// Protocol base
// ---------------------------------------------------------------------------

/// Per-channel protocol state shared between the connection task callbacks.
pub struct ProtocolBase {
    label: &'static str,
    credentials: Credentials,
    sign_host: String,
    sign_path: String,
    state: Mutex<ProtocolState>,
    sender: PacketSender,
    callbacks: SharedCallbacks,
}

impl ProtocolBase {
    /// Derive the signing host/path from `url`.
    pub fn new(
        label: &'static str,
        url: &str,
        credentials: Credentials,
        sender: PacketSender,
        callbacks: SharedCallbacks,
    ) -> Result<Self> {
        let (sign_host, sign_path) = split_url(url)?;
        Ok(Self {
            label,
            credentials,
            sign_host,
            sign_path,
            state: Mutex::new(ProtocolState::Disconnected),
            sender,
            callbacks,
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> ProtocolState {
        *self.state.lock()
    }

    fn set_state(&self, state: ProtocolState) {
        let mut guard = self.state.lock();
        if *guard != state {
            debug!("[{}] state {:?} -> {state:?}", self.label, *guard);
            *guard = state;
        }
    }

    pub fn callbacks(&self) -> &SharedCallbacks {
        &self.callbacks
    }

    pub fn send_packet(&self, packet: &Value) -> bool {
        self.sender.send_packet(packet)
    }

    /// Queue the signed `auth` frame and move to `Authenticating`.
    pub fn login(&self) -> Result<()> {
        let signed = self.credentials.sign("GET", &self.sign_host, &self.sign_path, &[])?;
        let mut frame = serde_json::Map::new();
        frame.insert("op".into(), json!("auth"));
        frame.insert("type".into(), json!("api"));
        for (k, v) in signed {
            frame.insert(k, Value::String(v));
        }
        self.set_state(ProtocolState::Authenticating);
        if !self.send_packet(&Value::Object(frame)) {
            return Err(GatewayError::Transport("login frame not queued".into()));
        }
        Ok(())
    }

    /// Connection task is about to dial.
    pub fn handle_connecting(&self) {
        self.set_state(ProtocolState::Connecting);
    }

    /// Transport connected (initial or reconnect).
    pub fn handle_connected(&self, handler: &dyn ChannelHandler) {
        self.set_state(ProtocolState::Connected);
        info!("[{}] connected", self.label);
        self.callbacks.write_log(format!("{} websocket connected", self.label));

        if handler.requires_auth() {
            if let Err(e) = self.login() {
                error!("[{}] login failed: {e}", self.label);
                self.callbacks.write_log(format!("{} login failed: {e}", self.label));
                self.set_state(ProtocolState::Connected);
            }
        }
        handler.on_connected(self);
    }

    pub fn handle_disconnected(&self) {
        self.set_state(ProtocolState::Disconnected);
        warn!("[{}] disconnected", self.label);
        self.callbacks.write_log(format!("{} websocket disconnected", self.label));
    }

    /// Binary frames are compressed JSON.
    pub fn handle_binary(&self, handler: &dyn ChannelHandler, data: &[u8]) {
        match decompress_frame(data) {
            Ok(text) => self.handle_text(handler, &text),
            Err(e) => error!("[{}] {e}", self.label),
        }
    }

    pub fn handle_text(&self, handler: &dyn ChannelHandler, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(packet) => self.dispatch(handler, &packet),
            Err(e) => error!("[{}] undecodable frame: {e}: {text}", self.label),
        }
    }

    /// Route a decoded packet.
    pub fn dispatch(&self, handler: &dyn ChannelHandler, packet: &Value) {
        if let Some(ts) = packet.get("ping") {
            self.send_packet(&json!({ "pong": ts }));
            return;
        }

        let op = json_util::str_field(packet, "op");
        if op == "ping" {
            let ts = packet.get("ts").cloned().unwrap_or(Value::Null);
            self.send_packet(&json!({ "op": "pong", "ts": ts }));
            return;
        }

        if packet.get("err-msg").is_some() {
            self.on_error_msg(packet);
            return;
        }

        if op == "auth" {
            self.on_login_ack(handler, packet);
            return;
        }

        handler.on_data(self, packet);
    }

    fn on_error_msg(&self, packet: &Value) {
        let msg = json_util::str_field(packet, "err-msg");
        if is_benign_message(msg) {
            return;
        }
        let code = json_util::string_field(packet, "err-code").unwrap_or_default();
        error!("[{}] error frame {code}: {msg}", self.label);
        self.callbacks.write_log(format!("{} error {code}: {msg}", self.label));
    }

    fn on_login_ack(&self, handler: &dyn ChannelHandler, packet: &Value) {
        let code = json_util::i64_field(packet, "err-code").unwrap_or(0);
        if code != 0 {
            error!("[{}] login rejected: {packet}", self.label);
            self.callbacks.write_log(format!("{} login rejected, code {code}", self.label));
            self.set_state(ProtocolState::Connected);
            return;
        }
        self.set_state(ProtocolState::Authenticated);
        info!("[{}] logged in", self.label);
        self.callbacks.write_log(format!("{} websocket login succeeded", self.label));
        handler.on_login(self);
    }
}

// ---------------------------------------------------------------------------
// Channel = connection + protocol + handler
// ---------------------------------------------------------------------------

/// Settings for one WebSocket channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub label: &'static str,
    pub url: String,
    pub id: usize,
    pub proxy: Option<ProxyConfig>,
    pub credentials: Credentials,
}

/// A running WebSocket channel driving a [`ChannelHandler`].
pub struct WsChannel<H: ChannelHandler> {
    conn: WsConnection,
    base: Arc<ProtocolBase>,
    handler: Arc<H>,
}

impl<H: ChannelHandler> WsChannel<H> {
    pub fn new(config: ChannelConfig, handler: Arc<H>, callbacks: SharedCallbacks) -> Result<Self> {
        let mut conn_config = WsConnConfig::new(config.url.clone(), config.id);
        conn_config.proxy = config.proxy;
        let conn = WsConnection::new(conn_config);
        let sender = PacketSender::new(config.label, conn.sender());
        let base = Arc::new(ProtocolBase::new(
            config.label,
            &config.url,
            config.credentials,
            sender,
            callbacks,
        )?);
        Ok(Self { conn, base, handler })
    }

    pub fn base(&self) -> &Arc<ProtocolBase> {
        &self.base
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Spawn the connection task.
    pub fn start(&mut self) {
        if self.conn.is_started() {
            return;
        }
        self.base.handle_connecting();

        let (b1, h1) = (self.base.clone(), self.handler.clone());
        let b2 = self.base.clone();
        let (b3, h3) = (self.base.clone(), self.handler.clone());
        let (b4, h4) = (self.base.clone(), self.handler.clone());

        self.conn.start(WsHandlers {
            on_connected: Arc::new(move |_| b1.handle_connected(h1.as_ref())),
            on_disconnected: Arc::new(move |_| b2.handle_disconnected()),
            on_text: Arc::new(move |_, text| b3.handle_text(h3.as_ref(), text)),
            on_binary: Arc::new(move |_, data| b4.handle_binary(h4.as_ref(), data)),
        });
    }

    pub async fn stop(&mut self) {
        self.conn.stop().await;
        self.base.set_state(ProtocolState::Disconnected);
    }
}
