//! Private order push channel.
//!
//! Logs in on every connect, subscribes to `orders.*` once the login ack
//! arrives, and maps each `notify` frame to an order update followed by the
//! fills it carries.

use std::sync::Arc;

use hbdm_core::ws::{ChannelConfig, ChannelHandler, ProtocolBase, WsChannel};
use hbdm_core::json_util::str_field;
use hbdm_core::{Result, SharedCallbacks};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::convert;

const LABEL: &str = "trade-ws";

/// Wildcard order topic.
pub const ORDERS_TOPIC: &str = "orders.*";

/// Trade channel handler.
pub struct TradeHandler {
    callbacks: SharedCallbacks,
}

impl TradeHandler {
    pub fn new(callbacks: SharedCallbacks) -> Self {
        Self { callbacks }
    }

    fn on_order(&self, packet: &Value) {
        let Some(order) = convert::parse_order(packet) else { return };
        let trades = convert::parse_trades(&order, packet);
        self.callbacks.on_order(order);
        for trade in trades {
            self.callbacks.on_trade(trade);
        }
    }
}

impl ChannelHandler for TradeHandler {
    fn requires_auth(&self) -> bool {
        true
    }

    fn on_login(&self, proto: &ProtocolBase) {
        info!("[{LABEL}] subscribing {ORDERS_TOPIC}");
        proto.send_packet(&json!({ "op": "sub", "topic": ORDERS_TOPIC }));
    }

    fn on_data(&self, _proto: &ProtocolBase, packet: &Value) {
        if str_field(packet, "op") != "notify" {
            debug!("[{LABEL}] ignoring {packet}");
            return;
        }
        if str_field(packet, "topic").contains("orders") {
            self.on_order(packet);
        }
    }
}

/// Authenticated order/trade push channel.
pub struct TradeWsApi {
    channel: WsChannel<TradeHandler>,
}

impl TradeWsApi {
    pub fn new(config: ChannelConfig, callbacks: SharedCallbacks) -> Result<Self> {
        let handler = Arc::new(TradeHandler::new(callbacks.clone()));
        Ok(Self { channel: WsChannel::new(config, handler, callbacks)? })
    }

    pub fn start(&mut self) {
        self.channel.start();
    }

    pub async fn stop(&mut self) {
        self.channel.stop().await;
    }

    pub fn state(&self) -> hbdm_core::ws::ProtocolState {
        self.channel.base().state()
    }
}
