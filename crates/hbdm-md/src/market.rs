//! Market WebSocket client.
//!
//! Keeps one mutable [`Tick`] per subscribed contract, fed by two independent
//! push streams:
//!
//! - `market.<symbol>.depth.step0` → up to 5 bid/ask levels
//! - `market.<symbol>.detail` → open/high/low/last and volume
//!
//! A copy of the tick is emitted only once both streams have contributed
//! (a last price from detail and at least one book level from depth). After
//! that, every update on either stream emits.
//!
//! Every subscription is recorded and replayed after each reconnect.

use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use hbdm_core::json_util::{array_field, f64_field, fill_levels, i64_field, str_field};
use hbdm_core::time_util;
use hbdm_core::ws::{ChannelConfig, ChannelHandler, ProtocolBase, WsChannel};
use hbdm_core::{Result, SharedCallbacks, SubscribeRequest, Tick};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::MdModule;

const LABEL: &str = "market-ws";

/// Tick plus readiness flags.
#[derive(Debug, Clone)]
struct TickState {
    tick: Tick,
    has_detail: bool,
    has_depth: bool,
}

impl TickState {
    fn new(symbol: &str) -> Self {
        Self { tick: Tick::new(symbol, chrono::Utc::now()), has_detail: false, has_depth: false }
    }

    fn is_ready(&self) -> bool {
        self.has_detail && self.has_depth
    }
}

/// Market channel handler: subscription registry and tick cache.
pub struct MarketHandler {
    ticks: Mutex<AHashMap<String, TickState>>,
    /// Insertion-ordered, append-only for the session.
    subscriptions: Mutex<Vec<SubscribeRequest>>,
    callbacks: SharedCallbacks,
}

impl MarketHandler {
    pub fn new(callbacks: SharedCallbacks) -> Self {
        Self {
            ticks: Mutex::new(AHashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
            callbacks,
        }
    }

    /// Record a subscription and seed an empty tick.
    ///
    /// Returns `false` if the symbol was already subscribed.
    pub fn register(&self, req: &SubscribeRequest) -> bool {
        let mut subs = self.subscriptions.lock();
        if subs.iter().any(|s| s.symbol == req.symbol) {
            return false;
        }
        subs.push(req.clone());
        self.ticks.lock().insert(req.symbol.clone(), TickState::new(&req.symbol));
        true
    }

    pub fn subscriptions(&self) -> Vec<SubscribeRequest> {
        self.subscriptions.lock().clone()
    }

    /// Current snapshot for `symbol`, regardless of readiness.
    pub fn tick(&self, symbol: &str) -> Option<Tick> {
        self.ticks.lock().get(symbol).map(|s| s.tick.clone())
    }

    /// Queue the depth and detail subscriptions for one contract.
    pub fn send_subscribe(&self, proto: &ProtocolBase, symbol: &str) {
        proto.send_packet(&json!({
            "sub": format!("market.{symbol}.depth.step0"),
            "id": format!("depth-{symbol}"),
        }));
        proto.send_packet(&json!({
            "sub": format!("market.{symbol}.detail"),
            "id": format!("detail-{symbol}"),
        }));
    }

    fn on_market_depth(&self, symbol: &str, packet: &Value) {
        let Some(tick_data) = packet.get("tick") else { return };
        if tick_data.get("bids").is_none() || tick_data.get("asks").is_none() {
            return;
        }
        let bids = array_field(tick_data, "bids");
        let asks = array_field(tick_data, "asks");

        let snapshot = {
            let mut ticks = self.ticks.lock();
            let Some(state) = ticks.get_mut(symbol) else {
                debug!("[{LABEL}] depth for unsubscribed {symbol}");
                return;
            };
            if let Some(ts) = i64_field(packet, "ts") {
                state.tick.datetime = time_util::from_millis(ts);
            }
            fill_levels(&mut state.tick.bids, bids);
            fill_levels(&mut state.tick.asks, asks);
            if !bids.is_empty() || !asks.is_empty() {
                state.has_depth = true;
            }
            state.is_ready().then(|| state.tick.clone())
        };

        if let Some(tick) = snapshot {
            self.callbacks.on_tick(tick);
        }
    }

    fn on_market_detail(&self, symbol: &str, packet: &Value) {
        let Some(tick_data) = packet.get("tick") else { return };

        let snapshot = {
            let mut ticks = self.ticks.lock();
            let Some(state) = ticks.get_mut(symbol) else {
                debug!("[{LABEL}] detail for unsubscribed {symbol}");
                return;
            };
            if let Some(ts) = i64_field(packet, "ts") {
                state.tick.datetime = time_util::from_millis(ts);
            }
            let tick = &mut state.tick;
            tick.open_price = f64_field(tick_data, "open");
            tick.high_price = f64_field(tick_data, "high");
            tick.low_price = f64_field(tick_data, "low");
            tick.last_price = f64_field(tick_data, "close");
            tick.volume = f64_field(tick_data, "vol");
            if tick.last_price != 0.0 {
                state.has_detail = true;
            }
            state.is_ready().then(|| state.tick.clone())
        };

        if let Some(tick) = snapshot {
            self.callbacks.on_tick(tick);
        }
    }
}

impl ChannelHandler for MarketHandler {
    fn requires_auth(&self) -> bool {
        false
    }

    /// Replay every recorded subscription.
    fn on_connected(&self, proto: &ProtocolBase) {
        let subs = self.subscriptions();
        if !subs.is_empty() {
            info!("[{LABEL}] replaying {} subscriptions", subs.len());
        }
        for req in &subs {
            self.send_subscribe(proto, &req.symbol);
        }
    }

    fn on_data(&self, _proto: &ProtocolBase, packet: &Value) {
        let channel = str_field(packet, "ch");
        if !channel.is_empty() {
            let mut parts = channel.split('.');
            let (Some("market"), Some(symbol), Some(kind)) =
                (parts.next(), parts.next(), parts.next())
            else {
                warn!("[{LABEL}] unexpected channel {channel}");
                return;
            };
            match kind {
                "depth" => self.on_market_depth(symbol, packet),
                "detail" => self.on_market_detail(symbol, packet),
                _ => debug!("[{LABEL}] ignoring channel {channel}"),
            }
        } else if packet.get("err_code").is_some() {
            let code = hbdm_core::json_util::string_field(packet, "err_code").unwrap_or_default();
            let msg = str_field(packet, "err_msg");
            error!("[{LABEL}] error {code}: {msg}");
            self.callbacks.write_log(format!("{LABEL} error {code}: {msg}"));
        }
    }
}

/// Public market data channel.
pub struct MarketWsApi {
    channel: WsChannel<MarketHandler>,
}

impl MarketWsApi {
    pub fn new(config: ChannelConfig, callbacks: SharedCallbacks) -> Result<Self> {
        let handler = Arc::new(MarketHandler::new(callbacks.clone()));
        Ok(Self { channel: WsChannel::new(config, handler, callbacks)? })
    }

    pub fn handler(&self) -> &Arc<MarketHandler> {
        self.channel.handler()
    }

    /// Record the subscription and, if connected, send it now. Otherwise it
    /// goes out with the replay on connect.
    pub fn subscribe(&self, req: &SubscribeRequest) {
        if !self.handler().register(req) {
            debug!("[{LABEL}] {} already subscribed", req.symbol);
            return;
        }
        let base = self.channel.base();
        if base.state() == hbdm_core::ws::ProtocolState::Connected {
            self.handler().send_subscribe(base, &req.symbol);
        }
    }
}

#[async_trait]
impl MdModule for MarketWsApi {
    fn name(&self) -> &str {
        LABEL
    }

    async fn start(&mut self) -> Result<()> {
        self.channel.start();
        Ok(())
    }

    fn subscribe(&mut self, req: &SubscribeRequest) {
        MarketWsApi::subscribe(self, req);
    }

    async fn stop(&mut self) -> Result<()> {
        self.channel.stop().await;
        Ok(())
    }
}
