//! Configuration parsing for the HBDM gateway.
//!
//! All components read their settings from a single JSON config file.
//!
//! # Example config
//!
//! ```json
//! {
//!   "gateway": { "name": "HBDM", "log_path": "/tmp/log" },
//!   "key": "...",
//!   "secret": "...",
//!   "proxy_host": "127.0.0.1",
//!   "proxy_port": 1080,
//!   "symbols": ["BTC-USD", "ETH-USD"]
//! }
//! ```

use serde::Deserialize;

use crate::auth::Credentials;

pub const DEFAULT_REST_URL: &str = "https://api.hbdm.com";
pub const DEFAULT_TRADE_WS_URL: &str = "wss://api.hbdm.com/swap-notification";
pub const DEFAULT_MARKET_WS_URL: &str = "wss://api.hbdm.com/swap-ws";

/// Top-level application config, deserialized from a JSON file.
#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway metadata (name, log path).
    #[serde(default)]
    pub gateway: GatewayMeta,

    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub proxy_host: String,

    /// Port as a number or a string. Anything that is not all digits
    /// disables the proxy.
    #[serde(default)]
    pub proxy_port: Option<serde_json::Value>,

    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    #[serde(default = "default_trade_ws_url")]
    pub trade_ws_url: String,

    #[serde(default = "default_market_ws_url")]
    pub market_ws_url: String,

    /// Contracts to subscribe to on connect.
    #[serde(default)]
    pub symbols: Vec<String>,

    #[serde(default = "default_lever_rate")]
    pub lever_rate: u32,

    /// Pause between sequential open-order queries.
    #[serde(default = "default_open_order_query_delay_ms")]
    pub open_order_query_delay_ms: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Timer ticks to wait after connect before polling account/position.
    #[serde(default = "default_poll_warmup_ticks")]
    pub poll_warmup_ticks: u32,
}

/// Gateway metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayMeta {
    #[serde(default = "default_gateway_name")]
    pub name: String,
    pub log_path: Option<String>,
}

impl Default for GatewayMeta {
    fn default() -> Self {
        Self { name: default_gateway_name(), log_path: None }
    }
}

/// HTTP proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    /// `http://host:port`, as accepted by reqwest.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// `host:port` for a raw TCP connect.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolve a proxy from user-supplied host/port.
///
/// An empty host, a zero port, or a port that is not all digits yields `None`.
pub fn parse_proxy(host: &str, port: &str) -> Option<ProxyConfig> {
    let host = host.trim();
    let port = port.trim();
    if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(ProxyConfig { host: host.to_string(), port }),
    }
}

impl GatewayConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.key.clone(), self.secret.clone())
    }

    pub fn proxy(&self) -> Option<ProxyConfig> {
        let port = match &self.proxy_port {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        parse_proxy(&self.proxy_host, &port)
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("gateway", &self.gateway)
            .field("credentials", &self.credentials())
            .field("proxy", &self.proxy())
            .field("rest_url", &self.rest_url)
            .field("trade_ws_url", &self.trade_ws_url)
            .field("market_ws_url", &self.market_ws_url)
            .field("symbols", &self.symbols)
            .field("lever_rate", &self.lever_rate)
            .finish_non_exhaustive()
    }
}

fn default_gateway_name() -> String {
    "HBDM".to_string()
}

fn default_rest_url() -> String {
    DEFAULT_REST_URL.to_string()
}

fn default_trade_ws_url() -> String {
    DEFAULT_TRADE_WS_URL.to_string()
}

fn default_market_ws_url() -> String {
    DEFAULT_MARKET_WS_URL.to_string()
}

fn default_lever_rate() -> u32 {
    20
}

fn default_open_order_query_delay_ms() -> u64 {
    100
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_poll_warmup_ticks() -> u32 {
    3
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<GatewayConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: GatewayConfig = serde_json::from_str(&content)?;
    Ok(config)
}
