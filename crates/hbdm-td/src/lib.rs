//! # hbdm-td
//!
//! Trading for HBDM coin-margined swaps.
//!
//! [`HbdmTd`] combines the signed REST client ([`rest::RestApi`]) with the
//! private order push channel ([`trade_ws::TradeWsApi`]) behind the
//! [`TdModule`] trait. The lifecycle is: `connect()` → order operations and
//! queries → `stop()`.
//!
//! | Concern              | Channel                 |
//! |----------------------|-------------------------|
//! | Place / cancel       | REST                    |
//! | Account / positions  | REST, polled            |
//! | Order + fill updates | trade WebSocket, pushed |
//! | Kline history        | REST, paginated         |

pub mod convert;
pub mod history;
pub mod rest;
pub mod trade_ws;
pub mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use hbdm_core::config::GatewayConfig;
use hbdm_core::ws::ChannelConfig;
use hbdm_core::{Bar, CancelRequest, HistoryRequest, OrderRequest, Result, SharedCallbacks};
use tracing::info;

pub use rest::{RestApi, RestSettings};
pub use trade_ws::{TradeHandler, TradeWsApi};
pub use transport::{HttpTransport, ReqwestTransport};

/// Trait implemented by trading modules.
///
/// Order operations return immediately with the local order id; outcomes
/// arrive through the gateway callbacks. All order operations take `&self`
/// so they can be called from several tasks.
#[async_trait]
pub trait TdModule: Send + Sync {
    fn name(&self) -> &str;

    /// Start the REST client (contract query) and the order push channel.
    async fn connect(&mut self) -> Result<()>;

    /// Submit one order. Returns the local order id.
    fn send_order(&self, req: &OrderRequest) -> String;

    /// Submit orders in one batch. Returns local ids in request order.
    fn send_orders(&self, reqs: &[OrderRequest]) -> Vec<String>;

    fn cancel_order(&self, req: &CancelRequest);

    async fn query_account(&self);

    /// Refresh positions; absent (symbol, direction) pairs are reported flat.
    async fn query_position(&self);

    async fn query_history(&self, req: &HistoryRequest) -> Vec<Bar>;

    /// Abort REST tasks and close the push channel.
    async fn stop(&mut self) -> Result<()>;
}

/// REST client plus trade WebSocket.
pub struct HbdmTd {
    rest: RestApi,
    trade_ws: TradeWsApi,
}

impl HbdmTd {
    /// Build on the HTTPS transport. Nothing is sent until [`connect`](TdModule::connect).
    pub fn new(cfg: &GatewayConfig, callbacks: SharedCallbacks) -> Result<Self> {
        let settings = RestSettings::from_config(cfg);
        let transport = Arc::new(ReqwestTransport::new(&settings.url, settings.proxy.as_ref())?);
        Self::with_transport(cfg, transport, callbacks)
    }

    pub fn with_transport(
        cfg: &GatewayConfig,
        transport: Arc<dyn HttpTransport>,
        callbacks: SharedCallbacks,
    ) -> Result<Self> {
        let rest = RestApi::new(RestSettings::from_config(cfg), transport, callbacks.clone())?;
        let channel = ChannelConfig {
            label: "trade-ws",
            url: cfg.trade_ws_url.clone(),
            id: 0,
            proxy: cfg.proxy(),
            credentials: cfg.credentials(),
        };
        let trade_ws = TradeWsApi::new(channel, callbacks)?;
        Ok(Self { rest, trade_ws })
    }

    /// REST client handle, shared with pollers.
    pub fn rest(&self) -> &RestApi {
        &self.rest
    }

    pub fn trade_ws(&self) -> &TradeWsApi {
        &self.trade_ws
    }
}

#[async_trait]
impl TdModule for HbdmTd {
    fn name(&self) -> &str {
        "hbdm"
    }

    async fn connect(&mut self) -> Result<()> {
        self.rest.start();
        self.trade_ws.start();
        info!("[td] connected");
        Ok(())
    }

    fn send_order(&self, req: &OrderRequest) -> String {
        self.rest.send_order(req)
    }

    fn send_orders(&self, reqs: &[OrderRequest]) -> Vec<String> {
        self.rest.send_orders(reqs)
    }

    fn cancel_order(&self, req: &CancelRequest) {
        self.rest.cancel_order(req);
    }

    async fn query_account(&self) {
        self.rest.query_account().await;
    }

    async fn query_position(&self) {
        self.rest.query_position().await;
    }

    async fn query_history(&self, req: &HistoryRequest) -> Vec<Bar> {
        self.rest.query_history(req).await
    }

    async fn stop(&mut self) -> Result<()> {
        self.rest.stop();
        self.trade_ws.stop().await;
        info!("[td] stopped");
        Ok(())
    }
}
