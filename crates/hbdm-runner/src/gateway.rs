//! Gateway facade: one REST client, the trade channel, and the market channel
//! behind a single connect / close lifecycle.
//!
//! After connect a timer polls account and positions every
//! `poll_interval_secs`, starting once `poll_warmup_ticks` ticks have passed.

use std::time::Duration;

use hbdm_core::config::GatewayConfig;
use hbdm_core::ws::ChannelConfig;
use hbdm_core::{
    Bar, CancelRequest, HistoryRequest, OrderRequest, Result, SharedCallbacks, SubscribeRequest,
};
use hbdm_md::{MarketWsApi, MdModule};
use hbdm_td::{HbdmTd, RestApi, TdModule};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Counts timer ticks; fires on every tick from the warmup tick onwards.
#[derive(Debug)]
pub struct PollTimer {
    warmup: u32,
    ticks: u32,
}

impl PollTimer {
    pub fn new(warmup: u32) -> Self {
        Self { warmup, ticks: 0 }
    }

    /// Record one tick. Returns `true` when a poll is due.
    pub fn tick(&mut self) -> bool {
        self.ticks = self.ticks.saturating_add(1);
        self.ticks >= self.warmup
    }
}

fn spawn_poller(rest: RestApi, interval: Duration, warmup: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = PollTimer::new(warmup);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            if !timer.tick() {
                continue;
            }
            debug!("[poll] account + position");
            rest.query_account().await;
            rest.query_position().await;
        }
    })
}

/// HBDM swap gateway.
pub struct HbdmGateway {
    config: GatewayConfig,
    td: HbdmTd,
    md: MarketWsApi,
    poller: Option<JoinHandle<()>>,
}

impl HbdmGateway {
    pub fn new(config: GatewayConfig, callbacks: SharedCallbacks) -> Result<Self> {
        let td = HbdmTd::new(&config, callbacks.clone())?;
        let market = ChannelConfig {
            label: "market-ws",
            url: config.market_ws_url.clone(),
            id: 1,
            proxy: config.proxy(),
            credentials: Default::default(),
        };
        let md = MarketWsApi::new(market, callbacks)?;
        Ok(Self { config, td, md, poller: None })
    }

    pub fn name(&self) -> &str {
        &self.config.gateway.name
    }

    /// Start every component, subscribe configured symbols, start polling.
    pub async fn connect(&mut self) -> Result<()> {
        self.td.connect().await?;
        self.md.start().await?;
        for symbol in self.config.symbols.clone() {
            self.subscribe(&SubscribeRequest { symbol });
        }

        let interval = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let warmup = self.config.poll_warmup_ticks;
        self.poller = Some(spawn_poller(self.td.rest().clone(), interval, warmup));
        info!("[gateway] {} connected", self.name());
        Ok(())
    }

    pub fn subscribe(&mut self, req: &SubscribeRequest) {
        MdModule::subscribe(&mut self.md, req);
    }

    pub fn send_order(&self, req: &OrderRequest) -> String {
        self.td.send_order(req)
    }

    pub fn send_orders(&self, reqs: &[OrderRequest]) -> Vec<String> {
        self.td.send_orders(reqs)
    }

    pub fn cancel_order(&self, req: &CancelRequest) {
        self.td.cancel_order(req);
    }

    pub async fn query_account(&self) {
        self.td.query_account().await;
    }

    pub async fn query_position(&self) {
        self.td.query_position().await;
    }

    pub async fn query_history(&self, req: &HistoryRequest) -> Vec<Bar> {
        self.td.query_history(req).await
    }

    /// Stop polling, then every component.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.md.stop().await?;
        self.td.stop().await?;
        info!("[gateway] {} closed", self.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hbdm_core::event::event_channel;
    use serde_json::json;

    use super::*;

    #[test]
    fn polls_from_warmup_tick_on() {
        let mut timer = PollTimer::new(3);
        let fired: Vec<bool> = (0..6).map(|_| timer.tick()).collect();
        assert_eq!(fired, [false, false, true, true, true, true]);
    }

    #[test]
    fn zero_warmup_polls_immediately() {
        let mut timer = PollTimer::new(0);
        assert!(timer.tick());
    }

    #[tokio::test]
    async fn close_without_connect() {
        let config: GatewayConfig = serde_json::from_value(json!({
            "gateway": {"name": "HBDM-TEST"},
            "symbols": ["BTC-USD"],
        }))
        .unwrap();
        let (etx, _erx) = event_channel();
        let mut gateway = HbdmGateway::new(config, Arc::new(etx)).unwrap();
        assert_eq!(gateway.name(), "HBDM-TEST");
        gateway.close().await.unwrap();
    }
}
