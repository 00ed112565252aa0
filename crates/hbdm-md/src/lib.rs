//! # hbdm-md
//!
//! Market data for HBDM coin-margined swaps.
//!
//! [`market::MarketWsApi`] subscribes to the public depth and detail channels
//! per contract and emits [`Tick`](hbdm_core::Tick) snapshots through the
//! gateway callbacks.

pub mod market;

use async_trait::async_trait;
use hbdm_core::{Result, SubscribeRequest};

pub use market::{MarketHandler, MarketWsApi};

/// Trait implemented by market data modules.
///
/// Only `Send` is required (not `Sync`) because modules are accessed
/// sequentially by the runner, never concurrently.
#[async_trait]
pub trait MdModule: Send {
    /// Human-readable module name.
    fn name(&self) -> &str;
    /// Connect and begin processing market data.
    async fn start(&mut self) -> Result<()>;
    /// Subscribe to one contract. Survives reconnects.
    fn subscribe(&mut self, req: &SubscribeRequest);
    /// Gracefully stop all connections and tasks.
    async fn stop(&mut self) -> Result<()>;
}
