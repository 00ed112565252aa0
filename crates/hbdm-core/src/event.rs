//! Collaborator callback surface.
//!
//! Components never call back into the caller directly; they emit through a
//! [`GatewayCallbacks`] implementation. The stock implementation forwards
//! every call as a [`GatewayEvent`] on an unbounded tokio channel, which the
//! runner (or a test) drains.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::types::{Account, Instrument, Order, Position, Tick, Trade};

/// Sink for domain objects produced by the gateway.
pub trait GatewayCallbacks: Send + Sync {
    fn on_order(&self, order: Order);
    fn on_trade(&self, trade: Trade);
    fn on_tick(&self, tick: Tick);
    fn on_account(&self, account: Account);
    fn on_position(&self, position: Position);
    fn on_contract(&self, instrument: Instrument);
    /// User-visible status line, distinct from tracing diagnostics.
    fn write_log(&self, msg: String);
}

/// Shared handle to a callback sink.
pub type SharedCallbacks = Arc<dyn GatewayCallbacks>;

/// One emitted domain object.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Order(Order),
    Trade(Trade),
    Tick(Tick),
    Account(Account),
    Position(Position),
    Contract(Instrument),
    Log(String),
}

/// Sender half of the gateway event channel.
pub type GatewayEventSender = mpsc::UnboundedSender<GatewayEvent>;

/// Receiver half of the gateway event channel.
pub type GatewayEventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Create a connected event channel.
pub fn event_channel() -> (GatewayEventSender, GatewayEventReceiver) {
    mpsc::unbounded_channel()
}

// A closed receiver means the consumer is gone; events are dropped.
impl GatewayCallbacks for GatewayEventSender {
    fn on_order(&self, order: Order) {
        let _ = self.send(GatewayEvent::Order(order));
    }

    fn on_trade(&self, trade: Trade) {
        let _ = self.send(GatewayEvent::Trade(trade));
    }

    fn on_tick(&self, tick: Tick) {
        let _ = self.send(GatewayEvent::Tick(tick));
    }

    fn on_account(&self, account: Account) {
        let _ = self.send(GatewayEvent::Account(account));
    }

    fn on_position(&self, position: Position) {
        let _ = self.send(GatewayEvent::Position(position));
    }

    fn on_contract(&self, instrument: Instrument) {
        let _ = self.send(GatewayEvent::Contract(instrument));
    }

    fn write_log(&self, msg: String) {
        let _ = self.send(GatewayEvent::Log(msg));
    }
}

/// Drain everything currently queued on a receiver. Test helper.
pub fn drain(rx: &mut GatewayEventReceiver) -> Vec<GatewayEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}
