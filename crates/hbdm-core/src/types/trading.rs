//! Trading-related data structures: requests from the caller and the domain
//! objects emitted back through [`GatewayCallbacks`](crate::event::GatewayCallbacks).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{Direction, Interval, Offset, OrderIdOrigin, OrderStatus, OrderType, Product};

/// Order ids above this value are locally generated `client_order_id`s.
///
/// Local ids are `{yyMMddHHmmss}{counter}` and always far exceed it, while
/// exchange ids for legacy accounts stay below.
pub const LOCAL_ORDER_ID_THRESHOLD: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Requests (caller → gateway)
// ---------------------------------------------------------------------------

/// A new order request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub order_type: OrderType,
    pub price: f64,
    pub volume: f64,
}

impl OrderRequest {
    /// Build the pending [`Order`] emitted before the exchange acknowledges.
    pub fn create_order(&self, order_id: String, datetime: DateTime<Utc>) -> Order {
        Order {
            order_id,
            symbol: self.symbol.clone(),
            direction: self.direction,
            offset: self.offset,
            order_type: self.order_type,
            price: self.price,
            volume: self.volume,
            traded: 0.0,
            status: OrderStatus::Submitting,
            datetime,
        }
    }
}

/// A cancel request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub symbol: String,
    pub order_id: String,
    /// Explicit origin of `order_id`. When absent, the magnitude heuristic
    /// in [`CancelRequest::origin`] decides.
    #[serde(default)]
    pub origin: Option<OrderIdOrigin>,
}

impl CancelRequest {
    pub fn new(symbol: &str, order_id: &str) -> Self {
        Self { symbol: symbol.to_string(), order_id: order_id.to_string(), origin: None }
    }

    /// Resolve which id field the exchange expects for this order.
    pub fn origin(&self, numeric_id: i64) -> OrderIdOrigin {
        self.origin.unwrap_or_else(|| classify_order_id(numeric_id))
    }
}

/// Magnitude heuristic: ids strictly above [`LOCAL_ORDER_ID_THRESHOLD`] are local.
pub fn classify_order_id(id: i64) -> OrderIdOrigin {
    if id > LOCAL_ORDER_ID_THRESHOLD { OrderIdOrigin::Local } else { OrderIdOrigin::Exchange }
}

/// A market data subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub symbol: String,
}

/// A historical kline query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Domain objects (gateway → caller)
// ---------------------------------------------------------------------------

/// An order and its latest known state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Local id if the exchange echoed a `client_order_id`, else the exchange id.
    pub order_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub order_type: OrderType,
    pub price: f64,
    pub volume: f64,
    pub traded: f64,
    pub status: OrderStatus,
    pub datetime: DateTime<Utc>,
}

/// A fill. Emitted once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub order_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
    pub datetime: DateTime<Utc>,
}

/// A position keyed by `(symbol, direction)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub frozen: f64,
    /// Average holding cost.
    pub price: f64,
    /// Unrealized PnL.
    pub pnl: f64,
}

impl Position {
    pub fn flat(symbol: &str, direction: Direction) -> Self {
        Self {
            symbol: symbol.to_string(),
            direction,
            volume: 0.0,
            frozen: 0.0,
            price: 0.0,
            pnl: 0.0,
        }
    }

    /// Reset to flat, keeping the key.
    pub fn clear(&mut self) {
        self.volume = 0.0;
        self.frozen = 0.0;
        self.price = 0.0;
        self.pnl = 0.0;
    }
}

/// Margin account balance for one settlement currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub balance: f64,
    pub frozen: f64,
}

/// A tradable contract. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub name: String,
    pub product: Product,
    pub price_tick: f64,
    /// Contract multiplier.
    pub size: f64,
    pub min_volume: f64,
    pub history_data: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_id_routing_boundary() {
        assert_eq!(classify_order_id(999_999), OrderIdOrigin::Exchange);
        assert_eq!(classify_order_id(1_000_000), OrderIdOrigin::Exchange);
        assert_eq!(classify_order_id(1_000_001), OrderIdOrigin::Local);
        assert_eq!(classify_order_id(24030604301510001), OrderIdOrigin::Local);
    }

    #[test]
    fn explicit_origin_overrides_heuristic() {
        let mut req = CancelRequest::new("BTC-USD", "42");
        assert_eq!(req.origin(42), OrderIdOrigin::Exchange);
        req.origin = Some(OrderIdOrigin::Local);
        assert_eq!(req.origin(42), OrderIdOrigin::Local);
    }

    #[test]
    fn pending_order_from_request() {
        let req = OrderRequest {
            symbol: "BTC-USD".into(),
            direction: Direction::Long,
            offset: Offset::Open,
            order_type: OrderType::Limit,
            price: 30000.0,
            volume: 2.0,
        };
        let order = req.create_order("24030604301510001".into(), DateTime::default());
        assert_eq!(order.status, OrderStatus::Submitting);
        assert_eq!(order.traded, 0.0);
        assert_eq!(order.volume, 2.0);
    }

    #[test]
    fn clear_keeps_key() {
        let mut pos = Position {
            symbol: "ETH-USD".into(),
            direction: Direction::Short,
            volume: 3.0,
            frozen: 1.0,
            price: 2000.0,
            pnl: -4.0,
        };
        pos.clear();
        assert_eq!(pos, Position::flat("ETH-USD", Direction::Short));
    }
}
