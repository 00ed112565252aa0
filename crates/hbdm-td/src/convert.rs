//! Wire rows → domain objects.
//!
//! Shared by the REST responses and the order push channel, which carry the
//! same order shape.

use hbdm_core::json_util::{array_field, f64_field, i64_field, str_field, string_field};
use hbdm_core::time_util;
use hbdm_core::{
    Account, Bar, Direction, Instrument, Interval, Offset, Order, OrderStatus, OrderType, Position,
    Product, Trade,
};
use serde_json::Value;
use tracing::warn;

/// Order row from `swap_openorders` or an `orders.*` push.
///
/// The id is the echoed `client_order_id` when present and non-zero, else
/// the exchange `order_id`. Rows with unmapped enum codes are dropped.
pub fn parse_order(d: &Value) -> Option<Order> {
    let order_id = match i64_field(d, "client_order_id") {
        Some(id) if id != 0 => id.to_string(),
        _ => string_field(d, "order_id")?,
    };

    let direction = Direction::from_wire(str_field(d, "direction"));
    let offset = Offset::from_wire(str_field(d, "offset"));
    let order_type = d.get("order_price_type").and_then(OrderType::from_wire);
    let status = i64_field(d, "status").and_then(OrderStatus::from_wire);
    let (Some(direction), Some(offset), Some(order_type), Some(status)) =
        (direction, offset, order_type, status)
    else {
        warn!("[convert] unmapped order row: {d}");
        return None;
    };

    Some(Order {
        order_id,
        symbol: str_field(d, "contract_code").to_string(),
        direction,
        offset,
        order_type,
        price: f64_field(d, "price"),
        volume: f64_field(d, "volume"),
        traded: f64_field(d, "trade_volume"),
        status,
        datetime: time_util::from_millis(i64_field(d, "created_at").unwrap_or(0)),
    })
}

/// Fills embedded in an order push. Inherit symbol/direction/offset from
/// the parent order.
pub fn parse_trades(order: &Order, d: &Value) -> Vec<Trade> {
    array_field(d, "trade")
        .iter()
        .map(|t| Trade {
            trade_id: string_field(t, "id")
                .or_else(|| string_field(t, "trade_id"))
                .unwrap_or_default(),
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            direction: order.direction,
            offset: order.offset,
            price: f64_field(t, "trade_price"),
            volume: f64_field(t, "trade_volume"),
            datetime: time_util::from_millis(i64_field(t, "created_at").unwrap_or(0)),
        })
        .collect()
}

/// `swap_account_info` row.
pub fn parse_account(d: &Value) -> Account {
    Account {
        account_id: str_field(d, "symbol").to_string(),
        balance: f64_field(d, "margin_balance"),
        frozen: f64_field(d, "margin_frozen"),
    }
}

/// `swap_position_info` row.
pub fn parse_position(d: &Value) -> Option<Position> {
    let direction = Direction::from_wire(str_field(d, "direction"))?;
    Some(Position {
        symbol: str_field(d, "contract_code").to_string(),
        direction,
        volume: f64_field(d, "volume"),
        frozen: f64_field(d, "frozen"),
        price: f64_field(d, "cost_hold"),
        pnl: f64_field(d, "profit"),
    })
}

/// `swap_contract_info` row.
pub fn parse_instrument(d: &Value) -> Instrument {
    let code = str_field(d, "contract_code").to_string();
    Instrument {
        name: code.clone(),
        symbol: code,
        product: Product::Futures,
        price_tick: f64_field(d, "price_tick"),
        size: f64_field(d, "contract_size"),
        min_volume: 1.0,
        history_data: true,
    }
}

/// Kline row; `id` is the bar open time in seconds.
pub fn parse_bar(symbol: &str, interval: Interval, d: &Value) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        datetime: time_util::from_secs(i64_field(d, "id").unwrap_or(0)),
        interval,
        volume: f64_field(d, "vol"),
        open_price: f64_field(d, "open"),
        high_price: f64_field(d, "high"),
        low_price: f64_field(d, "low"),
        close_price: f64_field(d, "close"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn order_row() -> Value {
        json!({
            "contract_code": "BTC-USD",
            "order_id": 633766664829804544i64,
            "client_order_id": 24030604301510001i64,
            "price": 30000.5,
            "volume": 2,
            "direction": "buy",
            "offset": "open",
            "order_price_type": "limit",
            "trade_volume": 1,
            "status": 4,
            "created_at": 1_700_000_000_123i64,
        })
    }

    #[test]
    fn prefers_client_order_id() {
        let order = parse_order(&order_row()).unwrap();
        assert_eq!(order.order_id, "24030604301510001");
        assert_eq!(order.status, OrderStatus::PartTraded);
        assert_eq!(order.traded, 1.0);
        assert_eq!(order.datetime.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn falls_back_to_exchange_id() {
        let mut row = order_row();
        row["client_order_id"] = Value::Null;
        assert_eq!(parse_order(&row).unwrap().order_id, "633766664829804544");
        row["client_order_id"] = json!(0);
        assert_eq!(parse_order(&row).unwrap().order_id, "633766664829804544");
    }

    #[test]
    fn legacy_numeric_order_type() {
        let mut row = order_row();
        row["order_price_type"] = json!(3);
        assert_eq!(parse_order(&row).unwrap().order_type, OrderType::Market);
        row["order_price_type"] = json!("optimal_20");
        assert_eq!(parse_order(&row).unwrap().order_type, OrderType::Market);
    }

    #[test]
    fn unknown_status_drops_row() {
        let mut row = order_row();
        row["status"] = json!(11);
        assert!(parse_order(&row).is_none());
    }

    #[test]
    fn trades_inherit_parent_fields() {
        let mut row = order_row();
        row["trade"] = json!([
            {"id": 7001, "trade_price": 30000.0, "trade_volume": 1,
             "created_at": 1_700_000_000_200i64},
        ]);
        let order = parse_order(&row).unwrap();
        let trades = parse_trades(&order, &row);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade_id, "7001");
        assert_eq!(trades[0].order_id, order.order_id);
        assert_eq!(trades[0].direction, Direction::Long);
        assert_eq!(trades[0].offset, Offset::Open);
    }

    #[test]
    fn account_and_contract_rows() {
        let acc =
            parse_account(&json!({"symbol": "BTC", "margin_balance": 1.5, "margin_frozen": 0.25}));
        assert_eq!(acc, Account { account_id: "BTC".into(), balance: 1.5, frozen: 0.25 });

        let row = json!({"contract_code": "BTC-USD", "price_tick": 0.1, "contract_size": 100});
        let inst = parse_instrument(&row);
        assert_eq!(inst.symbol, "BTC-USD");
        assert_eq!(inst.size, 100.0);
        assert_eq!(inst.min_volume, 1.0);
    }
}
