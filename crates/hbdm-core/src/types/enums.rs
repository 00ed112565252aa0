//! Enumerations and their exchange wire-code tables.
//!
//! Every translation between a domain enum and an exchange code goes through
//! one of the static tables below. Forward lookups (enum → wire) return the
//! single canonical code; reverse lookups (wire → enum) accept every legacy
//! alias and fold it onto one enum value.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Direction / Offset
// ---------------------------------------------------------------------------

/// Long or short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

const DIRECTION_TABLE: &[(Direction, &str)] =
    &[(Direction::Long, "buy"), (Direction::Short, "sell")];

impl Direction {
    pub fn to_wire(self) -> &'static str {
        lookup_wire(DIRECTION_TABLE, self).unwrap_or("")
    }

    pub fn from_wire(code: &str) -> Option<Self> {
        lookup_enum(DIRECTION_TABLE, code)
    }
}

/// Open or close a position. Independent of [`Direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Offset {
    Open,
    Close,
}

const OFFSET_TABLE: &[(Offset, &str)] = &[(Offset::Open, "open"), (Offset::Close, "close")];

impl Offset {
    pub fn to_wire(self) -> &'static str {
        lookup_wire(OFFSET_TABLE, self).unwrap_or("")
    }

    pub fn from_wire(code: &str) -> Option<Self> {
        lookup_enum(OFFSET_TABLE, code)
    }
}

// ---------------------------------------------------------------------------
// Order status
// ---------------------------------------------------------------------------

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Emitted locally, not yet acknowledged by the exchange.
    Submitting,
    NotTraded,
    PartTraded,
    AllTraded,
    Cancelled,
    Rejected,
}

/// Exchange status codes. `5` is "partially filled then cancelled".
const STATUS_TABLE: &[(i64, OrderStatus)] = &[
    (1, OrderStatus::Submitting),
    (2, OrderStatus::Submitting),
    (3, OrderStatus::NotTraded),
    (4, OrderStatus::PartTraded),
    (5, OrderStatus::Cancelled),
    (6, OrderStatus::AllTraded),
    (7, OrderStatus::Cancelled),
];

impl OrderStatus {
    pub fn from_wire(code: i64) -> Option<Self> {
        STATUS_TABLE.iter().find(|(c, _)| *c == code).map(|(_, s)| *s)
    }
}

// ---------------------------------------------------------------------------
// Order type
// ---------------------------------------------------------------------------

/// Order price type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    Stop,
    /// Fill-or-kill.
    Fok,
    /// Fill-and-kill (immediate-or-cancel).
    Fak,
}

/// Canonical outbound codes. `Stop` has no outbound code.
const ORDER_TYPE_TABLE: &[(OrderType, &str)] = &[
    (OrderType::Market, "opponent"),
    (OrderType::Limit, "limit"),
    (OrderType::Fok, "fok"),
    (OrderType::Fak, "ioc"),
];

/// Inbound string aliases on top of [`ORDER_TYPE_TABLE`].
const ORDER_TYPE_STR_ALIASES: &[(&str, OrderType)] = &[
    ("lightning", OrderType::Market),
    ("optimal_5", OrderType::Market),
    ("optimal_10", OrderType::Market),
    ("optimal_20", OrderType::Market),
];

/// Inbound numeric codes (legacy push format).
const ORDER_TYPE_NUM_ALIASES: &[(i64, OrderType)] = &[
    (1, OrderType::Limit),
    (3, OrderType::Market),
    (4, OrderType::Market),
    (5, OrderType::Stop),
    (6, OrderType::Limit),
];

impl OrderType {
    /// Outbound `order_price_type`, or `None` if the exchange cannot take it.
    pub fn to_wire(self) -> Option<&'static str> {
        lookup_wire(ORDER_TYPE_TABLE, self)
    }

    /// Resolve an inbound `order_price_type` that may be a string or an integer.
    pub fn from_wire(value: &serde_json::Value) -> Option<Self> {
        if let Some(code) = value.as_str() {
            return lookup_enum(ORDER_TYPE_TABLE, code)
                .or_else(|| {
                    ORDER_TYPE_STR_ALIASES.iter().find(|(c, _)| *c == code).map(|(_, t)| *t)
                });
        }
        let code = value.as_i64()?;
        ORDER_TYPE_NUM_ALIASES.iter().find(|(c, _)| *c == code).map(|(_, t)| *t)
    }
}

// ---------------------------------------------------------------------------
// Interval / Product
// ---------------------------------------------------------------------------

/// Kline bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Minute,
    Hour,
    Daily,
}

const INTERVAL_TABLE: &[(Interval, &str)] =
    &[(Interval::Minute, "1min"), (Interval::Hour, "60min"), (Interval::Daily, "1day")];

impl Interval {
    /// Exchange `period` parameter.
    pub fn to_wire(self) -> &'static str {
        lookup_wire(INTERVAL_TABLE, self).unwrap_or("")
    }

    pub fn from_wire(code: &str) -> Option<Self> {
        lookup_enum(INTERVAL_TABLE, code)
    }

    /// Length of one bar.
    pub fn duration(self) -> chrono::Duration {
        match self {
            Self::Minute => chrono::Duration::minutes(1),
            Self::Hour => chrono::Duration::hours(1),
            Self::Daily => chrono::Duration::days(1),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_wire())
    }
}

/// Instrument category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Product {
    #[default]
    Futures,
}

/// Where an order id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderIdOrigin {
    /// Generated by this gateway, sent as `client_order_id`.
    Local,
    /// Assigned by the exchange, sent as `order_id`.
    Exchange,
}

// ---------------------------------------------------------------------------
// Table helpers
// ---------------------------------------------------------------------------

fn lookup_wire<E: Copy + PartialEq>(table: &[(E, &'static str)], value: E) -> Option<&'static str> {
    table.iter().find(|(e, _)| *e == value).map(|(_, c)| *c)
}

fn lookup_enum<E: Copy>(table: &[(E, &'static str)], code: &str) -> Option<E> {
    table.iter().find(|(_, c)| *c == code).map(|(e, _)| *e)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn direction_and_offset_round_trip() {
        for d in [Direction::Long, Direction::Short] {
            assert_eq!(Direction::from_wire(d.to_wire()), Some(d));
        }
        for o in [Offset::Open, Offset::Close] {
            assert_eq!(Offset::from_wire(o.to_wire()), Some(o));
        }
        assert_eq!(Direction::from_wire("hold"), None);
    }

    #[test]
    fn market_aliases_fold_to_market() {
        for code in ["opponent", "lightning", "optimal_5", "optimal_10", "optimal_20"] {
            assert_eq!(OrderType::from_wire(&json!(code)), Some(OrderType::Market), "{code}");
        }
        assert_eq!(OrderType::from_wire(&json!(3)), Some(OrderType::Market));
        assert_eq!(OrderType::from_wire(&json!(4)), Some(OrderType::Market));
        // Forward direction stays canonical.
        assert_eq!(OrderType::Market.to_wire(), Some("opponent"));
    }

    #[test]
    fn numeric_order_types() {
        assert_eq!(OrderType::from_wire(&json!(1)), Some(OrderType::Limit));
        assert_eq!(OrderType::from_wire(&json!(6)), Some(OrderType::Limit));
        assert_eq!(OrderType::from_wire(&json!(5)), Some(OrderType::Stop));
        assert_eq!(OrderType::from_wire(&json!(2)), None);
        assert_eq!(OrderType::from_wire(&json!("ioc")), Some(OrderType::Fak));
    }

    #[test]
    fn stop_has_no_outbound_code() {
        assert_eq!(OrderType::Stop.to_wire(), None);
    }

    #[test]
    fn status_codes() {
        assert_eq!(OrderStatus::from_wire(3), Some(OrderStatus::NotTraded));
        assert_eq!(OrderStatus::from_wire(4), Some(OrderStatus::PartTraded));
        assert_eq!(OrderStatus::from_wire(5), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::from_wire(6), Some(OrderStatus::AllTraded));
        assert_eq!(OrderStatus::from_wire(7), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::from_wire(11), None);
    }

    #[test]
    fn interval_codes() {
        assert_eq!(Interval::Hour.to_wire(), "60min");
        assert_eq!(Interval::from_wire("1day"), Some(Interval::Daily));
        assert_eq!(Interval::Minute.duration(), chrono::Duration::minutes(1));
    }
}
