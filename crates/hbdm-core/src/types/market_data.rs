//! Market data structures: tick snapshots and kline bars.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::Interval;

/// Number of book levels carried per side.
pub const DEPTH_LEVELS: usize = 5;

/// One price level of the book.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub volume: f64,
}

/// Market snapshot for one instrument.
///
/// `bids[0]` is the best (highest) bid and `asks[0]` the best (lowest) ask.
/// Levels beyond what the exchange sent stay at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub name: String,
    pub datetime: DateTime<Utc>,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub last_price: f64,
    pub volume: f64,
    pub bids: [PriceLevel; DEPTH_LEVELS],
    pub asks: [PriceLevel; DEPTH_LEVELS],
}

impl Tick {
    /// Empty snapshot, seeded at subscription time.
    pub fn new(symbol: &str, datetime: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            datetime,
            open_price: 0.0,
            high_price: 0.0,
            low_price: 0.0,
            last_price: 0.0,
            volume: 0.0,
            bids: [PriceLevel::default(); DEPTH_LEVELS],
            asks: [PriceLevel::default(); DEPTH_LEVELS],
        }
    }

    /// Best bid price, `0.0` if no bid level has been set.
    pub fn bid_price_1(&self) -> f64 {
        self.bids[0].price
    }

    /// Best ask price, `0.0` if no ask level has been set.
    pub fn ask_price_1(&self) -> f64 {
        self.asks[0].price
    }
}

/// OHLCV aggregate over one [`Interval`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub datetime: DateTime<Utc>,
    pub interval: Interval,
    pub volume: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
}
