//! Paginated kline history.
//!
//! Each page asks for up to [`HISTORY_PAGE_SIZE`] bars between `start` and
//! `start + interval * HISTORY_PAGE_SIZE`. After a full page `start` moves to
//! the last returned bar. The first short page, failed request, or empty
//! payload ends the query. Failed pages are not retried.

use hbdm_core::json_util::array_field;
use hbdm_core::{Bar, HistoryRequest};
use tracing::{info, warn};

use crate::convert;
use crate::rest::{PATH_KLINE, RestApi};
use crate::transport::Method;

/// Maximum bars per kline request.
pub const HISTORY_PAGE_SIZE: usize = 1999;

/// Contract code queried for `symbol`: every digit removed.
pub fn history_symbol(symbol: &str) -> String {
    symbol.chars().filter(|c| !c.is_ascii_digit()).collect()
}

impl RestApi {
    /// Fetch bars from `req.start` until the exchange runs out.
    pub async fn query_history(&self, req: &HistoryRequest) -> Vec<Bar> {
        let symbol = history_symbol(&req.symbol);
        let period = req.interval.to_wire();
        let span = req.interval.duration() * HISTORY_PAGE_SIZE as i32;

        let mut history: Vec<Bar> = Vec::new();
        let mut start = req.start;

        loop {
            let end = start + span;
            let from = start.timestamp().to_string();
            let to = end.timestamp().to_string();
            let params = [
                ("contract_code", symbol.as_str()),
                ("period", period),
                ("from", from.as_str()),
                ("to", to.as_str()),
            ];

            let data = match self.request(Method::Get, PATH_KLINE, &params, None).await {
                Ok(data) => data,
                Err(e) => {
                    self.report_failure("query history", &e);
                    break;
                }
            };

            let rows = array_field(&data, "data");
            if rows.is_empty() {
                self.callbacks().write_log(format!("history for {} is empty", req.symbol));
                break;
            }

            let page: Vec<Bar> =
                rows.iter().map(|row| convert::parse_bar(&req.symbol, req.interval, row)).collect();
            let (Some(first), Some(last)) = (page.first(), page.last()) else { break };
            let (begin, last_dt) = (first.datetime, last.datetime);
            let (name, iv) = (&req.symbol, req.interval);
            info!("[rest] history {name} {iv}: {} bars {begin} - {last_dt}", page.len());
            self.callbacks().write_log(format!("history {name} {iv}: {begin} - {last_dt}"));

            let full = page.len() >= HISTORY_PAGE_SIZE;
            history.extend(page);
            if !full {
                break;
            }
            if last_dt <= start {
                warn!("[rest] history for {} did not advance past {start}, stopping", req.symbol);
                break;
            }
            start = last_dt;
        }

        history
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hbdm_core::Interval;
    use hbdm_core::event::{GatewayEvent, drain};
    use hbdm_core::time_util;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use super::*;
    use crate::rest::tests::api_with;
    use crate::transport::HttpResponse;
    use crate::transport::mock::{MockTransport, ok};

    /// Answer page `n` (0-based) with `sizes[n]` one-minute bars starting at `from`.
    fn paged(sizes: Vec<usize>) -> Arc<MockTransport> {
        let page = Arc::new(Mutex::new(0usize));
        MockTransport::new(move |req| {
            let mut n = page.lock();
            let size = sizes.get(*n).copied().unwrap_or(0);
            *n += 1;
            let from: i64 = req.param("from").and_then(|s| s.parse().ok()).unwrap_or(0);
            let rows: Vec<Value> = (0..size as i64)
                .map(|i| {
                    json!({"id": from + i * 60, "open": 1.0, "high": 2.0, "low": 0.5,
                           "close": 1.5, "vol": 10})
                })
                .collect();
            Ok(ok(json!({"status": "ok", "ch": "market.BTC-USD.kline.1min", "data": rows})))
        })
    }

    fn request() -> HistoryRequest {
        HistoryRequest {
            symbol: "BTC-USD".into(),
            interval: Interval::Minute,
            start: time_util::from_secs(1_700_000_000),
        }
    }

    #[test]
    fn digits_are_stripped() {
        assert_eq!(history_symbol("BTC200925"), "BTC");
        assert_eq!(history_symbol("BTC-USD"), "BTC-USD");
    }

    #[tokio::test]
    async fn paginates_until_short_page() {
        let transport = paged(vec![HISTORY_PAGE_SIZE, HISTORY_PAGE_SIZE, HISTORY_PAGE_SIZE, 500]);
        let (api, _rx) = api_with(transport.clone());

        let bars = api.query_history(&request()).await;
        assert_eq!(bars.len(), 3 * HISTORY_PAGE_SIZE + 500);

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| c.path == PATH_KLINE && c.param("period") == Some("1min")));
        assert!(calls.iter().all(|c| c.param("Signature").is_some()));

        // Window is start + 1999 intervals; next start is the last bar of the page.
        let from0: i64 = calls[0].param("from").unwrap().parse().unwrap();
        let to0: i64 = calls[0].param("to").unwrap().parse().unwrap();
        assert_eq!(from0, 1_700_000_000);
        assert_eq!(to0 - from0, 60 * HISTORY_PAGE_SIZE as i64);
        let from1: i64 = calls[1].param("from").unwrap().parse().unwrap();
        assert_eq!(from1, from0 + 60 * (HISTORY_PAGE_SIZE as i64 - 1));
    }

    #[tokio::test]
    async fn empty_page_stops() {
        let (api, mut rx) = api_with(paged(vec![]));
        assert!(api.query_history(&request()).await.is_empty());
        assert!(
            drain(&mut rx).iter().any(|e| matches!(e, GatewayEvent::Log(m) if m.contains("empty")))
        );
    }

    #[tokio::test]
    async fn http_failure_is_terminal() {
        let page = Arc::new(Mutex::new(0usize));
        let transport = MockTransport::new(move |_| {
            let mut n = page.lock();
            *n += 1;
            if *n == 1 {
                let rows: Vec<Value> = (0..HISTORY_PAGE_SIZE as i64)
                    .map(|i| json!({"id": 1_700_000_000 + i * 60}))
                    .collect();
                Ok(ok(json!({"status": "ok", "data": rows})))
            } else {
                Ok(HttpResponse { status: 429, body: "too many requests".into() })
            }
        });
        let (api, mut rx) = api_with(transport.clone());
        let bars = api.query_history(&request()).await;
        assert_eq!(bars.len(), HISTORY_PAGE_SIZE);
        assert_eq!(transport.calls().len(), 2);
        assert!(
            drain(&mut rx).iter().any(|e| matches!(e, GatewayEvent::Log(m) if m.contains("429")))
        );
    }

    #[tokio::test]
    async fn queries_stripped_symbol_but_keeps_requested_one() {
        let transport = paged(vec![3]);
        let (api, _rx) = api_with(transport.clone());
        let mut req = request();
        req.symbol = "BTC200925".into();
        let bars = api.query_history(&req).await;
        assert_eq!(transport.calls()[0].param("contract_code"), Some("BTC"));
        assert!(bars.iter().all(|b| b.symbol == "BTC200925"));
    }
}
