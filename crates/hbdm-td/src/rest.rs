//! Signed REST trading client.
//!
//! # REST endpoints
//!
//! | Operation      | Method | Path                                |
//! |----------------|--------|-------------------------------------|
//! | Contracts      | GET    | `/swap-api/v1/swap_contract_info`   |
//! | Account        | POST   | `/swap-api/v1/swap_account_info`    |
//! | Positions      | POST   | `/swap-api/v1/swap_position_info`   |
//! | Open orders    | POST   | `/swap-api/v1/swap_openorders`      |
//! | Place order    | POST   | `/swap-api/v1/swap_order`           |
//! | Batch orders   | POST   | `/swap-api/v1/swap_batchorder`      |
//! | Cancel order   | POST   | `/swap-api/v1/swap_cancel`          |
//! | Kline history  | GET    | `/swap-ex/market/history/kline`     |
//!
//! Every request carries the signed parameter set in its query string; POST
//! bodies are JSON. Every response goes through [`check_error`] before it is
//! mapped.
//!
//! Order placement is optimistic: the pending order is emitted before the
//! request is sent, and re-emitted as rejected if the request fails.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hbdm_core::auth::{Credentials, split_url};
use hbdm_core::config::{GatewayConfig, ProxyConfig};
use hbdm_core::json_util::{array_field, i64_field, str_field, string_field};
use hbdm_core::{
    CancelRequest, Direction, GatewayError, Instrument, Order, OrderIdOrigin, OrderRequest,
    OrderStatus, Position, Result, SharedCallbacks, time_util,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::convert;
use crate::transport::{HttpRequest, HttpTransport, Method};

const LABEL: &str = "rest";

pub const PATH_CONTRACT_INFO: &str = "/swap-api/v1/swap_contract_info";
pub const PATH_ACCOUNT_INFO: &str = "/swap-api/v1/swap_account_info";
pub const PATH_POSITION_INFO: &str = "/swap-api/v1/swap_position_info";
pub const PATH_OPEN_ORDERS: &str = "/swap-api/v1/swap_openorders";
pub const PATH_ORDER: &str = "/swap-api/v1/swap_order";
pub const PATH_BATCH_ORDER: &str = "/swap-api/v1/swap_batchorder";
pub const PATH_CANCEL: &str = "/swap-api/v1/swap_cancel";
pub const PATH_KLINE: &str = "/swap-ex/market/history/kline";

/// First counter value is `ORDER_COUNT_START + 1`.
const ORDER_COUNT_START: u64 = 10_000;

/// REST client settings.
#[derive(Debug, Clone)]
pub struct RestSettings {
    pub url: String,
    pub credentials: Credentials,
    pub proxy: Option<ProxyConfig>,
    pub lever_rate: u32,
    pub open_order_query_delay: Duration,
}

impl RestSettings {
    pub fn from_config(cfg: &GatewayConfig) -> Self {
        Self {
            url: cfg.rest_url.clone(),
            credentials: cfg.credentials(),
            proxy: cfg.proxy(),
            lever_rate: cfg.lever_rate,
            open_order_query_delay: Duration::from_millis(cfg.open_order_query_delay_ms),
        }
    }
}

/// Raise a business error if the body carries `"status": "error"`.
pub fn check_error(data: &Value) -> Result<()> {
    if str_field(data, "status") != "error" {
        return Ok(());
    }
    let code = string_field(data, "err_code")
        .or_else(|| string_field(data, "err-code"))
        .unwrap_or_default();
    let msg = string_field(data, "err_msg")
        .or_else(|| string_field(data, "err-msg"))
        .unwrap_or_default();
    Err(GatewayError::Business { code, msg })
}

#[derive(Debug)]
struct OrderIdGen {
    epoch: u64,
    count: u64,
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    credentials: Credentials,
    sign_host: String,
    lever_rate: u32,
    open_order_query_delay: Duration,
    callbacks: SharedCallbacks,
    ids: Mutex<OrderIdGen>,
    contracts: Mutex<BTreeMap<String, Instrument>>,
    positions: Mutex<BTreeMap<(String, Direction), Position>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// REST trading client. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RestApi {
    inner: Arc<Inner>,
}

impl RestApi {
    /// Build a client on `transport` without issuing any request.
    pub fn new(
        settings: RestSettings,
        transport: Arc<dyn HttpTransport>,
        callbacks: SharedCallbacks,
    ) -> Result<Self> {
        let (sign_host, _) = split_url(&settings.url)?;
        let epoch = time_util::connection_epoch(Utc::now());
        debug!("[{LABEL}] sign host {sign_host}, epoch {epoch}");
        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                credentials: settings.credentials,
                sign_host,
                lever_rate: settings.lever_rate,
                open_order_query_delay: settings.open_order_query_delay,
                callbacks,
                ids: Mutex::new(OrderIdGen { epoch, count: ORDER_COUNT_START }),
                contracts: Mutex::new(BTreeMap::new()),
                positions: Mutex::new(BTreeMap::new()),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Stamp a fresh connection epoch, announce the client and start the
    /// contract query.
    pub fn start(&self) {
        self.stamp_epoch(Utc::now());
        info!("[{LABEL}] started");
        self.inner.callbacks.write_log("REST API started".into());

        let this = self.clone();
        self.spawn(async move { this.query_contract().await });
    }

    /// Abort every in-flight request task.
    pub fn stop(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Wait for every in-flight request task to finish.
    pub async fn wait_idle(&self) {
        loop {
            let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                let _ = task.await;
            }
        }
    }

    fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(tokio::spawn(fut));
    }

    /// Cached contract.
    pub fn contract(&self, symbol: &str) -> Option<Instrument> {
        self.inner.contracts.lock().get(symbol).cloned()
    }

    // -----------------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------------

    /// Sign, send, and error-check one request.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value> {
        let signed =
            self.inner.credentials.sign(method.as_str(), &self.inner.sign_host, path, params)?;
        let req = HttpRequest {
            method,
            path: path.to_string(),
            params: signed.into_iter().collect(),
            body,
        };

        let resp = self.inner.transport.send(req).await?;
        if !resp.is_success() {
            return Err(GatewayError::Http { status: resp.status, body: resp.body });
        }
        let data = resp.json()?;
        check_error(&data)?;
        Ok(data)
    }

    /// Log a failed operation to diagnostics and the collaborator log.
    fn report(&self, op: &str, err: &GatewayError) {
        warn!("[{LABEL}] {op} failed: {err}");
        self.inner.callbacks.write_log(format!("{op} failed: {err}"));
    }

    /// Log a failed order placement. The rejected order has already been
    /// emitted; whether the cause also reaches the collaborator log follows
    /// the error category.
    fn report_rejection(&self, op: &str, err: &GatewayError) {
        warn!("[{LABEL}] {op} failed: {err}");
        if err.category().report_on_rejection() {
            self.inner.callbacks.write_log(format!("{op} failed: {err}"));
        }
    }

    // -----------------------------------------------------------------------
    // Order ids
    // -----------------------------------------------------------------------

    /// Replace the id prefix. The counter keeps running so ids stay unique
    /// across reconnects within the same second.
    fn stamp_epoch(&self, at: DateTime<Utc>) {
        let epoch = time_util::connection_epoch(at);
        debug!("[{LABEL}] epoch {epoch}");
        self.inner.ids.lock().epoch = epoch;
    }

    /// Next local order id, `{epoch}{counter}`.
    pub fn new_local_order_id(&self) -> String {
        let mut ids = self.inner.ids.lock();
        ids.count += 1;
        format!("{}{}", ids.epoch, ids.count)
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    fn order_payload(&self, req: &OrderRequest, order_id: &str) -> Result<Value> {
        let order_price_type = req
            .order_type
            .to_wire()
            .ok_or_else(|| GatewayError::Unsupported(format!("order type {:?}", req.order_type)))?;
        let client_order_id: i64 = order_id
            .parse()
            .map_err(|_| GatewayError::Protocol(format!("non-numeric order id {order_id}")))?;
        Ok(json!({
            "contract_code": req.symbol,
            "client_order_id": client_order_id,
            "price": req.price,
            "volume": req.volume as i64,
            "direction": req.direction.to_wire(),
            "offset": req.offset.to_wire(),
            "order_price_type": order_price_type,
            "lever_rate": self.inner.lever_rate,
        }))
    }

    fn reject(&self, mut order: Order) {
        order.status = OrderStatus::Rejected;
        self.inner.callbacks.on_order(order);
    }

    /// Place one order. The pending order is emitted before this returns.
    pub fn send_order(&self, req: &OrderRequest) -> String {
        let order_id = self.new_local_order_id();
        let order = req.create_order(order_id.clone(), Utc::now());

        let payload = match self.order_payload(req, &order_id) {
            Ok(p) => p,
            Err(e) => {
                self.reject(order);
                self.report_rejection("send order", &e);
                return order_id;
            }
        };

        self.inner.callbacks.on_order(order.clone());
        let this = self.clone();
        self.spawn(async move {
            if let Err(e) = this.request(Method::Post, PATH_ORDER, &[], Some(payload)).await {
                this.reject(order);
                this.report_rejection("send order", &e);
            }
        });
        order_id
    }

    /// Place several orders in one request.
    ///
    /// Per-index errors reject only the failing orders. A failure of the
    /// whole request rejects all of them.
    pub fn send_orders(&self, reqs: &[OrderRequest]) -> Vec<String> {
        let mut ids = Vec::with_capacity(reqs.len());
        let mut batch: Vec<(Order, Value)> = Vec::with_capacity(reqs.len());

        for req in reqs {
            let order_id = self.new_local_order_id();
            let order = req.create_order(order_id.clone(), Utc::now());
            match self.order_payload(req, &order_id) {
                Ok(payload) => {
                    self.inner.callbacks.on_order(order.clone());
                    batch.push((order, payload));
                }
                Err(e) => {
                    self.reject(order);
                    self.report_rejection("send orders", &e);
                }
            }
            ids.push(order_id);
        }

        if batch.is_empty() {
            return ids;
        }

        let (orders, payloads): (Vec<Order>, Vec<Value>) = batch.into_iter().unzip();
        let this = self.clone();
        self.spawn(async move {
            let body = json!({ "orders_data": payloads });
            match this.request(Method::Post, PATH_BATCH_ORDER, &[], Some(body)).await {
                Ok(data) => this.on_send_orders(&orders, &data),
                Err(e) => {
                    for order in orders {
                        this.reject(order);
                    }
                    this.report_rejection("send orders", &e);
                }
            }
        });
        ids
    }

    fn on_send_orders(&self, orders: &[Order], data: &Value) {
        // Errors may sit at the top level or under `data`.
        let rows = match data.get("errors").and_then(Value::as_array) {
            Some(rows) => rows.as_slice(),
            None => array_field(&data["data"], "errors"),
        };

        for row in rows {
            let Some(ix) = i64_field(row, "index").and_then(|i| usize::try_from(i).ok()) else {
                warn!("[{LABEL}] batch error without index: {row}");
                continue;
            };
            let code = string_field(row, "err_code").unwrap_or_default();
            let msg = str_field(row, "err_msg");
            match orders.get(ix) {
                Some(order) => {
                    self.reject(order.clone());
                    let id = &order.order_id;
                    self.inner
                        .callbacks
                        .write_log(format!("batch order {id} rejected, code {code}: {msg}"));
                }
                None => warn!("[{LABEL}] batch error index {ix} out of range"),
            }
        }
    }

    /// Body for `swap_cancel`: `client_order_id` for local ids, else `order_id`.
    pub fn cancel_payload(req: &CancelRequest) -> Result<Value> {
        let numeric: i64 = req
            .order_id
            .parse()
            .map_err(|_| GatewayError::Protocol(format!("non-numeric order id {}", req.order_id)))?;
        let key = match req.origin(numeric) {
            OrderIdOrigin::Local => "client_order_id",
            OrderIdOrigin::Exchange => "order_id",
        };
        let mut body = json!({ "contract_code": req.symbol });
        body[key] = json!(numeric);
        Ok(body)
    }

    pub fn cancel_order(&self, req: &CancelRequest) {
        let body = match Self::cancel_payload(req) {
            Ok(b) => b,
            Err(e) => {
                self.report("cancel order", &e);
                return;
            }
        };
        let this = self.clone();
        self.spawn(async move {
            if let Err(e) = this.request(Method::Post, PATH_CANCEL, &[], Some(body)).await {
                this.report("cancel order", &e);
            }
        });
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn query_account(&self) {
        match self.request(Method::Post, PATH_ACCOUNT_INFO, &[], None).await {
            Ok(data) => {
                for row in array_field(&data, "data") {
                    self.inner.callbacks.on_account(convert::parse_account(row));
                }
            }
            Err(e) => self.report("query account", &e),
        }
    }

    /// Refresh the position cache and emit every cached position.
    ///
    /// Entries absent from the response are zeroed and still emitted.
    pub async fn query_position(&self) {
        let data = match self.request(Method::Post, PATH_POSITION_INFO, &[], None).await {
            Ok(data) => data,
            Err(e) => {
                self.report("query position", &e);
                return;
            }
        };

        let snapshot: Vec<Position> = {
            let mut positions = self.inner.positions.lock();
            positions.values_mut().for_each(Position::clear);
            for row in array_field(&data, "data") {
                let Some(pos) = convert::parse_position(row) else {
                    warn!("[{LABEL}] unmapped position row: {row}");
                    continue;
                };
                positions.insert((pos.symbol.clone(), pos.direction), pos);
            }
            positions.values().cloned().collect()
        };

        for pos in snapshot {
            self.inner.callbacks.on_position(pos);
        }
    }

    /// Open orders for one contract.
    pub async fn query_order(&self, contract_code: &str) -> Result<()> {
        let body = json!({ "contract_code": contract_code });
        let data = self.request(Method::Post, PATH_OPEN_ORDERS, &[], Some(body)).await?;
        for row in array_field(&data["data"], "orders") {
            if let Some(order) = convert::parse_order(row) {
                self.inner.callbacks.on_order(order);
            }
        }
        self.inner.callbacks.write_log(format!("{contract_code} open orders queried"));
        Ok(())
    }

    /// Fetch the contract list, then query open orders contract by contract.
    pub async fn query_contract(&self) {
        let data = match self.request(Method::Get, PATH_CONTRACT_INFO, &[], None).await {
            Ok(data) => data,
            Err(e) => {
                self.report("query contract", &e);
                return;
            }
        };

        let mut codes = BTreeSet::new();
        for row in array_field(&data, "data") {
            let instrument = convert::parse_instrument(row);
            codes.insert(instrument.symbol.clone());
            self.inner.contracts.lock().insert(instrument.symbol.clone(), instrument.clone());
            self.inner.callbacks.on_contract(instrument);
        }
        self.inner.callbacks.write_log("contract query succeeded".into());

        self.drain_open_order_queue(codes.into_iter().collect()).await;
    }

    /// One open-order query at a time, with a fixed pause between them.
    async fn drain_open_order_queue(&self, mut queue: VecDeque<String>) {
        while let Some(code) = queue.pop_front() {
            if let Err(e) = self.query_order(&code).await {
                self.report(&format!("query open orders {code}"), &e);
            }
            if !queue.is_empty() {
                tokio::time::sleep(self.inner.open_order_query_delay).await;
            }
        }
    }

    pub(crate) fn callbacks(&self) -> &SharedCallbacks {
        &self.inner.callbacks
    }

    pub(crate) fn report_failure(&self, op: &str, err: &GatewayError) {
        self.report(op, err);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;
    use std::sync::Barrier;

    use chrono::TimeZone;
    use hbdm_core::event::{GatewayEvent, GatewayEventReceiver, drain, event_channel};
    use hbdm_core::{Offset, OrderType};

    use super::*;
    use crate::transport::HttpResponse;
    use crate::transport::mock::{MockTransport, ok};

    pub(crate) fn settings() -> RestSettings {
        RestSettings {
            url: "https://api.hbdm.com".into(),
            credentials: Credentials::new("key", "secret"),
            proxy: None,
            lever_rate: 20,
            open_order_query_delay: Duration::from_millis(1),
        }
    }

    pub(crate) fn api_with(transport: Arc<MockTransport>) -> (RestApi, GatewayEventReceiver) {
        let (tx, rx) = event_channel();
        (RestApi::new(settings(), transport, Arc::new(tx)).unwrap(), rx)
    }

    fn limit(symbol: &str) -> OrderRequest {
        OrderRequest {
            symbol: symbol.into(),
            direction: Direction::Long,
            offset: Offset::Open,
            order_type: OrderType::Limit,
            price: 30000.0,
            volume: 1.0,
        }
    }

    fn orders(events: &[GatewayEvent]) -> Vec<Order> {
        events
            .iter()
            .filter_map(|e| if let GatewayEvent::Order(o) = e { Some(o.clone()) } else { None })
            .collect()
    }

    #[test]
    fn check_error_classifies_business_failures() {
        assert!(check_error(&json!({"status": "ok"})).is_ok());
        let body = json!({"status": "error", "err_code": 1047, "err_msg": "insufficient margin"});
        let err = check_error(&body);
        assert!(matches!(err, Err(GatewayError::Business { ref code, .. }) if code == "1047"));
    }

    #[test]
    fn local_order_ids_are_unique_across_threads() {
        const THREADS: usize = 8;
        const PER_THREAD: u64 = 500;
        let (api, _rx) = api_with(MockTransport::always(json!({"status": "ok"})));
        let barrier = Barrier::new(THREADS);

        let per_thread: Vec<Vec<String>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        (0..PER_THREAD).map(|_| api.new_local_order_id()).collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let prefix = per_thread[0][0][..12].to_string();
        let mut counters = Vec::new();
        for ids in &per_thread {
            let nums: Vec<u64> = ids.iter().map(|s| s.parse().unwrap()).collect();
            assert!(nums.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(id.starts_with(&prefix));
                counters.push(id[12..].parse::<u64>().unwrap());
            }
        }
        let all: HashSet<&String> = per_thread.iter().flatten().collect();
        assert_eq!(all.len(), THREADS * PER_THREAD as usize);

        counters.sort_unstable();
        let total = THREADS as u64 * PER_THREAD;
        let expected: Vec<u64> = (ORDER_COUNT_START + 1..=ORDER_COUNT_START + total).collect();
        assert_eq!(counters, expected);
    }

    #[test]
    fn start_restamps_epoch_and_keeps_counter() {
        let (api, _rx) = api_with(MockTransport::always(json!({"status": "ok"})));
        let before = api.new_local_order_id();
        assert!(before.ends_with("10001"));

        api.stamp_epoch(Utc.with_ymd_and_hms(2024, 3, 5, 20, 30, 15).unwrap());
        assert_eq!(api.new_local_order_id(), "24030604301510002");
    }

    #[tokio::test]
    async fn transport_failures_on_queries_are_logged() {
        let transport =
            MockTransport::new(|_| Err(GatewayError::Transport("connection refused".into())));
        let (api, mut rx) = api_with(transport);
        api.query_contract().await;
        api.query_account().await;
        api.query_position().await;

        let logs: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| if let GatewayEvent::Log(m) = e { Some(m) } else { None })
            .collect();
        assert_eq!(logs.len(), 3);
        assert!(logs[0].starts_with("query contract failed"));
        assert!(logs.iter().all(|m| m.contains("connection refused")));
    }

    #[test]
    fn cancel_routing_by_magnitude() {
        let route = |id: &str| RestApi::cancel_payload(&CancelRequest::new("BTC-USD", id)).unwrap();
        assert_eq!(route("999999"), json!({"contract_code": "BTC-USD", "order_id": 999999}));
        assert_eq!(route("1000000"), json!({"contract_code": "BTC-USD", "order_id": 1000000}));
        assert_eq!(
            route("1000001"),
            json!({"contract_code": "BTC-USD", "client_order_id": 1000001})
        );

        let mut explicit = CancelRequest::new("BTC-USD", "42");
        explicit.origin = Some(OrderIdOrigin::Local);
        assert_eq!(RestApi::cancel_payload(&explicit).unwrap()["client_order_id"], 42);
        assert!(RestApi::cancel_payload(&CancelRequest::new("BTC-USD", "abc")).is_err());
    }

    #[tokio::test]
    async fn requests_are_signed() {
        let transport = MockTransport::always(json!({"status": "ok", "data": []}));
        let (api, _rx) = api_with(transport.clone());
        api.query_account().await;
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Post);
        assert_eq!(calls[0].path, PATH_ACCOUNT_INFO);
        assert_eq!(calls[0].param("AccessKeyId"), Some("key"));
        assert!(calls[0].param("Signature").is_some());
    }

    #[tokio::test]
    async fn send_order_emits_pending_then_ack() {
        let transport = MockTransport::always(json!({"status": "ok", "data": {"order_id": 1}}));
        let (api, mut rx) = api_with(transport.clone());
        let id = api.send_order(&limit("BTC-USD"));
        let pending = orders(&drain(&mut rx));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, OrderStatus::Submitting);

        api.wait_idle().await;
        assert!(drain(&mut rx).is_empty());
        let body = transport.calls()[0].body.clone().unwrap();
        assert_eq!(body["client_order_id"], json!(id.parse::<i64>().unwrap()));
        assert_eq!(body["order_price_type"], "limit");
        assert_eq!(body["direction"], "buy");
        assert_eq!(body["offset"], "open");
        assert_eq!(body["lever_rate"], 20);
        assert_eq!(body["volume"], 1);
    }

    #[tokio::test]
    async fn send_order_rejected_on_http_failure() {
        let transport =
            MockTransport::new(|_| Ok(HttpResponse { status: 502, body: "bad gateway".into() }));
        let (api, mut rx) = api_with(transport);
        let id = api.send_order(&limit("BTC-USD"));
        api.wait_idle().await;

        let events = drain(&mut rx);
        let orders = orders(&events);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].order_id, id);
        assert_eq!(orders[1].status, OrderStatus::Rejected);
        assert!(events.iter().any(|e| matches!(e, GatewayEvent::Log(m) if m.contains("502"))));
    }

    #[tokio::test]
    async fn send_order_rejected_on_transport_error_without_log() {
        let transport =
            MockTransport::new(|_| Err(GatewayError::Transport("connection refused".into())));
        let (api, mut rx) = api_with(transport);
        api.send_order(&limit("BTC-USD"));
        api.wait_idle().await;

        let events = drain(&mut rx);
        assert_eq!(orders(&events).last().map(|o| o.status), Some(OrderStatus::Rejected));
        assert!(!events.iter().any(|e| matches!(e, GatewayEvent::Log(_))));
    }

    #[tokio::test]
    async fn send_order_rejected_on_business_error() {
        let body = json!({"status": "error", "err_code": 1047, "err_msg": "no margin"});
        let transport = MockTransport::always(body);
        let (api, mut rx) = api_with(transport);
        api.send_order(&limit("BTC-USD"));
        api.wait_idle().await;
        let events = drain(&mut rx);
        assert_eq!(orders(&events).last().map(|o| o.status), Some(OrderStatus::Rejected));
        assert!(
            events.iter().any(|e| matches!(e, GatewayEvent::Log(m) if m.contains("no margin")))
        );
    }

    #[tokio::test]
    async fn stop_orders_are_rejected_locally() {
        let transport = MockTransport::always(json!({"status": "ok"}));
        let (api, mut rx) = api_with(transport.clone());
        let mut req = limit("BTC-USD");
        req.order_type = OrderType::Stop;
        api.send_order(&req);
        api.wait_idle().await;
        assert!(transport.calls().is_empty());
        let orders = orders(&drain(&mut rx));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn batch_partial_failure_rejects_only_that_index() {
        let transport = MockTransport::always(json!({
            "status": "ok",
            "data": {"success": [{"index": 0}, {"index": 2}]},
            "errors": [{"index": 1, "err_code": 1050, "err_msg": "duplicate client id"}],
        }));
        let (api, mut rx) = api_with(transport.clone());
        let ids = api.send_orders(&[limit("BTC-USD"), limit("ETH-USD"), limit("LTC-USD")]);
        api.wait_idle().await;

        let body = transport.calls()[0].body.clone().unwrap();
        assert_eq!(body["orders_data"].as_array().unwrap().len(), 3);

        let orders = orders(&drain(&mut rx));
        assert_eq!(orders.len(), 4);
        let mut latest: BTreeMap<String, OrderStatus> = BTreeMap::new();
        for o in &orders {
            latest.insert(o.order_id.clone(), o.status);
        }
        assert_eq!(latest[&ids[0]], OrderStatus::Submitting);
        assert_eq!(latest[&ids[1]], OrderStatus::Rejected);
        assert_eq!(latest[&ids[2]], OrderStatus::Submitting);
    }

    #[tokio::test]
    async fn batch_errors_nested_under_data() {
        let transport = MockTransport::always(json!({
            "status": "ok",
            "data": {"errors": [{"index": 0, "err_code": 1, "err_msg": "x"}]},
        }));
        let (api, mut rx) = api_with(transport);
        let ids = api.send_orders(&[limit("BTC-USD"), limit("ETH-USD")]);
        api.wait_idle().await;
        let orders = orders(&drain(&mut rx));
        let rejected: Vec<_> =
            orders.iter().filter(|o| o.status == OrderStatus::Rejected).collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].order_id, ids[0]);
    }

    #[tokio::test]
    async fn batch_transport_failure_rejects_all() {
        let transport = MockTransport::new(|_| Err(GatewayError::Transport("timeout".into())));
        let (api, mut rx) = api_with(transport);
        api.send_orders(&[limit("BTC-USD"), limit("ETH-USD")]);
        api.wait_idle().await;
        let orders = orders(&drain(&mut rx));
        assert_eq!(orders.iter().filter(|o| o.status == OrderStatus::Rejected).count(), 2);
    }

    #[tokio::test]
    async fn position_cache_zeroes_missing_entries() {
        let round = Arc::new(Mutex::new(0u32));
        let r = round.clone();
        let transport = MockTransport::new(move |_| {
            let mut n = r.lock();
            *n += 1;
            let data = if *n == 1 {
                json!([
                    {"contract_code": "BTC-USD", "direction": "buy", "volume": 3, "frozen": 1,
                     "cost_hold": 30000.0, "profit": 5.0},
                    {"contract_code": "ETH-USD", "direction": "sell", "volume": 2, "frozen": 0,
                     "cost_hold": 2000.0, "profit": -1.0},
                ])
            } else {
                json!([
                    {"contract_code": "ETH-USD", "direction": "sell", "volume": 1, "frozen": 0,
                     "cost_hold": 2100.0, "profit": 0.5},
                ])
            };
            Ok(ok(json!({"status": "ok", "data": data})))
        });
        let (api, mut rx) = api_with(transport);

        api.query_position().await;
        drain(&mut rx);
        api.query_position().await;

        let positions: Vec<Position> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| if let GatewayEvent::Position(p) = e { Some(p) } else { None })
            .collect();
        assert_eq!(positions.len(), 2);
        let btc = positions.iter().find(|p| p.symbol == "BTC-USD").unwrap();
        assert_eq!(btc, &Position::flat("BTC-USD", Direction::Long));
        let eth = positions.iter().find(|p| p.symbol == "ETH-USD").unwrap();
        assert_eq!(eth.volume, 1.0);
        assert_eq!(eth.price, 2100.0);
    }

    #[tokio::test]
    async fn query_position_error_leaves_cache() {
        let transport =
            MockTransport::always(json!({"status": "error", "err_code": 1, "err_msg": "busy"}));
        let (api, mut rx) = api_with(transport);
        api.query_position().await;
        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(e, GatewayEvent::Position(_))));
        assert!(events.iter().any(|e| matches!(e, GatewayEvent::Log(m) if m.contains("busy"))));
    }

    #[tokio::test]
    async fn contract_query_chains_open_order_queries() {
        let transport = MockTransport::new(|req| {
            Ok(ok(match req.path.as_str() {
                PATH_CONTRACT_INFO => json!({"status": "ok", "data": [
                    {"contract_code": "ETH-USD", "price_tick": 0.01, "contract_size": 10},
                    {"contract_code": "BTC-USD", "price_tick": 0.1, "contract_size": 100},
                ]}),
                PATH_OPEN_ORDERS => json!({"status": "ok", "data": {"orders": [{
                    "contract_code": req
                        .body
                        .as_ref()
                        .map(|b| b["contract_code"].clone())
                        .unwrap_or_default(),
                    "order_id": 5, "client_order_id": null, "price": 1.0, "volume": 1,
                    "direction": "sell", "offset": "close", "order_price_type": "limit",
                    "trade_volume": 0, "status": 3, "created_at": 1_700_000_000_000i64,
                }]}}),
                _ => json!({"status": "error", "err_code": 404, "err_msg": "unexpected"}),
            }))
        });
        let (api, mut rx) = api_with(transport.clone());
        api.query_contract().await;

        let paths: Vec<_> = transport.calls().iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec![PATH_CONTRACT_INFO, PATH_OPEN_ORDERS, PATH_OPEN_ORDERS]);
        let queried: Vec<_> = transport.calls()[1..]
            .iter()
            .map(|c| c.body.clone().unwrap()["contract_code"].clone())
            .collect();
        assert_eq!(queried, vec![json!("BTC-USD"), json!("ETH-USD")]);

        let events = drain(&mut rx);
        assert_eq!(events.iter().filter(|e| matches!(e, GatewayEvent::Contract(_))).count(), 2);
        let open = orders(&events);
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].order_id, "5");
        assert_eq!(open[0].status, OrderStatus::NotTraded);
        assert!(api.contract("BTC-USD").is_some_and(|c| c.price_tick == 0.1));
    }

    #[tokio::test]
    async fn account_rows_are_emitted() {
        let transport = MockTransport::always(json!({"status": "ok", "data": [
            {"symbol": "BTC", "margin_balance": 1.5, "margin_frozen": 0.1},
            {"symbol": "ETH", "margin_balance": 10.0, "margin_frozen": 0.0},
        ]}));
        let (api, mut rx) = api_with(transport);
        api.query_account().await;
        let accounts: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| if let GatewayEvent::Account(a) = e { Some(a) } else { None })
            .collect();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].account_id, "BTC");
        assert_eq!(accounts[0].balance, 1.5);
    }

    #[tokio::test]
    async fn cancel_failure_is_logged() {
        let transport =
            MockTransport::new(|_| Ok(HttpResponse { status: 500, body: "oops".into() }));
        let (api, mut rx) = api_with(transport.clone());
        api.cancel_order(&CancelRequest::new("BTC-USD", "24030604301510001"));
        api.wait_idle().await;
        assert_eq!(transport.calls()[0].path, PATH_CANCEL);
        assert!(
            drain(&mut rx).iter().any(|e| matches!(e, GatewayEvent::Log(m) if m.contains("oops")))
        );
    }
}
