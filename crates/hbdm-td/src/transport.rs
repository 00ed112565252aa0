//! HTTP transport seam for the REST client.
//!
//! [`RestApi`](crate::rest::RestApi) builds fully signed [`HttpRequest`]s and
//! hands them to an [`HttpTransport`]. The production transport is
//! [`ReqwestTransport`]; tests plug in a scripted transport instead.
//!
//! A transport returns `Err` only when no response was read (connect, TLS,
//! proxy, timeout). Any HTTP status, including non-2xx, is an `Ok` response.

use std::time::Duration;

use async_trait::async_trait;
use hbdm_core::config::ProxyConfig;
use hbdm_core::{GatewayError, Result};
use serde_json::Value;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A signed request relative to the REST base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    /// Query string parameters, signature included.
    pub params: Vec<(String, String)>,
    /// JSON body for POST.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Value of a query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Sends one request and returns the response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// reqwest-backed transport.
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, proxy: Option<&ProxyConfig>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| GatewayError::Config(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let http = builder.build().map_err(|e| GatewayError::Config(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let url = format!("{}{}", self.base_url, req.path);
        let builder = match req.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        let mut builder = builder.query(&req.params);
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}
