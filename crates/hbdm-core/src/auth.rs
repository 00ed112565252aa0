//! Request signing (signature version 2).
//!
//! The signed parameter set is:
//!
//! ```text
//! AccessKeyId, SignatureMethod=HmacSHA256, SignatureVersion=2, Timestamp
//! ```
//!
//! plus any request-specific query parameters, sorted lexicographically by
//! name. The payload is `METHOD\nhost\npath\nencoded-params`, signed with
//! HMAC-SHA256 and base64-encoded into a `Signature` entry.
//!
//! The same routine signs REST query strings and the WebSocket `auth` frame.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{GatewayError, Result};
use crate::time_util;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_METHOD: &str = "HmacSHA256";
pub const SIGNATURE_VERSION: &str = "2";

/// Signed parameter set, ordered by key.
pub type SignedParams = BTreeMap<String, String>;

/// API key pair. Held in memory only.
#[derive(Clone, Default)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { key: key.into(), secret: secret.into() }
    }

    /// Sign with the current UTC timestamp.
    pub fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<SignedParams> {
        let ts = time_util::sign_timestamp();
        create_signature(&self.key, method, host, path, &self.secret, params, &ts)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &redact(&self.key))
            .field("secret", &"***")
            .finish()
    }
}

fn redact(key: &str) -> String {
    match key.get(..4) {
        Some(prefix) if key.len() > 8 => format!("{prefix}***"),
        _ => "***".to_string(),
    }
}

/// Build the signed parameter set for one request.
///
/// Deterministic given its inputs: two calls with the same `timestamp`
/// return identical maps.
pub fn create_signature(
    api_key: &str,
    method: &str,
    host: &str,
    path: &str,
    secret: &str,
    params: &[(&str, &str)],
    timestamp: &str,
) -> Result<SignedParams> {
    let mut signed: SignedParams = BTreeMap::new();
    signed.insert("AccessKeyId".into(), api_key.into());
    signed.insert("SignatureMethod".into(), SIGNATURE_METHOD.into());
    signed.insert("SignatureVersion".into(), SIGNATURE_VERSION.into());
    signed.insert("Timestamp".into(), timestamp.into());
    for (k, v) in params {
        signed.insert((*k).to_string(), (*v).to_string());
    }

    let payload = format!(
        "{}\n{}\n{}\n{}",
        method.to_uppercase(),
        host.to_lowercase(),
        path,
        encode_params(&signed)
    );
    let signature = hmac_sha256_base64(secret, &payload)?;
    signed.insert("Signature".into(), signature);
    Ok(signed)
}

/// URL-encode an ordered parameter map as `k1=v1&k2=v2`.
pub fn encode_params(params: &SignedParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA256 digest of `message`, base64 (standard alphabet).
pub fn hmac_sha256_base64(secret: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Config(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Split a URL into the signing host (with explicit port, if any) and path.
///
/// `wss://api.hbdm.com/swap-notification` → `("api.hbdm.com", "/swap-notification")`.
pub fn split_url(raw: &str) -> Result<(String, String)> {
    let parsed =
        url::Url::parse(raw).map_err(|e| GatewayError::Config(format!("invalid url {raw}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| GatewayError::Config(format!("url has no host: {raw}")))?;
    let host = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok((host, parsed.path().to_string()))
}
