//! # hbdm-core
//!
//! Core crate for the HBDM coin-margined swap gateway, providing:
//!
//! - **Types** (`types`): enums with their wire tables, market data and trading structs
//! - **Signing** (`auth`): signature v2 parameter sets and credentials
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): `GatewayError` via thiserror, error categories
//! - **Events** (`event`): collaborator callback surface and event channel
//! - **WebSocket** (`ws`): reconnecting transport and the shared protocol base
//! - **JSON helpers** (`json_util`): lenient numeric field parsing
//! - **Time utilities** (`time_util`): signing timestamps, connection epoch
//! - **Logging** (`logging`): tracing-based structured logging

pub mod auth;
pub mod config;
pub mod error;
pub mod event;
pub mod json_util;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

pub use error::{GatewayError, Result};
pub use event::{GatewayCallbacks, GatewayEvent, SharedCallbacks};
// Re-export types at crate root for convenience.
pub use types::*;
