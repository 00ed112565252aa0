//! WebSocket transport with auto-reconnect, and the protocol base shared by
//! the trade and market channels.

pub mod client;
pub mod protocol;

pub use client::{
    OnBinaryCallback, OnMessageCallback, OnStateCallback, WsConnConfig, WsConnection, WsHandlers,
};
pub use protocol::{
    ChannelConfig, ChannelHandler, PacketSender, ProtocolBase, ProtocolState, WsChannel,
    decompress_frame,
};
