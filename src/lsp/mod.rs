//! Language Server Protocol client stack
//!
//! - **framing**: `Content-Length` message boundaries over a transport
//! - **protocol**: JSON-RPC requests, responses, notifications and
//!   server-to-client requests
//! - **client**: typed `lsp-types` API for what the RuboCop server speaks

pub mod client;
pub mod framing;
pub mod protocol;

#[cfg(test)]
pub mod testing;

pub use client::{LspClient, LspError};
pub use protocol::{JsonRpcErrorCode, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
