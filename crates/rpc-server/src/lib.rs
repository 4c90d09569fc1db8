//! RPC Server - JSON-RPC and WebSocket surface of the node
//!
//! Provides:
//! - HTTP JSON-RPC: the block lifecycle calls driven by the consensus engine
//!   (checkTx, beginBlock, deliverTx, endBlock, commit, reset, info) and the
//!   local client methods (sendRawTransaction, getAccount, getPendingNonce)
//! - WebSocket: accountSubscribe, accountUnsubscribe

pub mod http_server;
pub mod methods;
pub mod subscriptions;
pub mod ws_server;

#[cfg(test)]
mod tests;

pub use http_server::HttpRpcServer;
pub use methods::{RpcContext, RpcError};
pub use subscriptions::SubscriptionManager;
pub use ws_server::WebSocketServer;
