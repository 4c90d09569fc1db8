//! WebSocket Server
//!
//! Provides the WebSocket endpoint for account subscriptions. Each
//! connection gets one outbound queue; subscription tasks push
//! notifications into it and the connection loop writes them out.

use crate::subscriptions::{AccountNotification, SubscriptionId, SubscriptionManager};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bft_types::Address;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Notifications buffered per connection before new ones are dropped
const OUTBOUND_QUEUE: usize = 256;

/// WebSocket JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct WsJsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// WebSocket Server
pub struct WebSocketServer {
    subscription_manager: Arc<SubscriptionManager>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new(subscription_manager: Arc<SubscriptionManager>) -> Self {
        Self {
            subscription_manager,
        }
    }

    /// Run the WebSocket server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("WebSocket server listening on {}", addr);

        let subscription_manager = self.subscription_manager;

        while let Ok((stream, peer_addr)) = listener.accept().await {
            let sub_mgr = subscription_manager.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, sub_mgr).await {
                    tracing::warn!("WebSocket connection error from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    subscription_manager: Arc<SubscriptionManager>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<Value>(OUTBOUND_QUEUE);

    // Track subscriptions for this connection
    let mut active_subscriptions: Vec<SubscriptionId> = Vec::new();

    let result = loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                };

                match msg {
                    Message::Text(text) => {
                        let request: WsJsonRpcRequest = match serde_json::from_str(&text) {
                            Ok(req) => req,
                            Err(_) => continue,
                        };
                        let response = handle_ws_method(
                            &subscription_manager,
                            &request,
                            &mut active_subscriptions,
                            &outbound,
                        );
                        ws_sender.send(Message::Text(response.to_string())).await?;
                    }
                    Message::Close(_) => break Ok(()),
                    _ => {}
                }
            }
            Some(notification) = outbound_rx.recv() => {
                ws_sender.send(Message::Text(notification.to_string())).await?;
            }
        }
    };

    // Clean up subscriptions on disconnect
    for sub_id in active_subscriptions {
        subscription_manager.unsubscribe(sub_id);
    }

    result
}

/// Handle WebSocket JSON-RPC method
fn handle_ws_method(
    subscription_manager: &SubscriptionManager,
    request: &WsJsonRpcRequest,
    active_subscriptions: &mut Vec<SubscriptionId>,
    outbound: &mpsc::Sender<Value>,
) -> Value {
    match request.method.as_str() {
        "accountSubscribe" => {
            let params: Vec<Value> =
                serde_json::from_value(request.params.clone()).unwrap_or_default();
            let address = params.first().and_then(|v| v.as_str());

            match address {
                Some(addr) => match addr.parse::<Address>() {
                    Ok(address) => {
                        let (sub_id, receiver) = subscription_manager.subscribe_account(address);
                        active_subscriptions.push(sub_id);
                        tokio::spawn(forward_notifications(receiver, outbound.clone()));

                        json!({
                            "jsonrpc": "2.0",
                            "id": request.id,
                            "result": sub_id
                        })
                    }
                    Err(_) => error_response(&request.id, -32602, "Invalid address"),
                },
                None => error_response(&request.id, -32602, "Missing address parameter"),
            }
        }

        "accountUnsubscribe" => {
            let params: Vec<Value> =
                serde_json::from_value(request.params.clone()).unwrap_or_default();
            let sub_id = params.first().and_then(|v| v.as_u64());

            match sub_id {
                // Only this connection's own subscriptions
                Some(id) if active_subscriptions.contains(&id) => {
                    let success = subscription_manager.unsubscribe(id);
                    active_subscriptions.retain(|&s| s != id);
                    json!({
                        "jsonrpc": "2.0",
                        "id": request.id,
                        "result": success
                    })
                }
                Some(_) => json!({
                    "jsonrpc": "2.0",
                    "id": request.id,
                    "result": false
                }),
                None => error_response(&request.id, -32602, "Missing subscription ID"),
            }
        }

        _ => error_response(
            &request.id,
            -32601,
            &format!("Method not found: {}", request.method),
        ),
    }
}

/// Push one subscription's notifications into the connection's queue
///
/// A full queue drops the notification, like a lagging broadcast receiver.
/// Ends when the subscription is removed or the connection goes away.
async fn forward_notifications(
    mut receiver: broadcast::Receiver<AccountNotification>,
    outbound: mpsc::Sender<Value>,
) {
    loop {
        match receiver.recv().await {
            Ok(notification) => {
                match outbound.try_send(format_account_notification(&notification)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            "Connection queue full, dropping notification for subscription {}",
                            notification.subscription_id
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("Subscriber lagged, {} notifications dropped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Create error response
fn error_response(id: &Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Format account notification for WebSocket
pub fn format_account_notification(notification: &AccountNotification) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "accountNotification",
        "params": {
            "result": {
                "context": {
                    "height": notification.height
                },
                "value": {
                    "address": notification.address,
                    "nonce": notification.account.nonce,
                    "balance": notification.account.balance.to_string(),
                    "code": BASE64.encode(&notification.account.code)
                }
            },
            "subscription": notification.subscription_id
        }
    })
}
