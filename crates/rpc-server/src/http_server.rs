//! HTTP JSON-RPC Server
//!
//! Provides the HTTP endpoint for the lifecycle calls and local clients.

use crate::methods::{
    handle_begin_block, handle_check_tx, handle_commit, handle_deliver_tx, handle_end_block,
    handle_get_account, handle_get_health, handle_get_pending_nonce, handle_info, handle_reset,
    handle_send_raw_transaction, BeginBlockRequest, RpcContext, RpcError,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// HTTP RPC Server
pub struct HttpRpcServer {
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    /// Create a new HTTP RPC server
    pub fn new(context: Arc<RpcContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP RPC server listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<RpcContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let result = dispatch_method(&context, &request.method, request.params).await;
    (StatusCode::OK, Json(into_response(request.id, result)))
}

pub(crate) fn into_response(id: Value, result: Result<Value, RpcError>) -> JsonRpcResponse {
    match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: error_code(&e),
                message: e.to_string(),
            }),
        },
    }
}

fn positional(params: Value) -> Vec<Value> {
    serde_json::from_value(params).unwrap_or_default()
}

fn string_param<'a>(params: &'a [Value], what: &str) -> Result<&'a str, RpcError> {
    params
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing {}", what)))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}

/// Dispatch to appropriate method handler
pub async fn dispatch_method(
    ctx: &RpcContext,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    tracing::debug!("RPC method called: {}", method);
    match method {
        "checkTx" => {
            let params = positional(params);
            to_value(handle_check_tx(ctx, string_param(&params, "transaction")?)?)
        }

        "beginBlock" => {
            let params = positional(params);
            let request: BeginBlockRequest = params
                .first()
                .cloned()
                .ok_or_else(|| RpcError::InvalidParams("Missing header".to_string()))
                .and_then(|v| {
                    serde_json::from_value(v)
                        .map_err(|e| RpcError::InvalidParams(format!("Invalid header: {}", e)))
                })?;
            handle_begin_block(ctx, request)?;
            Ok(Value::Null)
        }

        "deliverTx" => {
            let params = positional(params);
            to_value(handle_deliver_tx(ctx, string_param(&params, "transaction")?)?)
        }

        "endBlock" => {
            let params = positional(params);
            let height = params
                .first()
                .and_then(|v| v.as_u64())
                .ok_or_else(|| RpcError::InvalidParams("Missing height".to_string()))?;
            handle_end_block(ctx, height)?;
            Ok(Value::Null)
        }

        "commit" => to_value(handle_commit(ctx)?),

        "reset" => {
            handle_reset(ctx)?;
            Ok(Value::Null)
        }

        "info" => to_value(handle_info(ctx)?),

        "getAccount" => {
            let params = positional(params);
            to_value(handle_get_account(ctx, string_param(&params, "address")?)?)
        }

        "getPendingNonce" => {
            let params = positional(params);
            let nonce = handle_get_pending_nonce(ctx, string_param(&params, "address")?)?;
            Ok(json!(nonce))
        }

        "sendRawTransaction" => {
            let params = positional(params);
            let tx = string_param(&params, "transaction")?;
            let hash = handle_send_raw_transaction(ctx, tx).await?;
            Ok(json!(hash))
        }

        "getHealth" => Ok(json!(handle_get_health(ctx)?)),

        "getVersion" => Ok(json!({
            "bft-node": env!("CARGO_PKG_VERSION"),
        })),

        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

/// Map error to JSON-RPC error code
fn error_code(error: &RpcError) -> i32 {
    match error {
        RpcError::InvalidParams(_) => -32602,
        RpcError::MethodNotFound(_) => -32601,
        RpcError::InternalError(_) => -32603,
        RpcError::TransactionRejected(code) => -32000 - code.code() as i32,
        RpcError::Forwarding(_) => -32010,
        RpcError::Fatal(_) => -32011,
        RpcError::Halted => -32012,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{context, funded_key, signed_transfer};
    use bft_types::ResultCode;

    #[tokio::test]
    async fn test_full_block_over_rpc() {
        let key = funded_key();
        let (ctx, consensus, _fatal) = context(&key);
        let tx = signed_transfer(&key, 0);

        let checked = dispatch_method(&ctx, "checkTx", json!([tx])).await.unwrap();
        assert_eq!(checked["code"], 0);
        assert_eq!(checked["name"], "OK");

        dispatch_method(&ctx, "beginBlock", json!([{"height": 1, "timestamp": 1}]))
            .await
            .unwrap();
        let delivered = dispatch_method(&ctx, "deliverTx", json!([tx])).await.unwrap();
        assert_eq!(delivered["code"], 0);
        dispatch_method(&ctx, "endBlock", json!([1])).await.unwrap();
        let committed = dispatch_method(&ctx, "commit", json!([])).await.unwrap();
        assert_eq!(committed["code"], 0);

        let info = dispatch_method(&ctx, "info", json!([])).await.unwrap();
        assert_eq!(info["lastHeight"], 1);
        assert_eq!(info["lastStateRoot"], committed["stateRoot"]);

        let replay = dispatch_method(&ctx, "checkTx", json!([tx])).await.unwrap();
        assert_eq!(replay["code"], ResultCode::BadNonce.code());
        assert!(consensus.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_send_raw_transaction_forwards() {
        let key = funded_key();
        let (ctx, consensus, _fatal) = context(&key);
        let address = bft_types::address_of(key.verifying_key()).to_string();

        dispatch_method(&ctx, "sendRawTransaction", json!([signed_transfer(&key, 0)]))
            .await
            .unwrap();
        assert_eq!(consensus.submitted().len(), 1);

        let nonce = dispatch_method(&ctx, "getPendingNonce", json!([address]))
            .await
            .unwrap();
        assert_eq!(nonce, 1);

        // Not committed yet
        let account = dispatch_method(&ctx, "getAccount", json!([address])).await.unwrap();
        assert_eq!(account["nonce"], 0);
        assert_eq!(account["isContract"], false);

        let err = dispatch_method(&ctx, "sendRawTransaction", json!([signed_transfer(&key, 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::TransactionRejected(ResultCode::BadNonce)));
        assert_eq!(error_code(&err), -32003);
    }

    #[tokio::test]
    async fn test_protocol_violation_halts() {
        let key = funded_key();
        let (ctx, _consensus, mut fatal) = context(&key);

        let err = dispatch_method(&ctx, "commit", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::Fatal(_)));
        assert!(fatal.try_recv().is_ok());

        // Everything lifecycle-related is refused from now on
        let err = dispatch_method(&ctx, "beginBlock", json!([{"height": 1, "timestamp": 1}]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Halted));
        assert!(dispatch_method(&ctx, "getHealth", json!([])).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let key = funded_key();
        let (ctx, _consensus, _fatal) = context(&key);

        let err = dispatch_method(&ctx, "checkTx", json!(["%%%"])).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));

        let err = dispatch_method(&ctx, "getAccount", json!(["0x1234"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));

        let err = dispatch_method(&ctx, "beginBlock", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));

        let err = dispatch_method(&ctx, "getSlot", json!([])).await.unwrap_err();
        assert_eq!(error_code(&err), -32601);
    }

    #[tokio::test]
    async fn test_malformed_check_is_a_result_code() {
        let key = funded_key();
        let (ctx, _consensus, _fatal) = context(&key);

        // Valid base64, not a transaction
        let checked = dispatch_method(&ctx, "checkTx", json!(["AAEC"])).await.unwrap();
        assert_eq!(checked["code"], ResultCode::Malformed.code());
        assert!(!ctx.is_halted());
    }

    #[test]
    fn test_response_shape() {
        let response = into_response(json!(7), Err(RpcError::Halted));
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["id"], 7);
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32012);
    }
}
