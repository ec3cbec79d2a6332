//! JSON-RPC 2.0 protocol layer
//!
//! Request/response correlation, server notifications, and server-to-client
//! requests (RuboCop asks the client to apply workspace edits).

use crate::io::transport::Transport;
use crate::lsp::framing::LspFraming;
use crate::log_lsp_message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{Level, debug, error, trace, warn};

/// Default timeout for a request round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    /// Successful response to a server request
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response to a server request
    pub fn failure(id: Value, code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcErrorObject {
                code: code as i32,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC error codes used by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum JsonRpcErrorCode {
    InvalidParams = -32602,
    MethodNotFound = -32601,
    InternalError = -32603,
}

// ============================================================================
// JSON-RPC Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JsonRpcError {
    #[error("JSON-RPC server error ({code}): {message}")]
    Server {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Request was cancelled")]
    RequestCancelled,

    #[error("Missing result in response")]
    MissingResult,
}

// ============================================================================
// Inbound message classification
// ============================================================================

/// An inbound message, classified by which of `id` / `method` it carries
#[derive(Debug)]
enum Inbound {
    Response(JsonRpcResponse),
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

impl Inbound {
    fn parse(message: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(message)?;
        let has_id = value.get("id").is_some_and(|id| !id.is_null());
        let has_method = value.get("method").is_some();

        Ok(match (has_id, has_method) {
            (true, true) => Inbound::Request(serde_json::from_value(value)?),
            (false, true) => Inbound::Notification(serde_json::from_value(value)?),
            _ => Inbound::Response(serde_json::from_value(value)?),
        })
    }
}

// ============================================================================
// JSON-RPC Client
// ============================================================================

/// Handler for server notifications
pub type NotificationHandler = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;

/// Future produced by a server request handler
pub type ResponseFuture = Pin<Box<dyn Future<Output = JsonRpcResponse> + Send>>;

/// Handler for server-to-client requests
pub type RequestHandler = Arc<dyn Fn(JsonRpcRequest) -> ResponseFuture + Send + Sync>;

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// JSON-RPC client with request/response correlation
pub struct JsonRpcClient {
    /// Outbound messages for the I/O task
    outbound_sender: mpsc::UnboundedSender<String>,

    request_id: AtomicU64,

    pending_requests: PendingRequests,

    notification_handler: Arc<Mutex<Option<NotificationHandler>>>,

    request_handler: Arc<Mutex<Option<RequestHandler>>>,
}

impl JsonRpcClient {
    /// Create a client and spawn the I/O task that owns the framed transport
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        let mut framed = LspFraming::new(transport);
        let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
        let pending_requests: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let notification_handler = Arc::new(Mutex::new(None::<NotificationHandler>));
        let request_handler = Arc::new(Mutex::new(None::<RequestHandler>));

        let pending = Arc::clone(&pending_requests);
        let notifications = Arc::clone(&notification_handler);
        let requests = Arc::clone(&request_handler);
        let reply_sender = outbound_sender.downgrade();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_receiver.recv() => {
                        let Some(message) = outbound else { break };
                        if let Err(e) = framed.send(&message).await {
                            error!("Failed to send message: {}", e);
                            break;
                        }
                    }
                    inbound = framed.receive() => {
                        match inbound {
                            Ok(message) => {
                                Self::dispatch_inbound(
                                    &message,
                                    &pending,
                                    &notifications,
                                    &requests,
                                    &reply_sender,
                                )
                                .await;
                            }
                            Err(e) => {
                                debug!("Language server connection ended: {}", e);
                                break;
                            }
                        }
                    }
                }
            }

            drop(outbound_receiver);
            // Dropping the senders wakes every waiter with RequestCancelled
            pending.lock().await.clear();
            let _ = framed.close().await;
            trace!("JSON-RPC I/O task finished");
        });

        Self {
            outbound_sender,
            request_id: AtomicU64::new(1),
            pending_requests,
            notification_handler,
            request_handler,
        }
    }

    /// Set the handler for server notifications
    pub async fn on_notification<F>(&self, handler: F)
    where
        F: Fn(JsonRpcNotification) + Send + Sync + 'static,
    {
        *self.notification_handler.lock().await = Some(Arc::new(handler));
    }

    /// Set the handler for server-to-client requests
    pub async fn on_request<F, Fut>(&self, handler: F)
    where
        F: Fn(JsonRpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JsonRpcResponse> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |request| Box::pin(handler(request)));
        *self.request_handler.lock().await = Some(handler);
    }

    async fn dispatch_inbound(
        message: &str,
        pending: &PendingRequests,
        notifications: &Arc<Mutex<Option<NotificationHandler>>>,
        requests: &Arc<Mutex<Option<RequestHandler>>>,
        reply_sender: &mpsc::WeakUnboundedSender<String>,
    ) {
        let inbound = match Inbound::parse(message) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Discarding unparseable message ({}): {}", e, message);
                return;
            }
        };

        match inbound {
            Inbound::Response(response) => {
                log_lsp_message!(Level::DEBUG, "incoming", "response", &response);
                let Some(id) = response.id.as_u64() else {
                    debug!("Received response with non-numeric id {}", response.id);
                    return;
                };
                match pending.lock().await.remove(&id) {
                    Some(sender) => {
                        if sender.send(response).is_err() {
                            debug!("Response receiver dropped for request {}", id);
                        }
                    }
                    None => debug!("Received response for unknown request {}", id),
                }
            }
            Inbound::Notification(notification) => {
                log_lsp_message!(
                    Level::DEBUG,
                    "incoming",
                    &notification.method,
                    &notification.params
                );
                let handler = notifications.lock().await.clone();
                if let Some(handler) = handler {
                    handler(notification);
                }
            }
            Inbound::Request(request) => {
                log_lsp_message!(Level::DEBUG, "incoming", &request.method, &request.params);
                let handler = requests.lock().await.clone();
                let reply_sender = reply_sender.clone();
                // Replies run off the I/O task so a handler may await other traffic
                tokio::spawn(async move {
                    let response = match handler {
                        Some(handler) => handler(request).await,
                        None => JsonRpcResponse::failure(
                            request.id,
                            JsonRpcErrorCode::MethodNotFound,
                            format!("Method not found: {}", request.method),
                        ),
                    };
                    match serde_json::to_string(&response) {
                        Ok(json) => {
                            if let Some(sender) = reply_sender.upgrade() {
                                let _ = sender.send(json);
                            }
                        }
                        Err(e) => error!("Failed to serialize reply: {}", e),
                    }
                });
            }
        }
    }

    /// Send a request with the default timeout
    pub async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, JsonRpcError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        self.request_with_timeout(method, params, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Send a request and wait at most `timeout` for its response
    pub async fn request_with_timeout<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        timeout: Duration,
    ) -> Result<R, JsonRpcError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::from(id),
            method: method.to_string(),
            params: params
                .map(|p| serde_json::to_value(p).map_err(JsonRpcError::Serialization))
                .transpose()?,
        };
        let request_json = serde_json::to_string(&request).map_err(JsonRpcError::Serialization)?;
        log_lsp_message!(Level::DEBUG, "outgoing", method, &request.params);

        let (response_sender, response_receiver) = oneshot::channel();
        self.pending_requests.lock().await.insert(id, response_sender);

        if self.outbound_sender.send(request_json).is_err() {
            self.pending_requests.lock().await.remove(&id);
            return Err(JsonRpcError::Transport("Outbound channel closed".to_string()));
        }

        let response = match tokio::time::timeout(timeout, response_receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(JsonRpcError::RequestCancelled),
            Err(_) => {
                self.pending_requests.lock().await.remove(&id);
                return Err(JsonRpcError::Timeout);
            }
        };

        if let Some(error) = response.error {
            return Err(JsonRpcError::Server {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        match response.result {
            Some(result) => serde_json::from_value(result).map_err(JsonRpcError::Deserialization),
            // Some servers omit `result` for a null reply
            None => serde_json::from_value(Value::Null).map_err(|_| JsonRpcError::MissingResult),
        }
    }

    /// Send a notification
    pub fn notify<P: Serialize>(&self, method: &str, params: Option<P>) -> Result<(), JsonRpcError> {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: params
                .map(|p| serde_json::to_value(p).map_err(JsonRpcError::Serialization))
                .transpose()?,
        };
        let json = serde_json::to_string(&notification).map_err(JsonRpcError::Serialization)?;
        log_lsp_message!(Level::DEBUG, "outgoing", method, &notification.params);

        self.outbound_sender
            .send(json)
            .map_err(|_| JsonRpcError::Transport("Outbound channel closed".to_string()))
    }

    /// Whether the I/O task is still running
    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        !self.outbound_sender.is_closed()
    }

    /// Fail every pending request (used when the connection is torn down)
    pub async fn cleanup_pending_requests(&self) {
        let mut pending = self.pending_requests.lock().await;
        for (id, sender) in pending.drain() {
            debug!("JsonRpcClient: cancelling pending request {}", id);
            let _ = sender.send(JsonRpcResponse::failure(
                Value::from(id),
                JsonRpcErrorCode::InternalError,
                "Request cancelled due to connection shutdown",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::testing::FakeServer;
    use serde_json::json;

    #[tokio::test]
    async fn test_request_response_correlation() {
        let (transport, mut server) = FakeServer::pair();
        let client = JsonRpcClient::new(transport);

        let responder = tokio::spawn(async move {
            let request = server.expect_request("textDocument/formatting").await;
            server.reply(request.id, json!([]));
        });

        let edits: Vec<Value> = client
            .request("textDocument/formatting", Some(json!({"x": 1})))
            .await
            .unwrap();
        assert!(edits.is_empty());
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced() {
        let (transport, mut server) = FakeServer::pair();
        let client = JsonRpcClient::new(transport);

        tokio::spawn(async move {
            let request = server.expect_request("workspace/executeCommand").await;
            server.reply_error(request.id, -32600, "Unknown command");
        });

        let result: Result<Value, _> = client
            .request("workspace/executeCommand", Some(json!({})))
            .await;
        match result {
            Err(JsonRpcError::Server { code, message, .. }) => {
                assert_eq!(code, -32600);
                assert_eq!(message, "Unknown command");
            }
            other => panic!("Expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_null_result_deserializes_to_unit() {
        let (transport, mut server) = FakeServer::pair();
        let client = JsonRpcClient::new(transport);

        tokio::spawn(async move {
            let request = server.expect_request("shutdown").await;
            server.reply(request.id, Value::Null);
        });

        let _: () = client.request("shutdown", None::<Value>).await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_clears_pending_request() {
        let (transport, _server) = FakeServer::pair();
        let client = JsonRpcClient::new(transport);

        let result: Result<Value, _> = client
            .request_with_timeout("shutdown", None::<Value>, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(JsonRpcError::Timeout)));
        assert!(client.pending_requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_notifications_reach_handler() {
        let (transport, server) = FakeServer::pair();
        let client = JsonRpcClient::new(transport);

        let (tx, mut rx) = mpsc::unbounded_channel();
        client
            .on_notification(move |notification| {
                let _ = tx.send(notification.method);
            })
            .await;

        server.notify(
            "textDocument/publishDiagnostics",
            json!({"uri": "file:///a.rb", "diagnostics": []}),
        );
        assert_eq!(
            rx.recv().await.as_deref(),
            Some("textDocument/publishDiagnostics")
        );
    }

    #[tokio::test]
    async fn test_server_request_gets_handler_reply() {
        let (transport, mut server) = FakeServer::pair();
        let client = JsonRpcClient::new(transport);
        client
            .on_request(|request| async move {
                JsonRpcResponse::success(request.id, json!({"applied": true}))
            })
            .await;

        server.request(7, "workspace/applyEdit", json!({"edit": {}}));
        let reply = server.expect_response(7).await;
        assert_eq!(reply.result, Some(json!({"applied": true})));
    }

    #[tokio::test]
    async fn test_server_request_without_handler_is_method_not_found() {
        let (transport, mut server) = FakeServer::pair();
        let _client = JsonRpcClient::new(transport);

        server.request(3, "window/workDoneProgress/create", json!({"token": "t"}));
        let reply = server.expect_response(3).await;
        assert_eq!(
            reply.error.map(|e| e.code),
            Some(JsonRpcErrorCode::MethodNotFound as i32)
        );
    }

    #[tokio::test]
    async fn test_connection_loss_cancels_pending_requests() {
        let (transport, mut server) = FakeServer::pair();
        let client = JsonRpcClient::new(transport);

        tokio::spawn(async move {
            server.expect_request("textDocument/formatting").await;
            drop(server);
        });

        let result: Result<Value, _> = client
            .request("textDocument/formatting", Some(json!({})))
            .await;
        assert!(matches!(result, Err(JsonRpcError::RequestCancelled)));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_inbound_classification() {
        assert!(matches!(
            Inbound::parse(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap(),
            Inbound::Response(_)
        ));
        assert!(matches!(
            Inbound::parse(r#"{"jsonrpc":"2.0","id":4,"method":"workspace/applyEdit","params":{}}"#)
                .unwrap(),
            Inbound::Request(_)
        ));
        assert!(matches!(
            Inbound::parse(r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{}}"#)
                .unwrap(),
            Inbound::Notification(_)
        ));
    }
}
