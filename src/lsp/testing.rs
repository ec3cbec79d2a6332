//! In-memory language server for tests
//!
//! [`FakeServer`] sits on the far end of a duplex pipe and speaks framed
//! JSON-RPC, so the client stack is exercised byte for byte without a real
//! `rubocop --lsp` process. Tests either drive it step by step or hand it to
//! [`FakeServer::into_responder`] for canned RuboCop behaviour.

use crate::io::transport::{StreamTransport, Transport};
use crate::lsp::framing::LspFraming;
use crate::lsp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Scripted end of an in-memory LSP connection
pub struct FakeServer {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<Value>,
}

impl FakeServer {
    /// Create a connected (client transport, fake server) pair
    pub fn pair() -> (StreamTransport, FakeServer) {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let (server_read, server_write) = tokio::io::split(server_side);

        let client_transport = StreamTransport::new(client_write, client_read);
        let mut framed = LspFraming::new(StreamTransport::new(server_write, server_read));

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        let Some(message) = outbound else { break };
                        if framed.send(&message).await.is_err() {
                            break;
                        }
                    }
                    inbound = framed.receive() => {
                        let Ok(message) = inbound else { break };
                        let Ok(value) = serde_json::from_str::<Value>(&message) else { continue };
                        if inbound_tx.send(value).is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = framed.close().await;
        });

        (
            client_transport,
            FakeServer {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
        )
    }

    /// Next message from the client, `None` once the client hung up
    pub async fn next_message(&mut self) -> Option<Value> {
        self.inbound.recv().await
    }

    /// Skip ahead to the next request for `method`
    pub async fn expect_request(&mut self, method: &str) -> JsonRpcRequest {
        loop {
            let message = self
                .next_message()
                .await
                .unwrap_or_else(|| panic!("connection closed while waiting for {method}"));
            if message.get("id").is_some() && message["method"] == method {
                return serde_json::from_value(message).unwrap();
            }
        }
    }

    /// Skip ahead to the next notification for `method`
    pub async fn expect_notification(&mut self, method: &str) -> JsonRpcNotification {
        loop {
            let message = self
                .next_message()
                .await
                .unwrap_or_else(|| panic!("connection closed while waiting for {method}"));
            if message.get("id").is_none() && message["method"] == method {
                return serde_json::from_value(message).unwrap();
            }
        }
    }

    /// Skip ahead to the client's response for request `id`
    pub async fn expect_response(&mut self, id: u64) -> JsonRpcResponse {
        loop {
            let message = self
                .next_message()
                .await
                .unwrap_or_else(|| panic!("connection closed while waiting for response {id}"));
            if message.get("method").is_none() && message["id"] == id {
                return serde_json::from_value(message).unwrap();
            }
        }
    }

    fn send(&self, message: Value) {
        let _ = self.outbound.send(message.to_string());
    }

    pub fn reply(&self, id: Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result}));
    }

    pub fn reply_error(&self, id: Value, code: i32, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        }));
    }

    pub fn notify(&self, method: &str, params: Value) {
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}));
    }

    /// Send a server-to-client request
    pub fn request(&self, id: u64, method: &str, params: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}));
    }

    /// Answer requests the way `rubocop --lsp` does, in the background
    pub fn into_responder(self, behavior: ServerBehavior) -> ResponderHandle {
        let received = Arc::new(Mutex::new(Vec::new()));
        let handle = ResponderHandle {
            outbound: self.outbound.clone(),
            received: Arc::clone(&received),
        };
        tokio::spawn(respond(self, behavior, received));
        handle
    }
}

/// Canned answers for [`FakeServer::into_responder`]
#[derive(Debug, Clone, Default)]
pub struct ServerBehavior {
    /// Result of `textDocument/formatting`
    pub formatting_edits: Vec<Value>,

    /// Workspace edit pushed back through `workspace/applyEdit` when an
    /// autocorrect command runs
    pub command_edit: Option<Value>,

    /// Reply to `initialize` with an error
    pub fail_initialize: bool,

    /// Reply to `workspace/executeCommand` with an error
    pub fail_commands: bool,
}

/// Observes and drives a running responder
#[derive(Clone)]
pub struct ResponderHandle {
    outbound: mpsc::UnboundedSender<String>,
    received: Arc<Mutex<Vec<(String, Value)>>>,
}

impl ResponderHandle {
    /// Params of every client message for `method`, in arrival order
    pub fn received(&self, method: &str) -> Vec<Value> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Methods of every client message, in arrival order
    pub fn methods(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    /// Push a server notification
    pub fn notify(&self, method: &str, params: Value) {
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        let _ = self.outbound.send(message.to_string());
    }

    /// Wait until the client has sent `count` messages for `method`
    pub async fn wait_for(&self, method: &str, count: usize) -> Vec<Value> {
        for _ in 0..200 {
            let seen = self.received(method);
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} x {method}");
    }
}

async fn respond(
    mut server: FakeServer,
    behavior: ServerBehavior,
    received: Arc<Mutex<Vec<(String, Value)>>>,
) {
    let mut next_server_id = 1000u64;

    while let Some(message) = server.next_message().await {
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            // Client responses (to applyEdit) need no answer
            continue;
        };
        let method = method.to_string();
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        received.lock().unwrap().push((method.clone(), params.clone()));

        let Some(id) = message.get("id").cloned() else {
            if method == "exit" {
                break;
            }
            continue;
        };

        match method.as_str() {
            "initialize" if behavior.fail_initialize => {
                server.reply_error(id, -32603, "initialization exploded");
            }
            "initialize" => server.reply(
                id,
                json!({
                    "capabilities": {
                        "textDocumentSync": {"openClose": true, "change": 1},
                        "documentFormattingProvider": true,
                        "executeCommandProvider": {
                            "commands": ["rubocop.formatAutocorrects", "rubocop.formatAutocorrectsAll"]
                        }
                    },
                    "serverInfo": {"name": "RuboCop", "version": "1.57.2"}
                }),
            ),
            "textDocument/formatting" => {
                server.reply(id, Value::Array(behavior.formatting_edits.clone()));
            }
            "workspace/executeCommand" if behavior.fail_commands => {
                server.reply_error(id, -32603, "autocorrect failed");
            }
            "workspace/executeCommand" => {
                if let Some(edit) = &behavior.command_edit {
                    server.request(next_server_id, "workspace/applyEdit", json!({"edit": edit}));
                    server.expect_response(next_server_id).await;
                    next_server_id += 1;
                }
                server.reply(id, Value::Null);
            }
            "shutdown" => server.reply(id, Value::Null),
            other => server.reply_error(id, -32601, &format!("Method not found: {other}")),
        }
    }
}
