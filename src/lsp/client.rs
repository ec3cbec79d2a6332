//! High-level LSP client
//!
//! Typed API over [`JsonRpcClient`] for the subset of the protocol the
//! RuboCop server speaks: lifecycle, document sync, watched files,
//! formatting and command execution.

use crate::io::transport::Transport;
use crate::lsp::protocol::{
    JsonRpcClient, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use lsp_types::{
    ClientCapabilities, DidChangeTextDocumentParams, DidChangeWatchedFilesClientCapabilities,
    DidChangeWatchedFilesParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DocumentFormattingClientCapabilities, DocumentFormattingParams, ExecuteCommandParams,
    FileEvent, InitializeParams, InitializeResult, InitializedParams,
    PublishDiagnosticsClientCapabilities, TextDocumentClientCapabilities,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentSyncClientCapabilities, TextEdit, Uri, VersionedTextDocumentIdentifier,
    WindowClientCapabilities, WorkspaceClientCapabilities, WorkspaceEditClientCapabilities,
    WorkspaceFolder,
};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, info};

// ============================================================================
// LSP Client Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LspError {
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("LSP client not initialized")]
    NotInitialized,

    #[error("LSP protocol error: {0}")]
    Protocol(String),

    #[error("LSP request timeout: {method}")]
    RequestTimeout { method: String },
}

impl LspError {
    fn from_rpc(method: &str, error: JsonRpcError) -> Self {
        match error {
            JsonRpcError::Timeout => LspError::RequestTimeout {
                method: method.to_string(),
            },
            other => LspError::JsonRpc(other),
        }
    }
}

// ============================================================================
// High-level LSP Client
// ============================================================================

/// Identity sent in `clientInfo`
const CLIENT_NAME: &str = "rubocop-lsp-client";

pub struct LspClient {
    rpc_client: JsonRpcClient,

    initialized: bool,
}

impl LspClient {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            rpc_client: JsonRpcClient::new(transport),
            initialized: false,
        }
    }

    /// Install the handler for server notifications
    pub async fn on_notification<F>(&self, handler: F)
    where
        F: Fn(JsonRpcNotification) + Send + Sync + 'static,
    {
        self.rpc_client.on_notification(handler).await;
    }

    /// Install the handler for server-to-client requests
    pub async fn on_request<F, Fut>(&self, handler: F)
    where
        F: Fn(JsonRpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JsonRpcResponse> + Send + 'static,
    {
        self.rpc_client.on_request(handler).await;
    }

    fn capabilities() -> ClientCapabilities {
        ClientCapabilities {
            workspace: Some(WorkspaceClientCapabilities {
                apply_edit: Some(true),
                workspace_edit: Some(WorkspaceEditClientCapabilities {
                    document_changes: Some(true),
                    ..Default::default()
                }),
                did_change_watched_files: Some(DidChangeWatchedFilesClientCapabilities {
                    dynamic_registration: Some(false),
                    relative_pattern_support: Some(false),
                }),
                workspace_folders: Some(true),
                ..Default::default()
            }),
            text_document: Some(TextDocumentClientCapabilities {
                synchronization: Some(TextDocumentSyncClientCapabilities {
                    dynamic_registration: Some(false),
                    will_save: Some(false),
                    will_save_wait_until: Some(false),
                    did_save: Some(false),
                }),
                formatting: Some(DocumentFormattingClientCapabilities {
                    dynamic_registration: Some(false),
                }),
                publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                    related_information: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            window: Some(WindowClientCapabilities {
                show_message: None,
                ..Default::default()
            }),
            general: None,
            experimental: None,
            notebook_document: None,
        }
    }

    /// Perform the `initialize` / `initialized` handshake
    pub async fn initialize(
        &mut self,
        workspace_folders: Vec<WorkspaceFolder>,
        initialization_options: Option<Value>,
    ) -> Result<InitializeResult, LspError> {
        if self.initialized {
            return Err(LspError::Protocol("Client already initialized".to_string()));
        }

        info!("Initializing LSP client");

        let root_uri: Option<Uri> = workspace_folders.first().map(|folder| folder.uri.clone());
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            #[allow(deprecated)]
            root_path: None,
            #[allow(deprecated)]
            root_uri,
            initialization_options,
            work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
            capabilities: Self::capabilities(),
            trace: Some(lsp_types::TraceValue::Off),
            workspace_folders: if workspace_folders.is_empty() {
                None
            } else {
                Some(workspace_folders)
            },
            client_info: Some(lsp_types::ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            locale: None,
        };

        let result: InitializeResult = self
            .rpc_client
            .request("initialize", Some(params))
            .await
            .map_err(|e| LspError::from_rpc("initialize", e))?;

        debug!("LSP server capabilities: {:?}", result.capabilities);

        self.rpc_client
            .notify("initialized", Some(InitializedParams {}))?;

        self.initialized = true;
        info!("LSP client initialized successfully");

        Ok(result)
    }

    fn ensure_initialized(&self) -> Result<(), LspError> {
        if self.initialized {
            Ok(())
        } else {
            Err(LspError::NotInitialized)
        }
    }

    // ========================================================================
    // Document synchronization
    // ========================================================================

    pub fn did_open(&self, document: TextDocumentItem) -> Result<(), LspError> {
        self.ensure_initialized()?;
        self.rpc_client.notify(
            "textDocument/didOpen",
            Some(DidOpenTextDocumentParams {
                text_document: document,
            }),
        )?;
        Ok(())
    }

    /// Full-text change notification
    pub fn did_change(&self, uri: Uri, version: i32, text: String) -> Result<(), LspError> {
        self.ensure_initialized()?;
        self.rpc_client.notify(
            "textDocument/didChange",
            Some(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier { uri, version },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text,
                }],
            }),
        )?;
        Ok(())
    }

    pub fn did_close(&self, uri: Uri) -> Result<(), LspError> {
        self.ensure_initialized()?;
        self.rpc_client.notify(
            "textDocument/didClose",
            Some(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri },
            }),
        )?;
        Ok(())
    }

    pub fn did_change_watched_files(&self, changes: Vec<FileEvent>) -> Result<(), LspError> {
        self.ensure_initialized()?;
        self.rpc_client.notify(
            "workspace/didChangeWatchedFiles",
            Some(DidChangeWatchedFilesParams { changes }),
        )?;
        Ok(())
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub async fn formatting(
        &self,
        params: DocumentFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>, LspError> {
        self.ensure_initialized()?;
        self.rpc_client
            .request("textDocument/formatting", Some(params))
            .await
            .map_err(|e| LspError::from_rpc("textDocument/formatting", e))
    }

    pub async fn execute_command(
        &self,
        command: &str,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, LspError> {
        self.ensure_initialized()?;
        let params = ExecuteCommandParams {
            command: command.to_string(),
            arguments,
            work_done_progress_params: Default::default(),
        };
        self.rpc_client
            .request("workspace/executeCommand", Some(params))
            .await
            .map_err(|e| LspError::from_rpc("workspace/executeCommand", e))
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Send `shutdown` then `exit`
    pub async fn shutdown(&mut self) -> Result<(), LspError> {
        if !self.initialized {
            return Ok(());
        }

        info!("Shutting down LSP client");

        let _: () = self
            .rpc_client
            .request("shutdown", None::<Value>)
            .await
            .map_err(|e| LspError::from_rpc("shutdown", e))?;
        self.rpc_client.notify("exit", None::<Value>)?;

        self.initialized = false;
        info!("LSP client shutdown complete");

        Ok(())
    }

    #[allow(dead_code)]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drop the connection state without talking to the server
    pub async fn close(&mut self) {
        self.initialized = false;
        self.rpc_client.cleanup_pending_requests().await;
    }
}
