//! RuboCop language server sessions
//!
//! A session is one live connection: the `rubocop --lsp` process plus an
//! initialized [`LspClient`] over its stdio. Everything the server pushes
//! (diagnostics, log and show messages, stderr, an unexpected exit) is
//! forwarded to the owner as a [`SessionEvent`] stamped with the session's
//! generation, so events from a connection that has since been replaced can
//! be recognised and dropped.

use async_trait::async_trait;
use lsp_types::{
    ApplyWorkspaceEditParams, ApplyWorkspaceEditResponse, LogMessageParams, MessageType,
    PublishDiagnosticsParams, ShowMessageParams, WorkspaceEdit, WorkspaceFolder,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::InitializationOptions;
use crate::io::{
    ChildProcessManager, ProcessError, ProcessExitEvent, ProcessExitHandler, ProcessManager,
    StderrMonitor, StopMode,
};
use crate::lsp::{JsonRpcErrorCode, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::lsp::{LspClient, LspError};
use crate::rubocop::command::ProcessDescriptor;

/// Default bound on the `initialize` round trip
pub const DEFAULT_INITIALIZATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on the `shutdown` round trip
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// The server started but the `initialize` handshake failed
    #[error("{0}")]
    Initialization(LspError),

    #[error("Session operation timeout: {operation} took longer than {timeout:?}")]
    OperationTimeout {
        operation: String,
        timeout: Duration,
    },
}

// ============================================================================
// Events
// ============================================================================

/// Something the server did, stamped with the generation of its session
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub generation: u64,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone)]
pub enum SessionEventKind {
    /// `textDocument/publishDiagnostics`
    Diagnostics(PublishDiagnosticsParams),
    /// A line for the output channel (log/show messages and stderr)
    Output(String),
    /// The server process exited without being asked to
    Exited { code: Option<i32> },
}

/// Applies server-requested workspace edits
///
/// Called from the connection's I/O side, so it must not wait on the session
/// owner.
#[async_trait]
pub trait WorkspaceEditHandler: Send + Sync {
    async fn apply_edit(&self, edit: WorkspaceEdit) -> bool;
}

// ============================================================================
// Session configuration
// ============================================================================

/// Everything needed to launch and initialize one session
#[derive(Clone)]
pub struct SessionConfig {
    pub descriptor: ProcessDescriptor,

    /// Working directory of the server process
    pub working_directory: PathBuf,

    pub workspace_folders: Vec<WorkspaceFolder>,

    pub initialization_options: InitializationOptions,

    /// Stamp for every event this session emits
    pub generation: u64,

    pub events: mpsc::UnboundedSender<SessionEvent>,

    pub edit_handler: Arc<dyn WorkspaceEditHandler>,

    pub initialization_timeout: Duration,

    pub shutdown_timeout: Duration,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("descriptor", &self.descriptor)
            .field("working_directory", &self.working_directory)
            .field("workspace_folders", &self.workspace_folders)
            .field("initialization_options", &self.initialization_options)
            .field("generation", &self.generation)
            .finish()
    }
}

impl SessionConfig {
    fn emit(&self, kind: SessionEventKind) {
        // The owner may already be gone during teardown
        let _ = self.events.send(SessionEvent {
            generation: self.generation,
            kind,
        });
    }
}

// ============================================================================
// Session trait and factory
// ============================================================================

/// A live, initialized connection
#[async_trait]
pub trait ServerSession: Send + Sync {
    fn client(&self) -> &LspClient;

    fn generation(&self) -> u64;

    /// Shut the server down: `shutdown`/`exit`, then stop the process
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

/// Creates ready-to-use sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn ServerSession>, SessionError>;
}

// ============================================================================
// Connection wiring shared by every session kind
// ============================================================================

fn message_type_label(typ: MessageType) -> &'static str {
    match typ {
        MessageType::ERROR => "Error",
        MessageType::WARNING => "Warn",
        MessageType::INFO => "Info",
        _ => "Log",
    }
}

/// Route server notifications and requests on `client` to `config`
pub(crate) async fn wire_client(client: &LspClient, config: &SessionConfig) {
    let notification_config = config.clone();
    client
        .on_notification(move |notification: JsonRpcNotification| {
            let params = notification.params.unwrap_or(Value::Null);
            match notification.method.as_str() {
                "textDocument/publishDiagnostics" => {
                    match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                        Ok(diagnostics) => notification_config
                            .emit(SessionEventKind::Diagnostics(diagnostics)),
                        Err(e) => warn!("Malformed publishDiagnostics: {}", e),
                    }
                }
                "window/logMessage" => {
                    if let Ok(log) = serde_json::from_value::<LogMessageParams>(params) {
                        notification_config.emit(SessionEventKind::Output(format!(
                            "[{}] {}",
                            message_type_label(log.typ),
                            log.message
                        )));
                    }
                }
                "window/showMessage" => {
                    if let Ok(show) = serde_json::from_value::<ShowMessageParams>(params) {
                        notification_config.emit(SessionEventKind::Output(format!(
                            "[{}] {}",
                            message_type_label(show.typ),
                            show.message
                        )));
                    }
                }
                other => debug!("Ignoring server notification {}", other),
            }
        })
        .await;

    let edit_handler = Arc::clone(&config.edit_handler);
    client
        .on_request(move |request: JsonRpcRequest| {
            let edit_handler = Arc::clone(&edit_handler);
            async move {
                if request.method != "workspace/applyEdit" {
                    return JsonRpcResponse::failure(
                        request.id,
                        JsonRpcErrorCode::MethodNotFound,
                        format!("Method not found: {}", request.method),
                    );
                }

                let params = request.params.unwrap_or(Value::Null);
                let params = match serde_json::from_value::<ApplyWorkspaceEditParams>(params) {
                    Ok(params) => params,
                    Err(e) => {
                        return JsonRpcResponse::failure(
                            request.id,
                            JsonRpcErrorCode::InvalidParams,
                            e.to_string(),
                        );
                    }
                };

                let applied = edit_handler.apply_edit(params.edit).await;
                let response = ApplyWorkspaceEditResponse {
                    applied,
                    failure_reason: None,
                    failed_change: None,
                };
                JsonRpcResponse::success(
                    request.id,
                    serde_json::to_value(response).unwrap_or(Value::Null),
                )
            }
        })
        .await;
}

/// Run the `initialize` handshake within the configured timeout
pub(crate) async fn initialize_client(
    client: &mut LspClient,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    let options = serde_json::to_value(&config.initialization_options)
        .map_err(|e| SessionError::Initialization(LspError::Protocol(e.to_string())))?;

    tokio::time::timeout(
        config.initialization_timeout,
        client.initialize(config.workspace_folders.clone(), Some(options)),
    )
    .await
    .map_err(|_| SessionError::OperationTimeout {
        operation: "LSP initialization".to_string(),
        timeout: config.initialization_timeout,
    })?
    .map_err(SessionError::Initialization)?;

    Ok(())
}

/// Shut the client down, tolerating an unresponsive server
pub(crate) async fn shutdown_client(client: &mut LspClient, timeout: Duration) {
    match tokio::time::timeout(timeout, client.shutdown()).await {
        Ok(Ok(())) => debug!("LSP client shutdown completed"),
        Ok(Err(e)) => warn!("LSP client shutdown error: {}", e),
        Err(_) => warn!("LSP client shutdown timed out"),
    }
    client.close().await;
}

// ============================================================================
// Process-backed session
// ============================================================================

/// Reports an unrequested process exit as a session event
struct ExitForwarder {
    config: SessionConfig,
}

#[async_trait]
impl ProcessExitHandler for ExitForwarder {
    async fn on_process_exit(&self, event: ProcessExitEvent) {
        self.config
            .emit(SessionEventKind::Exited { code: event.code });
    }
}

/// `rubocop --lsp` child process with its LSP client
pub struct RubocopSession {
    process_manager: ChildProcessManager,

    lsp_client: LspClient,

    generation: u64,

    shutdown_timeout: Duration,
}

impl RubocopSession {
    /// Start the process and complete the LSP handshake
    ///
    /// If this returns `Ok`, the session is ready for requests.
    pub async fn new(config: SessionConfig) -> Result<Self, SessionError> {
        info!(
            "Starting RuboCop session (generation {}): {}",
            config.generation,
            config.descriptor.command_line()
        );

        let mut process_manager = ChildProcessManager::new(
            config.descriptor.command.clone(),
            config.descriptor.args.clone(),
            Some(config.working_directory.clone()),
        )
        .with_env(config.descriptor.env.clone());

        let stderr_config = config.clone();
        process_manager.on_stderr_line(move |line| {
            stderr_config.emit(SessionEventKind::Output(line));
        });
        process_manager.on_process_exit(Arc::new(ExitForwarder {
            config: config.clone(),
        }));

        process_manager.start().await?;
        let transport = process_manager.create_stdio_transport()?;

        let mut lsp_client = LspClient::new(transport);
        wire_client(&lsp_client, &config).await;

        if let Err(e) = initialize_client(&mut lsp_client, &config).await {
            lsp_client.close().await;
            let _ = process_manager.stop(StopMode::Force).await;
            return Err(e);
        }

        info!("RuboCop session started");
        Ok(Self {
            process_manager,
            lsp_client,
            generation: config.generation,
            shutdown_timeout: config.shutdown_timeout,
        })
    }
}

impl Drop for RubocopSession {
    fn drop(&mut self) {
        if self.process_manager.is_running() {
            warn!("RubocopSession dropped without close() - force killing process");
            self.process_manager.kill_sync();
        }
    }
}

#[async_trait]
impl ServerSession for RubocopSession {
    fn client(&self) -> &LspClient {
        &self.lsp_client
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    async fn close(mut self: Box<Self>) -> Result<(), SessionError> {
        info!("Shutting down RuboCop session (generation {})", self.generation);
        shutdown_client(&mut self.lsp_client, self.shutdown_timeout).await;

        if self.process_manager.is_running() {
            self.process_manager.stop_within(self.shutdown_timeout).await?;
        }
        Ok(())
    }
}

/// Creates [`RubocopSession`]s
#[derive(Debug, Default, Clone)]
pub struct RubocopSessionFactory;

#[async_trait]
impl SessionFactory for RubocopSessionFactory {
    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn ServerSession>, SessionError> {
        Ok(Box::new(RubocopSession::new(config).await?))
    }
}
