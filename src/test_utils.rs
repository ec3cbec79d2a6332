//! Test utilities and global setup
//!
//! Centralized test logging plus the fakes shared by the controller tests:
//! a scripted command runner, a recording editor host and a session factory
//! backed by in-memory fake servers.

use async_trait::async_trait;
use lsp_types::{Diagnostic, Uri, WorkspaceEdit};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::extension::host::{
    EditorHost, StatusItem, TextDocument, file_uri, language_id_for,
};
use crate::io::{CommandRunner, ExecError, ExecOutput, ProcessError};
use crate::lsp::LspClient;
use crate::lsp::testing::{FakeServer, ResponderHandle, ServerBehavior};
use crate::rubocop::ProcessDescriptor;
use crate::rubocop::session::{
    ServerSession, SessionConfig, SessionError, SessionEvent, SessionEventKind, SessionFactory,
    initialize_client, shutdown_client, wire_client,
};

/// Test logging utilities
#[cfg(all(test, feature = "test-logging"))]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// For automatic initialization in a test module:
    /// ```rust
    /// #[cfg(feature = "test-logging")]
    /// #[ctor::ctor]
    /// fn init_test_logging() {
    ///     crate::test_utils::logging::init();
    /// }
    /// ```
    ///
    /// `RUST_LOG` controls the level (default: "debug,tokio=info"), e.g.
    ///
    /// ```bash
    /// RUST_LOG=rubocop_lsp_client::extension=trace cargo test --features test-logging
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(true)
                .compact()
                .try_init()
                .ok(); // Already initialized by another test
        });
    }
}

// ============================================================================
// Scripted command runner
// ============================================================================

#[derive(Debug, Clone)]
enum Scripted {
    Succeed(String),
    Fail(i32, String),
}

/// [`CommandRunner`] answering from a script; unscripted commands fail to
/// spawn as if not installed
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: HashMap<String, Scripted>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(mut self, command: &str, stdout: &str) -> Self {
        self.script
            .insert(command.to_string(), Scripted::Succeed(stdout.to_string()));
        self
    }

    pub fn fail(mut self, command: &str, code: i32, stderr: &str) -> Self {
        self.script
            .insert(command.to_string(), Scripted::Fail(code, stderr.to_string()));
        self
    }

    /// Global rubocop 1.57.2 on PATH
    pub fn rubocop_1_57() -> Self {
        Self::new().succeed("rubocop -v", "1.57.2")
    }

    /// Workspace without a Gemfile, global rubocop 1.57.2
    pub fn without_gemfile() -> Self {
        let missing = "Could not locate Gemfile or .bundle/ directory";
        Self::rubocop_1_57()
            .fail("bundle list --name-only", 10, missing)
            .fail("bundle show rubocop", 10, missing)
    }

    /// Bundler project whose bundle includes rubocop 1.57.2
    pub fn with_rubocop_in_bundle() -> Self {
        Self::new()
            .succeed("bundle list --name-only", "rake\nrubocop")
            .succeed("bundle show rubocop", "/gems/rubocop-1.57.2")
            .succeed("bundle exec rubocop -v", "1.57.2")
            .succeed("rubocop -v", "1.57.2")
    }

    /// Every command run so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &str, cwd: &Path) -> Result<ExecOutput, ExecError> {
        self.calls.lock().unwrap().push(command.to_string());
        match self.script.get(command) {
            Some(Scripted::Succeed(stdout)) => Ok(ExecOutput {
                stdout: stdout.clone(),
                stderr: String::new(),
            }),
            Some(Scripted::Fail(code, stderr)) => Err(ExecError::Failed {
                command: command.to_string(),
                cwd: cwd.to_path_buf(),
                code: Some(*code),
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            None => Err(ExecError::Spawn {
                command: command.to_string(),
                cwd: cwd.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "command not found"),
            }),
        }
    }
}

// ============================================================================
// Recording editor host
// ============================================================================

#[derive(Debug, Default)]
struct HostState {
    output: Vec<String>,
    statuses: Vec<Option<StatusItem>>,
    errors: Vec<(String, Vec<String>)>,
    responses: VecDeque<Option<String>>,
    documents: Vec<TextDocument>,
    active: Option<TextDocument>,
    applied_edits: Vec<WorkspaceEdit>,
    published: HashMap<String, Vec<Diagnostic>>,
    output_shown: usize,
    opened_settings: Vec<String>,
}

/// [`EditorHost`] that records every call
#[derive(Debug)]
pub struct RecordingHost {
    root: PathBuf,
    state: Mutex<HostState>,
}

impl RecordingHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(HostState::default()),
        }
    }

    /// Queue the button the user picks on the next error message
    pub fn respond_with(&self, label: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(label.map(str::to_string));
    }

    /// Open a document (version 1) and return it
    pub fn add_document(&self, path: &str, language_id: &str) -> TextDocument {
        let document = TextDocument {
            uri: file_uri(Path::new(path)).unwrap(),
            language_id: language_id.to_string(),
            version: 1,
            text: "puts \"Hello\"\n".to_string(),
        };
        self.state.lock().unwrap().documents.push(document.clone());
        document
    }

    pub fn set_active(&self, document: Option<TextDocument>) {
        self.state.lock().unwrap().active = document;
    }

    pub fn output(&self) -> Vec<String> {
        self.state.lock().unwrap().output.clone()
    }

    /// Whether any output line contains `text`
    pub fn logged(&self, text: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .output
            .iter()
            .any(|line| line.contains(text))
    }

    pub fn errors(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().errors.clone()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors().into_iter().map(|(message, _)| message).collect()
    }

    /// Most recent status; `None` when hidden or never set
    pub fn last_status(&self) -> Option<StatusItem> {
        self.state.lock().unwrap().statuses.last().cloned().flatten()
    }

    pub fn output_shown(&self) -> usize {
        self.state.lock().unwrap().output_shown
    }

    pub fn opened_settings(&self) -> Vec<String> {
        self.state.lock().unwrap().opened_settings.clone()
    }

    pub fn applied_edits(&self) -> Vec<WorkspaceEdit> {
        self.state.lock().unwrap().applied_edits.clone()
    }

    pub fn published(&self, uri: &str) -> Option<Vec<Diagnostic>> {
        self.state.lock().unwrap().published.get(uri).cloned()
    }
}

#[async_trait]
impl EditorHost for RecordingHost {
    fn append_line(&self, line: &str) {
        self.state.lock().unwrap().output.push(line.to_string());
    }

    fn show_output(&self) {
        self.state.lock().unwrap().output_shown += 1;
    }

    fn set_status(&self, status: Option<StatusItem>) {
        self.state.lock().unwrap().statuses.push(status);
    }

    async fn show_error_message(&self, message: &str, actions: &[&str]) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        state.errors.push((
            message.to_string(),
            actions.iter().map(|a| a.to_string()).collect(),
        ));
        state.responses.pop_front().flatten()
    }

    fn open_settings(&self, section: &str) {
        self.state
            .lock()
            .unwrap()
            .opened_settings
            .push(section.to_string());
    }

    fn workspace_folders(&self) -> Vec<PathBuf> {
        vec![self.root.clone()]
    }

    fn active_document(&self) -> Option<TextDocument> {
        self.state.lock().unwrap().active.clone()
    }

    fn open_documents(&self) -> Vec<TextDocument> {
        self.state.lock().unwrap().documents.clone()
    }

    async fn apply_workspace_edit(&self, edit: WorkspaceEdit) -> bool {
        self.state.lock().unwrap().applied_edits.push(edit);
        true
    }

    fn publish_diagnostics(&self, uri: &Uri, diagnostics: &[Diagnostic]) {
        self.state
            .lock()
            .unwrap()
            .published
            .insert(uri.as_str().to_string(), diagnostics.to_vec());
    }
}

// ============================================================================
// Fake sessions
// ============================================================================

/// Session over an in-memory [`FakeServer`]
struct FakeSession {
    client: LspClient,
    generation: u64,
    shutdown_timeout: std::time::Duration,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl ServerSession for FakeSession {
    fn client(&self) -> &LspClient {
        &self.client
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    async fn close(mut self: Box<Self>) -> Result<(), SessionError> {
        shutdown_client(&mut self.client, self.shutdown_timeout).await;
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// [`SessionFactory`] handing out fake-server sessions
#[derive(Default)]
pub struct FakeSessionFactory {
    behavior: ServerBehavior,
    failures_left: Mutex<usize>,
    attempts: AtomicUsize,
    configs: Mutex<Vec<SessionConfig>>,
    responders: Mutex<Vec<ResponderHandle>>,
    closed: Arc<AtomicUsize>,
}

impl FakeSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(mut self, behavior: ServerBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Fail the first `count` launches as if the executable were missing
    pub fn fail_first(self, count: usize) -> Self {
        *self.failures_left.lock().unwrap() = count;
        self
    }

    /// Calls to `create_session`, failed or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Descriptors of the servers actually started
    pub fn launches(&self) -> Vec<ProcessDescriptor> {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .map(|config| config.descriptor.clone())
            .collect()
    }

    /// Responder of the `index`th started server
    pub fn responder(&self, index: usize) -> ResponderHandle {
        self.responders.lock().unwrap()[index].clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Deliver an event as if session `generation` produced it
    pub fn emit(&self, generation: u64, kind: SessionEventKind) {
        let configs = self.configs.lock().unwrap();
        let config = configs.last().expect("no session was started");
        config
            .events
            .send(SessionEvent { generation, kind })
            .unwrap();
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn ServerSession>, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures_left = self.failures_left.lock().unwrap();
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(ProcessError::NotFound(config.descriptor.command.clone()).into());
            }
        }

        let (transport, server) = FakeServer::pair();
        self.responders
            .lock()
            .unwrap()
            .push(server.into_responder(self.behavior.clone()));
        self.configs.lock().unwrap().push(config.clone());

        let mut client = LspClient::new(transport);
        wire_client(&client, &config).await;
        if let Err(e) = initialize_client(&mut client, &config).await {
            client.close().await;
            return Err(e);
        }

        Ok(Box::new(FakeSession {
            client,
            generation: config.generation,
            shutdown_timeout: config.shutdown_timeout,
            closed: Arc::clone(&self.closed),
        }))
    }
}

// ============================================================================
// Integration helpers
// ============================================================================

/// RuboCop executable for integration tests: `RUBOCOP_PATH`, else `rubocop`
#[cfg(feature = "rubocop-integration-tests")]
pub fn rubocop_command() -> String {
    std::env::var("RUBOCOP_PATH").unwrap_or_else(|_| "rubocop".to_string())
}

/// Throwaway Ruby project with automatic cleanup
pub struct TestWorkspace {
    _temp_dir: tempfile::TempDir, // Keeps the directory alive until drop
    pub root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Result<Self, io::Error> {
        let temp_dir = tempfile::TempDir::new()?;
        // Canonical so file URIs match what the server reports
        let root = temp_dir.path().canonicalize()?;
        Ok(Self {
            _temp_dir: temp_dir,
            root,
        })
    }

    /// Write `contents` to `name` under the root, creating directories
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf, io::Error> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Open document for a file written with [`TestWorkspace::write`]
    pub fn document(&self, path: &Path) -> Result<TextDocument, io::Error> {
        let text = std::fs::read_to_string(path)?;
        let uri = file_uri(path).ok_or_else(|| io::Error::other("not an absolute path"))?;
        Ok(TextDocument {
            uri,
            language_id: language_id_for(path),
            version: 1,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_runner_replays_script() {
        let runner = ScriptedRunner::new()
            .succeed("rubocop -v", "1.57.2")
            .fail("bundle show rubocop", 7, "Could not find gem 'rubocop'.");
        let cwd = Path::new("/work");

        assert_eq!(runner.run("rubocop -v", cwd).await.unwrap().stdout, "1.57.2");
        assert_eq!(
            runner.run("bundle show rubocop", cwd).await.unwrap_err().stderr(),
            "Could not find gem 'rubocop'."
        );
        assert!(matches!(
            runner.run("bundle list --name-only", cwd).await,
            Err(ExecError::Spawn { .. })
        ));
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn test_workspace_files() {
        let workspace = TestWorkspace::new().unwrap();
        let path = workspace.write("lib/hello.rb", "puts \"Hello\"\n").unwrap();

        let document = workspace.document(&path).unwrap();
        assert_eq!(document.language_id, "ruby");
        assert!(document.key().ends_with("/lib/hello.rb"));
    }
}
