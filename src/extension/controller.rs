//! Language server lifecycle controller
//!
//! Owns the single connection to the RuboCop server and keeps the editor in
//! step with it. Every lifecycle operation takes `&mut self`, so starts,
//! stops and restarts are strictly sequential; server events carry the
//! generation of the connection that produced them and are dropped once that
//! connection has been replaced.
//!
//! Launch sequence for [`Controller::start`]:
//! 1. read settings fresh and decide whether the mode allows running
//!    (probing Bundler where the mode needs it)
//! 2. resolve the command line and check `rubocop -v` against the minimum
//!    version
//! 3. create the session, then reset the diagnostic cache, announce open
//!    documents and refresh the status item

use async_trait::async_trait;
use lsp_types::{
    DocumentFormattingParams, FileEvent, FormattingOptions, TextDocumentIdentifier, TextEdit, Uri,
    WorkspaceEdit, WorkspaceFolder,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{Mode, SETTINGS_SECTION, Settings, SettingsSource};
use crate::extension::commands::{self, Command};
use crate::extension::diagnostics::{DiagnosticCache, Status};
use crate::extension::documents::{DocumentSelector, DocumentSync};
use crate::extension::host::{EditorHost, TextDocument, UserAction, file_uri, log_client};
use crate::extension::middleware::{self, Flow};
use crate::io::{CommandRunner, ExecError};
use crate::rubocop::command::{self as resolve, Placeholders, ProcessDescriptor, ResolveError};
use crate::rubocop::session::{
    DEFAULT_INITIALIZATION_TIMEOUT, DEFAULT_SHUTDOWN_TIMEOUT, ServerSession, SessionConfig,
    SessionError, SessionEvent, SessionEventKind, SessionFactory, WorkspaceEditHandler,
};
use crate::rubocop::version::{VERSION_REQUIREMENT, VersionCheck};
use crate::rubocop::{BundleStatus, BundlerProbe, RubocopBundleStatus};

/// File names whose changes are reported to the server (no restart)
pub const WATCHED_FILE_NAMES: [&str; 3] = [".rubocop.yml", ".rubocop_todo.yml", "Gemfile.lock"];

const BUNDLER_HINT: &str = "Failed to invoke Bundler in the current workspace. After resolving the issue, run the command `RuboCop: Start Language Server`";

// ============================================================================
// Connection state
// ============================================================================

/// Observable lifecycle state of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Absent,
    Starting,
    Running,
    Stopping,
}

enum Connection {
    Absent,
    Starting,
    Running(Box<dyn ServerSession>),
    Stopping,
}

impl Connection {
    fn state(&self) -> ConnectionState {
        match self {
            Connection::Absent => ConnectionState::Absent,
            Connection::Starting => ConnectionState::Starting,
            Connection::Running(_) => ConnectionState::Running,
            Connection::Stopping => ConnectionState::Stopping,
        }
    }
}

/// Timeouts applied to every session
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub initialization_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            initialization_timeout: DEFAULT_INITIALIZATION_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Applies server edits straight through the host
struct HostEdits(Arc<dyn EditorHost>);

#[async_trait]
impl WorkspaceEditHandler for HostEdits {
    async fn apply_edit(&self, edit: WorkspaceEdit) -> bool {
        self.0.apply_workspace_edit(edit).await
    }
}

/// Answer of `bundle show rubocop`, remembered for one launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inclusion {
    Included,
    Excluded,
    Errored,
}

#[derive(Debug, Default)]
struct LaunchProbe {
    rubocop_in_bundle: Option<Inclusion>,
}

// ============================================================================
// Controller
// ============================================================================

pub struct Controller {
    host: Arc<dyn EditorHost>,
    settings: Arc<dyn SettingsSource>,
    runner: Arc<dyn CommandRunner>,
    factory: Arc<dyn SessionFactory>,
    options: ControllerOptions,

    connection: Connection,

    /// Generation of the newest session; events from older ones are stale
    generation: u64,

    diagnostics: DiagnosticCache,
    documents: DocumentSync,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,

    /// Set when the user picks Restart; run once the current operation ends
    restart_requested: bool,
}

impl Controller {
    pub fn new(
        host: Arc<dyn EditorHost>,
        settings: Arc<dyn SettingsSource>,
        runner: Arc<dyn CommandRunner>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            host,
            settings,
            runner,
            factory,
            options: ControllerOptions::default(),
            connection: Connection::Absent,
            generation: 0,
            diagnostics: DiagnosticCache::new(),
            documents: DocumentSync::new(),
            events_tx,
            events_rx,
            restart_requested: false,
        }
    }

    #[allow(dead_code)]
    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[allow(dead_code)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[allow(dead_code)]
    pub fn diagnostics(&self) -> &DiagnosticCache {
        &self.diagnostics
    }

    fn session(&self) -> Option<&dyn ServerSession> {
        match &self.connection {
            Connection::Running(session) => Some(session.as_ref()),
            _ => None,
        }
    }

    fn log(&self, message: &str) {
        log_client(self.host.as_ref(), message);
    }

    fn read_settings(&self) -> Settings {
        match self.settings.read() {
            Ok(settings) => settings,
            Err(e) => {
                self.log(&format!("Failed to read settings, using defaults: {e}"));
                Settings::default()
            }
        }
    }

    /// First workspace folder, else the process working directory
    fn cwd(&self) -> PathBuf {
        self.host
            .workspace_folders()
            .into_iter()
            .next()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn workspace_folders(&self) -> Vec<WorkspaceFolder> {
        self.host
            .workspace_folders()
            .iter()
            .filter_map(|path| {
                let uri = file_uri(path)?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string_lossy().into_owned());
                Some(WorkspaceFolder { uri, name })
            })
            .collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Editor activation
    pub async fn activate(&mut self) {
        self.start().await;
    }

    /// Editor deactivation
    pub async fn shutdown(&mut self) {
        self.stop_connection().await;
        self.restart_requested = false;
    }

    pub async fn start(&mut self) {
        self.start_connection().await;
        self.run_requested_restarts().await;
    }

    #[allow(dead_code)]
    pub async fn stop(&mut self) {
        self.stop_connection().await;
        self.run_requested_restarts().await;
    }

    #[allow(dead_code)]
    pub async fn restart(&mut self) {
        self.restart_connection().await;
        self.run_requested_restarts().await;
    }

    async fn run_requested_restarts(&mut self) {
        while std::mem::take(&mut self.restart_requested) {
            self.restart_connection().await;
        }
    }

    async fn restart_connection(&mut self) {
        self.log("Restarting language server...");
        self.stop_connection().await;
        // Emptied even when the next start is refused
        self.diagnostics.reset();
        self.documents.reset();
        self.start_connection().await;
    }

    async fn start_connection(&mut self) {
        if !matches!(self.connection, Connection::Absent) {
            debug!("Start ignored: connection is {:?}", self.state());
            return;
        }
        self.connection = Connection::Starting;

        let settings = self.read_settings();
        let mut probe = LaunchProbe::default();

        let descriptor = if self.should_enable(&settings, &mut probe).await {
            self.build_descriptor(&settings, &mut probe).await
        } else {
            None
        };
        let Some(descriptor) = descriptor else {
            self.connection = Connection::Absent;
            self.refresh_status();
            return;
        };

        self.log(&format!(
            "Starting language server: {}",
            descriptor.command_line()
        ));

        self.generation += 1;
        let config = SessionConfig {
            descriptor,
            working_directory: self.cwd(),
            workspace_folders: self.workspace_folders(),
            initialization_options: settings.initialization_options(),
            generation: self.generation,
            events: self.events_tx.clone(),
            edit_handler: Arc::new(HostEdits(Arc::clone(&self.host))),
            initialization_timeout: self.options.initialization_timeout,
            shutdown_timeout: self.options.shutdown_timeout,
        };

        match self.factory.create_session(config).await {
            Ok(session) => {
                self.connection = Connection::Running(session);
                self.after_start(&settings);
            }
            Err(e) => {
                self.connection = Connection::Absent;
                match &e {
                    SessionError::Initialization(cause) => {
                        self.log(&format!("Language server initialization failed: {cause}"))
                    }
                    other => self.log(&format!("Language server failed to start: {other}")),
                }
                self.refresh_status();
                self.display_error(
                    "Failed to start RuboCop Language Server",
                    &[UserAction::Restart, UserAction::ShowOutput],
                )
                .await;
            }
        }
    }

    fn after_start(&mut self, settings: &Settings) {
        self.diagnostics.reset();
        self.documents.reset();

        let selector = DocumentSelector::from_settings(settings);
        let open_documents = self.host.open_documents();
        if let Connection::Running(session) = &self.connection {
            if let Err(e) =
                self.documents
                    .sync_open_documents(session.client(), &selector, &open_documents)
            {
                warn!("Failed to sync open documents: {}", e);
            }
        }

        self.refresh_status();
    }

    async fn stop_connection(&mut self) {
        let session = match std::mem::replace(&mut self.connection, Connection::Stopping) {
            Connection::Running(session) => session,
            other => {
                self.connection = other;
                return;
            }
        };

        self.log("Stopping language server...");
        debug!("Closing session generation {}", session.generation());
        if let Err(e) = session.close().await {
            warn!("Language server did not stop cleanly: {}", e);
        }

        self.connection = Connection::Absent;
        self.diagnostics.reset();
        self.documents.reset();
        self.refresh_status();
    }

    // ========================================================================
    // Launch gating
    // ========================================================================

    async fn should_enable(&mut self, settings: &Settings, probe: &mut LaunchProbe) -> bool {
        match &settings.mode {
            Mode::EnableUnconditionally | Mode::OnlyRunGlobally => true,
            Mode::Disable => false,
            Mode::EnableViaGemfileOrMissingGemfile => {
                let cwd = self.cwd();
                let status = BundlerProbe::new(self.runner.as_ref(), &cwd)
                    .project_status()
                    .await;
                match status {
                    BundleStatus::Valid => self.enable_if_bundle_includes_rubocop(settings, probe).await,
                    BundleStatus::Missing => {
                        self.log("No Gemfile found in the current workspace");
                        true
                    }
                    BundleStatus::Errored(e) => {
                        self.report_bundler_error(settings, &e).await;
                        false
                    }
                }
            }
            Mode::EnableViaGemfile => self.enable_if_bundle_includes_rubocop(settings, probe).await,
            Mode::Invalid(value) => {
                self.log(&format!("Invalid value for rubocop.mode: {value}"));
                false
            }
        }
    }

    async fn enable_if_bundle_includes_rubocop(
        &mut self,
        settings: &Settings,
        probe: &mut LaunchProbe,
    ) -> bool {
        let inclusion = self.rubocop_in_bundle(settings, probe).await;
        if inclusion == Inclusion::Excluded {
            self.log("Disabling RuboCop extension, because rubocop isn't included in the bundle");
        }
        inclusion == Inclusion::Included
    }

    async fn rubocop_in_bundle(&mut self, settings: &Settings, probe: &mut LaunchProbe) -> Inclusion {
        if let Some(inclusion) = probe.rubocop_in_bundle {
            return inclusion;
        }

        let cwd = self.cwd();
        let status = BundlerProbe::new(self.runner.as_ref(), &cwd)
            .rubocop_status()
            .await;
        let inclusion = match status {
            RubocopBundleStatus::Included => Inclusion::Included,
            RubocopBundleStatus::Excluded => Inclusion::Excluded,
            RubocopBundleStatus::Errored(e) => {
                self.report_bundler_error(settings, &e).await;
                Inclusion::Errored
            }
        };

        probe.rubocop_in_bundle = Some(inclusion);
        inclusion
    }

    async fn report_bundler_error(&mut self, settings: &Settings, error: &ExecError) {
        self.log_exec_error(error);
        self.log(BUNDLER_HINT);
        if settings.mode != Mode::EnableUnconditionally {
            self.display_error(
                "Failed to run Bundler while initializing RuboCop",
                &[UserAction::ShowOutput],
            )
            .await;
        }
    }

    fn log_exec_error(&self, error: &ExecError) {
        for line in error.report_lines() {
            self.log(&line);
        }
    }

    // ========================================================================
    // Command resolution
    // ========================================================================

    /// Resolve the launch command for the current settings without starting
    pub async fn resolve(&mut self) -> Option<ProcessDescriptor> {
        let settings = self.read_settings();
        let mut probe = LaunchProbe::default();
        if !self.should_enable(&settings, &mut probe).await {
            return None;
        }
        self.build_descriptor(&settings, &mut probe).await
    }

    async fn build_descriptor(
        &mut self,
        settings: &Settings,
        probe: &mut LaunchProbe,
    ) -> Option<ProcessDescriptor> {
        let cwd = self.cwd();
        let placeholders = Placeholders::for_workspace(&cwd);

        let needs_bundle = resolve::custom_command(settings, &placeholders).is_none()
            && resolve::consults_bundle(settings);
        let in_bundle =
            needs_bundle && self.rubocop_in_bundle(settings, probe).await == Inclusion::Included;

        let (source, command_line) = resolve::select_command(settings, &placeholders, in_bundle);
        debug!("Resolved {:?} command: {}", source, command_line);

        let descriptor = match ProcessDescriptor::from_command_line(&command_line, settings) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.display_error(
                    &e.to_string(),
                    &[UserAction::ShowOutput, UserAction::ViewSettings],
                )
                .await;
                return None;
            }
        };

        if self.supported_version(&command_line, &cwd).await {
            Some(descriptor)
        } else {
            None
        }
    }

    /// Version gate: unsupported output fails closed, a failed check fails open
    async fn supported_version(&mut self, command_line: &str, cwd: &std::path::Path) -> bool {
        let version_command = format!("{command_line} -v");
        match self.runner.run(&version_command, cwd).await {
            Ok(output) => match VersionCheck::from_output(&output.stdout) {
                VersionCheck::Supported(version) => {
                    debug!("RuboCop {} satisfies {}", version, VERSION_REQUIREMENT);
                    true
                }
                VersionCheck::Unsupported(version) => {
                    self.log("Disabling because the extension does not support this version of the rubocop gem.");
                    self.log(&format!(
                        "  Version reported by `{version_command}`: {version} ({VERSION_REQUIREMENT} required)"
                    ));
                    let message = ResolveError::UnsupportedVersion { version }.to_string();
                    self.display_error(&message, &[UserAction::ShowOutput]).await;
                    false
                }
            },
            Err(e) => {
                self.log_exec_error(&e);
                self.log("Failed to verify the version of rubocop installed, proceeding anyway...");
                true
            }
        }
    }

    // ========================================================================
    // Errors shown to the user
    // ========================================================================

    async fn display_error(&mut self, message: &str, actions: &[UserAction]) {
        warn!("{}", message);
        let labels: Vec<&str> = actions.iter().map(|action| action.label()).collect();

        let Some(choice) = self.host.show_error_message(message, &labels).await else {
            return;
        };

        match UserAction::from_label(&choice) {
            Some(UserAction::Restart) => self.restart_requested = true,
            Some(UserAction::ShowOutput) => self.host.show_output(),
            Some(UserAction::ViewSettings) => self.host.open_settings(SETTINGS_SECTION),
            None => self.log(&format!("Unknown action: {choice}")),
        }
    }

    // ========================================================================
    // Server events
    // ========================================================================

    /// Handle every event already queued; returns how many were handled
    pub async fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await;
            handled += 1;
        }
        self.run_requested_restarts().await;
        handled
    }

    /// Wait for the next server event and handle it
    #[allow(dead_code)]
    pub async fn next_event(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event).await;
        }
        self.run_requested_restarts().await;
    }

    /// Handle events until diagnostics for `uri` arrive or `timeout` passes
    pub async fn wait_for_diagnostics(&mut self, uri: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.diagnostics.contains(uri) {
            if self.session().is_none() {
                return false;
            }
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event).await,
                _ => return false,
            }
        }
        true
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        if event.generation != self.generation {
            debug!(
                "Dropping event from stale connection (generation {}, current {})",
                event.generation, self.generation
            );
            return;
        }

        match event.kind {
            SessionEventKind::Output(line) => self.host.append_line(&line),
            SessionEventKind::Diagnostics(params) => {
                if self.session().is_none() {
                    return;
                }
                if let Flow::Next(params) =
                    middleware::diagnostics_stage(&mut self.diagnostics, params)
                {
                    self.refresh_status();
                    self.host
                        .publish_diagnostics(&params.uri, &params.diagnostics);
                }
            }
            SessionEventKind::Exited { code } => {
                if self.session().is_none() {
                    return;
                }
                let code = code.map_or_else(|| "?".to_string(), |c| c.to_string());
                self.log(&format!(
                    "Language server exited unexpectedly with exit code {code}"
                ));
                self.connection = Connection::Absent;
                self.refresh_status();
                self.display_error(
                    "RuboCop Language Server stopped unexpectedly",
                    &[UserAction::Restart, UserAction::ShowOutput],
                )
                .await;
            }
        }
    }
}

// Editor events, delivered by the host
#[allow(dead_code)]
impl Controller {
    /// Focus moved to another editor (or none)
    pub fn on_active_editor_changed(&mut self) {
        if let (Connection::Running(session), Some(document)) =
            (&self.connection, self.host.active_document())
        {
            let selector = DocumentSelector::from_settings(&self.read_settings());
            if selector.selects(&document) && !self.diagnostics.contains(document.key()) {
                if let Err(e) = self.documents.announce(session.client(), &document) {
                    warn!("Failed to announce {}: {}", document.key(), e);
                }
            }
        }
        self.refresh_status();
    }

    pub fn on_document_opened(&mut self, document: &TextDocument) {
        if let Connection::Running(session) = &self.connection {
            let selector = DocumentSelector::from_settings(&self.read_settings());
            if selector.selects(document) {
                if let Err(e) = self.documents.announce(session.client(), document) {
                    warn!("Failed to announce {}: {}", document.key(), e);
                }
            }
        }
    }

    pub fn on_document_changed(&mut self, document: &TextDocument) {
        if let Connection::Running(session) = &self.connection {
            let selector = DocumentSelector::from_settings(&self.read_settings());
            if selector.selects(document) {
                if let Err(e) = self.documents.change(session.client(), document) {
                    warn!("Failed to sync change of {}: {}", document.key(), e);
                }
            }
        }
    }

    pub fn on_document_closed(&mut self, uri: &Uri) {
        if let Connection::Running(session) = &self.connection {
            if let Err(e) = self.documents.close(session.client(), uri) {
                warn!("Failed to close {}: {}", uri.as_str(), e);
            }
        }
    }

    /// A settings section changed; `rubocop` (or a key under it) restarts
    pub async fn on_configuration_changed(&mut self, section: &str) {
        let affected = section == SETTINGS_SECTION
            || section
                .strip_prefix(SETTINGS_SECTION)
                .is_some_and(|rest| rest.starts_with('.'));
        if affected {
            self.restart().await;
        }
    }

    /// Forward changes of RuboCop and Bundler config files to the server
    pub fn on_watched_files_changed(&mut self, changes: Vec<FileEvent>) {
        let changes: Vec<FileEvent> = changes
            .into_iter()
            .filter(|change| is_watched_file(&change.uri))
            .collect();
        if changes.is_empty() {
            return;
        }

        if let Some(session) = self.session() {
            if let Err(e) = session.client().did_change_watched_files(changes) {
                warn!("Failed to forward watched file changes: {}", e);
            }
        }
    }
}

impl Controller {
    // ========================================================================
    // Formatting and commands
    // ========================================================================

    /// Document formatting provider
    pub async fn format_document(
        &mut self,
        document: &TextDocument,
        options: FormattingOptions,
    ) -> Option<Vec<TextEdit>> {
        let settings = self.read_settings();
        let Connection::Running(session) = &self.connection else {
            return None;
        };
        if !DocumentSelector::from_settings(&settings).selects(document) {
            return None;
        }
        if let Err(e) = self.documents.change(session.client(), document) {
            warn!("Failed to sync {} before formatting: {}", document.key(), e);
        }

        let params = DocumentFormattingParams {
            text_document: TextDocumentIdentifier {
                uri: document.uri.clone(),
            },
            options,
            work_done_progress_params: Default::default(),
        };

        match middleware::formatting_stage(&settings, params) {
            Flow::Done(result) => result,
            Flow::Next(params) => match session.client().formatting(params).await {
                Ok(edits) => edits,
                Err(e) => {
                    self.log(&format!("Formatting failed: {e}"));
                    None
                }
            },
        }
    }

    pub async fn execute(&mut self, command: Command) {
        match command {
            Command::Start => self.start_connection().await,
            Command::Stop => self.stop_connection().await,
            Command::Restart => self.restart_connection().await,
            Command::ShowOutputChannel => self.host.show_output(),
            Command::FormatAutocorrects | Command::FormatAutocorrectsAll => {
                self.autocorrect(command).await
            }
        }
        self.run_requested_restarts().await;
    }

    /// Run a command by id; returns false for ids this controller does not own
    #[allow(dead_code)]
    pub async fn execute_id(&mut self, id: &str) -> bool {
        match Command::from_id(id) {
            Some(command) => {
                self.execute(command).await;
                true
            }
            None => {
                debug!("Unknown command id {}", id);
                false
            }
        }
    }

    async fn autocorrect(&mut self, command: Command) {
        let Some(server_command) = command.server_command() else {
            return;
        };
        let Some(document) = self.host.active_document() else {
            return;
        };
        let selector = DocumentSelector::from_settings(&self.read_settings());
        if !selector.supports_language(&document.language_id) {
            return;
        }
        let Connection::Running(session) = &self.connection else {
            return;
        };
        // The server corrects its own copy of the text
        if selector.selects(&document) {
            if let Err(e) = self.documents.change(session.client(), &document) {
                warn!("Failed to sync {} before {}: {}", document.key(), command, e);
            }
        }

        let result = commands::relay_autocorrect(session.client(), server_command, &document).await;
        if let Err(e) = result {
            self.log(&format!("{command} failed: {e}"));
            self.display_error(
                "Failed to apply RuboCop corrects to the document.",
                &[UserAction::ShowOutput],
            )
            .await;
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Aggregated status for the active document
    pub fn status(&self) -> Status {
        if self.session().is_none() {
            return Status::Hidden;
        }
        let Some(document) = self.host.active_document() else {
            return Status::Hidden;
        };
        let selector = DocumentSelector::from_settings(&self.read_settings());
        if !selector.supports_language(&document.language_id) {
            return Status::Hidden;
        }
        Status::from_diagnostics(self.diagnostics.get(document.key()))
    }

    fn refresh_status(&self) {
        self.host.set_status(self.status().item());
    }
}

/// Whether a changed file is one the server watches
pub fn is_watched_file(uri: &Uri) -> bool {
    let name = uri.as_str().rsplit('/').next().unwrap_or_default();
    WATCHED_FILE_NAMES.contains(&name)
}
