//! The editor surface the controller drives
//!
//! [`EditorHost`] is everything the controller needs from an editor: an
//! output channel, a status bar item, error messages with action buttons,
//! the settings UI, the open documents, and a way to apply edits. The
//! headless binary and the tests each provide their own host.

use async_trait::async_trait;
use lsp_types::{Diagnostic, Uri, WorkspaceEdit};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix of every line the client itself writes to the output channel
pub const CLIENT_LOG_PREFIX: &str = "[client]";

// ============================================================================
// Documents
// ============================================================================

/// An open text document as the editor sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    pub uri: Uri,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

impl TextDocument {
    /// Cache and lookup key for this document
    pub fn key(&self) -> &str {
        self.uri.as_str()
    }

    pub fn is_file(&self) -> bool {
        self.uri.as_str().starts_with("file:")
    }

    /// Last path segment of the URI
    pub fn file_name(&self) -> &str {
        self.uri.as_str().rsplit('/').next().unwrap_or_default()
    }
}

/// `file://` URI for an absolute path
pub fn file_uri(path: &Path) -> Option<Uri> {
    let url = url::Url::from_file_path(path).ok()?;
    Uri::from_str(url.as_str()).ok()
}

/// Guess the editor language id from a file path
pub fn language_id_for(path: &Path) -> String {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    match file_name {
        "Gemfile" => return "gemfile".to_string(),
        "Rakefile" | "Guardfile" | "Capfile" | "Vagrantfile" => return "ruby".to_string(),
        _ => {}
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("rb" | "rake" | "gemspec" | "ru" | "jbuilder") => "ruby".to_string(),
        Some("erb") => "erb".to_string(),
        Some(other) => other.to_string(),
        None => "plaintext".to_string(),
    }
}

// ============================================================================
// Status bar
// ============================================================================

/// Command run when the status item is clicked
pub const STATUS_CLICK_COMMAND: &str = "workbench.action.problems.focus";

/// Contents of the right-aligned status bar item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusItem {
    pub text: String,
    pub tooltip: String,
    /// Theme color id of the background, if highlighted
    pub background: Option<&'static str>,
    pub command: &'static str,
}

// ============================================================================
// Actions offered with error messages
// ============================================================================

/// Buttons offered with an error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Restart,
    ShowOutput,
    ViewSettings,
}

impl UserAction {
    pub fn label(self) -> &'static str {
        match self {
            UserAction::Restart => "Restart",
            UserAction::ShowOutput => "Show Output",
            UserAction::ViewSettings => "View Settings",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Restart" => Some(UserAction::Restart),
            "Show Output" => Some(UserAction::ShowOutput),
            "View Settings" => Some(UserAction::ViewSettings),
            _ => None,
        }
    }
}

// ============================================================================
// Editor host
// ============================================================================

#[async_trait]
pub trait EditorHost: Send + Sync {
    /// Append a line to the output channel
    fn append_line(&self, line: &str);

    /// Reveal the output channel
    fn show_output(&self);

    /// Show or update the status item; `None` hides it
    fn set_status(&self, status: Option<StatusItem>);

    /// Show an error with action buttons; returns the chosen label, if any
    async fn show_error_message(&self, message: &str, actions: &[&str]) -> Option<String>;

    /// Open the settings UI filtered to `section`
    fn open_settings(&self, section: &str);

    fn workspace_folders(&self) -> Vec<PathBuf>;

    /// Document in the focused editor
    fn active_document(&self) -> Option<TextDocument>;

    fn open_documents(&self) -> Vec<TextDocument>;

    async fn apply_workspace_edit(&self, edit: WorkspaceEdit) -> bool;

    /// Hand diagnostics to the editor's problem list
    fn publish_diagnostics(&self, uri: &Uri, diagnostics: &[Diagnostic]);
}

/// Write a `[client]` line to the output channel and the log
pub fn log_client(host: &dyn EditorHost, message: &str) {
    tracing::info!("{}", message);
    host.append_line(&format!("{CLIENT_LOG_PREFIX} {message}"));
}
