//! Terminal editor host
//!
//! Backs the binary: documents are files loaded into memory, the output
//! channel is echoed to stderr, error messages are printed without offering
//! any action, and workspace edits from the server are applied to the
//! in-memory text (see [`apply_text_edits`]).

use async_trait::async_trait;
use lsp_types::{
    Diagnostic, DocumentChangeOperation, DocumentChanges, OneOf, Position, TextEdit, Uri,
    WorkspaceEdit,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::extension::host::{EditorHost, StatusItem, TextDocument, file_uri, language_id_for};

#[derive(Debug, Default)]
struct State {
    /// Open documents in the order they were opened
    documents: Vec<TextDocument>,
    active: Option<Uri>,
    diagnostics: HashMap<String, Vec<Diagnostic>>,
    status: Option<StatusItem>,
}

/// [`EditorHost`] for a terminal session over one workspace root
pub struct HeadlessHost {
    root: PathBuf,
    state: Mutex<State>,
    /// Number of workspace edits applied so far
    edits: watch::Sender<usize>,
}

impl HeadlessHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(State::default()),
            edits: watch::Sender::new(0),
        }
    }

    /// Load `path` (relative to the root) and make it the active document
    pub fn open_file(&self, path: &Path) -> io::Result<TextDocument> {
        let path = self.root.join(path).canonicalize()?;
        let text = std::fs::read_to_string(&path)?;
        let uri = file_uri(&path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file URI", path.display()),
            )
        })?;

        let document = TextDocument {
            uri: uri.clone(),
            language_id: language_id_for(&path),
            version: 1,
            text,
        };

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let mut state = self.state.lock().unwrap();
        state.documents.retain(|d| d.uri != uri);
        state.documents.push(document.clone());
        state.active = Some(uri);
        Ok(document)
    }

    pub fn document(&self, uri: &Uri) -> Option<TextDocument> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let state = self.state.lock().unwrap();
        state.documents.iter().find(|d| &d.uri == uri).cloned()
    }

    /// Last diagnostics published for `uri`
    pub fn diagnostics(&self, uri: &Uri) -> Option<Vec<Diagnostic>> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let state = self.state.lock().unwrap();
        state.diagnostics.get(uri.as_str()).cloned()
    }

    /// Make an open document the active one; false if `uri` is not open
    pub fn focus(&self, uri: &Uri) -> bool {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let mut state = self.state.lock().unwrap();
        if !state.documents.iter().any(|d| &d.uri == uri) {
            return false;
        }
        state.active = Some(uri.clone());
        true
    }

    pub fn status(&self) -> Option<StatusItem> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().status.clone()
    }

    pub fn edits_applied(&self) -> usize {
        *self.edits.borrow()
    }

    /// Wait until at least `count` workspace edits have been applied
    pub async fn wait_for_edits(&self, count: usize, timeout: Duration) -> bool {
        let mut receiver = self.edits.subscribe();
        matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|applied| *applied >= count)).await,
            Ok(Ok(_))
        )
    }

    /// Write the in-memory text of `uri` back to disk
    pub fn save(&self, uri: &Uri) -> io::Result<()> {
        let document = self.document(uri).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} is not open", uri.as_str()))
        })?;
        let path = url::Url::parse(uri.as_str())
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is not a file URI", uri.as_str()),
                )
            })?;
        std::fs::write(path, document.text)
    }
}

/// Flatten a workspace edit into per-document text edits
///
/// Resource operations (create, rename, delete) are not supported.
fn text_edits_by_document(edit: WorkspaceEdit) -> Option<Vec<(Uri, Vec<TextEdit>)>> {
    let mut by_document = Vec::new();

    if let Some(changes) = edit.changes {
        by_document.extend(changes);
    }

    let document_edits = match edit.document_changes {
        None => Vec::new(),
        Some(DocumentChanges::Edits(edits)) => edits,
        Some(DocumentChanges::Operations(operations)) => {
            let mut edits = Vec::new();
            for operation in operations {
                match operation {
                    DocumentChangeOperation::Edit(edit) => edits.push(edit),
                    DocumentChangeOperation::Op(op) => {
                        warn!("Unsupported resource operation in workspace edit: {:?}", op);
                        return None;
                    }
                }
            }
            edits
        }
    };
    for document_edit in document_edits {
        let edits = document_edit
            .edits
            .into_iter()
            .map(|edit| match edit {
                OneOf::Left(edit) => edit,
                OneOf::Right(annotated) => annotated.text_edit,
            })
            .collect();
        by_document.push((document_edit.text_document.uri, edits));
    }

    Some(by_document)
}

/// Byte offset of an LSP position (UTF-16 columns), clamped to the text
fn offset_at(text: &str, position: Position) -> usize {
    let mut line_start = 0;
    for _ in 0..position.line {
        match text[line_start..].find('\n') {
            Some(newline) => line_start += newline + 1,
            None => return text.len(),
        }
    }

    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |newline| line_start + newline);

    let mut column = 0;
    for (index, ch) in text[line_start..line_end].char_indices() {
        if column >= position.character {
            return line_start + index;
        }
        column += ch.len_utf16() as u32;
    }
    line_end
}

/// Apply non-overlapping text edits computed against `text`
///
/// Edits starting at the same position are inserted in the order given.
pub fn apply_text_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut resolved: Vec<(usize, usize, usize, &str)> = edits
        .iter()
        .enumerate()
        .map(|(index, edit)| {
            let start = offset_at(text, edit.range.start);
            let end = offset_at(text, edit.range.end).max(start);
            (start, index, end, edit.new_text.as_str())
        })
        .collect();
    // Back to front so earlier offsets stay valid
    resolved.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));

    let mut result = text.to_string();
    for (start, _, end, new_text) in resolved {
        result.replace_range(start..end, new_text);
    }
    result
}

#[async_trait]
impl EditorHost for HeadlessHost {
    fn append_line(&self, line: &str) {
        eprintln!("[{}] {}", chrono::Local::now().format("%H:%M:%S%.3f"), line);
    }

    fn show_output(&self) {
        // Already on stderr
    }

    fn set_status(&self, status: Option<StatusItem>) {
        if let Some(item) = &status {
            debug!("Status: {} ({})", item.text, item.tooltip);
        }
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().status = status;
    }

    async fn show_error_message(&self, message: &str, _actions: &[&str]) -> Option<String> {
        eprintln!("error: {message}");
        None
    }

    fn open_settings(&self, section: &str) {
        info!("Settings for `{}` are read from the workspace settings file", section);
    }

    fn workspace_folders(&self) -> Vec<PathBuf> {
        vec![self.root.clone()]
    }

    fn active_document(&self) -> Option<TextDocument> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let state = self.state.lock().unwrap();
        let active = state.active.as_ref()?;
        state.documents.iter().find(|d| &d.uri == active).cloned()
    }

    fn open_documents(&self) -> Vec<TextDocument> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().documents.clone()
    }

    async fn apply_workspace_edit(&self, edit: WorkspaceEdit) -> bool {
        let Some(by_document) = text_edits_by_document(edit) else {
            return false;
        };

        {
            // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
            let mut state = self.state.lock().unwrap();
            if let Some((uri, _)) = by_document
                .iter()
                .find(|(uri, _)| !state.documents.iter().any(|d| &d.uri == uri))
            {
                warn!("Workspace edit for unopened document {}", uri.as_str());
                return false;
            }

            for (uri, edits) in &by_document {
                if let Some(document) = state.documents.iter_mut().find(|d| &d.uri == uri) {
                    document.text = apply_text_edits(&document.text, edits);
                    document.version += 1;
                }
            }
        }

        self.edits.send_modify(|applied| *applied += 1);
        true
    }

    fn publish_diagnostics(&self, uri: &Uri, diagnostics: &[Diagnostic]) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state
            .lock()
            .unwrap()
            .diagnostics
            .insert(uri.as_str().to_string(), diagnostics.to_vec());
    }
}
