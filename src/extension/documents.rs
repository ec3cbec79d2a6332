//! Document selection and synchronisation with the server
//!
//! The server only hears about documents the selector accepts: `file` URIs in
//! `ruby`, any file named `Gemfile`, and every additional language the user
//! configured. Each document is opened at most once per connection.

use lsp_types::{TextDocumentItem, Uri};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::config::Settings;
use crate::extension::host::TextDocument;
use crate::lsp::{LspClient, LspError};

/// Languages handled without any configuration
pub const BUILTIN_LANGUAGES: [&str; 2] = ["ruby", "gemfile"];

const GEMFILE: &str = "Gemfile";

/// Which documents belong to the RuboCop server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSelector {
    languages: BTreeSet<String>,
}

impl DocumentSelector {
    pub fn from_settings(settings: &Settings) -> Self {
        let languages = BUILTIN_LANGUAGES
            .iter()
            .map(|language| language.to_string())
            .chain(settings.additional_languages.iter().cloned())
            .collect();
        Self { languages }
    }

    /// Language check used for the status item and commands
    pub fn supports_language(&self, language_id: &str) -> bool {
        self.languages.contains(language_id)
    }

    /// Full selector used for synchronisation
    pub fn selects(&self, document: &TextDocument) -> bool {
        document.is_file()
            && (self.supports_language(&document.language_id) || document.file_name() == GEMFILE)
    }
}

/// Tracks which documents (and versions) the current connection has seen
#[derive(Debug, Default)]
pub struct DocumentSync {
    announced: HashMap<String, i32>,
}

impl DocumentSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; called for every new connection
    pub fn reset(&mut self) {
        self.announced.clear();
    }

    #[cfg(test)]
    pub fn is_announced(&self, uri: &str) -> bool {
        self.announced.contains_key(uri)
    }

    /// Send `didOpen` unless this connection already has the document
    ///
    /// Returns whether a notification was sent.
    pub fn announce(&mut self, client: &LspClient, document: &TextDocument) -> Result<bool, LspError> {
        if self.announced.contains_key(document.key()) {
            return Ok(false);
        }

        debug!("Announcing {} to the language server", document.key());
        client.did_open(TextDocumentItem {
            uri: document.uri.clone(),
            language_id: document.language_id.clone(),
            version: document.version,
            text: document.text.clone(),
        })?;
        self.announced
            .insert(document.key().to_string(), document.version);
        Ok(true)
    }

    /// Announce every selected document, in order; returns how many were sent
    pub fn sync_open_documents(
        &mut self,
        client: &LspClient,
        selector: &DocumentSelector,
        documents: &[TextDocument],
    ) -> Result<usize, LspError> {
        let mut sent = 0;
        for document in documents.iter().filter(|d| selector.selects(d)) {
            if self.announce(client, document)? {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Bring the server up to `document`'s version
    ///
    /// A document the server has never seen is opened instead; a version it
    /// already has is not sent again.
    pub fn change(&mut self, client: &LspClient, document: &TextDocument) -> Result<(), LspError> {
        if self.announce(client, document)? {
            return Ok(());
        }
        let Some(known) = self.announced.get_mut(document.key()) else {
            return Ok(());
        };
        if document.version <= *known {
            return Ok(());
        }

        client.did_change(document.uri.clone(), document.version, document.text.clone())?;
        *known = document.version;
        Ok(())
    }

    /// Send `didClose` for an announced document
    pub fn close(&mut self, client: &LspClient, uri: &Uri) -> Result<(), LspError> {
        if self.announced.remove(uri.as_str()).is_some() {
            client.did_close(uri.clone())?;
        }
        Ok(())
    }
}
