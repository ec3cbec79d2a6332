//! Editor commands
//!
//! The lifecycle commands are handled by the controller itself; the two
//! autocorrect commands are relayed to the server as
//! `workspace/executeCommand` with the active document's `{uri, version}`.

use serde_json::{Value, json};
use std::fmt;

use crate::extension::host::TextDocument;
use crate::lsp::{LspClient, LspError};

/// Commands contributed to the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Stop,
    Restart,
    ShowOutputChannel,
    FormatAutocorrects,
    FormatAutocorrectsAll,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Start,
        Command::Stop,
        Command::Restart,
        Command::ShowOutputChannel,
        Command::FormatAutocorrects,
        Command::FormatAutocorrectsAll,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Command::Start => "rubocop.start",
            Command::Stop => "rubocop.stop",
            Command::Restart => "rubocop.restart",
            Command::ShowOutputChannel => "rubocop.showOutputChannel",
            Command::FormatAutocorrects => "rubocop.formatAutocorrects",
            Command::FormatAutocorrectsAll => "rubocop.formatAutocorrectsAll",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.id() == id)
    }

    /// Server-side command this relays to, for the autocorrect commands
    ///
    /// The server registers the same ids as the editor commands.
    pub fn server_command(self) -> Option<&'static str> {
        match self {
            Command::FormatAutocorrects | Command::FormatAutocorrectsAll => Some(self.id()),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// `[{uri, version}]` for the active document
pub fn autocorrect_arguments(document: &TextDocument) -> Vec<Value> {
    vec![json!({
        "uri": document.uri.as_str(),
        "version": document.version,
    })]
}

/// Ask the server to autocorrect `document`; edits come back through
/// `workspace/applyEdit`
pub async fn relay_autocorrect(
    client: &LspClient,
    server_command: &str,
    document: &TextDocument,
) -> Result<(), LspError> {
    client
        .execute_command(server_command, autocorrect_arguments(document))
        .await?;
    Ok(())
}
