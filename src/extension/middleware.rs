//! Stages between the editor and the server
//!
//! Each stage either hands its (possibly rewritten) input to the next step or
//! finishes the request itself.

use lsp_types::{DocumentFormattingParams, PublishDiagnosticsParams, TextEdit};

use crate::config::Settings;
use crate::extension::diagnostics::DiagnosticCache;

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum Flow<T, R> {
    /// Continue with this input
    Next(T),
    /// Stop here with this result
    Done(R),
}

/// Formatting goes to the server only while `autocorrect` is on
pub fn formatting_stage(
    settings: &Settings,
    params: DocumentFormattingParams,
) -> Flow<DocumentFormattingParams, Option<Vec<TextEdit>>> {
    if settings.autocorrect {
        Flow::Next(params)
    } else {
        Flow::Done(None)
    }
}

/// Record pushed diagnostics, then let them through to the editor
pub fn diagnostics_stage(
    cache: &mut DiagnosticCache,
    params: PublishDiagnosticsParams,
) -> Flow<PublishDiagnosticsParams, ()> {
    cache.set(params.uri.as_str(), params.diagnostics.clone());
    Flow::Next(params)
}
