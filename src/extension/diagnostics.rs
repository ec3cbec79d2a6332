//! Diagnostic cache and the aggregated status indicator

use lsp_types::{Diagnostic, DiagnosticSeverity};
use std::collections::HashMap;

use crate::extension::host::{STATUS_CLICK_COMMAND, StatusItem};

const ERROR_BACKGROUND: &str = "statusBarItem.errorBackground";
const WARNING_BACKGROUND: &str = "statusBarItem.warningBackground";

// ============================================================================
// Diagnostic cache
// ============================================================================

/// Last diagnostics pushed per document, keyed by URI string
///
/// A missing key means the server has not reported on the document since the
/// last restart, not that it is clean. Keys are only ever removed together by
/// [`DiagnosticCache::reset`].
#[derive(Debug, Default)]
pub struct DiagnosticCache {
    entries: HashMap<String, Vec<Diagnostic>>,
}

impl DiagnosticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, uri: impl Into<String>, diagnostics: Vec<Diagnostic>) {
        self.entries.insert(uri.into(), diagnostics);
    }

    pub fn get(&self, uri: &str) -> Option<&[Diagnostic]> {
        self.entries.get(uri).map(Vec::as_slice)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Aggregated status
// ============================================================================

/// Counts by severity bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    pub errors: usize,
    pub warnings: usize,
    /// Information and hints together
    pub others: usize,
}

impl SeverityCounts {
    /// Diagnostics without a severity are not counted
    pub fn tally(diagnostics: &[Diagnostic]) -> Self {
        let mut counts = Self::default();
        for diagnostic in diagnostics {
            match diagnostic.severity {
                Some(DiagnosticSeverity::ERROR) => counts.errors += 1,
                Some(DiagnosticSeverity::WARNING) => counts.warnings += 1,
                Some(DiagnosticSeverity::INFORMATION) | Some(DiagnosticSeverity::HINT) => {
                    counts.others += 1
                }
                _ => {}
            }
        }
        counts
    }
}

/// What the status item shows for the active document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Hidden,
    /// Running, but nothing reported for this document yet
    Idle,
    Errors(usize),
    Warnings(usize),
    Others(usize),
    Clean,
}

impl Status {
    /// Highest-priority non-empty bucket wins: errors, warnings, then others
    pub fn from_diagnostics(diagnostics: Option<&[Diagnostic]>) -> Self {
        let Some(diagnostics) = diagnostics else {
            return Status::Idle;
        };

        let counts = SeverityCounts::tally(diagnostics);
        if counts.errors > 0 {
            Status::Errors(counts.errors)
        } else if counts.warnings > 0 {
            Status::Warnings(counts.warnings)
        } else if counts.others > 0 {
            Status::Others(counts.others)
        } else {
            Status::Clean
        }
    }

    /// Status bar contents; `None` when hidden
    pub fn item(self) -> Option<StatusItem> {
        let (text, tooltip, background) = match self {
            Status::Hidden => return None,
            Status::Idle => ("RuboCop $(ruby)", "RuboCop".to_string(), None),
            Status::Errors(count) => (
                "RuboCop $(error)",
                format!("RuboCop: {}", plural(count, "error", "errors")),
                Some(ERROR_BACKGROUND),
            ),
            Status::Warnings(count) => (
                "RuboCop $(warning)",
                format!("RuboCop: {}", plural(count, "warning", "warnings")),
                Some(WARNING_BACKGROUND),
            ),
            Status::Others(count) => (
                "RuboCop $(info)",
                format!("RuboCop: {}", plural(count, "hint", "issues")),
                None,
            ),
            Status::Clean => ("RuboCop $(ruby)", "RuboCop: No issues!".to_string(), None),
        };

        Some(StatusItem {
            text: text.to_string(),
            tooltip,
            background,
            command: STATUS_CLICK_COMMAND,
        })
    }
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("1 {one}")
    } else {
        format!("{count} {many}")
    }
}
