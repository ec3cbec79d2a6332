//! Command resolution for the RuboCop language server
//!
//! Turns settings into a [`ProcessDescriptor`]: a custom `commandPath` with
//! its placeholders expanded, `bundle exec rubocop`, or the global `rubocop`.

use std::collections::BTreeMap;
use std::path::{MAIN_SEPARATOR_STR, Path};

use crate::config::{Mode, Settings};

/// Invocation through the project's bundle
pub const BUNDLE_COMMAND: &str = "bundle exec rubocop";

/// Invocation of whatever `rubocop` is on PATH
pub const GLOBAL_COMMAND: &str = "rubocop";

/// Always appended to the command line
pub const LSP_FLAG: &str = "--lsp";

/// Set to `true` in the server environment when YJIT is enabled
pub const YJIT_ENV: &str = "RUBY_YJIT_ENABLE";

// ============================================================================
// Placeholder expansion
// ============================================================================

/// Values for the `${...}` placeholders allowed in `commandPath`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    /// `${cwd}`
    pub cwd: String,
    /// `${pathSeparator}`
    pub path_separator: String,
    /// `${userHome}`; left unexpanded when the home directory is unknown
    pub user_home: Option<String>,
}

impl Placeholders {
    /// Values for a workspace rooted at `cwd` on this machine
    pub fn for_workspace(cwd: &Path) -> Self {
        Self {
            cwd: cwd.to_string_lossy().into_owned(),
            path_separator: MAIN_SEPARATOR_STR.to_string(),
            user_home: dirs::home_dir().map(|home| home.to_string_lossy().into_owned()),
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "cwd" => Some(&self.cwd),
            "pathSeparator" => Some(&self.path_separator),
            "userHome" => self.user_home.as_deref(),
            _ => None,
        }
    }
}

/// Expand placeholders in one left-to-right pass
///
/// Substituted text is never rescanned. Unknown or unterminated placeholders
/// are copied through unchanged.
pub fn expand_placeholders(template: &str, values: &Placeholders) -> String {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(close) = after_open.find('}') else {
            expanded.push_str(&rest[start..]);
            return expanded;
        };

        let name = &after_open[..close];
        match values.lookup(name) {
            Some(value) => expanded.push_str(value),
            None => expanded.push_str(&rest[start..start + 2 + close + 1]),
        }
        rest = &after_open[close + 1..];
    }

    expanded.push_str(rest);
    expanded
}

// ============================================================================
// Command line resolution
// ============================================================================

/// Where the command line came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSource {
    Custom,
    Bundle,
    Global,
}

/// The user's `commandPath`, expanded, if one is configured
pub fn custom_command(settings: &Settings, values: &Placeholders) -> Option<String> {
    if settings.command_path.is_empty() {
        None
    } else {
        Some(expand_placeholders(&settings.command_path, values))
    }
}

/// Whether the bundle should be consulted before falling back to the global
/// command
pub fn consults_bundle(settings: &Settings) -> bool {
    settings.mode != Mode::OnlyRunGlobally
}

/// Pick the command line once the bundle question (if any) is answered
pub fn select_command(
    settings: &Settings,
    values: &Placeholders,
    rubocop_in_bundle: bool,
) -> (CommandSource, String) {
    if let Some(command) = custom_command(settings, values) {
        (CommandSource::Custom, command)
    } else if consults_bundle(settings) && rubocop_in_bundle {
        (CommandSource::Bundle, BUNDLE_COMMAND.to_string())
    } else {
        (CommandSource::Global, GLOBAL_COMMAND.to_string())
    }
}

// ============================================================================
// Process descriptor
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Could not find RuboCop executable")]
    EmptyCommand,

    #[error("Unsupported RuboCop version: {version} (>= 1.53.0 required)")]
    UnsupportedVersion { version: String },
}

/// Executable, arguments and environment overrides for the server process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ProcessDescriptor {
    /// Split a command line on whitespace and append `--lsp`
    pub fn from_command_line(command_line: &str, settings: &Settings) -> Result<Self, ResolveError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let command = parts.next().ok_or(ResolveError::EmptyCommand)?;

        let mut args: Vec<String> = parts.collect();
        args.push(LSP_FLAG.to_string());

        let mut env = BTreeMap::new();
        if settings.yjit_enabled {
            env.insert(YJIT_ENV.to_string(), "true".to_string());
        }

        Ok(Self { command, args, env })
    }

    /// `command args...` as logged and shown to the user
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
