//! User settings in the `rubocop` namespace
//!
//! Settings are never cached: every decision point asks its
//! [`SettingsSource`] for a fresh snapshot, so an edited settings file takes
//! effect on the next start without any invalidation.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
#[cfg(test)]
use std::sync::Mutex;
use tracing::trace;

/// Settings namespace; a change here triggers a restart
pub const SETTINGS_SECTION: &str = "rubocop";

// ============================================================================
// Mode
// ============================================================================

/// When to run the language server
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    /// Always run, preferring `bundle exec` when the bundle includes rubocop
    EnableUnconditionally,
    /// Run unless a Gemfile exists without rubocop in it
    #[default]
    EnableViaGemfileOrMissingGemfile,
    /// Run only when the Gemfile includes rubocop
    EnableViaGemfile,
    /// Always run the global `rubocop`, ignoring Bundler
    OnlyRunGlobally,
    /// Never run
    Disable,
    /// Unrecognised value, treated as disabled
    Invalid(String),
}

impl Mode {
    pub fn as_str(&self) -> &str {
        match self {
            Mode::EnableUnconditionally => "enableUnconditionally",
            Mode::EnableViaGemfileOrMissingGemfile => "enableViaGemfileOrMissingGemfile",
            Mode::EnableViaGemfile => "enableViaGemfile",
            Mode::OnlyRunGlobally => "onlyRunGlobally",
            Mode::Disable => "disable",
            Mode::Invalid(value) => value,
        }
    }
}

impl FromStr for Mode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "enableUnconditionally" => Mode::EnableUnconditionally,
            "enableViaGemfileOrMissingGemfile" => Mode::EnableViaGemfileOrMissingGemfile,
            "enableViaGemfile" => Mode::EnableViaGemfile,
            "onlyRunGlobally" => Mode::OnlyRunGlobally,
            "disable" => Mode::Disable,
            other => Mode::Invalid(other.to_string()),
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Non-string values land in Invalid too, matching an unknown string
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => s.parse().unwrap_or_default(),
            Value::Null => Mode::default(),
            other => Mode::Invalid(other.to_string()),
        })
    }
}

impl Serialize for Mode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Settings snapshot
// ============================================================================

fn default_true() -> bool {
    true
}

/// One read of the `rubocop.*` settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub mode: Mode,

    /// Custom command line; may contain `${cwd}`, `${pathSeparator}` and
    /// `${userHome}`
    #[serde(default)]
    pub command_path: String,

    /// Language ids handled in addition to `ruby` and `gemfile`
    #[serde(default)]
    pub additional_languages: Vec<String>,

    #[serde(default = "default_true")]
    pub safe_autocorrect: bool,

    #[serde(default)]
    pub lint_mode: Option<bool>,

    #[serde(default)]
    pub layout_mode: Option<bool>,

    /// Gates document formatting
    #[serde(default = "default_true")]
    pub autocorrect: bool,

    #[serde(default = "default_true")]
    pub yjit_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            command_path: String::new(),
            additional_languages: Vec::new(),
            safe_autocorrect: true,
            lint_mode: None,
            layout_mode: None,
            autocorrect: true,
            yjit_enabled: true,
        }
    }
}

/// `initializationOptions` sent with `initialize`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationOptions {
    pub safe_autocorrect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lint_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_mode: Option<bool>,
}

impl Settings {
    pub fn initialization_options(&self) -> InitializationOptions {
        InitializationOptions {
            safe_autocorrect: self.safe_autocorrect,
            lint_mode: self.lint_mode,
            layout_mode: self.layout_mode,
        }
    }

    /// Parse a settings document
    ///
    /// Accepts a nested `{"rubocop": {...}}` object, flat `"rubocop.key"`
    /// entries (as in an editor's `settings.json`), or both; flat entries
    /// win. Unrelated keys are ignored.
    pub fn from_json(document: &Value) -> Result<Self, SettingsError> {
        let Some(root) = document.as_object() else {
            return Err(SettingsError::NotAnObject);
        };

        let mut section = match root.get(SETTINGS_SECTION) {
            Some(Value::Object(nested)) => nested.clone(),
            Some(_) => return Err(SettingsError::NotAnObject),
            None => Map::new(),
        };

        let prefix = format!("{SETTINGS_SECTION}.");
        for (key, value) in root {
            if let Some(name) = key.strip_prefix(&prefix) {
                section.insert(name.to_string(), value.clone());
            }
        }

        serde_json::from_value(Value::Object(section)).map_err(SettingsError::Invalid)
    }
}

// ============================================================================
// Settings sources
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file is not valid JSON: {0}")]
    Parse(serde_json::Error),

    #[error("Settings must be a JSON object")]
    NotAnObject,

    #[error("Invalid rubocop settings: {0}")]
    Invalid(serde_json::Error),
}

/// Provides a fresh settings snapshot on every call
pub trait SettingsSource: Send + Sync {
    fn read(&self) -> Result<Settings, SettingsError>;
}

/// Settings read from a JSON file on every call; a missing file means defaults
#[derive(Debug, Clone)]
pub struct JsonSettingsFile {
    path: PathBuf,
}

impl JsonSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for JsonSettingsFile {
    fn read(&self) -> Result<Settings, SettingsError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("No settings file at {}, using defaults", self.path.display());
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let document: Value = serde_json::from_str(&content).map_err(SettingsError::Parse)?;
        Settings::from_json(&document)
    }
}

/// In-memory settings that can be swapped at runtime
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StaticSettings {
    settings: Mutex<Settings>,
}

#[cfg(test)]
impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    /// Replace the snapshot returned by later reads
    pub fn set(&self, settings: Settings) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.settings.lock().unwrap() = settings;
    }
}

#[cfg(test)]
impl SettingsSource for StaticSettings {
    fn read(&self) -> Result<Settings, SettingsError> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        Ok(self.settings.lock().unwrap().clone())
    }
}
