//! RuboCop version detection and the minimum-version gate

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Oldest RuboCop with a built-in language server (`--lsp`)
pub const MINIMUM_VERSION: RubocopVersion = RubocopVersion {
    major: 1,
    minor: 53,
    patch: 0,
    pre: None,
};

/// Human-readable requirement, as shown to the user
pub const VERSION_REQUIREMENT: &str = ">= 1.53.0";

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z.-]+))?(?:\+[0-9A-Za-z.-]+)?$")
        .expect("Failed to compile version regex")
});

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RubocopVersionError {
    #[error("Invalid version format: {0:?}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubocopVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Pre-release tag after `-`
    pub pre: Option<String>,
}

impl RubocopVersion {
    /// Parse the trimmed output of `rubocop -v`
    ///
    /// The whole output must be a version; `bundle exec` noise or a banner
    /// makes it unparseable.
    pub fn parse(output: &str) -> Result<Self, RubocopVersionError> {
        let output = output.trim();
        let captures = VERSION_PATTERN
            .captures(output)
            .ok_or_else(|| RubocopVersionError::InvalidFormat(output.to_string()))?;

        let component = |index: usize| -> Result<u64, RubocopVersionError> {
            captures[index]
                .parse::<u64>()
                .map_err(|_| RubocopVersionError::InvalidFormat(output.to_string()))
        };

        Ok(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
            pre: captures.get(4).map(|m| m.as_str().to_string()),
        })
    }

    /// Whether this version satisfies [`VERSION_REQUIREMENT`]
    ///
    /// Pre-releases never satisfy it, even when their core version is newer.
    pub fn is_supported(&self) -> bool {
        self.pre.is_none() && self.core_cmp(&MINIMUM_VERSION) != Ordering::Less
    }

    fn core_cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for RubocopVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

/// Outcome of checking `rubocop -v` output against the requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    Supported(RubocopVersion),
    /// Too old, a pre-release, or not a version at all; carries the raw text
    Unsupported(String),
}

impl VersionCheck {
    pub fn from_output(output: &str) -> Self {
        match RubocopVersion::parse(output) {
            Ok(version) if version.is_supported() => VersionCheck::Supported(version),
            _ => VersionCheck::Unsupported(output.trim().to_string()),
        }
    }
}
