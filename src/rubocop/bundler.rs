//! Bundler project detection
//!
//! Two probes, each a single `bundle` invocation in the workspace root:
//! whether the workspace is a Bundler project at all, and whether its bundle
//! includes the `rubocop` gem.

use std::path::Path;
use tracing::debug;

use crate::io::{CommandRunner, ExecError};

/// Lists the bundle; fails with "Could not locate Gemfile" outside a project
pub const BUNDLE_LIST_COMMAND: &str = "bundle list --name-only";

/// Locates the rubocop gem in the bundle
pub const BUNDLE_SHOW_COMMAND: &str = "bundle show rubocop";

const MISSING_GEMFILE_PREFIX: &str = "Could not locate Gemfile";
const MISSING_GEM_MESSAGE: &str = "Could not find gem 'rubocop'.";

/// Whether the workspace is a Bundler project
#[derive(Debug)]
pub enum BundleStatus {
    Valid,
    /// No Gemfile; a valid state, not an error
    Missing,
    Errored(ExecError),
}

/// Whether the bundle includes rubocop
#[derive(Debug)]
pub enum RubocopBundleStatus {
    Included,
    Excluded,
    Errored(ExecError),
}

impl RubocopBundleStatus {
    #[cfg(test)]
    pub fn is_included(&self) -> bool {
        matches!(self, RubocopBundleStatus::Included)
    }
}

/// Runs the Bundler probes for one workspace root
pub struct BundlerProbe<'a> {
    runner: &'a dyn CommandRunner,
    cwd: &'a Path,
}

impl<'a> BundlerProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner, cwd: &'a Path) -> Self {
        Self { runner, cwd }
    }

    pub async fn project_status(&self) -> BundleStatus {
        match self.runner.run(BUNDLE_LIST_COMMAND, self.cwd).await {
            Ok(_) => BundleStatus::Valid,
            Err(e) if e.stderr().starts_with(MISSING_GEMFILE_PREFIX) => {
                debug!("No Gemfile in {}", self.cwd.display());
                BundleStatus::Missing
            }
            Err(e) => BundleStatus::Errored(e),
        }
    }

    pub async fn rubocop_status(&self) -> RubocopBundleStatus {
        match self.runner.run(BUNDLE_SHOW_COMMAND, self.cwd).await {
            Ok(_) => RubocopBundleStatus::Included,
            Err(e)
                if e.stderr().starts_with(MISSING_GEMFILE_PREFIX)
                    || e.stderr() == MISSING_GEM_MESSAGE =>
            {
                RubocopBundleStatus::Excluded
            }
            Err(e) => RubocopBundleStatus::Errored(e),
        }
    }
}
