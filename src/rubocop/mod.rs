//! RuboCop-specific launch logic
//!
//! - **bundler**: Bundler project and gem detection
//! - **command**: placeholder expansion and command line resolution
//! - **version**: `rubocop -v` parsing and the minimum-version gate
//! - **session**: one live language server connection and its factory

pub mod bundler;
pub mod command;
pub mod session;
pub mod version;

pub use bundler::{BundleStatus, BundlerProbe, RubocopBundleStatus};
pub use command::{Placeholders, ProcessDescriptor, ResolveError};
pub use session::{
    RubocopSessionFactory, ServerSession, SessionConfig, SessionError, SessionEvent,
    SessionEventKind, SessionFactory, WorkspaceEditHandler,
};
pub use version::{VERSION_REQUIREMENT, VersionCheck};
