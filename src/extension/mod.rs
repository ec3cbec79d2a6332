//! Editor-facing side of the client
//!
//! The [`Controller`] owns the server connection and reacts to editor events
//! through an [`EditorHost`].

pub mod commands;
pub mod controller;
pub mod diagnostics;
pub mod documents;
pub mod host;
pub mod middleware;

pub use commands::Command;
pub use controller::{ConnectionState, Controller, ControllerOptions};
pub use diagnostics::{DiagnosticCache, Status};
pub use host::{EditorHost, StatusItem, TextDocument, UserAction};
