//! I/O layer - Generic abstractions for processes, transports and commands
//!
//! - **Transport**: Pure I/O layer for bidirectional message exchange
//! - **Process**: Language server process lifecycle with stdio integration
//! - **Exec**: One-shot helper commands with captured output
//!
//! Nothing here knows about LSP or RuboCop.

pub mod exec;
pub mod process;
pub mod transport;

pub use exec::{CommandRunner, ExecError, ExecOutput, ShellRunner};
pub use process::{
    ChildProcessManager, ProcessError, ProcessExitEvent, ProcessExitHandler, ProcessManager,
    StderrMonitor, StopMode,
};
pub use transport::{StdioTransport, StreamTransport, Transport};
