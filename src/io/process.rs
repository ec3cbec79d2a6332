//! Server process lifecycle
//!
//! Spawns the language server with piped stdio, drains its stderr, watches
//! for exit and stops it on request. The stdio pipes are handed out once as a
//! [`StdioTransport`]; speaking a protocol over them is somebody else's job.
//!
//! Exits are classified by who caused them: [`ProcessManager::stop`] and
//! [`ProcessManager::kill_sync`] mark the process as stopped before
//! signalling it, so only an exit nobody asked for reaches the
//! [`ProcessExitHandler`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::io::transport::{StdioTransport, Transport};

/// How to stop a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// SIGTERM, letting the server finish in-flight work
    Graceful,
    /// SIGKILL
    Force,
}

/// Where a managed process is in its life
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running { pid: u32 },
    /// Stopped on request
    Stopped,
    /// Exited by itself
    Exited { code: Option<i32> },
}

impl ProcessState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.pid().is_some()
    }
}

/// An exit nobody asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExitEvent {
    /// `None` when killed by a signal
    pub code: Option<i32>,
}

#[async_trait]
pub trait ProcessExitHandler: Send + Sync {
    async fn on_process_exit(&self, event: ProcessExitEvent);
}

/// Receives the process's stderr line by line
pub trait StderrMonitor {
    /// Install the stderr handler; must be called before the process starts
    ///
    /// Stderr is drained whether or not a handler is installed.
    fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static;
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Executable not found: {0}")]
    NotFound(String),

    #[error("Process not started")]
    NotStarted,

    #[error("Process already started")]
    AlreadyStarted,

    /// A stdio pipe was not set up by the spawn
    #[error("Process {0} not piped")]
    MissingPipe(&'static str),
}

/// Lifecycle of one external process
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn start(&mut self) -> Result<(), ProcessError>;

    async fn stop(&mut self, mode: StopMode) -> Result<(), ProcessError>;

    fn is_running(&self) -> bool;

    /// Take the stdio transport; available once per start
    fn create_stdio_transport(&mut self) -> Result<StdioTransport, ProcessError>;

    /// Force kill without awaiting, for `Drop`
    fn kill_sync(&mut self);
}

// ============================================================================
// Child process manager
// ============================================================================

type LineHandler = Box<dyn Fn(String) + Send + Sync>;

/// [`ProcessManager`] over a `tokio::process` child
pub struct ChildProcessManager {
    command: String,
    args: Vec<String>,
    /// Applied on top of the inherited environment
    env: BTreeMap<String, String>,
    working_directory: Option<PathBuf>,

    state: Arc<Mutex<ProcessState>>,
    transport: Option<StdioTransport>,

    stderr_handler: Option<LineHandler>,
    exit_handler: Option<Arc<dyn ProcessExitHandler>>,

    stderr_task: Option<JoinHandle<()>>,
    exit_task: Option<JoinHandle<()>>,
}

impl ChildProcessManager {
    pub fn new(command: String, args: Vec<String>, working_directory: Option<PathBuf>) -> Self {
        Self {
            command,
            args,
            env: BTreeMap::new(),
            working_directory,
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            transport: None,
            stderr_handler: None,
            exit_handler: None,
            stderr_task: None,
            exit_task: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Install the handler for unrequested exits
    pub fn on_process_exit(&mut self, handler: Arc<dyn ProcessExitHandler>) {
        self.exit_handler = Some(handler);
    }

    pub fn get_state(&self) -> ProcessState {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().clone()
    }

    /// Move to `next`, returning the pid if the process was running
    fn leave_running(state: &Mutex<ProcessState>, next: ProcessState) -> Option<u32> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let mut state = state.lock().unwrap();
        let pid = state.pid();
        if pid.is_some() {
            *state = next;
        }
        pid
    }

    fn spawn_stderr_reader(&mut self, stderr: ChildStderr) {
        let handler = self.stderr_handler.take();
        self.stderr_task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match &handler {
                        Some(handler) => handler(line.trim_end().to_string()),
                        None => trace!("stderr: {}", line),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read server stderr: {}", e);
                        break;
                    }
                }
            }
            trace!("stderr closed");
        }));
    }

    fn spawn_exit_watcher(&mut self, mut child: Child, pid: u32) {
        let state = Arc::clone(&self.state);
        let exit_handler = self.exit_handler.clone();

        self.exit_task = Some(tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => {
                    info!("Process {} exited: {}", pid, status);
                    status.code()
                }
                Err(e) => {
                    error!("Failed to wait for process {}: {}", pid, e);
                    None
                }
            };

            let unrequested =
                Self::leave_running(&state, ProcessState::Exited { code }).is_some();
            if let (true, Some(handler)) = (unrequested, exit_handler) {
                handler.on_process_exit(ProcessExitEvent { code }).await;
            }
        }));
    }

    /// SIGTERM, then SIGKILL if the process is still alive after `grace`
    ///
    /// Returns once the process has exited.
    pub async fn stop_within(&mut self, grace: Duration) -> Result<(), ProcessError> {
        let pid = self.get_state().pid();
        self.stop(StopMode::Graceful).await?;

        let (Some(pid), Some(mut exit_task)) = (pid, self.exit_task.take()) else {
            return Ok(());
        };
        if tokio::time::timeout(grace, &mut exit_task).await.is_err() {
            warn!("Process {} still running after {:?}, killing it", pid, grace);
            Self::send_signal(pid, StopMode::Force);
            let _ = exit_task.await;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn send_signal(pid: u32, mode: StopMode) {
        let signal = match mode {
            StopMode::Graceful => libc::SIGTERM,
            StopMode::Force => libc::SIGKILL,
        };
        // SAFETY: kill(2) with a pid we spawned and a valid signal number
        if unsafe { libc::kill(pid as libc::pid_t, signal) } == 0 {
            debug!("Sent signal {} to process {}", signal, pid);
        }
    }

    #[cfg(not(unix))]
    fn send_signal(pid: u32, _mode: StopMode) {
        warn!("Cannot signal process {} on this platform", pid);
    }
}

#[async_trait]
impl ProcessManager for ChildProcessManager {
    async fn start(&mut self) -> Result<(), ProcessError> {
        if self.is_running() {
            return Err(ProcessError::AlreadyStarted);
        }

        info!("Spawning {} {}", self.command, self.args.join(" "));
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProcessError::NotFound(self.command.clone()),
            _ => ProcessError::Io(e),
        })?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("spawned process has no pid"))?;

        let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(ProcessError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ProcessError::MissingPipe("stderr"))?;

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Running { pid };
        info!("Process started with PID {}", pid);

        self.transport = Some(StdioTransport::new(stdin, stdout));
        self.spawn_stderr_reader(stderr);
        self.spawn_exit_watcher(child, pid);
        Ok(())
    }

    async fn stop(&mut self, mode: StopMode) -> Result<(), ProcessError> {
        let Some(pid) = Self::leave_running(&self.state, ProcessState::Stopped) else {
            return match self.get_state() {
                ProcessState::Exited { code } => {
                    debug!("Process already exited with code {:?}", code);
                    Ok(())
                }
                _ => Err(ProcessError::NotStarted),
            };
        };
        info!("Stopping process {} ({:?})", pid, mode);

        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
        }
        Self::send_signal(pid, mode);

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.get_state().is_running()
    }

    fn create_stdio_transport(&mut self) -> Result<StdioTransport, ProcessError> {
        self.transport.take().ok_or(ProcessError::NotStarted)
    }

    fn kill_sync(&mut self) {
        if let Some(pid) = Self::leave_running(&self.state, ProcessState::Stopped) {
            warn!("Force killing process {}", pid);
            Self::send_signal(pid, StopMode::Force);
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl StderrMonitor for ChildProcessManager {
    fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Box::new(handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn shell(script: &str) -> ChildProcessManager {
        ChildProcessManager::new(
            "sh".to_string(),
            vec!["-c".to_string(), script.to_string()],
            None,
        )
    }

    struct ChannelExitHandler(mpsc::UnboundedSender<ProcessExitEvent>);

    #[async_trait]
    impl ProcessExitHandler for ChannelExitHandler {
        async fn on_process_exit(&self, event: ProcessExitEvent) {
            let _ = self.0.send(event);
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut manager = shell("sleep 5");
        assert_eq!(manager.get_state(), ProcessState::NotStarted);

        manager.start().await.unwrap();
        assert!(manager.is_running());
        assert!(manager.get_state().pid().is_some());

        manager.stop(StopMode::Graceful).await.unwrap();
        assert_eq!(manager.get_state(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_stderr_lines_reach_handler() {
        let mut manager = shell("echo 'warning: parser/current is loading' >&2; echo >&2; sleep 1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.on_stderr_line(move |line| {
            let _ = tx.send(line);
        });

        manager.start().await.unwrap();
        let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "warning: parser/current is loading");
        manager.stop(StopMode::Force).await.unwrap();
    }

    #[tokio::test]
    async fn test_env_overrides_reach_child() {
        let mut manager = shell("echo \"yjit=$RUBY_YJIT_ENABLE\" >&2; sleep 1")
            .with_env(BTreeMap::from([(
                "RUBY_YJIT_ENABLE".to_string(),
                "true".to_string(),
            )]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.on_stderr_line(move |line| {
            let _ = tx.send(line);
        });

        manager.start().await.unwrap();
        let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "yjit=true");
        manager.stop(StopMode::Force).await.unwrap();
    }

    #[tokio::test]
    async fn test_unrequested_exit_is_reported() {
        let mut manager = shell("exit 3");
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.on_process_exit(Arc::new(ChannelExitHandler(tx)));

        manager.start().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, ProcessExitEvent { code: Some(3) });
        assert_eq!(manager.get_state(), ProcessState::Exited { code: Some(3) });
        assert!(manager.stop(StopMode::Graceful).await.is_ok());
    }

    #[tokio::test]
    async fn test_requested_stop_is_not_reported() {
        let mut manager = shell("sleep 5");
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.on_process_exit(Arc::new(ChannelExitHandler(tx)));

        manager.start().await.unwrap();
        manager.stop(StopMode::Force).await.unwrap();

        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(!matches!(event, Ok(Some(_))));
    }

    #[tokio::test]
    async fn test_stop_within_kills_a_process_ignoring_sigterm() {
        let mut manager = shell("trap '' TERM; echo ready >&2; while true; do sleep 0.1; done");
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.on_stderr_line(move |line| {
            let _ = tx.send(line);
        });
        manager.start().await.unwrap();
        let ready = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(ready.as_deref(), Some("ready"));

        tokio::time::timeout(
            Duration::from_secs(5),
            manager.stop_within(Duration::from_millis(200)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(manager.get_state(), ProcessState::Stopped);
        assert!(manager.exit_task.is_none());
    }

    #[tokio::test]
    async fn test_stop_within_after_process_exited() {
        let mut manager = shell("exit 0");
        manager.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.is_running() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        manager.stop_within(Duration::from_millis(200)).await.unwrap();
        assert_eq!(manager.get_state(), ProcessState::Exited { code: Some(0) });
    }

    #[tokio::test]
    async fn test_lifecycle_misuse() {
        let mut manager = shell("sleep 5");
        assert!(matches!(
            manager.stop(StopMode::Graceful).await,
            Err(ProcessError::NotStarted)
        ));
        assert!(matches!(
            manager.create_stdio_transport(),
            Err(ProcessError::NotStarted)
        ));

        manager.start().await.unwrap();
        assert!(matches!(
            manager.start().await,
            Err(ProcessError::AlreadyStarted)
        ));
        let _transport = manager.create_stdio_transport().unwrap();
        assert!(manager.create_stdio_transport().is_err());

        manager.kill_sync();
        assert!(!manager.is_running());
        // Already stopped
        assert!(manager.stop(StopMode::Graceful).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let mut manager = ChildProcessManager::new(
            "definitely-not-a-real-rubocop-binary".to_string(),
            vec!["--lsp".to_string()],
            None,
        );
        match manager.start().await {
            Err(ProcessError::NotFound(command)) => {
                assert_eq!(command, "definitely-not-a-real-rubocop-binary")
            }
            other => panic!("Expected NotFound, got {other:?}"),
        }
        assert_eq!(manager.get_state(), ProcessState::NotStarted);
    }
}
