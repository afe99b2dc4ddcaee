use crate::config::{SpawnConfig, SpawnerConfig};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating-system identifier of a spawned child. Always greater than zero.
pub type ProcessId = u32;

/// Exit code a child uses when it could not replace its image with the
/// requested command.
pub const EXEC_FAILURE_EXIT_CODE: i32 = 127;

/// Standard stream of the child that a pipe is wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdStream {
    Stdin,
    Stdout,
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StdStream::Stdin => f.write_str("stdin"),
            StdStream::Stdout => f.write_str("stdout"),
        }
    }
}

/// Which standard streams of the child are connected back to the parent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Redirection {
    /// Parent writes, child reads on stdin
    pub input: bool,
    /// Child writes on stdout, parent reads
    pub output: bool,
}

impl Redirection {
    pub const NONE: Redirection = Redirection {
        input: false,
        output: false,
    };
    pub const BOTH: Redirection = Redirection {
        input: true,
        output: true,
    };

    pub fn new(input: bool, output: bool) -> Self {
        Self { input, output }
    }

    /// Number of pipes a spawn with this redirection allocates
    pub fn pipe_count(&self) -> usize {
        usize::from(self.input) + usize::from(self.output)
    }
}

/// How a reaped child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitState {
    /// Child called exit with the given code
    Exited(i32),
    /// Child was terminated by a signal
    Signaled { signal: i32, core_dumped: bool },
}

impl ExitState {
    /// Exited with code zero
    pub fn success(&self) -> bool {
        matches!(self, ExitState::Exited(0))
    }

    /// Exit code, if the child exited normally
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitState::Exited(code) => Some(*code),
            ExitState::Signaled { .. } => None,
        }
    }

    /// Terminating signal number, if the child was signalled
    pub fn signal(&self) -> Option<i32> {
        match self {
            ExitState::Signaled { signal, .. } => Some(*signal),
            ExitState::Exited(_) => None,
        }
    }

    /// Terminated by a signal rather than by exiting
    pub fn is_abnormal(&self) -> bool {
        matches!(self, ExitState::Signaled { .. })
    }

    /// The child most likely never started its command
    pub fn is_exec_failure(&self) -> bool {
        matches!(self, ExitState::Exited(EXEC_FAILURE_EXIT_CODE))
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Exited(code) => write!(f, "exit code {code}"),
            ExitState::Signaled {
                signal,
                core_dumped: true,
            } => write!(f, "signal {signal} (core dumped)"),
            ExitState::Signaled { signal, .. } => write!(f, "signal {signal}"),
        }
    }
}

/// Result of sending a signal to a child
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Signal was delivered
    Success,
    /// Process is not a live child of this spawner (or has already exited)
    ProcessNotFound,
    /// Insufficient privileges to signal the process
    AccessDenied,
    /// Delivery failed for another reason
    Failed(String),
}

/// Identity and redirection of a spawned child
pub trait ProcessHandle: Send {
    /// Process identifier, valid until the child is reaped
    fn pid(&self) -> ProcessId;

    /// Redirection the child was spawned with
    fn redirection(&self) -> Redirection;
}

/// Creates children with optional stdin/stdout pipes back to the caller
pub trait ProcessSpawner: Send + Sync {
    /// The handle type this spawner produces
    type Handle: ProcessHandle;

    /// Spawn `config.program` without waiting for it.
    ///
    /// On success every requested pipe end is owned by the returned handle.
    /// On failure nothing allocated by this call is left open.
    fn spawn(&self, config: &SpawnConfig) -> Result<Self::Handle>;
}

/// Collects the exit status of children created by the same spawner.
///
/// Each child can be reaped exactly once. Reaping a pid twice, or a pid this
/// spawner never created, is rejected with `SpawnError::ReapMisuse`.
pub trait ProcessReaper: Send + Sync {
    /// Block until the child exits and consume its status
    fn wait(&self, pid: ProcessId) -> Result<ExitState>;

    /// Consume the status if the child has already exited, `None` otherwise
    fn try_wait(&self, pid: ProcessId) -> Result<Option<ExitState>>;
}

/// Sends termination signals to children of a spawner
pub trait ProcessTermination: Send + Sync {
    /// Ask the child to exit (SIGTERM on Unix)
    fn terminate(&self, pid: ProcessId) -> TerminationResult;

    /// Kill the child outright (SIGKILL on Unix)
    fn force_kill(&self, pid: ProcessId) -> TerminationResult;
}

/// Creates the spawner implementation for one platform
pub trait SpawnerFactory {
    /// The type of spawner this factory creates
    type Spawner: ProcessSpawner + ProcessReaper + ProcessTermination;

    fn create_spawner(config: SpawnerConfig) -> Self::Spawner;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}

/// Reaping from async code without blocking the runtime
#[async_trait]
pub trait AsyncProcessReaper: Send + Sync {
    /// Wait for the child to exit and consume its status.
    ///
    /// Dropping the returned future does not stop the wait. The status is
    /// still consumed once the child exits and is then lost, so a later
    /// `wait` on the same pid reports `SpawnError::ReapMisuse`.
    async fn wait_async(&self, pid: ProcessId) -> Result<ExitState>;
}
