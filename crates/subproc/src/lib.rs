//! subproc - spawn a child process with its stdin and/or stdout piped back
//! to the caller, then reap it.
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::{BufRead, BufReader, Write};
//! use subproc::ProcessHandle;
//!
//! fn main() -> subproc::Result<()> {
//!     let mut child = subproc::spawn(&["sort"], true, true)?;
//!
//!     let mut supply = File::from(child.take_supply().expect("stdin was redirected"));
//!     for word in ["put", "a", "ring", "on", "it"] {
//!         writeln!(supply, "{word}").expect("sort is reading");
//!     }
//!     drop(supply); // end of input
//!
//!     let ingest = File::from(child.take_ingest().expect("stdout was redirected"));
//!     for line in BufReader::new(ingest).lines() {
//!         println!("{}", line.expect("sort is writing"));
//!     }
//!
//!     subproc::wait(child.pid())?;
//!     Ok(())
//! }
//! ```

#[cfg(not(unix))]
compile_error!("subproc requires a Unix platform (fork/exec)");

mod factory;
mod retry;

use std::sync::OnceLock;

pub use factory::PlatformSpawnerFactory;
pub use retry::spawn_with_retry;

// Re-export core functionality
pub use subproc_core::*;

#[cfg(unix)]
pub use nix::sys::signal::Signal;
#[cfg(unix)]
pub use subproc_unix::{NOT_IN_USE, UnixProcessHandle, UnixProcessSpawner};

/// Spawner type for the platform being compiled for
pub type PlatformSpawner = <PlatformSpawnerFactory as SpawnerFactory>::Spawner;

/// Handle type produced by `PlatformSpawner`
pub type PlatformHandle = <PlatformSpawner as ProcessSpawner>::Handle;

static DEFAULT_SPAWNER: OnceLock<PlatformSpawner> = OnceLock::new();

/// Process-wide spawner behind the free functions of this crate.
///
/// Children spawned through it can only be reaped or signalled through it.
pub fn default_spawner() -> &'static PlatformSpawner {
    DEFAULT_SPAWNER.get_or_init(|| {
        tracing::debug!(
            "Creating default {} spawner",
            PlatformSpawnerFactory::platform_name()
        );
        PlatformSpawnerFactory::create_spawner(SpawnerConfig::default())
    })
}

/// Spawn `argv[0]` with the remaining elements as its arguments.
///
/// When `redirect_input` is set the handle holds the write end of a pipe
/// feeding the child's stdin; when `redirect_output` is set it holds the read
/// end of a pipe carrying the child's stdout. Streams that are not redirected
/// are inherited from the caller.
pub fn spawn<S: AsRef<str>>(
    argv: &[S],
    redirect_input: bool,
    redirect_output: bool,
) -> Result<PlatformHandle> {
    let config = SpawnConfig::from_argv(argv, redirect_input, redirect_output)?;
    default_spawner().spawn(&config)
}

/// Block until the child exits and consume its status. Works once per child.
pub fn wait(pid: ProcessId) -> Result<ExitState> {
    default_spawner().wait(pid)
}

/// Consume the child's status if it already exited
pub fn try_wait(pid: ProcessId) -> Result<Option<ExitState>> {
    default_spawner().try_wait(pid)
}

/// `wait` on tokio's blocking pool
pub async fn wait_async(pid: ProcessId) -> Result<ExitState> {
    default_spawner().wait_async(pid).await
}

/// Send SIGTERM to a child of the default spawner
pub fn terminate(pid: ProcessId) -> TerminationResult {
    default_spawner().terminate(pid)
}

/// Send SIGKILL to a child of the default spawner
pub fn force_kill(pid: ProcessId) -> TerminationResult {
    default_spawner().force_kill(pid)
}
