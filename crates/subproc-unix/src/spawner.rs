use crate::handle::UnixProcessHandle;
use crate::pipe::ChildPipes;
use crate::registry::ChildRegistry;
use async_trait::async_trait;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Arc;
use subproc_core::{
    AsyncProcessReaper, EXEC_FAILURE_EXIT_CODE, ExitState, ProcessHandle, ProcessId,
    ProcessReaper, ProcessSpawner, ProcessTermination, Result, SpawnConfig, SpawnError,
    SpawnerConfig, TerminationResult,
};
use tracing::{debug, error, info, warn};

/// Fork/exec spawner with pipe redirection and per-spawner child tracking
pub struct UnixProcessSpawner {
    registry: Arc<ChildRegistry>,
    config: SpawnerConfig,
}

impl Default for UnixProcessSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl UnixProcessSpawner {
    pub fn new() -> Self {
        Self::with_config(SpawnerConfig::default())
    }

    pub fn with_config(config: SpawnerConfig) -> Self {
        debug!("Initializing Unix process spawner: {:?}", config);
        Self {
            registry: Arc::new(ChildRegistry::default()),
            config,
        }
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    /// Spawn from an argument vector whose first element is the program
    pub fn spawn_argv<S: AsRef<str>>(
        &self,
        argv: &[S],
        redirect_input: bool,
        redirect_output: bool,
    ) -> Result<UnixProcessHandle> {
        let config = SpawnConfig::from_argv(argv, redirect_input, redirect_output)?;
        self.spawn(&config)
    }

    /// Children spawned here and not yet reaped
    pub fn live_children(&self) -> Vec<ProcessId> {
        self.registry.pids()
    }

    pub fn is_live(&self, pid: ProcessId) -> bool {
        self.registry.is_live(pid)
    }

    /// Send `signal` to a live child of this spawner.
    ///
    /// Pids this spawner did not create, or has already reaped, are refused
    /// so that a recycled pid is never signalled.
    pub fn signal(&self, pid: ProcessId, signal: Signal) -> TerminationResult {
        if !self.registry.is_live(pid) {
            warn!("Refusing to send {} to untracked process {}", signal, pid);
            return TerminationResult::ProcessNotFound;
        }

        match signal::kill(to_nix_pid(pid), signal) {
            Ok(()) => {
                info!("Sent {} to process {}", signal, pid);
                TerminationResult::Success
            }
            Err(Errno::ESRCH) => {
                info!("Process {} not found (already terminated)", pid);
                TerminationResult::ProcessNotFound
            }
            Err(Errno::EPERM) => {
                warn!("Permission denied to signal process {}", pid);
                TerminationResult::AccessDenied
            }
            Err(e) => {
                warn!("Failed to send {} to process {}: {}", signal, pid, e);
                TerminationResult::Failed(format!("{signal} failed: {e}"))
            }
        }
    }
}

impl ProcessSpawner for UnixProcessSpawner {
    type Handle = UnixProcessHandle;

    fn spawn(&self, config: &SpawnConfig) -> Result<UnixProcessHandle> {
        config.validate()?;
        let command = config.display_command();
        let plan = ExecPlan::new(config)?;
        let redirection = config.redirection();
        let pipes = ChildPipes::open(redirection)?;
        debug!(
            "Opened {} pipe(s) for {}",
            redirection.pipe_count(),
            command
        );

        // SAFETY: the child branch only makes async-signal-safe calls before
        // it execs or exits, and never returns into this function.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => setup_child(&pipes, &plan),
            Ok(ForkResult::Parent { child }) => {
                let handle = setup_parent(pipes, child);
                self.registry.insert(handle.pid(), command.clone());
                info!(
                    "Spawned Unix process: {} (PID: {}) with redirection: {:?}",
                    command,
                    handle.pid(),
                    handle.redirection()
                );
                Ok(handle)
            }
            Err(errno) => {
                warn!("fork failed for {}: {}", command, errno);
                // pipes drop here, closing every end opened above
                Err(SpawnError::ProcessCreation {
                    command,
                    source: errno.into(),
                })
            }
        }
    }
}

impl ProcessReaper for UnixProcessSpawner {
    fn wait(&self, pid: ProcessId) -> Result<ExitState> {
        wait_blocking(&self.registry, pid)
    }

    fn try_wait(&self, pid: ProcessId) -> Result<Option<ExitState>> {
        reap(&self.registry, pid, Some(WaitPidFlag::WNOHANG))
    }
}

#[async_trait]
impl AsyncProcessReaper for UnixProcessSpawner {
    async fn wait_async(&self, pid: ProcessId) -> Result<ExitState> {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || wait_blocking(&registry, pid))
            .await
            .map_err(|e| anyhow::anyhow!("reap task for process {pid} failed: {e}"))?
    }
}

impl ProcessTermination for UnixProcessSpawner {
    fn terminate(&self, pid: ProcessId) -> TerminationResult {
        self.signal(pid, Signal::SIGTERM)
    }

    fn force_kill(&self, pid: ProcessId) -> TerminationResult {
        self.signal(pid, Signal::SIGKILL)
    }
}

impl Drop for UnixProcessSpawner {
    fn drop(&mut self) {
        let unreaped = self.registry.pids();
        if unreaped.is_empty() {
            return;
        }

        if !self.config.kill_unreaped_on_drop {
            warn!(
                "Spawner dropped with {} unreaped children: {:?}",
                unreaped.len(),
                unreaped
            );
            return;
        }

        warn!(
            "Emergency cleanup: killing {} unreaped children during drop",
            unreaped.len()
        );
        for pid in unreaped {
            if let Err(e) = signal::kill(to_nix_pid(pid), Signal::SIGKILL) {
                error!("Failed to send SIGKILL to process {} during drop: {}", pid, e);
            }
            if let Err(e) = wait_blocking(&self.registry, pid) {
                error!("Failed to reap process {} during drop: {}", pid, e);
            }
        }
    }
}

/// Program and argv as C strings, with the NULL-terminated pointer array
/// execvp expects. Built before forking so the child never allocates.
struct ExecPlan {
    program: CString,
    // Owns the strings argv_ptrs points into
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
}

impl ExecPlan {
    fn new(config: &SpawnConfig) -> Result<Self> {
        let to_cstring = |arg: &str| {
            CString::new(arg)
                .map_err(|e| SpawnError::InvalidCommand(format!("argument {arg:?}: {e}")))
        };

        let program = to_cstring(config.program.as_str())?;
        let argv = config.argv().map(to_cstring).collect::<Result<Vec<_>>>()?;
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();

        Ok(Self {
            program,
            _argv: argv,
            argv_ptrs,
        })
    }
}

/// Child side of the split. Wires the pipe ends onto stdin/stdout, closes
/// every other pipe descriptor and replaces the process image. Never returns.
fn setup_child(pipes: &ChildPipes, plan: &ExecPlan) -> ! {
    // Raw libc rather than nix wrappers: no allocation or Result mapping
    // between fork and exec. A failed close leaves nothing to recover; a
    // failed dup2 or exec ends the child with the exec failure code.
    //
    // SAFETY: only async-signal-safe libc calls on descriptors and memory
    // prepared before the fork.
    unsafe {
        // Parent ends first, so a later dup2 cannot be undone by closing one
        for pipe in pipes.iter() {
            libc::close(pipe.parent_raw_fd());
        }

        for pipe in pipes.iter() {
            if libc::dup2(pipe.child_raw_fd(), pipe.target_fd()) < 0 {
                libc::_exit(EXEC_FAILURE_EXIT_CODE);
            }
            libc::close(pipe.child_raw_fd());
        }

        // Undo what the Rust runtime set up for the parent
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        let mut unblocked: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut unblocked);
        libc::pthread_sigmask(libc::SIG_SETMASK, &unblocked, std::ptr::null_mut());

        libc::execvp(plan.program.as_ptr(), plan.argv_ptrs.as_ptr());
        libc::_exit(EXEC_FAILURE_EXIT_CODE)
    }
}

/// Parent side of the split. Closes the child's ends and keeps the rest.
fn setup_parent(pipes: ChildPipes, child: Pid) -> UnixProcessHandle {
    let ChildPipes { stdin, stdout } = pipes;
    UnixProcessHandle::new(
        child.as_raw() as ProcessId,
        stdin.map(|pipe| pipe.into_parent_end()),
        stdout.map(|pipe| pipe.into_parent_end()),
    )
}

fn to_nix_pid(pid: ProcessId) -> Pid {
    Pid::from_raw(pid as i32)
}

fn wait_blocking(registry: &ChildRegistry, pid: ProcessId) -> Result<ExitState> {
    reap(registry, pid, None)?.ok_or_else(|| {
        SpawnError::Other(anyhow::anyhow!(
            "blocking wait for process {pid} returned no status"
        ))
    })
}

/// waitpid on a tracked child. `None` means the child is still running
/// (only possible with WNOHANG).
fn reap(
    registry: &ChildRegistry,
    pid: ProcessId,
    flags: Option<WaitPidFlag>,
) -> Result<Option<ExitState>> {
    let command = registry.begin_reap(pid).inspect_err(|e| warn!("{}", e))?;
    let blocking = flags.is_none();

    let state = loop {
        match waitpid(to_nix_pid(pid), flags) {
            Ok(WaitStatus::Exited(_, code)) => break ExitState::Exited(code),
            Ok(WaitStatus::Signaled(_, signal, core_dumped)) => {
                break ExitState::Signaled {
                    signal: signal as i32,
                    core_dumped,
                };
            }
            Ok(WaitStatus::StillAlive) => {
                registry.abort_reap(pid);
                return Ok(None);
            }
            // Stop/continue notifications are not exits
            Ok(other) => {
                debug!("Ignoring status {:?} of process {}", other, pid);
                if !blocking {
                    registry.abort_reap(pid);
                    return Ok(None);
                }
            }
            Err(Errno::EINTR) => {}
            Err(Errno::ECHILD) => {
                registry.finish_reap(pid);
                warn!("Process {} ({}) was reaped outside this spawner", pid, command);
                return Err(SpawnError::ReapMisuse {
                    pid,
                    reason: "no such child; its status was consumed elsewhere".to_string(),
                });
            }
            Err(errno) => {
                registry.abort_reap(pid);
                return Err(SpawnError::Wait {
                    pid,
                    source: errno.into(),
                });
            }
        }
    };

    registry.finish_reap(pid);
    debug!("Reaped process {} ({}): {}", pid, command, state);
    Ok(Some(state))
}
