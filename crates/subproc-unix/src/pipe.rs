//! Close-on-exec pipes, split into the end the parent keeps and the end the
//! child inherits as one of its standard streams.

use nix::errno::Errno;
use nix::libc;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use subproc_core::{Redirection, SpawnError, StdStream};

/// Lowest descriptor that is not one of the standard slots
const FIRST_NON_STD_FD: RawFd = 3;

/// One pipe between the parent and a standard stream of the child
#[derive(Debug)]
pub(crate) struct ChildPipe {
    stream: StdStream,
    parent_end: OwnedFd,
    child_end: OwnedFd,
}

impl ChildPipe {
    pub(crate) fn open(stream: StdStream) -> Result<Self, SpawnError> {
        let pipe_error = |errno: Errno| SpawnError::PipeCreation {
            stream,
            source: errno.into(),
        };

        let (read_end, write_end) = cloexec_pipe().map_err(pipe_error)?;
        let (parent_end, child_end) = match stream {
            StdStream::Stdin => (write_end, read_end),
            StdStream::Stdout => (read_end, write_end),
        };
        // dup2 onto a standard slot must never clobber another pipe end
        let child_end = lift_above_std_slots(child_end).map_err(pipe_error)?;

        Ok(Self {
            stream,
            parent_end,
            child_end,
        })
    }

    /// Standard slot the child end is duplicated into
    pub(crate) fn target_fd(&self) -> RawFd {
        match self.stream {
            StdStream::Stdin => libc::STDIN_FILENO,
            StdStream::Stdout => libc::STDOUT_FILENO,
        }
    }

    pub(crate) fn parent_raw_fd(&self) -> RawFd {
        self.parent_end.as_raw_fd()
    }

    pub(crate) fn child_raw_fd(&self) -> RawFd {
        self.child_end.as_raw_fd()
    }

    /// Keep the parent's end; the child's end is closed here
    pub(crate) fn into_parent_end(self) -> OwnedFd {
        self.parent_end
    }
}

/// The pipes requested for one spawn
#[derive(Debug, Default)]
pub(crate) struct ChildPipes {
    pub(crate) stdin: Option<ChildPipe>,
    pub(crate) stdout: Option<ChildPipe>,
}

impl ChildPipes {
    /// Opens every requested pipe. If the second one fails the first is
    /// closed before the error is returned.
    pub(crate) fn open(redirection: Redirection) -> Result<Self, SpawnError> {
        let stdin = redirection
            .input
            .then(|| ChildPipe::open(StdStream::Stdin))
            .transpose()?;
        let stdout = redirection
            .output
            .then(|| ChildPipe::open(StdStream::Stdout))
            .transpose()?;

        Ok(Self { stdin, stdout })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ChildPipe> {
        self.stdin.iter().chain(self.stdout.iter())
    }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

// No pipe2: a fork on another thread can still slip in before the flag is set.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
)))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (read_end, write_end) = nix::unistd::pipe()?;
    for fd in [&read_end, &write_end] {
        // SAFETY: fd is an open descriptor owned by this function.
        Errno::result(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;
    }
    Ok((read_end, write_end))
}

/// Move a descriptor that landed in slot 0, 1 or 2 (the parent had closed
/// its own standard streams) to the lowest free slot above them.
fn lift_above_std_slots(fd: OwnedFd) -> nix::Result<OwnedFd> {
    if fd.as_raw_fd() >= FIRST_NON_STD_FD {
        return Ok(fd);
    }

    // SAFETY: fd is open; F_DUPFD_CLOEXEC returns a fresh descriptor we own.
    let lifted = Errno::result(unsafe {
        libc::fcntl(fd.as_raw_fd(), libc::F_DUPFD_CLOEXEC, FIRST_NON_STD_FD)
    })?;
    drop(fd);
    // SAFETY: lifted was just returned by fcntl and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(lifted) })
}
