use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use subproc_core::{ProcessHandle, ProcessId, Redirection};

/// Raw descriptor value reported for a stream that is not redirected.
/// No open descriptor is ever negative.
pub const NOT_IN_USE: RawFd = -1;

/// A spawned child and the pipe ends the parent kept.
///
/// The handle owns the descriptors, not the process: dropping it closes any
/// end still held, but the child must still be reaped through the spawner.
#[derive(Debug)]
pub struct UnixProcessHandle {
    pid: ProcessId,
    redirection: Redirection,
    supply: Option<OwnedFd>,
    ingest: Option<OwnedFd>,
}

impl UnixProcessHandle {
    pub(crate) fn new(pid: ProcessId, supply: Option<OwnedFd>, ingest: Option<OwnedFd>) -> Self {
        Self {
            pid,
            redirection: Redirection::new(supply.is_some(), ingest.is_some()),
            supply,
            ingest,
        }
    }

    /// Writable end feeding the child's stdin, or `NOT_IN_USE`
    pub fn supply_raw_fd(&self) -> RawFd {
        self.supply.as_ref().map_or(NOT_IN_USE, AsRawFd::as_raw_fd)
    }

    /// Readable end receiving the child's stdout, or `NOT_IN_USE`
    pub fn ingest_raw_fd(&self) -> RawFd {
        self.ingest.as_ref().map_or(NOT_IN_USE, AsRawFd::as_raw_fd)
    }

    pub fn has_supply(&self) -> bool {
        self.supply.is_some()
    }

    pub fn has_ingest(&self) -> bool {
        self.ingest.is_some()
    }

    /// Take ownership of the stdin pipe end. Dropping it signals end of
    /// input to the child.
    pub fn take_supply(&mut self) -> Option<OwnedFd> {
        self.supply.take()
    }

    /// Take ownership of the stdout pipe end
    pub fn take_ingest(&mut self) -> Option<OwnedFd> {
        self.ingest.take()
    }

    /// Close the stdin pipe end now. Returns false if it was not open.
    pub fn close_supply(&mut self) -> bool {
        self.supply.take().is_some()
    }

    pub fn into_parts(self) -> (ProcessId, Option<OwnedFd>, Option<OwnedFd>) {
        (self.pid, self.supply, self.ingest)
    }
}

impl ProcessHandle for UnixProcessHandle {
    fn pid(&self) -> ProcessId {
        self.pid
    }

    fn redirection(&self) -> Redirection {
        self.redirection
    }
}
