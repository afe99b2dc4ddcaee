use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use subproc_core::{ProcessId, SpawnError};

#[derive(Debug)]
struct ChildRecord {
    command: String,
    /// A waiter currently holds this pid in waitpid
    reaping: bool,
}

/// Children a spawner created and has not reaped yet.
///
/// Every reap goes through `begin_reap`, so a pid is handed to waitpid at most
/// once at a time and never after its status has been consumed.
#[derive(Debug, Default)]
pub(crate) struct ChildRegistry {
    children: Mutex<HashMap<ProcessId, ChildRecord>>,
}

impl ChildRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<ProcessId, ChildRecord>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, pid: ProcessId, command: String) {
        self.lock().insert(
            pid,
            ChildRecord {
                command,
                reaping: false,
            },
        );
    }

    /// Spawned here and not yet reaped
    pub(crate) fn is_live(&self, pid: ProcessId) -> bool {
        self.lock().contains_key(&pid)
    }

    pub(crate) fn pids(&self) -> Vec<ProcessId> {
        let mut pids: Vec<_> = self.lock().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Claim `pid` for a waitpid call, returning its command for diagnostics
    pub(crate) fn begin_reap(&self, pid: ProcessId) -> Result<String, SpawnError> {
        let mut children = self.lock();
        let record = children.get_mut(&pid).ok_or_else(|| SpawnError::ReapMisuse {
            pid,
            reason: "not a live child of this spawner (never spawned or already reaped)"
                .to_string(),
        })?;

        if record.reaping {
            return Err(SpawnError::ReapMisuse {
                pid,
                reason: "another caller is already waiting for it".to_string(),
            });
        }

        record.reaping = true;
        Ok(record.command.clone())
    }

    /// The status was consumed; the pid is no longer ours
    pub(crate) fn finish_reap(&self, pid: ProcessId) {
        self.lock().remove(&pid);
    }

    /// waitpid returned without consuming a status
    pub(crate) fn abort_reap(&self, pid: ProcessId) {
        if let Some(record) = self.lock().get_mut(&pid) {
            record.reaping = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reap_lifecycle() {
        let registry = ChildRegistry::default();
        registry.insert(100, "sort".to_string());
        assert!(registry.is_live(100));

        assert_eq!(registry.begin_reap(100).unwrap(), "sort");
        // Still live while a waiter holds it
        assert!(registry.is_live(100));

        registry.finish_reap(100);
        assert!(!registry.is_live(100));
        assert!(matches!(
            registry.begin_reap(100),
            Err(SpawnError::ReapMisuse { pid: 100, .. })
        ));
    }

    #[test]
    fn test_concurrent_reap_is_rejected() {
        let registry = ChildRegistry::default();
        registry.insert(7, "cat".to_string());

        registry.begin_reap(7).unwrap();
        let second = registry.begin_reap(7).unwrap_err();
        assert!(second.to_string().contains("already waiting"));

        registry.abort_reap(7);
        assert!(registry.begin_reap(7).is_ok());
    }

    #[test]
    fn test_unknown_pid_is_misuse() {
        let registry = ChildRegistry::default();
        assert!(matches!(
            registry.begin_reap(1),
            Err(SpawnError::ReapMisuse { pid: 1, .. })
        ));
    }

    #[test]
    fn test_pids_sorted() {
        let registry = ChildRegistry::default();
        registry.insert(30, "c".to_string());
        registry.insert(10, "a".to_string());
        registry.insert(20, "b".to_string());
        assert_eq!(registry.pids(), vec![10, 20, 30]);
    }
}
