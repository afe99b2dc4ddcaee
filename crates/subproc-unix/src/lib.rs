//! Unix implementation of the subproc spawner: fork, close-on-exec pipes,
//! dup2 onto the child's standard streams, execvp, and tracked reaping.

#[cfg(unix)]
mod handle;
#[cfg(unix)]
mod pipe;
#[cfg(unix)]
mod registry;
#[cfg(unix)]
mod spawner;

#[cfg(unix)]
pub use handle::{NOT_IN_USE, UnixProcessHandle};
#[cfg(unix)]
pub use spawner::UnixProcessSpawner;

pub struct UnixProcessSpawnerFactory;

#[cfg(unix)]
impl subproc_core::SpawnerFactory for UnixProcessSpawnerFactory {
    type Spawner = UnixProcessSpawner;

    fn create_spawner(config: subproc_core::SpawnerConfig) -> UnixProcessSpawner {
        UnixProcessSpawner::with_config(config)
    }

    fn platform_name() -> &'static str {
        "unix"
    }
}
