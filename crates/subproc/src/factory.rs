use subproc_core::{SpawnerConfig, SpawnerFactory};

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformSpawnerFactory;

impl SpawnerFactory for PlatformSpawnerFactory {
    #[cfg(unix)]
    type Spawner = subproc_unix::UnixProcessSpawner;

    fn create_spawner(config: SpawnerConfig) -> Self::Spawner {
        #[cfg(unix)]
        return subproc_unix::UnixProcessSpawnerFactory::create_spawner(config);
    }

    fn platform_name() -> &'static str {
        #[cfg(unix)]
        return subproc_unix::UnixProcessSpawnerFactory::platform_name();
    }
}
