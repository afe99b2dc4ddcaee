use crate::error::{Result, SpawnError};
use crate::process::Redirection;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Backoff settings for `spawn_with_retry`.
///
/// Plain spawns never retry; these settings only apply when the caller opts in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Minimum delay between retry attempts (in milliseconds)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Maximum delay between retry attempts (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Maximum number of attempts, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Whether to use exponential backoff (true) or fixed delay (false)
    #[serde(default = "default_use_exponential_backoff")]
    pub use_exponential_backoff: bool,

    /// Randomize delays so that competing spawners do not retry in lockstep
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            use_exponential_backoff: default_use_exponential_backoff(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Many quick attempts, for hosts that briefly hit the process limit
    pub fn aggressive() -> Self {
        Self {
            min_delay_ms: 10,
            max_delay_ms: 1_000,
            max_attempts: 8,
            use_exponential_backoff: true,
            jitter: true,
        }
    }

    /// Two spaced attempts with a fixed delay
    pub fn conservative() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 2_000,
            max_attempts: 2,
            use_exponential_backoff: false,
            jitter: false,
        }
    }

    /// A single attempt (fail fast)
    pub fn no_retry() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            max_attempts: 1,
            use_exponential_backoff: false,
            jitter: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(SpawnError::Configuration(
                "min_delay_ms cannot be greater than max_delay_ms".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(SpawnError::Configuration(
                "max_attempts must allow at least one attempt".to_string(),
            ));
        }

        if self.max_attempts > 10 {
            return Err(SpawnError::Configuration(
                "max_attempts should not exceed 10 to avoid excessive retries".to_string(),
            ));
        }

        if self.max_delay_ms > 60_000 {
            return Err(SpawnError::Configuration(
                "max_delay_ms should not exceed 60 seconds".to_string(),
            ));
        }

        Ok(())
    }

    pub fn min_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.max_delay_ms)
    }

    /// More than one attempt is allowed
    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// Settings of a spawner instance
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpawnerConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    /// SIGKILL and reap children that are still unreaped when the spawner is
    /// dropped. When false they are only reported.
    #[serde(default)]
    pub kill_unreaped_on_drop: bool,
}

/// What to run and which standard streams to connect back to the caller
#[derive(Default, Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(rename_all = "camelCase")]
pub struct SpawnConfig {
    /// Executable; looked up on `PATH` when it contains no `/`
    pub program: String,
    /// Arguments after the program name
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub args: Vec<String>,
    /// Keep a writable pipe end wired to the child's stdin
    #[builder(default)]
    #[serde(default)]
    pub redirect_input: bool,
    /// Keep a readable pipe end wired to the child's stdout
    #[builder(default)]
    #[serde(default)]
    pub redirect_output: bool,
}

impl SpawnConfig {
    pub fn builder() -> SpawnConfigBuilder {
        SpawnConfigBuilder::default()
    }

    /// Build from an argument vector whose first element is the program
    pub fn from_argv<S: AsRef<str>>(
        argv: &[S],
        redirect_input: bool,
        redirect_output: bool,
    ) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SpawnError::InvalidCommand("argument vector is empty".to_string()))?;

        Ok(Self {
            program: program.as_ref().to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            redirect_input,
            redirect_output,
        })
    }

    /// Full argument vector, program first
    pub fn argv(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    pub fn redirection(&self) -> Redirection {
        Redirection::new(self.redirect_input, self.redirect_output)
    }

    /// Command line for diagnostics
    pub fn display_command(&self) -> String {
        self.argv().collect::<Vec<_>>().join(" ")
    }

    /// Reject commands that can never be handed to the OS
    pub fn validate(&self) -> Result<()> {
        if self.program.is_empty() {
            return Err(SpawnError::InvalidCommand(
                "program cannot be empty".to_string(),
            ));
        }

        if let Some(bad) = self.argv().find(|a| a.contains('\0')) {
            return Err(SpawnError::InvalidCommand(format!(
                "argument {bad:?} contains a NUL byte"
            )));
        }

        Ok(())
    }
}

impl SpawnConfigBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn arg<S: ToString>(&mut self, arg: S) -> &mut Self {
        self.args.get_or_insert_with(Vec::new).push(arg.to_string());
        self
    }
}

// Default value functions for serde
fn default_min_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    2_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_use_exponential_backoff() -> bool {
    true
}
fn default_jitter() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_config() {
        let config = RetryConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.retries_enabled());
    }

    #[test]
    fn test_retry_presets() {
        let config = RetryConfig::aggressive();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 8);

        let config = RetryConfig::conservative();
        assert!(config.validate().is_ok());
        assert!(!config.use_exponential_backoff);

        let config = RetryConfig::no_retry();
        assert!(config.validate().is_ok());
        assert!(!config.retries_enabled());
    }

    #[test]
    fn test_invalid_retry_config() {
        let mut config = RetryConfig {
            min_delay_ms: 1000,
            max_delay_ms: 500,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.max_delay_ms = 1000;
        config.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(SpawnError::Configuration(_))
        ));
    }

    #[test]
    fn test_spawner_config_from_partial_json() {
        let config: SpawnerConfig =
            serde_json::from_str(r#"{"retry": {"maxAttempts": 5}}"#).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.min_delay_ms, default_min_delay_ms());
        assert!(!config.kill_unreaped_on_drop);
    }

    #[test]
    fn test_spawn_config_builder() {
        let config = SpawnConfig::builder()
            .program("sort")
            .args(["-r", "-u"])
            .redirect_input(true)
            .build()
            .unwrap();

        assert_eq!(config.program, "sort");
        assert_eq!(config.args, vec!["-r", "-u"]);
        assert_eq!(config.redirection(), Redirection::new(true, false));
        assert_eq!(config.display_command(), "sort -r -u");
    }

    #[test]
    fn test_spawn_config_builder_requires_program() {
        assert!(SpawnConfig::builder().redirect_output(true).build().is_err());
    }

    #[test]
    fn test_from_argv() {
        let config = SpawnConfig::from_argv(&["/usr/bin/sort", "-n"], true, true).unwrap();
        assert_eq!(config.program, "/usr/bin/sort");
        assert_eq!(config.argv().collect::<Vec<_>>(), vec!["/usr/bin/sort", "-n"]);
        assert_eq!(config.redirection(), Redirection::BOTH);

        let empty: [&str; 0] = [];
        assert!(matches!(
            SpawnConfig::from_argv(&empty, false, false),
            Err(SpawnError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unrepresentable_commands() {
        let config = SpawnConfig::default();
        assert!(matches!(
            config.validate(),
            Err(SpawnError::InvalidCommand(_))
        ));

        let config = SpawnConfig::from_argv(&["cat", "bad\0arg"], false, false).unwrap();
        assert!(matches!(
            config.validate(),
            Err(SpawnError::InvalidCommand(msg)) if msg.contains("NUL")
        ));
    }

    #[test]
    fn test_spawn_config_serialization() {
        let config = SpawnConfig::from_argv(&["sort"], true, false).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"redirectInput\":true"));

        let parsed: SpawnConfig = serde_json::from_str(r#"{"program": "cat"}"#).unwrap();
        assert_eq!(parsed.redirection(), Redirection::NONE);
        assert!(parsed.args.is_empty());
    }
}
