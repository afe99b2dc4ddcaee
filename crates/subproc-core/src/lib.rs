//! subproc core - platform-independent types for spawning piped children
//!
//! This crate provides the configuration, error and exit-status types plus
//! the spawner traits that platform crates implement.

pub mod config;
pub mod error;
pub mod process;

pub use config::*;
pub use error::*;
pub use process::*;
