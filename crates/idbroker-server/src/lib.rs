//! The idbroker daemon.
//!
//! Loads [`config::AppConfig`], opens the storage backend, registers the
//! statically configured connectors and runs garbage collection and signing
//! key rotation until shutdown.

pub mod config;
pub mod daemon;
pub mod observability;

pub use crate::config::{AppConfig, ConfigError, ConfigSource};
pub use crate::daemon::{Daemon, DaemonError};
