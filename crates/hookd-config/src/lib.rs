//! KDL configuration parsing for the hookd build daemon.
//!
//! This crate handles:
//! - Parsing the daemon configuration file (hookd.kdl)
//! - Defaults for every setting
//! - Startup checks on the configured directories

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{DaemonConfig, PipelineConfig, load_daemon_config, parse_daemon_config};
