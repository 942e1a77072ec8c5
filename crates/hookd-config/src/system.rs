//! Daemon configuration parsing.

use crate::{ConfigError, ConfigResult};
use hookd_core::AllowList;
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_BASE_DIR: &str = "/var/opt/hookd";
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Daemon-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the webhook listener binds to.
    pub listen: SocketAddr,
    /// Number of worker threads.
    pub workers: usize,
    /// Base directory of the daemon.
    pub base_dir: PathBuf,
    /// Parent of every worker workspace.
    pub work_dir: PathBuf,
    /// Where build logs are written.
    pub log_dir: PathBuf,
    /// Maximum queued jobs; 0 means unbounded.
    pub queue_capacity: usize,
    /// How long shutdown waits for each worker.
    pub join_timeout: Duration,
    /// Commands used by the build pipeline.
    pub pipeline: PipelineConfig,
    /// Accepted repositories and accounts.
    pub allow: AllowList,
}

/// External programs invoked by the build pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Git executable.
    pub git: String,
    /// Build command, program first.
    pub build: Vec<String>,
    /// Where build logs are written.
    pub log_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            build: vec![
                "mvn".to_string(),
                "clean".to_string(),
                "package".to_string(),
            ],
            log_dir: PathBuf::from(DEFAULT_BASE_DIR),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let base_dir = PathBuf::from(DEFAULT_BASE_DIR);
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            workers: DEFAULT_WORKERS,
            work_dir: base_dir.clone(),
            log_dir: base_dir.clone(),
            base_dir,
            queue_capacity: 0,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            pipeline: PipelineConfig::default(),
            allow: AllowList::default(),
        }
    }
}

impl DaemonConfig {
    /// Directories that must exist and be readable and writable before startup.
    pub fn directories(&self) -> Vec<&Path> {
        let mut dirs: Vec<&Path> = vec![&self.base_dir, &self.work_dir, &self.log_dir];
        dirs.sort();
        dirs.dedup();
        dirs
    }

    /// Verify every configured directory exists, is a directory, and can be
    /// read and written by this process.
    pub fn check_directories(&self) -> ConfigResult<()> {
        for dir in self.directories() {
            check_directory(dir)?;
        }
        Ok(())
    }
}

fn check_directory(path: &Path) -> ConfigResult<()> {
    let problem = |problem: &str| ConfigError::Directory {
        path: path.to_path_buf(),
        problem: problem.to_string(),
    };

    let metadata = fs::metadata(path).map_err(|_| problem("does not exist"))?;
    if !metadata.is_dir() {
        return Err(problem("is not a directory"));
    }
    fs::read_dir(path).map_err(|_| problem("cannot be read"))?;

    let probe = path.join(format!(".hookd-write-probe-{}", std::process::id()));
    fs::write(&probe, b"").map_err(|_| problem("cannot be written"))?;
    fs::remove_file(&probe)?;

    Ok(())
}

/// Read and parse a daemon configuration file.
pub fn load_daemon_config(path: &Path) -> ConfigResult<DaemonConfig> {
    let content = fs::read_to_string(path)?;
    parse_daemon_config(&content)
}

/// Parse a daemon configuration from KDL text.
///
/// Every setting is optional. `work-dir` and `log-dir` default to `base-dir`.
pub fn parse_daemon_config(kdl: &str) -> ConfigResult<DaemonConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut config = DaemonConfig::default();
    let mut work_dir = None;
    let mut log_dir = None;

    for node in doc.nodes() {
        match node.name().value() {
            "listen" => {
                let addr = require_string(node, "listen")?;
                config.listen = addr.parse().map_err(|e| ConfigError::InvalidValue {
                    field: "listen".to_string(),
                    message: format!("{}: {}", addr, e),
                })?;
            }
            "workers" => {
                config.workers = require_count(node, "workers")?;
                if config.workers == 0 {
                    return Err(ConfigError::InvalidValue {
                        field: "workers".to_string(),
                        message: "at least one worker is required".to_string(),
                    });
                }
            }
            "base-dir" => config.base_dir = PathBuf::from(require_string(node, "base-dir")?),
            "work-dir" => work_dir = Some(PathBuf::from(require_string(node, "work-dir")?)),
            "log-dir" => log_dir = Some(PathBuf::from(require_string(node, "log-dir")?)),
            "queue-capacity" => {
                config.queue_capacity = require_count(node, "queue-capacity")?;
            }
            "join-timeout-ms" => {
                let millis = require_count(node, "join-timeout-ms")?;
                config.join_timeout = Duration::from_millis(millis as u64);
            }
            "git" => config.pipeline.git = require_string(node, "git")?,
            "build" => {
                let build = get_all_string_args(node);
                if build.is_empty() {
                    return Err(ConfigError::MissingField("build command".to_string()));
                }
                config.pipeline.build = build;
            }
            "allow" => config.allow = parse_allow(node),
            _ => {} // Ignore unknown nodes
        }
    }

    config.work_dir = work_dir.unwrap_or_else(|| config.base_dir.clone());
    config.log_dir = log_dir.unwrap_or_else(|| config.base_dir.clone());
    config.pipeline.log_dir = config.log_dir.clone();

    Ok(config)
}

fn parse_allow(node: &KdlNode) -> AllowList {
    let mut allow = AllowList::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "repositories" | "repository" => {
                    allow.repositories.extend(get_all_string_args(child));
                }
                "accounts" | "account" => {
                    allow.accounts.extend(get_all_string_args(child));
                }
                _ => {}
            }
        }
    }

    allow
}

// Helper functions for extracting values from KDL nodes

fn require_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn require_count(node: &KdlNode, field: &str) -> ConfigResult<usize> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;

    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is not a valid count", value),
    })
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}
