#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColonyError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("no saved state at {0}")]
    StateNotFound(PathBuf),

    #[error("state file {path} was written by format version {found}, expected {expected}")]
    StateVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("invalid scenario: {0}")]
    Scenario(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
