//! Error types for the agent.
//!
//! Each concern has its own enum; [`AgentError`] is the top-level error that
//! bootstrap code maps to a process exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve the user profile directory")]
    NoProfileDir,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid server port {0:?}")]
    InvalidPort(String),
}

/// Errors raised by a feature during `initialize` or a single `watch` call.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("{0} is disabled by its rule")]
    Disabled(&'static str),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("required OS resource unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors on the collector link send path.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connection is offline")]
    Offline,

    #[error("collector is not keeping up ({pending} bytes unwritten)")]
    Backpressure { pending: usize },

    #[error("failed to encode user action: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("socket write failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Errors from the persistent outbox.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Single-instance lock errors.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// The pid is `None` when the holder's lock file could not be read.
    #[error(
        "another instance is already running{}",
        .0.map(|pid| format!(" (pid {pid})")).unwrap_or_default()
    )]
    AlreadyRunning(Option<u32>),

    #[error("lock file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error returned from startup and the run loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create {0} timer: interval must be non-zero")]
    Timer(&'static str),

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("scheduler is stopped")]
    Stopped,
}

impl AgentError {
    /// Process exit code for a fatal startup or run failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::Instance(InstanceError::AlreadyRunning(_)) => -1,
            AgentError::Instance(_) => -4,
            AgentError::Config(_) => -2,
            AgentError::Timer(_) | AgentError::Stopped => -3,
            AgentError::Runtime(_) | AgentError::Signal(_) => -4,
        }
    }
}
