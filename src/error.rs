//! Error types shared across the dispatch core.
//!
//! Per-request failures never surface here: they are turned into error
//! bodies by the result listener. These types cover startup wiring and the
//! few operations that can legitimately be refused at runtime.

use thiserror::Error;

/// Failures of the event ring and its worker groups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// Ring capacity must be a non-zero power of two.
    #[error("ring capacity {0} is not a non-zero power of two")]
    InvalidCapacity(usize),
    /// A worker group was configured without threads.
    #[error("worker group `{0}` has no threads")]
    EmptyWorkerGroup(String),
    /// A pipeline needs at least one worker group to drain the ring.
    #[error("pipeline has no worker groups")]
    NoWorkerGroups,
    /// The pipeline no longer accepts events.
    #[error("pipeline is shut down")]
    ShutDown,
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker `{name}`: {reason}")]
    Spawn { name: String, reason: String },
}

/// Registry construction errors. These are configuration defects and are
/// fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry has no default entry")]
    MissingDefault,
    #[error("command `{0}` registered twice")]
    Duplicate(String),
}

/// Raised when a raw protocol value has no mapping in the status or data-type
/// tables. Always a programming error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("unmapped status code {0}")]
    Status(u16),
    #[error("unmapped data type `{0}`")]
    DataType(String),
    #[error("unsupported protocol method `{0}`")]
    Protocol(String),
}

/// Errors from [`Dispatcher`](crate::dispatcher::Dispatcher) construction and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Errors reported by a [`Datastore`](crate::datastore::Datastore).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatastoreError {
    #[error("datastore is stopped")]
    Stopped,
    #[error("table `{0}` already exists")]
    TableExists(String),
    #[error("table `{0}` does not exist")]
    NoSuchTable(String),
    #[error("unknown column `{column}` in table `{table}`")]
    UnknownColumn { table: String, column: String },
    #[error("column `{column}` in table `{table}` expects {expected}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: &'static str,
    },
    #[error("missing value for column `{column}` in table `{table}`")]
    MissingColumn { table: String, column: String },
    #[error("unique column `{column}` in table `{table}` already holds {value}")]
    UniqueViolation {
        table: String,
        column: String,
        value: String,
    },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
