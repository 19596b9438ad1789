//! Transaction orchestration for the pkd daemon.
//!
//! This crate ties the helper runtime to the daemon's dispatch layer: the
//! `TransactionRegistry` that owns transaction records and their supervisors,
//! the lifecycle state machine (`validate_transition`), role-to-helper
//! resolution (`HelperResolver`, `ScriptTable`), the TOML daemon
//! configuration, and tracing initialisation.

pub mod config;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod telemetry;
pub mod transaction;

pub use config::{ConfigError, DaemonConfig};
pub use lifecycle::validate_transition;
pub use registry::{SinkFactory, TransactionRegistry};
pub use resolver::{HelperResolver, ScriptTable};
pub use transaction::{JobIndex, Task, Transaction, TransactionState, TransactionSummary};

use pkd_schema::{Role, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
    #[error("task already registered: {0}")]
    DuplicateTask(TaskId),
    #[error("task already committed: {0}")]
    AlreadyCommitted(TaskId),
    #[error("task still active: {0}")]
    StillActive(TaskId),
    #[error("backend has no helper for role '{0}'")]
    NoHelper(Role),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
