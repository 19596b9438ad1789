use chrono::{DateTime, Utc};
use pkd_runtime::{HelperArgs, ProcessSupervisor};
use pkd_schema::{ExitKind, Role, TaskId, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically assigned transaction number, unique within one daemon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobIndex(u32);

impl JobIndex {
    pub fn new(job: u32) -> Self {
        Self(job)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unit of work a caller hands to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub role: Role,
    #[serde(default)]
    pub arguments: HelperArgs,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            arguments: HelperArgs::new(),
        }
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: HelperArgs) -> Self {
        self.arguments = arguments;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionState {
    Added,
    Committed,
    Running,
    Finished(ExitKind),
    Removed,
}

impl TransactionState {
    pub fn is_finished(self) -> bool {
        matches!(self, TransactionState::Finished(_))
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Added => write!(f, "added"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::Running => write!(f, "running"),
            TransactionState::Finished(exit) => write!(f, "finished({exit})"),
            TransactionState::Removed => write!(f, "removed"),
        }
    }
}

/// One tracked transaction.
///
/// Owns its supervisor from a successful commit until the exit is applied.
#[derive(Debug)]
pub struct Transaction {
    pub(crate) job: JobIndex,
    pub(crate) tid: TransactionId,
    pub(crate) task: Task,
    pub(crate) state: TransactionState,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) supervisor: Option<ProcessSupervisor>,
}

impl Transaction {
    pub(crate) fn new(job: JobIndex, task: Task, created_at: DateTime<Utc>) -> Self {
        Self {
            job,
            tid: TransactionId::generate(job.get(), created_at),
            task,
            state: TransactionState::Added,
            created_at,
            supervisor: None,
        }
    }

    pub fn job(&self) -> JobIndex {
        self.job
    }

    pub fn tid(&self) -> &TransactionId {
        &self.tid
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn role(&self) -> Role {
        self.task.role
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_committed(&self) -> bool {
        self.state != TransactionState::Added
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn exit(&self) -> Option<ExitKind> {
        match self.state {
            TransactionState::Finished(exit) => Some(exit),
            _ => None,
        }
    }

    /// Pid of the bound helper while one is running.
    pub fn pid(&self) -> Option<u32> {
        self.supervisor
            .as_ref()
            .filter(|s| s.is_in_use())
            .and_then(ProcessSupervisor::pid)
    }

    pub fn summary(&self) -> TransactionSummary {
        TransactionSummary {
            job: self.job,
            tid: self.tid.clone(),
            task_id: self.task.id.clone(),
            role: self.task.role,
            state: self.state,
            created_at: self.created_at,
        }
    }
}

/// Read-only view of a transaction for dispatch and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub job: JobIndex,
    pub tid: TransactionId,
    pub task_id: TaskId,
    pub role: Role,
    pub state: TransactionState,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transaction_starts_added() {
        let task = Task::new("task-1", Role::SearchName)
            .with_arguments(HelperArgs::new().arg("none").arg("vim"));
        let txn = Transaction::new(JobIndex::new(4), task, Utc::now());
        assert_eq!(txn.state(), TransactionState::Added);
        assert!(!txn.is_committed());
        assert!(txn.tid().starts_with("/4_"));
        assert_eq!(txn.role(), Role::SearchName);
        assert_eq!(txn.exit(), None);
        assert_eq!(txn.pid(), None);
    }

    #[test]
    fn state_display_and_serde() {
        assert_eq!(
            TransactionState::Finished(ExitKind::Killed).to_string(),
            "finished(kill)"
        );
        let json = serde_json::to_string(&TransactionState::Finished(ExitKind::Quit)).unwrap();
        assert_eq!(json, r#"{"finished":"quit"}"#);
        let json = serde_json::to_string(&TransactionState::Running).unwrap();
        assert_eq!(json, r#""running""#);
    }

    #[test]
    fn summary_reflects_transaction() {
        let txn = Transaction::new(
            JobIndex::new(1),
            Task::new("t", Role::GetUpdates),
            Utc::now(),
        );
        let summary = txn.summary();
        assert_eq!(summary.job, JobIndex::new(1));
        assert_eq!(summary.task_id, "t");
        assert_eq!(summary.state, TransactionState::Added);
        assert_eq!(&summary.tid, txn.tid());
    }
}
