//! The transaction registry.
//!
//! Owns every transaction record in insertion order, binds a
//! [`ProcessSupervisor`] on commit, and applies helper exits as they are
//! reported. Exits travel from the supervision tasks back to the registry over
//! a channel; pending exits are applied at the start of every registry
//! operation, so a transaction reads as finished as soon as its facade sink
//! has seen `finished`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pkd_runtime::{BackendSink, HelperLocator, ProcessSupervisor, DEFAULT_DRAIN_TIMEOUT};
use pkd_schema::{
    EnumLookup, ErrorKind, ExitKind, InfoKind, MessageKind, PackageDescription, PackageFiles,
    PackageId, RepoDetail, RestartKind, Role, StandardLookup, StatusKind, TaskId, TransactionId,
    UpdateDetail,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::lifecycle::validate_transition;
use crate::resolver::{HelperResolver, ScriptTable};
use crate::transaction::{JobIndex, Task, Transaction, TransactionState, TransactionSummary};
use crate::RegistryError;

/// Provides the backend facade sink for a newly committed transaction.
pub trait SinkFactory {
    fn sink_for(&self, tid: &TransactionId, role: Role) -> Arc<dyn BackendSink>;
}

impl<F> SinkFactory for F
where
    F: Fn(&TransactionId, Role) -> Arc<dyn BackendSink>,
{
    fn sink_for(&self, tid: &TransactionId, role: Role) -> Arc<dyn BackendSink> {
        self(tid, role)
    }
}

#[derive(Debug, Clone, Copy)]
struct Completion {
    job: JobIndex,
    exit: ExitKind,
}

/// Forwards everything to the facade sink and reports the exit back to the
/// registry after the facade has seen it.
struct CompletionSink {
    job: JobIndex,
    inner: Arc<dyn BackendSink>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl BackendSink for CompletionSink {
    fn package(&self, info: InfoKind, package_id: &PackageId, summary: &str) {
        self.inner.package(info, package_id, summary);
    }

    fn description(&self, description: &PackageDescription) {
        self.inner.description(description);
    }

    fn files(&self, files: &PackageFiles) {
        self.inner.files(files);
    }

    fn repo_detail(&self, detail: &RepoDetail) {
        self.inner.repo_detail(detail);
    }

    fn update_detail(&self, detail: &UpdateDetail) {
        self.inner.update_detail(detail);
    }

    fn percentage(&self, value: u8) {
        self.inner.percentage(value);
    }

    fn sub_percentage(&self, value: u8) {
        self.inner.sub_percentage(value);
    }

    fn error_code(&self, kind: ErrorKind, message: &str) {
        self.inner.error_code(kind, message);
    }

    fn require_restart(&self, kind: RestartKind, details: &str) {
        self.inner.require_restart(kind, details);
    }

    fn message(&self, kind: MessageKind, text: &str) {
        self.inner.message(kind, text);
    }

    fn transaction_data(&self, data: &str) {
        self.inner.transaction_data(data);
    }

    fn status(&self, status: StatusKind) {
        self.inner.status(status);
    }

    fn allow_cancel(&self, allowed: bool) {
        self.inner.allow_cancel(allowed);
    }

    fn no_percentage_updates(&self) {
        self.inner.no_percentage_updates();
    }

    fn unrecognized(&self, line: &str) {
        self.inner.unrecognized(line);
    }

    fn finished(&self, exit: ExitKind) {
        self.inner.finished(exit);
        if self
            .completions
            .send(Completion { job: self.job, exit })
            .is_err()
        {
            debug!(job = self.job.get(), "registry gone, dropping exit {exit}");
        }
    }
}

pub struct TransactionRegistry {
    transactions: Vec<Transaction>,
    next_job: u32,
    locator: HelperLocator,
    lookup: Arc<dyn EnumLookup>,
    resolver: Box<dyn HelperResolver>,
    sinks: Box<dyn SinkFactory>,
    drain_timeout: Duration,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl TransactionRegistry {
    pub fn new(
        locator: HelperLocator,
        resolver: impl HelperResolver + 'static,
        sinks: impl SinkFactory + 'static,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            transactions: Vec::new(),
            next_job: 1,
            locator,
            lookup: Arc::new(StandardLookup),
            resolver: Box::new(resolver),
            sinks: Box::new(sinks),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            completions_tx,
            completions_rx,
        }
    }

    /// Registry wired from the daemon config: its helper location, script
    /// table, and drain timeout.
    pub fn from_config(config: &DaemonConfig, sinks: impl SinkFactory + 'static) -> Self {
        Self::new(
            config.helper_locator(),
            ScriptTable::from_config(config),
            sinks,
        )
        .with_drain_timeout(config.drain_timeout())
    }

    #[must_use]
    pub fn with_lookup(mut self, lookup: Arc<dyn EnumLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn position_by_task(&self, task: &TaskId) -> Option<usize> {
        self.transactions
            .iter()
            .position(|t| t.task.id == *task)
    }

    fn position_by_job(&self, job: JobIndex) -> Option<usize> {
        self.transactions.iter().position(|t| t.job == job)
    }

    /// Create a new transaction in the `Added` state.
    pub fn add(&mut self, task: Task) -> Result<&Transaction, RegistryError> {
        self.poll_completions();
        if self.position_by_task(&task.id).is_some() {
            return Err(RegistryError::DuplicateTask(task.id));
        }

        let job = self.allocate_job();
        let transaction = Transaction::new(job, task, Utc::now());
        info!(
            job = job.get(),
            tid = %transaction.tid,
            role = %transaction.task.role,
            "transaction added"
        );

        let index = self.transactions.len();
        self.transactions.push(transaction);
        Ok(&self.transactions[index])
    }

    /// Next job index not held by any stored transaction. Zero is never used.
    fn allocate_job(&mut self) -> JobIndex {
        loop {
            let candidate = JobIndex::new(self.next_job);
            self.next_job = self.next_job.checked_add(1).unwrap_or(1);
            if self.position_by_job(candidate).is_none() {
                return candidate;
            }
            debug!(job = candidate.get(), "job index still in use, skipping");
        }
    }

    /// Bind a supervisor and start the helper for `task`.
    ///
    /// A helper that fails to launch moves the transaction straight to
    /// `Finished(Failed)`; that is still reported as `Ok` since the failure
    /// reaches the facade sink. Errors are returned only when nothing changed.
    pub fn commit(&mut self, task: &TaskId) -> Result<(), RegistryError> {
        self.poll_completions();
        let index = self
            .position_by_task(task)
            .ok_or_else(|| RegistryError::UnknownTask(task.clone()))?;

        let txn = &self.transactions[index];
        if txn.state != TransactionState::Added {
            return Err(RegistryError::AlreadyCommitted(task.clone()));
        }
        let command = self.resolver.command_for(&txn.task)?;
        validate_transition(txn.state, TransactionState::Committed)?;

        let sink = CompletionSink {
            job: txn.job,
            inner: self.sinks.sink_for(&txn.tid, txn.task.role),
            completions: self.completions_tx.clone(),
        };
        let mut supervisor =
            ProcessSupervisor::new(self.locator.clone(), Arc::clone(&self.lookup), Arc::new(sink))
                .with_drain_timeout(self.drain_timeout);

        let txn = &mut self.transactions[index];
        txn.state = TransactionState::Committed;
        match supervisor.spawn(&command) {
            Ok(pid) => {
                txn.state = TransactionState::Running;
                txn.supervisor = Some(supervisor);
                info!(job = txn.job.get(), pid, "transaction running");
            }
            Err(e) => {
                txn.state = TransactionState::Finished(ExitKind::Failed);
                warn!(job = txn.job.get(), "transaction failed to start: {e}");
            }
        }
        Ok(())
    }

    /// Drop a transaction that is not active.
    pub fn remove(&mut self, task: &TaskId) -> Result<(), RegistryError> {
        self.poll_completions();
        let index = self
            .position_by_task(task)
            .ok_or_else(|| RegistryError::UnknownTask(task.clone()))?;

        let state = self.transactions[index].state;
        if !matches!(
            state,
            TransactionState::Added | TransactionState::Finished(_)
        ) {
            return Err(RegistryError::StillActive(task.clone()));
        }
        validate_transition(state, TransactionState::Removed)?;

        let txn = self.transactions.remove(index);
        info!(job = txn.job.get(), tid = %txn.tid, "transaction removed");
        Ok(())
    }

    /// Request forced termination of the helper bound to `task`.
    ///
    /// `Ok(false)` means there was nothing to kill.
    pub fn cancel(&mut self, task: &TaskId) -> Result<bool, RegistryError> {
        self.poll_completions();
        let index = self
            .position_by_task(task)
            .ok_or_else(|| RegistryError::UnknownTask(task.clone()))?;
        Ok(self.transactions[index]
            .supervisor
            .as_ref()
            .is_some_and(ProcessSupervisor::kill))
    }

    /// Ask the helper bound to `task` to quit.
    pub fn quit(&mut self, task: &TaskId) -> Result<bool, RegistryError> {
        self.poll_completions();
        let index = self
            .position_by_task(task)
            .ok_or_else(|| RegistryError::UnknownTask(task.clone()))?;
        Ok(self.transactions[index]
            .supervisor
            .as_ref()
            .is_some_and(ProcessSupervisor::quit))
    }

    /// True if a transaction with `role` has not finished yet.
    pub fn role_present(&mut self, role: Role) -> bool {
        self.poll_completions();
        self.transactions
            .iter()
            .any(|t| t.task.role == role && !t.is_finished())
    }

    pub fn lookup_by_job(&mut self, job: JobIndex) -> Option<&Transaction> {
        self.poll_completions();
        self.position_by_job(job).map(|i| &self.transactions[i])
    }

    pub fn lookup_by_task(&mut self, task: &TaskId) -> Option<&Transaction> {
        self.poll_completions();
        self.position_by_task(task).map(|i| &self.transactions[i])
    }

    pub fn snapshot(&mut self) -> Vec<TransactionSummary> {
        self.poll_completions();
        self.transactions.iter().map(Transaction::summary).collect()
    }

    pub fn snapshot_json(&mut self) -> Result<String, RegistryError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Apply every exit reported so far. Returns how many changed a record.
    pub fn poll_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            if self.apply(completion) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next helper exit, apply it, and return its job.
    ///
    /// Pending forever while no transaction is running.
    pub async fn next_finished(&mut self) -> Option<JobIndex> {
        loop {
            let completion = self.completions_rx.recv().await?;
            if self.apply(completion) {
                return Some(completion.job);
            }
        }
    }

    fn apply(&mut self, completion: Completion) -> bool {
        let Some(index) = self.position_by_job(completion.job) else {
            debug!(job = completion.job.get(), "exit for a removed transaction");
            return false;
        };
        let txn = &mut self.transactions[index];
        let finished = TransactionState::Finished(completion.exit);
        if validate_transition(txn.state, finished).is_err() {
            // already terminal, e.g. the spawn failure path set it directly
            return false;
        }
        txn.state = finished;
        txn.supervisor = None;
        if completion.exit.is_success() {
            info!(job = txn.job.get(), tid = %txn.tid, "transaction finished");
        } else {
            warn!(
                job = txn.job.get(),
                tid = %txn.tid,
                "transaction finished: {}",
                completion.exit
            );
        }
        true
    }
}
