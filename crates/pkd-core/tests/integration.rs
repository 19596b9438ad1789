use pkd_core::{
    DaemonConfig, JobIndex, RegistryError, ScriptTable, Task, TransactionRegistry,
    TransactionState,
};
use pkd_runtime::mock::{Recorded, RecordingSink};
use pkd_runtime::{BackendSink, HelperArgs, HelperLocator};
use pkd_schema::{ControlEvent, ErrorKind, ExitKind, Role, TaskId, TransactionId};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const BACKEND: &str = "test";

fn write_helper(helpers: &Path, script: &str, body: &str) {
    let dir = helpers.join(BACKEND);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(script);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
}

fn registry(helpers: &Path) -> (TransactionRegistry, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let shared = Arc::clone(&sink);
    let reg = TransactionRegistry::new(
        HelperLocator::new(BACKEND, helpers),
        ScriptTable::new(),
        move |_: &TransactionId, _: Role| -> Arc<dyn BackendSink> { shared.clone() },
    )
    .with_drain_timeout(Duration::from_millis(200));
    (reg, sink)
}

async fn next_finished(reg: &mut TransactionRegistry) -> JobIndex {
    tokio::time::timeout(Duration::from_secs(10), reg.next_finished())
        .await
        .expect("helper did not finish in time")
        .expect("completion channel closed")
}

fn state_of(reg: &mut TransactionRegistry, task: &str) -> TransactionState {
    reg.lookup_by_task(&TaskId::new(task)).unwrap().state()
}

#[tokio::test]
async fn spawn_failure_finishes_failed_and_clears_role() {
    let helpers = tempfile::tempdir().unwrap();
    let (mut reg, sink) = registry(helpers.path());

    reg.add(Task::new("t1", Role::InstallPackage)).unwrap();
    assert!(reg.role_present(Role::InstallPackage));

    reg.commit(&TaskId::new("t1")).unwrap();
    assert_eq!(
        state_of(&mut reg, "t1"),
        TransactionState::Finished(ExitKind::Failed)
    );
    assert!(!reg.role_present(Role::InstallPackage));
    assert_eq!(reg.poll_completions(), 0);

    assert_eq!(sink.exits(), vec![ExitKind::Failed]);
    assert_eq!(
        sink.errors(),
        vec![(
            ErrorKind::InternalError,
            "Spawn of helper 'install-package.py' failed".to_owned()
        )]
    );

    reg.remove(&TaskId::new("t1")).unwrap();
    assert!(reg.is_empty());
}

#[tokio::test]
async fn successful_run_lifecycle() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(
        helpers.path(),
        "search-name.py",
        r#"printf 'status\tquery\n' >&2
printf 'package\tavailable\t%s;1.0;noarch;fedora\tFound it\n' "$2"
sleep 0.5"#,
    );
    let (mut reg, sink) = registry(helpers.path());

    let job = reg
        .add(
            Task::new("search", Role::SearchName)
                .with_arguments(HelperArgs::new().arg("none").arg("vim")),
        )
        .unwrap()
        .job();
    reg.commit(&TaskId::new("search")).unwrap();
    assert_eq!(state_of(&mut reg, "search"), TransactionState::Running);
    assert!(reg.lookup_by_job(job).unwrap().pid().is_some());
    assert!(reg.role_present(Role::SearchName));

    let before = reg.snapshot();
    let err = reg.remove(&TaskId::new("search")).unwrap_err();
    assert!(matches!(err, RegistryError::StillActive(_)));
    assert_eq!(reg.snapshot(), before);

    assert_eq!(next_finished(&mut reg).await, job);
    assert_eq!(
        state_of(&mut reg, "search"),
        TransactionState::Finished(ExitKind::Success)
    );
    assert!(!reg.role_present(Role::SearchName));
    assert_eq!(reg.lookup_by_job(job).unwrap().pid(), None);

    let events = sink.events();
    assert!(events.contains(&Recorded::Control(ControlEvent::StatusChange(
        pkd_schema::StatusKind::Query
    ))));
    assert_eq!(sink.protocol().len(), 1);
    assert_eq!(events.last(), Some(&Recorded::Finished(ExitKind::Success)));

    reg.remove(&TaskId::new("search")).unwrap();
    assert!(reg.lookup_by_job(job).is_none());
    assert!(reg.snapshot().is_empty());
}

#[tokio::test]
async fn cancel_twice_yields_single_finished() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(helpers.path(), "update-system.py", "exec sleep 30");
    let (mut reg, sink) = registry(helpers.path());

    reg.add(Task::new("upd", Role::UpdateSystem)).unwrap();
    reg.commit(&TaskId::new("upd")).unwrap();

    assert!(reg.cancel(&TaskId::new("upd")).unwrap());
    assert!(!reg.cancel(&TaskId::new("upd")).unwrap());

    next_finished(&mut reg).await;
    assert_eq!(
        state_of(&mut reg, "upd"),
        TransactionState::Finished(ExitKind::Killed)
    );
    assert!(!reg.cancel(&TaskId::new("upd")).unwrap());

    assert_eq!(sink.exits(), vec![ExitKind::Killed]);
    assert_eq!(
        sink.errors(),
        vec![(ErrorKind::ProcessKill, "Transaction was cancelled".to_owned())]
    );
}

#[tokio::test]
async fn quit_marks_transaction_quit() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(helpers.path(), "refresh-cache.py", "ulimit -c 0\nexec sleep 30");
    let (mut reg, sink) = registry(helpers.path());

    reg.add(Task::new("rc", Role::RefreshCache)).unwrap();
    reg.commit(&TaskId::new("rc")).unwrap();
    assert!(reg.quit(&TaskId::new("rc")).unwrap());

    next_finished(&mut reg).await;
    assert_eq!(
        state_of(&mut reg, "rc"),
        TransactionState::Finished(ExitKind::Quit)
    );
    assert_eq!(
        sink.errors(),
        vec![(ErrorKind::ProcessQuit, "Transaction was cancelled".to_owned())]
    );
}

#[tokio::test]
async fn double_commit_is_rejected_without_mutation() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(helpers.path(), "get-updates.py", "exit 0");
    let (mut reg, sink) = registry(helpers.path());

    reg.add(Task::new("gu", Role::GetUpdates)).unwrap();
    reg.commit(&TaskId::new("gu")).unwrap();
    let err = reg.commit(&TaskId::new("gu")).unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyCommitted(_)));

    next_finished(&mut reg).await;
    let err = reg.commit(&TaskId::new("gu")).unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyCommitted(_)));
    assert_eq!(sink.exits(), vec![ExitKind::Success]);
}

#[tokio::test]
async fn silent_failure_reports_internal_error() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(helpers.path(), "remove-package.py", "exit 1");
    let (mut reg, sink) = registry(helpers.path());

    reg.add(Task::new("rm", Role::RemovePackage)).unwrap();
    reg.commit(&TaskId::new("rm")).unwrap();
    next_finished(&mut reg).await;

    assert_eq!(
        state_of(&mut reg, "rm"),
        TransactionState::Finished(ExitKind::Failed)
    );
    assert_eq!(
        sink.errors(),
        vec![(
            ErrorKind::InternalError,
            "Helper returned non-zero return value but did not set error".to_owned()
        )]
    );
}

#[tokio::test]
async fn failure_of_one_transaction_leaves_others_running() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(helpers.path(), "get-depends.py", "sleep 0.3");
    let (mut reg, _sink) = registry(helpers.path());

    reg.add(Task::new("deps", Role::GetDepends)).unwrap();
    reg.add(Task::new("broken", Role::GetRequires)).unwrap();
    reg.commit(&TaskId::new("deps")).unwrap();
    reg.commit(&TaskId::new("broken")).unwrap();

    assert_eq!(state_of(&mut reg, "deps"), TransactionState::Running);
    assert_eq!(
        state_of(&mut reg, "broken"),
        TransactionState::Finished(ExitKind::Failed)
    );
    assert!(reg.role_present(Role::GetDepends));
    assert!(!reg.role_present(Role::GetRequires));

    let job = next_finished(&mut reg).await;
    assert_eq!(reg.lookup_by_job(job).unwrap().task().id, "deps");
    assert_eq!(
        state_of(&mut reg, "deps"),
        TransactionState::Finished(ExitKind::Success)
    );
}

#[tokio::test]
async fn registry_from_config_uses_script_table() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(
        helpers.path(),
        "repos.sh",
        r"printf 'repo-detail\tfedora\tFedora\ttrue\n'",
    );
    let config = DaemonConfig::from_toml_str(&format!(
        "backend = \"{BACKEND}\"\nhelpers_dir = \"{}\"\ndrain_timeout_ms = 100\n\n[scripts]\nget-repo-list = \"repos.sh\"\n",
        helpers.path().display()
    ))
    .unwrap();

    let sink = Arc::new(RecordingSink::new());
    let shared = Arc::clone(&sink);
    let mut reg = TransactionRegistry::from_config(
        &config,
        move |_: &TransactionId, _: Role| -> Arc<dyn BackendSink> { shared.clone() },
    );

    reg.add(Task::new("repos", Role::GetRepoList)).unwrap();
    reg.commit(&TaskId::new("repos")).unwrap();
    next_finished(&mut reg).await;

    assert_eq!(sink.protocol().len(), 1);
    assert_eq!(sink.exits(), vec![ExitKind::Success]);
}

#[tokio::test]
async fn exit_is_visible_to_queries_without_waiting() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(helpers.path(), "get-description.py", "exit 0");
    let (mut reg, sink) = registry(helpers.path());

    let job = reg
        .add(Task::new("pkgs", Role::GetDescription))
        .unwrap()
        .job();
    reg.commit(&TaskId::new("pkgs")).unwrap();

    for _ in 0..100 {
        if !sink.exits().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sink.exits(), vec![ExitKind::Success]);

    assert!(!reg.role_present(Role::GetDescription));
    assert_eq!(
        state_of(&mut reg, "pkgs"),
        TransactionState::Finished(ExitKind::Success)
    );
    assert_eq!(reg.lookup_by_job(job).unwrap().pid(), None);
    assert_eq!(
        reg.snapshot()[0].state,
        TransactionState::Finished(ExitKind::Success)
    );
}

#[tokio::test]
async fn dropping_registry_kills_running_helpers() {
    let helpers = tempfile::tempdir().unwrap();
    write_helper(helpers.path(), "install-file.py", "exec sleep 30");
    let (mut reg, _sink) = registry(helpers.path());

    reg.add(Task::new("files", Role::InstallFile)).unwrap();
    reg.commit(&TaskId::new("files")).unwrap();
    let pid = reg
        .lookup_by_task(&TaskId::new("files"))
        .unwrap()
        .pid()
        .unwrap();
    drop(reg);

    let stat = format!("/proc/{pid}/stat");
    let mut alive = true;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        alive = std::fs::read_to_string(&stat)
            .is_ok_and(|s| !s.rsplit(')').next().unwrap().trim_start().starts_with('Z'));
        if !alive {
            break;
        }
    }
    assert!(!alive, "helper {pid} outlived the registry");
}
