//! Supervision of one helper process at a time.
//!
//! `ProcessSupervisor::spawn` launches the helper with piped stdout/stderr and
//! hands the child to a tokio task. The task decodes both streams line by
//! line, relays events to the [`BackendSink`], and reports the exit exactly
//! once through [`BackendSink::finished`].

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pkd_schema::{ControlEvent, EnumLookup, ErrorKind, ExitKind, MessageKind};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::args::HelperCommand;
use crate::buffer::LineBuffer;
use crate::decode::{decode_error_line, decode_output_line, DecodeError};
use crate::locate::HelperLocator;
use crate::sink::{forward_control, forward_protocol, BackendSink};
use crate::SpawnError;

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const CANCELLED_TEXT: &str = "Transaction was cancelled";
const SILENT_FAILURE_TEXT: &str = "Helper returned non-zero return value but did not set error";
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Kill,
    Quit,
}

/// Map an OS exit status onto the helper exit vocabulary.
pub fn classify_exit(status: ExitStatus) -> ExitKind {
    match status.signal() {
        Some(libc::SIGQUIT) => ExitKind::Quit,
        Some(_) => ExitKind::Killed,
        None if status.success() => ExitKind::Success,
        None => ExitKind::Failed,
    }
}

/// The live side of one spawned helper.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    in_use: Arc<AtomicBool>,
    termination_requested: AtomicBool,
    control: mpsc::UnboundedSender<Termination>,
    task: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True from a successful spawn until the exit has been reported.
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    fn request(&self, termination: Termination) -> bool {
        if !self.is_in_use() {
            debug!(pid = self.pid, "helper not in use, ignoring {termination:?}");
            return false;
        }
        if self.termination_requested.swap(true, Ordering::AcqRel) {
            debug!(pid = self.pid, "termination already requested");
            return false;
        }
        self.control.send(termination).is_ok()
    }
}

impl Drop for ProcessHandle {
    // The child lives in the supervision task with kill_on_drop set, so
    // aborting the task kills a helper that is still running.
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if self.is_in_use() {
                debug!(pid = self.pid, "handle dropped, killing helper");
            }
            task.abort();
        }
    }
}

/// Launches helpers for one transaction and relays what they report.
pub struct ProcessSupervisor {
    locator: HelperLocator,
    lookup: Arc<dyn EnumLookup>,
    sink: Arc<dyn BackendSink>,
    drain_timeout: Duration,
    current: Option<ProcessHandle>,
}

impl ProcessSupervisor {
    pub fn new(
        locator: HelperLocator,
        lookup: Arc<dyn EnumLookup>,
        sink: Arc<dyn BackendSink>,
    ) -> Self {
        Self {
            locator,
            lookup,
            sink,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            current: None,
        }
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn is_in_use(&self) -> bool {
        self.current.as_ref().is_some_and(ProcessHandle::is_in_use)
    }

    pub fn pid(&self) -> Option<u32> {
        self.current.as_ref().map(ProcessHandle::pid)
    }

    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.current.as_ref()
    }

    /// Start `command` and return the helper's pid.
    ///
    /// A launch failure is reported to the sink as an internal error followed
    /// by `Finished(Failed)` before the error is returned. Spawning while a
    /// previous helper is still running fails with [`SpawnError::InUse`] and
    /// reports nothing.
    pub fn spawn(&mut self, command: &HelperCommand) -> Result<u32, SpawnError> {
        if let Some(handle) = self.current.as_ref().filter(|h| h.is_in_use()) {
            return Err(SpawnError::InUse(handle.pid));
        }
        match self.launch(command) {
            Ok(pid) => Ok(pid),
            Err(err) => {
                warn!("spawn of helper '{}' failed: {err}", command.script);
                self.sink.error_code(
                    ErrorKind::InternalError,
                    &format!("Spawn of helper '{}' failed", command.script),
                );
                self.sink.finished(ExitKind::Failed);
                Err(err)
            }
        }
    }

    fn launch(&mut self, command: &HelperCommand) -> Result<u32, SpawnError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SpawnError::NoRuntime)?;
        command.args.validate()?;

        let path = self.locator.resolve(&command.script);
        debug!("spawning {} {}", path.display(), command.args);

        let mut child = Command::new(&path)
            .args(command.args.as_slice())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Exec {
                path: path.clone(),
                source,
            })?;

        let pid = child.id().unwrap_or_default();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let in_use = Arc::new(AtomicBool::new(true));

        let relay = Relay {
            pid,
            sink: Arc::clone(&self.sink),
            lookup: Arc::clone(&self.lookup),
            stdout_lines: LineBuffer::new(),
            stderr_lines: LineBuffer::new(),
            errors_reported: 0,
        };
        let streams = Streams { stdout, stderr };
        let task = runtime.spawn(supervise(
            child,
            streams,
            control_rx,
            relay,
            Arc::clone(&in_use),
            self.drain_timeout,
        ));

        info!(pid, "started helper {command}");
        self.current = Some(ProcessHandle {
            pid,
            in_use,
            termination_requested: AtomicBool::new(false),
            control: control_tx,
            task: Some(task),
        });
        Ok(pid)
    }

    /// Force the running helper to stop (SIGKILL).
    ///
    /// Returns false without doing anything when no helper is in use or a
    /// termination was already requested. `Finished` still arrives through the
    /// normal exit path.
    pub fn kill(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|h| h.request(Termination::Kill))
    }

    /// Ask the running helper to quit (SIGQUIT). Same rules as [`kill`](Self::kill).
    pub fn quit(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|h| h.request(Termination::Quit))
    }

    /// Wait until the current helper's exit has been fully reported.
    pub async fn join(&mut self) {
        let Some(task) = self.current.as_mut().and_then(|h| h.task.take()) else {
            return;
        };
        if let Err(e) = task.await {
            warn!("helper supervision task ended abnormally: {e}");
        }
    }
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("locator", &self.locator)
            .field("drain_timeout", &self.drain_timeout)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

struct Streams {
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

/// Turns raw pipe chunks into sink calls for one process.
struct Relay {
    pid: u32,
    sink: Arc<dyn BackendSink>,
    lookup: Arc<dyn EnumLookup>,
    stdout_lines: LineBuffer,
    stderr_lines: LineBuffer,
    errors_reported: usize,
}

impl Relay {
    fn stdout_chunk(&mut self, chunk: &[u8]) {
        for line in self.stdout_lines.push(chunk) {
            debug!(pid = self.pid, "stdout: {line}");
            match decode_output_line(&line, self.lookup.as_ref()) {
                Ok(Some(event)) => forward_protocol(self.sink.as_ref(), &event),
                Ok(None) => {}
                Err(err) => self.absorb(&line, &err),
            }
        }
    }

    fn stderr_chunk(&mut self, chunk: &[u8]) {
        for line in self.stderr_lines.push(chunk) {
            if line.is_empty() {
                continue;
            }
            debug!(pid = self.pid, "stderr: {line}");
            match decode_error_line(&line, self.lookup.as_ref()) {
                Ok(event) => {
                    if matches!(event, ControlEvent::ErrorCode { .. }) {
                        self.errors_reported += 1;
                    }
                    forward_control(self.sink.as_ref(), &event);
                }
                Err(err) => self.absorb(&line, &err),
            }
        }
    }

    fn absorb(&self, line: &str, err: &DecodeError) {
        warn!(pid = self.pid, "dropping helper line '{line}': {err}");
        self.sink.message(MessageKind::Daemon, &err.to_string());
    }

    fn finish(&mut self, exit: ExitKind) {
        let lost = self.stdout_lines.discard() + self.stderr_lines.discard();
        if lost > 0 {
            debug!(pid = self.pid, "discarding {lost} bytes of unterminated output");
        }
        match exit {
            ExitKind::Killed => self.sink.error_code(ErrorKind::ProcessKill, CANCELLED_TEXT),
            ExitKind::Quit => self.sink.error_code(ErrorKind::ProcessQuit, CANCELLED_TEXT),
            ExitKind::Failed if self.errors_reported == 0 => {
                self.sink
                    .error_code(ErrorKind::InternalError, SILENT_FAILURE_TEXT);
            }
            ExitKind::Failed | ExitKind::Success => {}
        }
        info!(pid = self.pid, "helper finished: {exit}");
        self.sink.finished(exit);
    }
}

/// Read into `buf`, or stay pending forever once the stream is gone.
async fn read_some<R: AsyncRead + Unpin>(
    stream: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match stream {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Record a read result, closing the stream on EOF or error.
fn settle<R>(pid: u32, name: &str, result: std::io::Result<usize>, stream: &mut Option<R>) -> usize {
    match result {
        Ok(0) => {
            *stream = None;
            0
        }
        Ok(n) => n,
        Err(e) => {
            warn!(pid, "reading helper {name} failed: {e}");
            *stream = None;
            0
        }
    }
}

#[allow(unsafe_code)]
fn send_quit(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(pid, libc::SIGQUIT) };
    if rc != 0 {
        warn!(pid, "failed to send SIGQUIT: {}", std::io::Error::last_os_error());
    }
}

async fn supervise(
    mut child: Child,
    mut streams: Streams,
    mut control: mpsc::UnboundedReceiver<Termination>,
    mut relay: Relay,
    in_use: Arc<AtomicBool>,
    drain_timeout: Duration,
) {
    let pid = relay.pid;
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];
    let mut control_open = true;

    let status = loop {
        tokio::select! {
            biased;
            request = control.recv(), if control_open => match request {
                Some(Termination::Kill) => {
                    info!(pid, "killing helper");
                    if let Err(e) = child.start_kill() {
                        warn!(pid, "failed to kill helper: {e}");
                    }
                }
                Some(Termination::Quit) => {
                    info!(pid, "asking helper to quit");
                    if let Some(id) = child.id() {
                        send_quit(id);
                    }
                }
                None => {
                    // owner dropped its handle
                    control_open = false;
                    if let Err(e) = child.start_kill() {
                        warn!(pid, "failed to kill orphaned helper: {e}");
                    }
                }
            },
            read = read_some(&mut streams.stdout, &mut out_buf) => {
                let n = settle(pid, "stdout", read, &mut streams.stdout);
                relay.stdout_chunk(&out_buf[..n]);
            }
            read = read_some(&mut streams.stderr, &mut err_buf) => {
                let n = settle(pid, "stderr", read, &mut streams.stderr);
                relay.stderr_chunk(&err_buf[..n]);
            }
            status = child.wait() => break status,
        }
    };
    control.close();

    let drain = async {
        while streams.stdout.is_some() || streams.stderr.is_some() {
            tokio::select! {
                read = read_some(&mut streams.stdout, &mut out_buf) => {
                    let n = settle(pid, "stdout", read, &mut streams.stdout);
                    relay.stdout_chunk(&out_buf[..n]);
                }
                read = read_some(&mut streams.stderr, &mut err_buf) => {
                    let n = settle(pid, "stderr", read, &mut streams.stderr);
                    relay.stderr_chunk(&err_buf[..n]);
                }
            }
        }
    };
    if tokio::time::timeout(drain_timeout, drain).await.is_err() {
        warn!(pid, "helper output still open after {drain_timeout:?}, discarding the rest");
    }

    let exit = match status {
        Ok(status) => classify_exit(status),
        Err(e) => {
            warn!(pid, "waiting for helper failed: {e}");
            ExitKind::Failed
        }
    };
    relay.finish(exit);
    in_use.store(false, Ordering::Release);
    drop(streams);
}
