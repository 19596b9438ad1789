use pkd_schema::{
    ControlEvent, ErrorKind, ExitKind, InfoKind, MessageKind, PackageDescription, PackageFiles,
    PackageId, ProtocolEvent, RepoDetail, RestartKind, StatusKind, UpdateDetail,
};
use tracing::debug;

/// Receiver for everything a supervised helper reports.
///
/// One method per decoded event plus the terminal [`finished`](Self::finished)
/// notification, which is delivered exactly once per spawned process. Calls
/// are made from the supervision task in the order lines were decoded.
pub trait BackendSink: Send + Sync {
    fn package(&self, info: InfoKind, package_id: &PackageId, summary: &str);
    fn description(&self, description: &PackageDescription);
    fn files(&self, files: &PackageFiles);
    fn repo_detail(&self, detail: &RepoDetail);
    fn update_detail(&self, detail: &UpdateDetail);

    fn percentage(&self, value: u8);
    fn sub_percentage(&self, value: u8);
    fn error_code(&self, kind: ErrorKind, message: &str);
    fn require_restart(&self, kind: RestartKind, details: &str);
    fn message(&self, kind: MessageKind, text: &str);
    fn transaction_data(&self, data: &str);
    fn status(&self, status: StatusKind);
    fn allow_cancel(&self, allowed: bool);
    fn no_percentage_updates(&self);

    fn unrecognized(&self, line: &str) {
        debug!("helper said: {line}");
    }

    fn finished(&self, exit: ExitKind);
}

pub fn forward_protocol(sink: &dyn BackendSink, event: &ProtocolEvent) {
    match event {
        ProtocolEvent::Package {
            info,
            package_id,
            summary,
        } => sink.package(*info, package_id, summary),
        ProtocolEvent::Description(description) => sink.description(description),
        ProtocolEvent::Files(files) => sink.files(files),
        ProtocolEvent::RepoDetail(detail) => sink.repo_detail(detail),
        ProtocolEvent::UpdateDetail(detail) => sink.update_detail(detail),
    }
}

pub fn forward_control(sink: &dyn BackendSink, event: &ControlEvent) {
    match event {
        ControlEvent::Percentage(value) => sink.percentage(*value),
        ControlEvent::SubPercentage(value) => sink.sub_percentage(*value),
        ControlEvent::ErrorCode { kind, message } => sink.error_code(*kind, message),
        ControlEvent::RequireRestart { kind, details } => sink.require_restart(*kind, details),
        ControlEvent::Message { kind, text } => sink.message(*kind, text),
        ControlEvent::TransactionDataChanged(data) => sink.transaction_data(data),
        ControlEvent::StatusChange(status) => sink.status(*status),
        ControlEvent::AllowCancel(allowed) => sink.allow_cancel(*allowed),
        ControlEvent::NoPercentageUpdates => sink.no_percentage_updates(),
        ControlEvent::Unrecognized(line) => sink.unrecognized(line),
    }
}
