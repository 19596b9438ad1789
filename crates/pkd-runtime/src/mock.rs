use crate::sink::BackendSink;
use pkd_schema::{
    ControlEvent, ErrorKind, ExitKind, InfoKind, MessageKind, PackageDescription, PackageFiles,
    PackageId, ProtocolEvent, RepoDetail, RestartKind, StatusKind, UpdateDetail,
};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Protocol(ProtocolEvent),
    Control(ControlEvent),
    Finished(ExitKind),
}

/// A sink that keeps every call in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Recorded) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn exits(&self) -> Vec<ExitKind> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Finished(exit) => Some(exit),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Control(ControlEvent::ErrorCode { kind, message }) => {
                    Some((kind, message))
                }
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self, wanted: MessageKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Control(ControlEvent::Message { kind, text }) if kind == wanted => {
                    Some(text)
                }
                _ => None,
            })
            .collect()
    }

    pub fn protocol(&self) -> Vec<ProtocolEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Protocol(event) => Some(event),
                _ => None,
            })
            .collect()
    }
}

impl BackendSink for RecordingSink {
    fn package(&self, info: InfoKind, package_id: &PackageId, summary: &str) {
        self.push(Recorded::Protocol(ProtocolEvent::Package {
            info,
            package_id: package_id.clone(),
            summary: summary.to_owned(),
        }));
    }

    fn description(&self, description: &PackageDescription) {
        self.push(Recorded::Protocol(ProtocolEvent::Description(
            description.clone(),
        )));
    }

    fn files(&self, files: &PackageFiles) {
        self.push(Recorded::Protocol(ProtocolEvent::Files(files.clone())));
    }

    fn repo_detail(&self, detail: &RepoDetail) {
        self.push(Recorded::Protocol(ProtocolEvent::RepoDetail(detail.clone())));
    }

    fn update_detail(&self, detail: &UpdateDetail) {
        self.push(Recorded::Protocol(ProtocolEvent::UpdateDetail(
            detail.clone(),
        )));
    }

    fn percentage(&self, value: u8) {
        self.push(Recorded::Control(ControlEvent::Percentage(value)));
    }

    fn sub_percentage(&self, value: u8) {
        self.push(Recorded::Control(ControlEvent::SubPercentage(value)));
    }

    fn error_code(&self, kind: ErrorKind, message: &str) {
        self.push(Recorded::Control(ControlEvent::ErrorCode {
            kind,
            message: message.to_owned(),
        }));
    }

    fn require_restart(&self, kind: RestartKind, details: &str) {
        self.push(Recorded::Control(ControlEvent::RequireRestart {
            kind,
            details: details.to_owned(),
        }));
    }

    fn message(&self, kind: MessageKind, text: &str) {
        self.push(Recorded::Control(ControlEvent::Message {
            kind,
            text: text.to_owned(),
        }));
    }

    fn transaction_data(&self, data: &str) {
        self.push(Recorded::Control(ControlEvent::TransactionDataChanged(
            data.to_owned(),
        )));
    }

    fn status(&self, status: StatusKind) {
        self.push(Recorded::Control(ControlEvent::StatusChange(status)));
    }

    fn allow_cancel(&self, allowed: bool) {
        self.push(Recorded::Control(ControlEvent::AllowCancel(allowed)));
    }

    fn no_percentage_updates(&self) {
        self.push(Recorded::Control(ControlEvent::NoPercentageUpdates));
    }

    fn unrecognized(&self, line: &str) {
        self.push(Recorded::Control(ControlEvent::Unrecognized(line.to_owned())));
    }

    fn finished(&self, exit: ExitKind) {
        self.push(Recorded::Finished(exit));
    }
}
