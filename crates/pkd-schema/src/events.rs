//! Typed events decoded from helper output.
//!
//! Data events arrive on a helper's stdout, control events on its stderr.
//! Both serialize in an adjacently tagged form (`{"event": ..., "data": ...}`)
//! so progress can be forwarded to clients verbatim.

use serde::{Deserialize, Serialize};

use crate::enums::{ErrorKind, GroupKind, InfoKind, MessageKind, RestartKind, StatusKind};
use crate::types::PackageId;

/// Largest package size, in bytes, a helper may report.
pub const MAX_PACKAGE_SIZE: u64 = 1_073_741_824;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescription {
    pub package_id: String,
    pub license: String,
    pub group: GroupKind,
    pub detail: String,
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFiles {
    pub package_id: String,
    /// `;`-separated list exactly as the helper sent it.
    pub file_list: String,
}

impl PackageFiles {
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.file_list.split(';').filter(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDetail {
    pub repo_id: String,
    pub description: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetail {
    pub package_id: String,
    pub updates: String,
    pub obsoletes: String,
    pub vendor_url: String,
    pub bugzilla_url: String,
    pub cve_url: String,
    pub restart: RestartKind,
    pub update_text: String,
}

/// A data event from a helper's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ProtocolEvent {
    Package {
        info: InfoKind,
        package_id: PackageId,
        summary: String,
    },
    Description(PackageDescription),
    Files(PackageFiles),
    RepoDetail(RepoDetail),
    UpdateDetail(UpdateDetail),
}

/// A control event from a helper's stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ControlEvent {
    Percentage(u8),
    SubPercentage(u8),
    ErrorCode { kind: ErrorKind, message: String },
    RequireRestart { kind: RestartKind, details: String },
    Message { kind: MessageKind, text: String },
    TransactionDataChanged(String),
    StatusChange(StatusKind),
    AllowCancel(bool),
    NoPercentageUpdates,
    /// Free-form stderr chatter that is not a protocol command.
    Unrecognized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_split_on_semicolon() {
        let files = PackageFiles {
            package_id: "vim;7.0;i386;fedora".to_owned(),
            file_list: "/usr/bin/vim;/usr/share/vim/vimrc;".to_owned(),
        };
        let list: Vec<&str> = files.files().collect();
        assert_eq!(list, vec!["/usr/bin/vim", "/usr/share/vim/vimrc"]);
    }

    #[test]
    fn protocol_event_json_shape() {
        let event = ProtocolEvent::Package {
            info: InfoKind::Installed,
            package_id: PackageId::parse("vim;7.0;i386;fedora").unwrap(),
            summary: "The vim editor".to_owned(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "package");
        assert_eq!(value["data"]["info"], "installed");
        assert_eq!(value["data"]["package_id"], "vim;7.0;i386;fedora");

        let back: ProtocolEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn control_event_json_shape() {
        let value = serde_json::to_value(ControlEvent::StatusChange(StatusKind::RefreshCache)).unwrap();
        assert_eq!(value["event"], "status-change");
        assert_eq!(value["data"], "refresh-cache");

        let value = serde_json::to_value(ControlEvent::NoPercentageUpdates).unwrap();
        assert_eq!(value["event"], "no-percentage-updates");
    }
}
