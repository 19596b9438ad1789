//! Injected text-to-enum resolution used by the protocol decoder.

use crate::enums::{ErrorKind, GroupKind, InfoKind, MessageKind, RestartKind, StatusKind};

/// Resolves the enumerated fields of helper protocol lines.
///
/// Every method defaults to the built-in text tables, so an implementation
/// only overrides the fields it wants to map differently (for example a
/// backend that still emits legacy names).
pub trait EnumLookup: Send + Sync {
    fn info(&self, text: &str) -> Option<InfoKind> {
        InfoKind::from_text(text)
    }

    fn restart(&self, text: &str) -> Option<RestartKind> {
        RestartKind::from_text(text)
    }

    /// Groups are informational only; unknown text is never an error.
    fn group(&self, text: &str) -> GroupKind {
        GroupKind::from_text(text).unwrap_or(GroupKind::Unknown)
    }

    fn error(&self, text: &str) -> Option<ErrorKind> {
        ErrorKind::from_text(text)
    }

    fn message(&self, text: &str) -> Option<MessageKind> {
        MessageKind::from_text(text)
    }

    fn status(&self, text: &str) -> Option<StatusKind> {
        StatusKind::from_text(text)
    }
}

/// The built-in tables with no overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardLookup;

impl EnumLookup for StandardLookup {}
