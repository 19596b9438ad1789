//! Shared vocabulary for the pkd transaction core.
//!
//! This crate defines the enumerated protocol kinds and their text forms,
//! the injectable `EnumLookup` used by the decoder, identifier newtypes
//! (`PackageId`, `TransactionId`), and the typed events a helper process
//! produces on its stdout and stderr.

pub mod enums;
pub mod events;
pub mod lookup;
pub mod types;

pub use enums::{
    ErrorKind, ExitKind, GroupKind, InfoKind, MessageKind, RestartKind, Role, StatusKind,
};
pub use events::{
    ControlEvent, PackageDescription, PackageFiles, ProtocolEvent, RepoDetail, UpdateDetail,
    MAX_PACKAGE_SIZE,
};
pub use lookup::{EnumLookup, StandardLookup};
pub use types::{PackageId, PackageIdError, TaskId, TransactionId};
