//! Helper process execution for pkd.
//!
//! This crate implements the spawn-and-protocol engine: the line decoders for
//! the helper text protocol (`decode_output_line`, `decode_error_line`), line
//! buffering of pipe output, helper location and argument building, the
//! `BackendSink` event boundary, and the `ProcessSupervisor` that launches a
//! helper, relays its events, and reports its exit exactly once.

pub mod args;
pub mod buffer;
pub mod decode;
pub mod locate;
pub mod mock;
pub mod sink;
pub mod supervisor;

pub use args::{HelperArgs, HelperCommand};
pub use buffer::LineBuffer;
pub use decode::{decode_error_line, decode_output_line, DecodeError};
pub use locate::HelperLocator;
pub use sink::{forward_control, forward_protocol, BackendSink};
pub use supervisor::{classify_exit, ProcessHandle, ProcessSupervisor, DEFAULT_DRAIN_TIMEOUT};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("invalid helper argument: {0}")]
    InvalidArgument(String),
    #[error("failed to execute helper {}: {source}", .path.display())]
    Exec {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("helper process {0} is still running")]
    InUse(u32),
    #[error("no async runtime available to supervise the helper")]
    NoRuntime,
}
