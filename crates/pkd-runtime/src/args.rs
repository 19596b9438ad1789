use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SpawnError;

/// Argument list handed to a helper process.
///
/// Each entry becomes one argv element; nothing is ever joined into a shell
/// string. `Display` renders a space-joined form for logs only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HelperArgs(Vec<String>);

impl HelperArgs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.0.push(value.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(values.into_iter().map(Into::into));
        self
    }

    /// Booleans travel as `yes`/`no`.
    #[must_use]
    pub fn bool_arg(self, value: bool) -> Self {
        self.arg(if value { "yes" } else { "no" })
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reject arguments that cannot be passed through `execve`.
    pub fn validate(&self) -> Result<(), SpawnError> {
        match self.0.iter().position(|a| a.contains('\0')) {
            Some(index) => Err(SpawnError::InvalidArgument(format!(
                "argument {index} contains a NUL byte"
            ))),
            None => Ok(()),
        }
    }
}

impl fmt::Display for HelperArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// A helper script name plus the arguments to run it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub script: String,
    pub args: HelperArgs,
}

impl HelperCommand {
    pub fn new(script: impl Into<String>, args: HelperArgs) -> Self {
        Self {
            script: script.into(),
            args,
        }
    }
}

impl fmt::Display for HelperCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.script)
        } else {
            write!(f, "{} {}", self.script, self.args)
        }
    }
}
