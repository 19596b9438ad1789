use crate::config::DaemonConfig;
use crate::transaction::Task;
use crate::RegistryError;
use pkd_runtime::HelperCommand;
use pkd_schema::Role;
use std::collections::BTreeMap;

/// Maps a task onto the helper invocation that performs it.
pub trait HelperResolver {
    fn command_for(&self, task: &Task) -> Result<HelperCommand, RegistryError>;
}

/// Resolver driven by the `[scripts]` table of the daemon config.
///
/// Roles without an entry run `<role>.py`; an entry with an empty script
/// name marks the role as unsupported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTable {
    scripts: BTreeMap<Role, String>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            scripts: config.scripts.clone(),
        }
    }

    #[must_use]
    pub fn with_script(mut self, role: Role, script: impl Into<String>) -> Self {
        self.scripts.insert(role, script.into());
        self
    }

    pub fn script_for(&self, role: Role) -> Option<String> {
        match self.scripts.get(&role) {
            Some(script) if script.is_empty() => None,
            Some(script) => Some(script.clone()),
            None => Some(format!("{role}.py")),
        }
    }
}

impl HelperResolver for ScriptTable {
    fn command_for(&self, task: &Task) -> Result<HelperCommand, RegistryError> {
        let script = self
            .script_for(task.role)
            .ok_or(RegistryError::NoHelper(task.role))?;
        Ok(HelperCommand::new(script, task.arguments.clone()))
    }
}
