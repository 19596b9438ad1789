use pkd_runtime::HelperLocator;
use pkd_schema::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HELPERS_DIR: &str = "/usr/share/PackageKit/helpers";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("backend name must not be empty")]
    EmptyBackend,
}

/// Daemon settings read from a TOML file.
///
/// ```toml
/// backend = "yum"
/// helpers_dir = "/usr/share/PackageKit/helpers"
/// drain_timeout_ms = 500
///
/// [scripts]
/// search-name = "search-name.py"
/// rollback = ""
/// ```
///
/// An empty script name marks the role as unsupported by the backend.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct DaemonConfig {
    pub backend: String,
    pub helpers_dir: PathBuf,
    pub local_helpers_dir: Option<PathBuf>,
    pub drain_timeout_ms: u64,
    pub log_filter: String,
    pub scripts: BTreeMap<Role, String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            backend: "dummy".to_owned(),
            helpers_dir: PathBuf::from(DEFAULT_HELPERS_DIR),
            local_helpers_dir: None,
            drain_timeout_ms: 500,
            log_filter: "info".to_owned(),
            scripts: BTreeMap::new(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if config.backend.trim().is_empty() {
            return Err(ConfigError::EmptyBackend);
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn helper_locator(&self) -> HelperLocator {
        let locator = HelperLocator::new(&self.backend, &self.helpers_dir);
        match &self.local_helpers_dir {
            Some(dir) => locator.with_local_dir(dir),
            None => locator,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.backend, "dummy");
        assert_eq!(config.helpers_dir, PathBuf::from("/usr/share/PackageKit/helpers"));
        assert_eq!(config.drain_timeout(), Duration::from_millis(500));
        assert_eq!(config.log_filter, "info");
        assert!(config.local_helpers_dir.is_none());
    }

    #[test]
    fn parses_full_config() {
        let config = DaemonConfig::from_toml_str(
            r#"
backend = "yum"
helpers_dir = "/opt/helpers"
local_helpers_dir = "/home/dev/backends"
drain_timeout_ms = 50
log_filter = "pkd_runtime=debug"

[scripts]
search-name = "search-name.py"
rollback = ""
"#,
        )
        .unwrap();
        assert_eq!(config.backend, "yum");
        assert_eq!(config.drain_timeout(), Duration::from_millis(50));
        assert_eq!(
            config.scripts.get(&Role::SearchName).map(String::as_str),
            Some("search-name.py")
        );
        assert_eq!(config.scripts.get(&Role::Rollback).map(String::as_str), Some(""));

        let locator = config.helper_locator();
        assert_eq!(locator.backend(), "yum");
        assert_eq!(
            locator.resolve("resolve.py"),
            PathBuf::from("/opt/helpers/yum/resolve.py")
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = DaemonConfig::from_toml_str("backend = \"yum\"\nhelper_dir = \"/x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml(_)));
        assert!(err.to_string().contains("helper_dir"));
    }

    #[test]
    fn rejects_unknown_role() {
        let err = DaemonConfig::from_toml_str("[scripts]\nfly-to-moon = \"moon.py\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml(_)));
    }

    #[test]
    fn rejects_empty_backend() {
        assert!(matches!(
            DaemonConfig::from_toml_str("backend = \" \""),
            Err(ConfigError::EmptyBackend)
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkd.toml");
        std::fs::write(&path, "backend = \"apt\"\n").unwrap();
        assert_eq!(DaemonConfig::load(&path).unwrap().backend, "apt");

        let missing = DaemonConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
