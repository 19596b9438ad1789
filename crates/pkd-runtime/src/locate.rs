use std::path::PathBuf;
use tracing::debug;

/// Finds helper executables for one backend.
///
/// A local development tree (`<local>/<backend>/helpers/<script>`) wins when
/// it is configured and the script exists there; otherwise the installed
/// location `<helpers_dir>/<backend>/<script>` is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperLocator {
    backend: String,
    helpers_dir: PathBuf,
    local_dir: Option<PathBuf>,
}

impl HelperLocator {
    pub fn new(backend: impl Into<String>, helpers_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: backend.into(),
            helpers_dir: helpers_dir.into(),
            local_dir: None,
        }
    }

    #[must_use]
    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn resolve(&self, script: &str) -> PathBuf {
        if let Some(local) = &self.local_dir {
            let candidate = local.join(&self.backend).join("helpers").join(script);
            if candidate.exists() {
                debug!("using local helper {}", candidate.display());
                return candidate;
            }
        }
        self.helpers_dir.join(&self.backend).join(script)
    }
}
