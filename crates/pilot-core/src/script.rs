//! Script files submitted as the pipeline's script-body variable.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ScriptSettings;
use crate::domain::{PilotError, Result};

/// Reads `<dir>/<name>.<extension>` verbatim.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
    extension: String,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn from_settings(settings: &ScriptSettings) -> Self {
        Self::new(settings.dir.clone(), settings.extension.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a script name. A name already ending in the extension is
    /// not extended twice.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let suffix = format!(".{}", self.extension.trim_start_matches('.'));
        if name.ends_with(&suffix) {
            self.dir.join(name)
        } else {
            self.dir.join(format!("{}{}", name, suffix))
        }
    }

    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.path_for(name);
        debug!(path = %path.display(), "Reading script");

        let content = std::fs::read_to_string(&path)
            .map_err(|source| PilotError::ScriptRead { path: path.clone(), source })?;

        if content.trim().is_empty() {
            return Err(PilotError::ScriptRead {
                path,
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "script is empty"),
            });
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_path_for_appends_extension_once() {
        let store = ScriptStore::new("/srv/scripts", "rb");
        assert_eq!(store.path_for("fix"), PathBuf::from("/srv/scripts/fix.rb"));
        assert_eq!(store.path_for("fix.rb"), PathBuf::from("/srv/scripts/fix.rb"));
    }

    #[test]
    fn test_read_returns_content_verbatim() {
        let dir = tempdir().unwrap();
        let body = "task fix_eligibility: :environment do\n  pp 1\nend\n";
        std::fs::write(dir.path().join("fix.rb"), body).unwrap();

        let store = ScriptStore::new(dir.path(), "rb");
        assert_eq!(store.read("fix").unwrap(), body);
    }

    #[test]
    fn test_missing_script_is_script_read_error() {
        let dir = tempdir().unwrap();
        let store = ScriptStore::new(dir.path(), "rb");

        let err = store.read("absent").unwrap_err();
        assert!(matches!(err, PilotError::ScriptRead { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_script_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("blank.rb"), "  \n").unwrap();
        let store = ScriptStore::new(dir.path(), "rb");

        assert!(matches!(store.read("blank"), Err(PilotError::ScriptRead { .. })));
    }
}
