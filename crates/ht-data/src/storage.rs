use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use ht_types::{config_error, DataError, HtResult};

/// Write `value` as pretty-printed JSON, creating parent directories.
pub fn save_json<T: Serialize, P: AsRef<Path>>(value: &T, file_path: P) -> HtResult<()> {
    let path = file_path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Read a JSON document into `T`.
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> HtResult<T> {
    let path = file_path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| DataError::LoadingFailed {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Persists search results to an explicit path or a configured default.
#[derive(Debug, Clone, Default)]
pub struct ResultWriter {
    write_path: Option<PathBuf>,
}

impl ResultWriter {
    pub fn new(write_path: Option<PathBuf>) -> Self {
        Self { write_path }
    }

    pub fn write_path(&self) -> Option<&Path> {
        self.write_path.as_deref()
    }

    /// The explicit path wins; otherwise the configured one is used.
    pub fn resolve(&self, path: Option<&Path>) -> HtResult<PathBuf> {
        path.or(self.write_path.as_deref())
            .map(Path::to_path_buf)
            .ok_or_else(|| config_error!("File path is not specified"))
    }

    pub fn save<T: Serialize>(&self, results: &T, path: Option<&Path>) -> HtResult<PathBuf> {
        let target = self.resolve(path)?;
        save_json(results, &target)?;
        tracing::info!("Saved results to {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ht_types::HtError;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_json_round_trip_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("results.json");
        let value = BTreeMap::from([("best_score".to_string(), 0.75)]);

        save_json(&value, &path).unwrap();
        let back: BTreeMap<String, f64> = load_json(&path).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_explicit_path_overrides_configured() {
        let dir = TempDir::new().unwrap();
        let configured = dir.path().join("default.json");
        let explicit = dir.path().join("explicit.json");
        let writer = ResultWriter::new(Some(configured.clone()));

        assert_eq!(writer.save(&1, Some(explicit.as_path())).unwrap(), explicit);
        assert!(!configured.exists());
        assert_eq!(writer.save(&2, None).unwrap(), configured);
        assert_eq!(load_json::<i32, _>(&configured).unwrap(), 2);
    }

    #[test]
    fn test_missing_path_is_a_config_error() {
        let err = ResultWriter::default().save(&1, None).unwrap_err();
        assert!(matches!(err, HtError::Config(ref m) if m == "File path is not specified"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load_json::<i32, _>("/nonexistent/results.json").is_err());
    }
}
