//! Persisted default-source store and resolution.

use std::fs;
use std::path::PathBuf;

use crate::error::{BrokerError, BrokerResult};
use crate::registry::AppRecord;

/// Key-value collaborator holding the user's last chosen source path.
pub trait DefaultStore {
    fn read(&self) -> Option<String>;
    fn write(&mut self, path: &str) -> BrokerResult<()>;
}

/// Plain-text file under the per-user configuration directory.
#[derive(Debug, Clone)]
pub struct FileDefaultStore {
    path: PathBuf,
}

impl FileDefaultStore {
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("scanbridge").join("default_source"),
        }
    }

    /// Use an explicit file instead of the per-user location.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FileDefaultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultStore for FileDefaultStore {
    fn read(&self) -> Option<String> {
        fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn write(&mut self, value: &str) -> BrokerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, value)?;
        Ok(())
    }
}

/// In-memory store for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct MemoryDefaultStore {
    value: Option<String>,
}

impl MemoryDefaultStore {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }
}

impl DefaultStore for MemoryDefaultStore {
    fn read(&self) -> Option<String> {
        self.value.clone()
    }

    fn write(&mut self, value: &str) -> BrokerResult<()> {
        self.value = Some(value.to_string());
        Ok(())
    }
}

/// Pick the default source for an application.
///
/// The first discovered source is remembered as the fallback; the first
/// entry whose path matches the persisted default (case-insensitive) is
/// preferred and terminates the scan. With nothing discovered the
/// application has no compatible source at all.
pub(crate) fn resolve(app: &AppRecord, store: &dyn DefaultStore) -> BrokerResult<usize> {
    if app.source_count() == 0 {
        return Err(BrokerError::NoSource);
    }
    if let Some(want) = store.read() {
        for (index, src) in app.sources().enumerate() {
            if src.path.to_string_lossy().eq_ignore_ascii_case(&want) {
                return Ok(index);
            }
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DataGroups, Identity, ProtocolVersion};
    use crate::registry::SourceRecord;
    use tempfile::TempDir;

    fn app_with_sources(paths: &[&str]) -> AppRecord {
        let mut app = AppRecord::new(Identity::new(
            "App",
            "Vendor",
            ProtocolVersion::CURRENT,
            DataGroups::IMAGE,
        ));
        for (i, path) in paths.iter().enumerate() {
            app.add_source(SourceRecord::new(
                Identity::new(
                    format!("D{}", i + 1),
                    "Vendor",
                    ProtocolVersion::CURRENT,
                    DataGroups::IMAGE,
                ),
                PathBuf::from(path),
            ))
            .unwrap();
        }
        app
    }

    #[test]
    fn test_no_sources_means_no_default() {
        let app = app_with_sources(&[]);
        let store = MemoryDefaultStore::default();
        assert!(matches!(
            resolve(&app, &store),
            Err(BrokerError::NoSource)
        ));
    }

    #[test]
    fn test_fallback_is_first_discovered() {
        let app = app_with_sources(&["/drv/d1", "/drv/d2"]);
        let store = MemoryDefaultStore::default();
        assert_eq!(resolve(&app, &store).unwrap(), 0);
    }

    #[test]
    fn test_persisted_path_preferred() {
        let app = app_with_sources(&["/drv/d1", "/drv/d2"]);
        let store = MemoryDefaultStore::with_value("/drv/d2");
        assert_eq!(resolve(&app, &store).unwrap(), 1);
    }

    #[test]
    fn test_persisted_path_match_is_case_insensitive() {
        let app = app_with_sources(&["/drv/d1", "/Drv/D2"]);
        let store = MemoryDefaultStore::with_value("/drv/d2");
        assert_eq!(resolve(&app, &store).unwrap(), 1);
    }

    #[test]
    fn test_unmatched_persisted_path_falls_back() {
        let app = app_with_sources(&["/drv/d1", "/drv/d2"]);
        let store = MemoryDefaultStore::with_value("/drv/gone");
        assert_eq!(resolve(&app, &store).unwrap(), 0);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = FileDefaultStore::at(dir.path().join("cfg").join("default_source"));
        assert_eq!(store.read(), None);
        store.write("/drv/d1").unwrap();
        assert_eq!(store.read(), Some("/drv/d1".to_string()));
    }
}
