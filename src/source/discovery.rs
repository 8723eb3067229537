//! Best-effort recursive scan of a source module directory.

use std::path::Path;

use crate::registry::{AppRecord, SourceRecord};

use super::probe::probe_or_open;
use super::traits::ModuleLoader;

/// Shared-library extension for source modules on this platform.
pub(crate) fn module_extension() -> &'static str {
    if cfg!(target_os = "linux") {
        "so"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else if cfg!(target_os = "windows") {
        "dll"
    } else {
        "so"
    }
}

/// Recursively walk `root`, browse-probing every candidate module and
/// appending compatible sources to `app`. Returns the number of sources
/// discovered in this pass.
///
/// This is a best-effort scan: a broken module must not abort discovery of
/// the others, and a traversal failure aborts that subtree only. Entries
/// are visited in file-name order so the result is deterministic for a
/// fixed file-system snapshot.
pub(crate) fn discover(app: &mut AppRecord, loader: &dyn ModuleLoader, root: &Path) -> usize {
    let mut count = 0;
    scan_dir(app, loader, root, module_extension(), &mut count);
    count
}

fn scan_dir(
    app: &mut AppRecord,
    loader: &dyn ModuleLoader,
    dir: &Path,
    extension: &str,
    count: &mut usize,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("skipping unreadable directory {:?}: {}", dir, e);
            return;
        }
    };

    let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scan_dir(app, loader, &path, extension, count);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) != Some(extension) {
            continue;
        }
        if app.source_count() >= crate::registry::MAX_SOURCES {
            log::warn!("source table full; ignoring remaining modules under {:?}", dir);
            return;
        }
        match probe_or_open(loader, app.identity.supported_groups, &path, false) {
            Ok(outcome) => {
                // add_source cannot fail here; the capacity check above
                // reserved the slot.
                if app
                    .add_source(SourceRecord::new(outcome.identity, path))
                    .is_ok()
                {
                    *count += 1;
                }
            }
            Err(e) => {
                log::debug!("skipping candidate module {:?}: {}", path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BrokerError, BrokerResult};
    use crate::protocol::{
        Dat, DataGroups, Identity, Msg, Payload, ProtocolVersion, ResultCode,
    };
    use crate::source::traits::{LoadedModule, SourceEntry, SourceHost};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    struct StubEntry {
        identity: Identity,
    }

    impl SourceEntry for StubEntry {
        fn call(
            &mut self,
            _host: &mut dyn SourceHost,
            _origin: Option<&Identity>,
            _group: DataGroups,
            _dat: Dat,
            _msg: Msg,
            payload: &mut Payload,
        ) -> ResultCode {
            if let Payload::Identity(out) = payload {
                *out = self.identity.clone();
            }
            ResultCode::Success
        }
    }

    struct StubModule {
        identity: Identity,
    }

    impl LoadedModule for StubModule {
        fn entry(&self) -> BrokerResult<Box<dyn SourceEntry>> {
            Ok(Box::new(StubEntry {
                identity: self.identity.clone(),
            }))
        }
    }

    /// Loader keyed by file stem; unknown stems fail to load.
    struct StubLoader {
        modules: HashMap<String, Identity>,
    }

    impl ModuleLoader for StubLoader {
        fn load(&self, path: &Path) -> BrokerResult<Box<dyn LoadedModule>> {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            match self.modules.get(stem) {
                Some(identity) => Ok(Box::new(StubModule {
                    identity: identity.clone(),
                })),
                None => Err(BrokerError::operation(format!("broken module {:?}", path))),
            }
        }
    }

    fn identity(name: &str, groups: DataGroups) -> Identity {
        Identity::new(name, "Vendor", ProtocolVersion::CURRENT, groups)
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(format!("{}.{}", name, module_extension())), b"").unwrap();
    }

    fn imaging_app() -> AppRecord {
        AppRecord::new(identity("Scan1", DataGroups::CONTROL | DataGroups::IMAGE))
    }

    #[test]
    fn test_discovery_filters_by_capability() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "d1");
        touch(dir.path(), "d2");

        let loader = StubLoader {
            modules: HashMap::from([
                ("d1".to_string(), identity("D1", DataGroups::IMAGE)),
                ("d2".to_string(), identity("D2", DataGroups::AUDIO)),
            ]),
        };

        let mut app = imaging_app();
        let count = discover(&mut app, &loader, dir.path());
        assert_eq!(count, 1);
        assert_eq!(app.source(0).unwrap().identity.product_name, "D1");
    }

    #[test]
    fn test_broken_module_does_not_abort_scan() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "broken");
        touch(dir.path(), "good");

        let loader = StubLoader {
            modules: HashMap::from([("good".to_string(), identity("Good", DataGroups::IMAGE))]),
        };

        let mut app = imaging_app();
        assert_eq!(discover(&mut app, &loader, dir.path()), 1);
        assert_eq!(app.source_count(), 1);
    }

    #[test]
    fn test_recursive_scan_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("nested");
        fs::create_dir(&sub).unwrap();
        touch(&sub, "d1");
        fs::write(dir.path().join("readme.txt"), b"not a module").unwrap();

        let loader = StubLoader {
            modules: HashMap::from([("d1".to_string(), identity("D1", DataGroups::IMAGE))]),
        };

        let mut app = imaging_app();
        assert_eq!(discover(&mut app, &loader, dir.path()), 1);
    }

    #[test]
    fn test_missing_root_yields_empty_scan() {
        let loader = StubLoader {
            modules: HashMap::new(),
        };
        let mut app = imaging_app();
        assert_eq!(
            discover(&mut app, &loader, Path::new("/no/such/dir")),
            0
        );
    }
}
