//! Shared test doubles for the protocol-level integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scanbridge::{
    BrokerError, BrokerResult, Dat, DataGroups, Identity, LoadedModule, Msg, ModuleLoader,
    Payload, ProtocolVersion, ResultCode, SourceEntry, SourceHost,
};

/// Calls a mock source entry point has observed, in order.
pub type CallLog = Arc<Mutex<Vec<(Dat, Msg)>>>;

/// Scriptable source entry point.
///
/// Answers the identity probe, records every applied triplet, raises a
/// transfer-ready notification when poked with the trigger attribute, and
/// reports pumped events as not-source-events so the broker forwards them
/// visibly.
pub struct MockEntry {
    identity: Identity,
    calls: CallLog,
}

/// Attribute that makes a mock source raise `Msg::TransferReady` mid-call.
pub const NOTIFY_TRIGGER: Dat = Dat::SourceSpecific(7);

impl SourceEntry for MockEntry {
    fn call(
        &mut self,
        host: &mut dyn SourceHost,
        origin: Option<&Identity>,
        _group: DataGroups,
        dat: Dat,
        msg: Msg,
        payload: &mut Payload,
    ) -> ResultCode {
        if origin.is_none() {
            // Identity probe; no resources may be touched here.
            if let Payload::Identity(out) = payload {
                *out = self.identity.clone();
            }
            return ResultCode::Success;
        }

        self.calls.lock().unwrap().push((dat, msg));

        if dat == NOTIFY_TRIGGER {
            return host.notify(Msg::TransferReady);
        }
        if dat == Dat::Event && msg == Msg::ProcessEvent {
            return ResultCode::NotSourceEvent;
        }
        ResultCode::Success
    }
}

pub struct MockModule {
    identity: Identity,
    calls: CallLog,
}

impl LoadedModule for MockModule {
    fn entry(&self) -> BrokerResult<Box<dyn SourceEntry>> {
        Ok(Box::new(MockEntry {
            identity: self.identity.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct MockSource {
    identity: Identity,
    loads: Arc<AtomicUsize>,
    calls: CallLog,
}

/// Loader keyed by module file stem. Stems without a registered source
/// fail to load, standing in for broken modules on disk.
#[derive(Default)]
pub struct MockLoader {
    sources: HashMap<String, MockSource>,
}

impl MockLoader {
    pub fn add(&mut self, stem: &str, identity: Identity) -> (Arc<AtomicUsize>, CallLog) {
        let loads = Arc::new(AtomicUsize::new(0));
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        self.sources.insert(
            stem.to_string(),
            MockSource {
                identity,
                loads: Arc::clone(&loads),
                calls: Arc::clone(&calls),
            },
        );
        (loads, calls)
    }
}

impl ModuleLoader for MockLoader {
    fn load(&self, path: &Path) -> BrokerResult<Box<dyn LoadedModule>> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let source = self
            .sources
            .get(stem)
            .ok_or_else(|| BrokerError::operation(format!("cannot load {:?}", path)))?;
        source.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockModule {
            identity: source.identity.clone(),
            calls: Arc::clone(&source.calls),
        }))
    }
}

pub fn module_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// Create an empty module file for the stub loader to "load".
pub fn touch_module(dir: &Path, stem: &str) -> PathBuf {
    let path = dir.join(format!("{}.{}", stem, module_extension()));
    std::fs::write(&path, b"").unwrap();
    path
}

pub fn app_identity(name: &str) -> Identity {
    Identity::new(
        name,
        "TestVendor",
        ProtocolVersion::CURRENT,
        DataGroups::CONTROL | DataGroups::IMAGE,
    )
}

pub fn source_identity(name: &str, groups: DataGroups) -> Identity {
    Identity::new(name, "TestVendor", ProtocolVersion::CURRENT, groups)
}
