//! Per-application source records.

use std::fmt;
use std::path::PathBuf;

use crate::hooks::OverrideHandle;
use crate::protocol::{CallbackFn, Identity, Msg};
use crate::source::{LoadedModule, SourceEntry};

/// Callback registration plus the one-deep notification buffer used when
/// the application has not supplied a callback function.
#[derive(Default)]
pub struct CallbackRecord {
    pub(crate) callback: Option<CallbackFn>,
    pub(crate) token: u32,
    pub(crate) pending: Option<Msg>,
    pub(crate) delivery_pending: bool,
}

impl fmt::Debug for CallbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRecord")
            .field(
                "callback",
                &if self.callback.is_some() { "<fn>" } else { "<none>" },
            )
            .field("token", &self.token)
            .field("pending", &self.pending)
            .field("delivery_pending", &self.delivery_pending)
            .finish()
    }
}

/// A source discovered for (and owned by) one application connection.
///
/// Identity and path survive for the lifetime of the owning connection even
/// while the module is unloaded between probe and open; the module handle
/// and entry point exist only while the source is open.
pub struct SourceRecord {
    pub identity: Identity,

    /// Unique key for "is this the persisted default".
    pub path: PathBuf,

    /// Entry object, present only while open. Declared before `module` so
    /// it drops first: the entry's code lives inside the module.
    pub(crate) entry: Option<Box<dyn SourceEntry>>,

    /// Module handle, present only while open. Dropping unloads it.
    pub(crate) module: Option<Box<dyn LoadedModule>>,

    pub(crate) callback: CallbackRecord,

    /// Reentrancy guard: a top-level call into this source is executing.
    pub(crate) in_flight: bool,

    /// Loader-override handle installed for legacy sources while open.
    pub(crate) override_handle: Option<OverrideHandle>,
}

impl SourceRecord {
    pub fn new(identity: Identity, path: PathBuf) -> Self {
        Self {
            identity,
            path,
            entry: None,
            module: None,
            callback: CallbackRecord::default(),
            in_flight: false,
            override_handle: None,
        }
    }

    /// Whether the source module is currently resident.
    pub fn is_open(&self) -> bool {
        self.entry.is_some() || self.module.is_some()
    }

    /// Drop the entry point and unload the module, scrubbing transient
    /// connection state. Identity and path are retained.
    pub(crate) fn close(&mut self) {
        self.entry = None;
        self.module = None;
        self.callback = CallbackRecord::default();
        self.in_flight = false;
        self.override_handle = None;
    }
}

impl fmt::Debug for SourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRecord")
            .field("identity", &self.identity)
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("in_flight", &self.in_flight)
            .field("callback", &self.callback)
            .finish()
    }
}
