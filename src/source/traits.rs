//! Seams between the broker core and platform module loading.
//!
//! The dispatch/state-machine logic contains zero platform-conditional
//! code: loading, symbol resolution, and the legacy compatibility hooks are
//! injected through the narrow traits below. See `native` for the
//! `libloading`-backed implementation.

use std::path::Path;

use crate::error::BrokerResult;
use crate::protocol::{Dat, DataGroups, Identity, Msg, Payload, ResultCode};

/// A loaded source module's single entry point.
///
/// `origin` is `None` exactly when the broker itself is interrogating the
/// module (the identity probe); that is the module's only reliable signal
/// to skip real resource allocation. Every other call carries a private
/// copy of the requesting application's identity.
pub trait SourceEntry {
    fn call(
        &mut self,
        host: &mut dyn SourceHost,
        origin: Option<&Identity>,
        group: DataGroups,
        dat: Dat,
        msg: Msg,
        payload: &mut Payload,
    ) -> ResultCode;
}

/// Broker services available to a source while one of its calls is on the
/// stack. Notifications raised here flow through the callback/event bridge
/// to the owning application.
pub trait SourceHost {
    /// Push a notification verb (transfer-ready, close-requested, ...) to
    /// the owning application.
    fn notify(&mut self, msg: Msg) -> ResultCode;
}

/// A resident native module. Dropping it unloads the module.
pub trait LoadedModule {
    /// Resolve the module's entry object. Fails when the entry symbol is
    /// absent or malformed.
    fn entry(&self) -> BrokerResult<Box<dyn SourceEntry>>;
}

/// Narrow loading seam injected into the broker.
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> BrokerResult<Box<dyn LoadedModule>>;
}

/// Entry-point function exported by native source modules:
///
/// ```rust,ignore
/// #[no_mangle]
/// pub extern "C" fn scanbridge_source_entry() -> Box<dyn SourceEntry> {
///     Box::new(MySource::default())
/// }
/// ```
#[allow(improper_ctypes_definitions)]
pub type SourceEntryFn = unsafe extern "C" fn() -> Box<dyn SourceEntry>;

/// Name of the entry symbol every source module must export.
pub const SOURCE_ENTRY_SYMBOL: &str = "scanbridge_source_entry";
