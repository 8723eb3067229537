//! Native module loading via `libloading`.

use std::path::Path;

use libloading::Library;

use crate::error::{BrokerError, BrokerResult};

use super::traits::{LoadedModule, ModuleLoader, SourceEntry, SourceEntryFn, SOURCE_ENTRY_SYMBOL};

/// Loads source modules from shared libraries (.so/.dylib/.dll).
#[derive(Debug, Default)]
pub struct NativeLoader;

impl ModuleLoader for NativeLoader {
    fn load(&self, path: &Path) -> BrokerResult<Box<dyn LoadedModule>> {
        // SAFETY: loading runs arbitrary initialization code from a
        // user-specified module path. The contract is the single exported
        // entry symbol with the documented signature.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            BrokerError::operation(format!("failed to load module {:?}: {}", path, e))
        })?;
        Ok(Box::new(NativeModule { library }))
    }
}

struct NativeModule {
    library: Library,
}

impl LoadedModule for NativeModule {
    fn entry(&self) -> BrokerResult<Box<dyn SourceEntry>> {
        // SAFETY: the symbol signature is fixed by the module contract; the
        // returned entry object must not outlive the library, which the
        // owning SourceRecord guarantees by field drop order.
        unsafe {
            let entry_fn: libloading::Symbol<SourceEntryFn> = self
                .library
                .get(SOURCE_ENTRY_SYMBOL.as_bytes())
                .map_err(|e| {
                    BrokerError::operation(format!(
                        "missing entry symbol '{}': {}",
                        SOURCE_ENTRY_SYMBOL, e
                    ))
                })?;
            Ok(entry_fn())
        }
    }
}
