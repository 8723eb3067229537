//! Source module handling: loading seam, identity probe, discovery, and
//! default resolution.
//!
//! A *source* is a dynamically loaded driver module exposing the single
//! entry symbol [`SOURCE_ENTRY_SYMBOL`]. The broker core only ever talks to
//! the narrow [`ModuleLoader`] / [`LoadedModule`] / [`SourceEntry`] traits;
//! the `libloading`-backed implementation lives in `native` behind the
//! `dynamic-sources` feature.

pub mod defaults;
pub mod discovery;
#[cfg(feature = "dynamic-sources")]
pub mod native;
pub mod probe;
pub mod traits;

pub use defaults::{DefaultStore, FileDefaultStore, MemoryDefaultStore};
#[cfg(feature = "dynamic-sources")]
pub use native::NativeLoader;
pub use traits::{
    LoadedModule, ModuleLoader, SourceEntry, SourceEntryFn, SourceHost, SOURCE_ENTRY_SYMBOL,
};
