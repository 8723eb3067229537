//! scanbridge — a broker between imaging applications and dynamically
//! loaded hardware driver modules ("sources").
//!
//! Applications connect, enumerate the compatible sources discovered on
//! this machine, open one, and exchange triplet-addressed messages with it;
//! the broker owns the connection state machine, the identity registry,
//! routing, and the notification bridge in between. There is no global
//! state: a [`Broker`] is an explicit context object, and everything
//! platform-specific (module loading, default persistence, application
//! wake-up, the legacy loader override) enters through injectable traits.
//!
//! ```no_run
//! use scanbridge::{
//!     Broker, BrokerConfig, Dat, DataGroups, Identity, Msg, Payload,
//!     ProtocolVersion,
//! };
//!
//! let mut broker = Broker::new(BrokerConfig::default());
//! let mut payload = Payload::Identity(Identity::new(
//!     "Scan1",
//!     "Example",
//!     ProtocolVersion::CURRENT,
//!     DataGroups::CONTROL | DataGroups::IMAGE,
//! ));
//! let rc = broker.dispatch(
//!     None,
//!     None,
//!     DataGroups::CONTROL,
//!     Dat::Parent,
//!     Msg::OpenBroker,
//!     &mut payload,
//! );
//! assert!(rc.is_success());
//! ```

mod bridge;
pub mod broker;
pub mod config;
pub mod error;
pub mod hooks;
pub mod protocol;
pub mod registry;
pub mod source;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult};
pub use hooks::{LoaderOverride, NoopLoaderOverride, NoopWake, OverrideHandle, Wake};
pub use protocol::{
    CallbackFn, CallbackReg, ConditionCode, Dat, DataGroups, EventPayload, Identity, Msg,
    Payload, ProtocolVersion, ResultCode,
};
pub use registry::{AppHandle, MAX_APPS, MAX_SOURCES};
pub use source::{
    DefaultStore, FileDefaultStore, LoadedModule, MemoryDefaultStore, ModuleLoader, SourceEntry,
    SourceEntryFn, SourceHost, SOURCE_ENTRY_SYMBOL,
};
#[cfg(feature = "dynamic-sources")]
pub use source::NativeLoader;
