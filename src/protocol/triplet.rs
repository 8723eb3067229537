//! Triplet vocabulary: data groups, attribute types, message verbs, and the
//! closed result/condition code sets returned from every dispatch.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Coarse feature-category bitmask used for capability matching.
///
/// CONTROL is universally supported and carries no capability information;
/// the remaining group bits describe what kind of data a source can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataGroups(pub u32);

impl DataGroups {
    pub const NONE: DataGroups = DataGroups(0);

    /// Control operations. Every application and source supports these.
    pub const CONTROL: DataGroups = DataGroups(0x0001);

    /// Image acquisition.
    pub const IMAGE: DataGroups = DataGroups(0x0002);

    /// Audio acquisition.
    pub const AUDIO: DataGroups = DataGroups(0x0004);

    /// Mask covering the capability groups proper (flags above are excluded).
    pub const GROUP_MASK: DataGroups = DataGroups(0x00FF_FFFF);

    /// Advertised by sources that speak the current broker protocol and do
    /// not need the legacy loader override while open.
    pub const MODERN: DataGroups = DataGroups(0x1000_0000);

    pub const fn contains(self, other: DataGroups) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersection(self, other: DataGroups) -> DataGroups {
        DataGroups(self.0 & other.0)
    }

    pub const fn without(self, other: DataGroups) -> DataGroups {
        DataGroups(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Capability overlap between an application's requested groups and a
    /// source's advertised groups. CONTROL is masked out: a source that
    /// advertises nothing beyond it is never compatible.
    pub fn compatible_with(self, other: DataGroups) -> bool {
        !self
            .intersection(other)
            .without(Self::CONTROL)
            .intersection(Self::GROUP_MASK)
            .is_empty()
    }
}

impl BitOr for DataGroups {
    type Output = DataGroups;

    fn bitor(self, rhs: DataGroups) -> DataGroups {
        DataGroups(self.0 | rhs.0)
    }
}

/// Data-attribute type: the second element of a triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dat {
    /// Source-to-application notification channel.
    Null,
    /// Source identity management: enumeration, defaults, open/close.
    Identity,
    /// Broker connection lifecycle.
    Parent,
    /// Condition-code queries.
    Status,
    /// Application event pump.
    Event,
    /// Callback registration.
    Callback,
    /// An attribute owned by a specific source (capabilities, transfer
    /// setup, ...). Forwarded without interpretation.
    SourceSpecific(u16),
}

/// Message verb: the third element of a triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Msg {
    Get,
    GetFirst,
    GetNext,
    GetDefault,
    SetDefault,
    /// Connect an application to the broker.
    OpenBroker,
    /// Disconnect an application from the broker.
    CloseBroker,
    OpenSource,
    CloseSource,
    /// Pump one application event through the broker.
    ProcessEvent,
    RegisterCallback,

    // Source-to-application notifications.
    TransferReady,
    CloseRequest,
    CloseOk,
    DeviceEvent,

    /// A verb owned by a specific source. Forwarded without interpretation.
    SourceSpecific(u16),
}

impl Msg {
    /// True for the verbs a source pushes to its owning application.
    pub fn is_notification(self) -> bool {
        matches!(
            self,
            Msg::TransferReady | Msg::CloseRequest | Msg::CloseOk | Msg::DeviceEvent
        )
    }
}

/// Direct outcome of a dispatch. A closed set; anything richer travels in
/// the condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    /// The operation failed; the condition code has the detail.
    Failure,
    /// Partial success; the condition code has the detail.
    CheckStatus,
    /// The user (or source UI) cancelled the operation.
    Cancel,
    /// A buffered source notification was delivered into the event payload.
    SourceEvent,
    /// The pumped event was not a source notification.
    NotSourceEvent,
    /// Enumeration walked past the last entry.
    EndOfList,
    /// The source understood the request but has nothing to report.
    InfoNotSupported,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        matches!(self, ResultCode::Success | ResultCode::CheckStatus)
    }
}

/// Sticky per-application error slot, readable exactly once before it
/// resets to `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionCode {
    #[default]
    Success,
    /// Unstructured failure: an internal fault was caught at a firewall.
    Bummer,
    LowMemory,
    /// No capability-compatible source exists.
    NoSuchSource,
    /// Module load, symbol resolution, or probe handshake failed.
    OperationError,
    /// Bad or missing argument.
    BadValue,
    /// Wrong connection state, or a reentrant call.
    SequenceError,
    /// Unknown or invalid source destination.
    BadDestination,
    /// Unrecognized (group, attribute, verb) combination.
    BadProtocol,
    /// Connection table full.
    MaxConnections,
}
